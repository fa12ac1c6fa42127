//! Format contracts: declarative descriptions of the data shape a port
//! accepts, and the intersection test used before two ports may link.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Encoding of the data crossing a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    /// Multiplexed container bytes (MP4, MKV, ...)
    Container,
    /// H.264 elementary stream
    H264,
    /// Compressed audio
    Aac,
    /// Uncompressed video frames
    RawVideo,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Container => write!(f, "container"),
            Encoding::H264 => write!(f, "h264"),
            Encoding::Aac => write!(f, "aac"),
            Encoding::RawVideo => write!(f, "raw-video"),
        }
    }
}

/// Pixel layout of raw video frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelLayout {
    Nv12,
    I420,
    Rgb24,
}

impl fmt::Display for PixelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PixelLayout::Nv12 => write!(f, "nv12"),
            PixelLayout::I420 => write!(f, "i420"),
            PixelLayout::Rgb24 => write!(f, "rgb24"),
        }
    }
}

/// Where buffer memory lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryClass {
    /// Host-addressable system memory
    System,
    /// Device-resident memory (GPU surfaces)
    Device,
}

impl fmt::Display for MemoryClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryClass::System => write!(f, "system"),
            MemoryClass::Device => write!(f, "device"),
        }
    }
}

/// One acceptable data shape. Unset fields are wildcards.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    pub encoding: Encoding,
    pub layout: Option<PixelLayout>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub memory: Option<MemoryClass>,
}

fn field_compatible<T: PartialEq + Copy>(a: Option<T>, b: Option<T>) -> bool {
    match (a, b) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

impl FormatDescriptor {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            layout: None,
            width: None,
            height: None,
            memory: None,
        }
    }

    pub fn with_layout(mut self, layout: PixelLayout) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_memory(mut self, memory: MemoryClass) -> Self {
        self.memory = Some(memory);
        self
    }

    /// Two descriptors are compatible when the encoding matches and every
    /// pinned field agrees. A partial overlap (e.g. same resolution but
    /// conflicting memory class) is NOT compatible; no conversion is
    /// inserted automatically.
    pub fn compatible(&self, other: &FormatDescriptor) -> bool {
        self.encoding == other.encoding
            && field_compatible(self.layout, other.layout)
            && field_compatible(self.width, other.width)
            && field_compatible(self.height, other.height)
            && field_compatible(self.memory, other.memory)
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encoding)?;
        if let Some(layout) = self.layout {
            write!(f, "/{layout}")?;
        }
        if let (Some(w), Some(h)) = (self.width, self.height) {
            write!(f, " {w}x{h}")?;
        }
        if let Some(memory) = self.memory {
            write!(f, " @{memory}")?;
        }
        Ok(())
    }
}

/// The set of data shapes a port accepts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatContract {
    accepts: Vec<FormatDescriptor>,
}

impl FormatContract {
    pub fn new(descriptor: FormatDescriptor) -> Self {
        Self {
            accepts: vec![descriptor],
        }
    }

    pub fn any_of(descriptors: Vec<FormatDescriptor>) -> Self {
        Self {
            accepts: descriptors,
        }
    }

    pub fn descriptors(&self) -> &[FormatDescriptor] {
        &self.accepts
    }

    /// True when some pair of descriptors is compatible. Linking requires a
    /// non-trivial intersection.
    pub fn intersects(&self, other: &FormatContract) -> bool {
        self.accepts
            .iter()
            .any(|a| other.accepts.iter().any(|b| a.compatible(b)))
    }

    /// True when the contract accepts a concrete descriptor
    pub fn accepts(&self, descriptor: &FormatDescriptor) -> bool {
        self.accepts.iter().any(|a| a.compatible(descriptor))
    }
}

impl fmt::Display for FormatContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, d) in self.accepts.iter().enumerate() {
            if i > 0 {
                write!(f, " | ")?;
            }
            write!(f, "{d}")?;
        }
        Ok(())
    }
}
