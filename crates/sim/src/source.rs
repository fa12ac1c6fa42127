//! File source: streams a media file in fixed-size chunks

use crate::container;
use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use tracing::{debug, info};
use vidgraph_core::{
    ConfigSchema, Encoding, FormatDescriptor, FrameBuffer, PortDecl, StageContext, StageDescriptor,
    StageError, StageImpl, StageKind,
};

const DEFAULT_BLOCKSIZE: i64 = 4096;

struct FileSource {
    path: PathBuf,
    blocksize: usize,
    file: Option<File>,
}

impl StageImpl for FileSource {
    fn prepare(&mut self) -> Result<(), StageError> {
        let file = File::open(&self.path)
            .map_err(|e| StageError::failed(format!("cannot open {}: {e}", self.path.display())))?;
        self.file = Some(file);
        Ok(())
    }

    fn run(mut self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| StageError::failed("source was not prepared"))?;

        let mut chunk = vec![0u8; self.blocksize];
        let mut sequence = 0u64;
        loop {
            if ctx.draining() {
                debug!(stage = %ctx.stage_name(), "Drain requested, ending stream");
                break;
            }
            let n = file.read(&mut chunk)?;
            if n == 0 {
                break;
            }
            let buffer = FrameBuffer::new(sequence, 0.0, FormatDescriptor::new(Encoding::Container))
                .with_payload(chunk[..n].to_vec());
            ctx.push(0, buffer)?;
            sequence += 1;
        }
        info!(stage = %ctx.stage_name(), chunks = sequence, "Source exhausted");
        ctx.push_eos();
        Ok(())
    }
}

pub(crate) fn file_source() -> StageKind {
    let descriptor = StageDescriptor::new("file-source", "Reads a media file and streams it")
        .with_config(
            ConfigSchema::new()
                .required_key("location")
                .key("blocksize"),
        )
        .with_output(PortDecl::src("src", container()));
    StageKind::new(descriptor, |config| {
        let location = config
            .str_value("location")
            .ok_or("'location' must be a string path")?;
        let blocksize = config.int_value("blocksize").unwrap_or(DEFAULT_BLOCKSIZE);
        if blocksize <= 0 {
            return Err(format!("invalid blocksize: {blocksize}"));
        }
        Ok(Box::new(FileSource {
            path: PathBuf::from(location),
            blocksize: blocksize as usize,
            file: None,
        }))
    })
}
