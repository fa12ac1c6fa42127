//! File sink: writes the muxed output stream to disk

use crate::container;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use tracing::info;
use vidgraph_core::{
    ConfigSchema, PortDecl, StageContext, StageDescriptor, StageError, StageImpl, StageKind,
};

struct FileSink {
    path: PathBuf,
    file: Option<File>,
}

impl StageImpl for FileSink {
    fn prepare(&mut self) -> Result<(), StageError> {
        let file = File::create(&self.path).map_err(|e| {
            StageError::failed(format!("cannot create {}: {e}", self.path.display()))
        })?;
        self.file = Some(file);
        Ok(())
    }

    fn run(mut self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        let mut file = self
            .file
            .take()
            .ok_or_else(|| StageError::failed("sink was not prepared"))?;

        let mut bytes_written: u64 = 0;
        loop {
            match ctx.pull(0)? {
                Some(buffer) => {
                    file.write_all(&buffer.payload)?;
                    bytes_written += buffer.payload.len() as u64;
                }
                None => break,
            }
        }
        file.flush()?;
        info!(
            path = %self.path.display(),
            bytes = bytes_written,
            "Output file written"
        );
        Ok(())
    }
}

pub(crate) fn file_sink() -> StageKind {
    let descriptor = StageDescriptor::new("file-sink", "Writes the output stream to a file")
        .with_config(
            ConfigSchema::new()
                .required_key("location")
                .key("sync")
                .key("async"),
        )
        .with_input(PortDecl::sink("sink", container()));
    StageKind::new(descriptor, |config| {
        let location = config
            .str_value("location")
            .ok_or("'location' must be a string path")?;
        Ok(Box::new(FileSink {
            path: PathBuf::from(location),
            file: None,
        }))
    })
}
