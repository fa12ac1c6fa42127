//! Synthetic stage implementations for the detection pipeline
//!
//! Each stage here realizes the engine-facing behavior of one pipeline role
//! (file source, demuxer, parser, decoder, converter, batcher, detector,
//! tracker, overlay, encoder, muxer, file sink) with deterministic
//! synthetic media work: real file I/O and real orchestration semantics,
//! placeholder codec/inference math. They stand in for production
//! decode/inference backends during development and CI; a production
//! backend registers the same stage type identifiers through the same
//! [`StageRegistry`].

mod batch;
mod demux;
mod detect;
mod overlay;
mod sink;
mod source;
mod track;
mod transform;

use vidgraph_core::{
    Encoding, FormatContract, FormatDescriptor, MemoryClass, PixelLayout, StageRegistry,
};

/// Register every built-in stage type
pub fn register_builtin(registry: &mut StageRegistry) {
    registry.register(source::file_source());
    registry.register(demux::stream_demux());
    registry.register(transform::h264_parse());
    registry.register(transform::video_decode());
    registry.register(transform::video_convert());
    registry.register(batch::stream_batch());
    registry.register(detect::object_detect());
    registry.register(track::object_track());
    registry.register(overlay::overlay());
    registry.register(transform::h264_encode());
    registry.register(transform::stream_mux());
    registry.register(sink::file_sink());
}

pub(crate) fn container() -> FormatContract {
    FormatContract::new(FormatDescriptor::new(Encoding::Container))
}

pub(crate) fn h264() -> FormatContract {
    FormatContract::new(FormatDescriptor::new(Encoding::H264))
}

/// Raw video, any layout/size
pub(crate) fn raw_video() -> FormatContract {
    FormatContract::new(FormatDescriptor::new(Encoding::RawVideo))
}

/// Raw NV12 frames in system memory, any size
pub(crate) fn raw_nv12() -> FormatContract {
    FormatContract::new(
        FormatDescriptor::new(Encoding::RawVideo)
            .with_layout(PixelLayout::Nv12)
            .with_memory(MemoryClass::System),
    )
}
