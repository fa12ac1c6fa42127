//! On-screen overlay: renders detection results onto frames. This is the
//! customary place to attach an inspection hook, right before results are
//! burned into pixels.

use crate::raw_video;
use tracing::debug;
use vidgraph_core::{
    PortDecl, StageContext, StageDescriptor, StageError, StageImpl, StageKind,
};

struct Overlay;

impl StageImpl for Overlay {
    fn run(self: Box<Self>, mut ctx: StageContext) -> Result<(), StageError> {
        let mut rendered: usize = 0;
        loop {
            match ctx.pull(0)? {
                Some(buffer) => {
                    if let Some(meta) = &buffer.meta {
                        rendered += meta.object_count();
                    }
                    ctx.push(0, buffer)?;
                }
                None => break,
            }
        }
        debug!(objects = rendered, "Overlay rendered");
        ctx.push_eos();
        Ok(())
    }
}

pub(crate) fn overlay() -> StageKind {
    let descriptor = StageDescriptor::new("overlay", "Draws detection overlays on frames")
        .with_input(PortDecl::sink("sink", raw_video()))
        .with_output(PortDecl::src("src", raw_video()));
    StageKind::new(descriptor, |_| Ok(Box::new(Overlay)))
}
