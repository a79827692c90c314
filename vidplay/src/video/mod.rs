/*!
    Video output: render surfaces and the video sink.
*/

mod sink;
mod surface;

pub(crate) use sink::VideoSink;
pub use surface::{RenderSurface, SnapshotSurface, SurfaceSlot};
