//! Frame capture and output plumbing.

mod image_seq;
mod prefetch;
mod sink;
mod source;

pub use image_seq::{ImageSequenceSource, ImageSequenceWriter};
pub use prefetch::PrefetchSource;
pub use sink::{FrameDisplay, FrameWriter, OutputSink, Route};
pub use source::{FrameSource, VecSource};
