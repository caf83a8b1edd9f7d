// Frame handoff: double-buffered RGB frames between the capture thread and readers.

pub mod swap;

pub use swap::{BackBuffer, FrameSwap, FrontFrame, Published, Rgb8};
