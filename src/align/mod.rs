// Alignment module
// Linear resampling between timestamp grids and channel concatenation

pub mod interp;
pub mod merge;

pub use interp::{resample, ResampleError};
pub use merge::{align_and_merge, align_stream, concatenate_channels, AlignError};
