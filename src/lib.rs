// xdf-merge - align two XDF streams and export them as one MAT-file matrix
// Module declarations

pub mod align;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod recording;

pub use align::{align_and_merge, AlignError, ResampleError};
pub use export::WriteError;
pub use pipeline::{run, MergeConfig, MergeError, MergeOutcome};
pub use recording::{load_xdf, LoadError, LoadOptions, Recording, Stream, StreamNotFoundError};
