// Stream merging
// Resamples one stream onto another's grid and joins their channels

use log::{debug, info};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
use thiserror::Error;

use super::interp::{self, ResampleError};
use crate::recording::{Recording, Stream, StreamNotFoundError};

#[derive(Debug, Error)]
pub enum AlignError {
    #[error(transparent)]
    StreamNotFound(#[from] StreamNotFoundError),

    #[error("Stream {0:?} holds string samples and cannot be merged")]
    NonNumericStream(String),

    #[error("Cannot resample stream {name:?}: {source}")]
    Resample {
        name: String,
        #[source]
        source: ResampleError,
    },

    #[error("Cannot join {left_rows} rows with {right_rows} rows")]
    RowMismatch { left_rows: usize, right_rows: usize },
}

pub type AlignResult<T> = Result<T, AlignError>;

/// Join two matrices side by side, keeping row order
pub fn concatenate_channels<'a>(
    reference: ArrayView2<'a, f64>,
    aligned: ArrayView2<'a, f64>,
) -> AlignResult<Array2<f64>> {
    let (left_rows, right_rows) = (reference.nrows(), aligned.nrows());

    // Differing row counts are the only way joining along columns can fail
    concatenate(Axis(1), &[reference, aligned])
        .map_err(|_| AlignError::RowMismatch { left_rows, right_rows })
}

fn numeric_samples(stream: &Stream) -> AlignResult<&Array2<f64>> {
    stream
        .samples()
        .ok_or_else(|| AlignError::NonNumericStream(stream.name().to_string()))
}

/// Resample `aligned` onto the timestamps of `reference`
pub fn align_stream(reference: &Stream, aligned: &Stream) -> AlignResult<Array2<f64>> {
    let samples = numeric_samples(aligned)?;

    interp::resample(&aligned.timestamps, samples.view(), &reference.timestamps).map_err(
        |source| AlignError::Resample {
            name: aligned.name().to_string(),
            source,
        },
    )
}

/// Select both streams, resample the second onto the first and join them
///
/// The result has one row per reference sample and the reference channels
/// followed by the aligned channels.
pub fn align_and_merge(
    recording: &Recording,
    reference_name: &str,
    aligned_name: &str,
) -> AlignResult<Array2<f64>> {
    let reference = recording.select_stream(reference_name)?;
    let aligned = recording.select_stream(aligned_name)?;

    let reference_samples = numeric_samples(reference)?;
    debug!(
        "Reference {:?}: {} x {}; aligned {:?}: {} x {}",
        reference.name(),
        reference.sample_count(),
        reference_samples.ncols(),
        aligned.name(),
        aligned.sample_count(),
        aligned.channel_count()
    );

    let resampled = align_stream(reference, aligned)?;
    let merged = concatenate_channels(reference_samples.view(), resampled.view())?;

    info!(
        "Merged {:?} onto {:?}: {} rows x {} channels",
        aligned.name(),
        reference.name(),
        merged.nrows(),
        merged.ncols()
    );

    Ok(merged)
}
