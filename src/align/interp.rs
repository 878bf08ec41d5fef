// Channel-wise linear resampling
// Maps a source stream's samples onto a target timestamp grid, clamping at the edges

use ndarray::{Array2, ArrayView1, ArrayView2};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ResampleError {
    #[error("Source stream has no samples to interpolate from")]
    EmptySource,

    #[error("Source timestamps are not non-decreasing at index {index} ({previous} then {current})")]
    NonMonotonicTimestamps {
        index: usize,
        previous: f64,
        current: f64,
    },

    #[error("Source has {timestamps} timestamps but {rows} sample rows")]
    ShapeMismatch { timestamps: usize, rows: usize },
}

pub type ResampleResult<T> = Result<T, ResampleError>;

/// Where a target timestamp falls relative to the source knots
#[derive(Debug, Clone, Copy, PartialEq)]
enum Position {
    /// At or before the first knot
    First,
    /// At or after the last knot
    Last,
    /// Inside [xp[lower], xp[lower + 1])
    Between { lower: usize, offset: f64, span: f64 },
    /// NaN target
    Undefined,
}

/// Reject empty, NaN-containing or decreasing source timestamps
pub fn check_timestamps(timestamps: &[f64]) -> ResampleResult<()> {
    if timestamps.is_empty() {
        return Err(ResampleError::EmptySource);
    }

    for (i, pair) in timestamps.windows(2).enumerate() {
        let (previous, current) = (pair[0], pair[1]);
        // Written so that NaN on either side fails too
        if !(current >= previous) {
            return Err(ResampleError::NonMonotonicTimestamps {
                index: i + 1,
                previous,
                current,
            });
        }
    }

    if timestamps[0].is_nan() {
        return Err(ResampleError::NonMonotonicTimestamps {
            index: 0,
            previous: f64::NAN,
            current: f64::NAN,
        });
    }

    Ok(())
}

fn locate(x: f64, knots: &[f64]) -> Position {
    if x.is_nan() {
        return Position::Undefined;
    }

    let above = knots.partition_point(|&k| k <= x);
    if above == 0 {
        Position::First
    } else if above == knots.len() {
        Position::Last
    } else {
        let lower = above - 1;
        Position::Between {
            lower,
            offset: x - knots[lower],
            span: knots[above] - knots[lower],
        }
    }
}

fn evaluate(position: Position, values: ArrayView1<'_, f64>) -> f64 {
    match position {
        Position::First => values[0],
        Position::Last => values[values.len() - 1],
        Position::Between {
            lower,
            offset,
            span,
        } => {
            let (left, right) = (values[lower], values[lower + 1]);
            if offset == 0.0 {
                return left;
            }

            let slope = (right - left) / span;
            let mut value = slope * offset + left;
            // A NaN or infinite neighbour poisons the slope; retry from the upper knot
            if value.is_nan() {
                value = slope * (offset - span) + right;
                if value.is_nan() && left == right {
                    value = left;
                }
            }
            value
        }
        Position::Undefined => f64::NAN,
    }
}

/// Linear interpolation of one series at `x`; `knots` must already be validated
pub fn interp(x: f64, knots: &[f64], values: ArrayView1<'_, f64>) -> f64 {
    evaluate(locate(x, knots), values)
}

/// Resample every channel of `source` onto `targets`
///
/// Output has one row per target timestamp and one column per source channel.
/// Targets before the first or after the last source timestamp take the boundary
/// value; targets on a knot reproduce the knot value exactly.
pub fn resample(
    source_timestamps: &[f64],
    source: ArrayView2<'_, f64>,
    targets: &[f64],
) -> ResampleResult<Array2<f64>> {
    if source_timestamps.len() != source.nrows() {
        return Err(ResampleError::ShapeMismatch {
            timestamps: source_timestamps.len(),
            rows: source.nrows(),
        });
    }
    check_timestamps(source_timestamps)?;

    // Knot positions are shared by all channels
    let positions: Vec<Position> = targets
        .iter()
        .map(|&t| locate(t, source_timestamps))
        .collect();

    let mut output = Array2::zeros((targets.len(), source.ncols()));
    for c in 0..source.ncols() {
        let channel = source.column(c);
        for (row, position) in positions.iter().enumerate() {
            output[[row, c]] = evaluate(*position, channel);
        }
    }

    Ok(output)
}
