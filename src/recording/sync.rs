// Timestamp post-processing
// Clock offset synchronization and jitter removal applied after ingestion

use super::ClockOffset;

/// Post-processing switches for `load_xdf`
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Map each stream's timestamps onto the recorder clock using its clock offsets
    pub synchronize_clocks: bool,

    /// Replace timestamps of regular streams by a per-segment linear fit
    pub dejitter_timestamps: bool,

    /// Gaps longer than this many seconds start a new segment
    pub jitter_break_threshold_seconds: f64,

    /// Gaps longer than this many nominal sample periods start a new segment
    pub jitter_break_threshold_samples: f64,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            synchronize_clocks: true,
            dejitter_timestamps: true,
            jitter_break_threshold_seconds: 1.0,
            jitter_break_threshold_samples: 500.0,
        }
    }
}

impl LoadOptions {
    /// Keep timestamps exactly as stored in the file
    pub fn raw() -> Self {
        LoadOptions {
            synchronize_clocks: false,
            dejitter_timestamps: false,
            ..Default::default()
        }
    }
}

/// Least squares fit y = intercept + slope * x
/// Returns (intercept, slope); a degenerate x range gives slope 0
fn linear_fit(xs: &[f64], ys: &[f64]) -> (f64, f64) {
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        cov += dx * (y - mean_y);
        var += dx * dx;
    }

    if var == 0.0 {
        return (mean_y, 0.0);
    }

    let slope = cov / var;
    (mean_y - slope * mean_x, slope)
}

/// Shift timestamps onto the recorder clock
/// Fits offset = a + b * t over the measurements and adds the fitted offset to each timestamp
pub fn synchronize_clocks(timestamps: &mut [f64], offsets: &[ClockOffset]) {
    if offsets.is_empty() || timestamps.is_empty() {
        return;
    }

    let times: Vec<f64> = offsets.iter().map(|o| o.collection_time).collect();
    let values: Vec<f64> = offsets.iter().map(|o| o.offset).collect();
    let (intercept, slope) = linear_fit(&times, &values);

    for t in timestamps.iter_mut() {
        *t += intercept + slope * *t;
    }
}

/// Replace timestamps of a regular stream with a linear fit per continuous segment
pub fn dejitter(timestamps: &mut [f64], nominal_srate: f64, options: &LoadOptions) {
    if nominal_srate <= 0.0 || timestamps.len() < 2 {
        return;
    }

    let threshold = options
        .jitter_break_threshold_seconds
        .max(options.jitter_break_threshold_samples / nominal_srate);

    let mut start = 0;
    for i in 1..=timestamps.len() {
        let is_break = i == timestamps.len() || timestamps[i] - timestamps[i - 1] > threshold;
        if is_break {
            fit_segment(&mut timestamps[start..i]);
            start = i;
        }
    }
}

fn fit_segment(segment: &mut [f64]) {
    if segment.len() < 2 {
        return;
    }

    let indices: Vec<f64> = (0..segment.len()).map(|i| i as f64).collect();
    let (intercept, slope) = linear_fit(&indices, segment);

    for (i, t) in segment.iter_mut().enumerate() {
        *t = intercept + slope * i as f64;
    }
}

/// Measured sampling rate in Hz, 0 when it cannot be determined
pub fn effective_srate(timestamps: &[f64]) -> f64 {
    if timestamps.len() < 2 {
        return 0.0;
    }

    let duration = timestamps[timestamps.len() - 1] - timestamps[0];
    if duration > 0.0 {
        (timestamps.len() - 1) as f64 / duration
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: &[f64], b: &[f64]) {
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b) {
            assert!((x - y).abs() < 1e-9, "{} != {}", x, y);
        }
    }

    #[test]
    fn test_constant_offset() {
        let mut ts = vec![10.0, 11.0, 12.0];
        let offsets = vec![ClockOffset {
            collection_time: 5.0,
            offset: -2.5,
        }];

        synchronize_clocks(&mut ts, &offsets);

        assert_close(&ts, &[7.5, 8.5, 9.5]);
    }

    #[test]
    fn test_drifting_offset() {
        // Offset grows by 0.01 s per second of stream time
        let offsets = vec![
            ClockOffset { collection_time: 0.0, offset: 1.0 },
            ClockOffset { collection_time: 100.0, offset: 2.0 },
            ClockOffset { collection_time: 200.0, offset: 3.0 },
        ];
        let mut ts = vec![0.0, 50.0, 100.0];

        synchronize_clocks(&mut ts, &offsets);

        assert_close(&ts, &[1.0, 51.5, 102.0]);
    }

    #[test]
    fn test_no_offsets_is_noop() {
        let mut ts = vec![1.0, 2.0];
        synchronize_clocks(&mut ts, &[]);
        assert_eq!(ts, vec![1.0, 2.0]);
    }

    #[test]
    fn test_dejitter_smooths_segment() {
        let mut ts = vec![0.0, 0.0105, 0.0195, 0.0302, 0.0398];

        dejitter(&mut ts, 100.0, &LoadOptions::default());

        // Residual jitter removed: constant spacing
        let d0 = ts[1] - ts[0];
        for w in ts.windows(2) {
            assert!(((w[1] - w[0]) - d0).abs() < 1e-12);
        }
        assert!((d0 - 0.01).abs() < 1e-3);
    }

    #[test]
    fn test_dejitter_keeps_breaks() {
        let options = LoadOptions {
            jitter_break_threshold_samples: 0.0,
            ..Default::default()
        };
        // 5 second gap splits the stream into two segments
        let mut ts = vec![0.0, 1.0, 2.0, 7.0, 8.0, 9.0];

        dejitter(&mut ts, 1.0, &options);

        assert_close(&ts, &[0.0, 1.0, 2.0, 7.0, 8.0, 9.0]);
    }

    #[test]
    fn test_dejitter_skips_irregular_streams() {
        let mut ts = vec![0.0, 0.3, 0.35];
        dejitter(&mut ts, 0.0, &LoadOptions::default());
        assert_eq!(ts, vec![0.0, 0.3, 0.35]);
    }

    #[test]
    fn test_effective_srate() {
        assert_eq!(effective_srate(&[]), 0.0);
        assert_eq!(effective_srate(&[3.0]), 0.0);
        assert!((effective_srate(&[0.0, 0.5, 1.0]) - 2.0).abs() < 1e-12);
    }
}
