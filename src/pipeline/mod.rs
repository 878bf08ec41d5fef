// Pipeline module
// Load -> align -> persist, run once per invocation

pub mod config;
pub mod trace;

use log::{info, warn};
use serde::Serialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;

use crate::align::{align_and_merge, AlignError};
use crate::export::{write_mat, WriteError};
use crate::recording::xdf::read_recording_file;
use crate::recording::{ingest_xdf, LoadError};

pub use config::{ConfigError, MergeConfig};
pub use trace::{read_trace_file, PipelineStage, TraceEntry, TraceError, TraceWriter};

#[derive(Debug, Error)]
pub enum MergeError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Align(#[from] AlignError),

    #[error(transparent)]
    Write(#[from] WriteError),
}

/// What a successful run produced
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    pub output_path: PathBuf,
    pub rows: usize,
    pub columns: usize,

    /// SHA-256 of the input recording, hex encoded
    pub input_sha256: String,
}

/// SHA-256 of `data` as lowercase hex
pub fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Trace entries are advisory: a failed append is logged and the run goes on
struct Tracer(Option<TraceWriter>);

impl Tracer {
    fn record(&self, entry: TraceEntry) {
        if let Some(writer) = &self.0 {
            if let Err(e) = writer.append(&entry) {
                warn!(
                    "Failed to record {:?} stage in trace {}: {}",
                    entry.stage,
                    writer.path().display(),
                    e
                );
            }
        }
    }
}

/// Run the whole merge described by `config`
///
/// Nothing is written to `config.output_path` unless loading and aligning
/// both succeeded.
pub fn run(config: &MergeConfig) -> Result<MergeOutcome, MergeError> {
    let tracer = Tracer(config.trace_path.clone().map(TraceWriter::new));

    // Load
    let bytes = read_recording_file(&config.input_path)?;
    let input_sha256 = calculate_sha256(&bytes);
    let recording = ingest_xdf(&bytes, &config.load_options)?;

    info!(
        "Loaded {} ({} bytes, sha256 {}), {} streams",
        config.input_path.display(),
        bytes.len(),
        input_sha256,
        recording.streams.len()
    );
    let summaries = recording.summaries();
    for summary in &summaries {
        info!(
            "  {:?} [{}] {} ch x {} samples, {} @ {:.3} Hz (nominal {})",
            summary.name,
            summary.stream_type,
            summary.channels,
            summary.samples,
            summary.channel_format.as_str(),
            summary.effective_srate,
            summary.nominal_srate
        );
    }
    tracer.record(
        TraceEntry::completed(
            PipelineStage::Load,
            format!("Loaded {} streams", summaries.len()),
        )
        .with_data(json!({
            "path": config.input_path.display().to_string(),
            "sha256": input_sha256,
            "streams": summaries,
        })),
    );
    drop(bytes);

    // Align
    let merged = align_and_merge(&recording, &config.reference_stream, &config.aligned_stream)?;
    tracer.record(
        TraceEntry::completed(
            PipelineStage::Align,
            format!(
                "Aligned {:?} onto {:?}",
                config.aligned_stream, config.reference_stream
            ),
        )
        .with_data(json!({
            "reference": config.reference_stream,
            "aligned": config.aligned_stream,
            "rows": merged.nrows(),
            "columns": merged.ncols(),
        })),
    );

    // Persist
    write_mat(&config.output_path, &config.variable_name, merged.view())?;
    tracer.record(
        TraceEntry::completed(
            PipelineStage::Persist,
            format!("Wrote {}", config.output_path.display()),
        )
        .with_data(json!({ "variable": config.variable_name })),
    );

    Ok(MergeOutcome {
        output_path: config.output_path.clone(),
        rows: merged.nrows(),
        columns: merged.ncols(),
        input_sha256,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::mat::decode_mat;
    use crate::recording::test_support::{two_stream_xdf, XdfBuilder};
    use ndarray::array;
    use std::fs;
    use tempfile::TempDir;

    fn config_in(dir: &TempDir, recording: &[u8]) -> MergeConfig {
        let input_path = dir.path().join("session.xdf");
        fs::write(&input_path, recording).unwrap();

        MergeConfig {
            input_path,
            output_path: dir.path().join("merged_data.mat"),
            ..Default::default()
        }
    }

    #[test]
    fn test_calculate_sha256() {
        assert_eq!(
            calculate_sha256(b"hello world"),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }

    #[test]
    fn test_end_to_end_merge() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir, &two_stream_xdf("EGI NetAmp 0", "Tobii"));

        let outcome = run(&config).unwrap();

        assert_eq!((outcome.rows, outcome.columns), (3, 2));
        assert_eq!(outcome.input_sha256.len(), 64);

        let (name, data) = decode_mat(&fs::read(&config.output_path).unwrap());
        assert_eq!(name, "data");
        assert_eq!(data, array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]);
    }

    #[test]
    fn test_shape_follows_reference_stream() {
        let temp_dir = TempDir::new().unwrap();
        let recording = XdfBuilder::new()
            .stream_header(1, "EGI NetAmp 0", 3, 0.0, "float32")
            .stream_header(2, "Tobii", 2, 0.0, "double64")
            .samples_f32(
                1,
                &[
                    (Some(0.0), vec![1.0, 2.0, 3.0]),
                    (Some(0.5), vec![1.0, 2.0, 3.0]),
                    (Some(1.0), vec![1.0, 2.0, 3.0]),
                    (Some(1.5), vec![1.0, 2.0, 3.0]),
                ],
            )
            .samples_f64(2, &[(Some(0.2), vec![5.0, 6.0]), (Some(1.2), vec![7.0, 8.0])])
            .build();
        let config = config_in(&temp_dir, &recording);

        let outcome = run(&config).unwrap();

        assert_eq!((outcome.rows, outcome.columns), (4, 5));
    }

    #[test]
    fn test_missing_stream_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir, &two_stream_xdf("EGI NetAmp 0", "Pupil Labs"));

        let err = run(&config).unwrap_err();

        match err {
            MergeError::Align(AlignError::StreamNotFound(e)) => assert_eq!(e.name, "Tobii"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_missing_input_writes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        let config = MergeConfig {
            input_path: temp_dir.path().join("absent.xdf"),
            output_path: temp_dir.path().join("merged_data.mat"),
            ..Default::default()
        };

        let err = run(&config).unwrap_err();

        assert!(matches!(err, MergeError::Load(LoadError::Io { .. })));
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_invalid_container_is_load_error() {
        let temp_dir = TempDir::new().unwrap();
        let config = config_in(&temp_dir, b"not a recording");

        let err = run(&config).unwrap_err();

        assert!(matches!(err, MergeError::Load(LoadError::InvalidMagic)));
        assert!(!config.output_path.exists());
    }

    #[test]
    fn test_unwritable_output_is_write_error() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config_in(&temp_dir, &two_stream_xdf("EGI NetAmp 0", "Tobii"));
        config.output_path = temp_dir.path().join("missing_dir").join("merged.mat");

        let err = run(&config).unwrap_err();

        assert!(matches!(err, MergeError::Write(WriteError::Io { .. })));
    }

    #[test]
    fn test_trace_records_each_stage() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config_in(&temp_dir, &two_stream_xdf("EGI NetAmp 0", "Tobii"));
        let trace_path = temp_dir.path().join("trace.jsonl");
        config.trace_path = Some(trace_path.clone());

        let outcome = run(&config).unwrap();

        let entries = read_trace_file(&trace_path).unwrap();
        let stages: Vec<_> = entries.iter().map(|e| e.stage).collect();
        assert_eq!(stages, PipelineStage::ALL.to_vec());

        let load = entries[0].data.as_ref().unwrap();
        assert_eq!(load["sha256"], outcome.input_sha256.as_str());
        assert_eq!(load["streams"].as_array().unwrap().len(), 2);
        assert_eq!(entries[1].data.as_ref().unwrap()["columns"], 2);
    }

    #[test]
    fn test_unwritable_trace_does_not_fail_run() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config_in(&temp_dir, &two_stream_xdf("EGI NetAmp 0", "Tobii"));
        config.trace_path = Some(temp_dir.path().join("no_such_dir").join("trace.jsonl"));

        let outcome = run(&config).unwrap();

        assert_eq!((outcome.rows, outcome.columns), (3, 2));
        let (_, data) = decode_mat(&fs::read(&config.output_path).unwrap());
        assert_eq!(data, array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]]);
    }

    #[test]
    fn test_failed_run_stops_trace() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = config_in(&temp_dir, &two_stream_xdf("EGI NetAmp 0", "EEG"));
        let trace_path = temp_dir.path().join("trace.jsonl");
        config.trace_path = Some(trace_path.clone());

        assert!(run(&config).is_err());

        let entries = read_trace_file(&trace_path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].stage, PipelineStage::Load);
    }
}
