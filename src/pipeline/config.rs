// Merge configuration
// Built-in paths and stream names, with positional overrides for the binary

use std::path::PathBuf;
use thiserror::Error;

use crate::recording::LoadOptions;

pub const DEFAULT_INPUT_PATH: &str = "recording.xdf";
pub const DEFAULT_OUTPUT_PATH: &str = "merged_data.mat";
pub const DEFAULT_REFERENCE_STREAM: &str = "EGI NetAmp 0";
pub const DEFAULT_ALIGNED_STREAM: &str = "Tobii";
pub const DEFAULT_VARIABLE_NAME: &str = "data";

const USAGE: &str = "usage: xdf-merge [INPUT.xdf] [OUTPUT.mat]";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("Unexpected argument {0:?}; {usage}", usage = USAGE)]
    UnexpectedArgument(String),

    #[error("Options are not supported: {0:?}; {usage}", usage = USAGE)]
    UnsupportedOption(String),
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    pub input_path: PathBuf,
    pub output_path: PathBuf,

    /// Stream whose timestamps define the output rows
    pub reference_stream: String,

    /// Stream resampled onto the reference grid
    pub aligned_stream: String,

    /// Variable name of the matrix inside the MAT-file
    pub variable_name: String,

    pub load_options: LoadOptions,

    /// JSONL trace of the run; no trace when `None`
    pub trace_path: Option<PathBuf>,
}

impl Default for MergeConfig {
    fn default() -> Self {
        MergeConfig {
            input_path: PathBuf::from(DEFAULT_INPUT_PATH),
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            reference_stream: DEFAULT_REFERENCE_STREAM.to_string(),
            aligned_stream: DEFAULT_ALIGNED_STREAM.to_string(),
            variable_name: DEFAULT_VARIABLE_NAME.to_string(),
            load_options: LoadOptions::default(),
            trace_path: None,
        }
    }
}

impl MergeConfig {
    /// Defaults, with optional positional input and output paths
    pub fn from_args<I>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = String>,
    {
        let mut config = MergeConfig::default();

        for (position, arg) in args.into_iter().enumerate() {
            if arg.starts_with('-') {
                return Err(ConfigError::UnsupportedOption(arg));
            }
            match position {
                0 => config.input_path = PathBuf::from(arg),
                1 => config.output_path = PathBuf::from(arg),
                _ => return Err(ConfigError::UnexpectedArgument(arg)),
            }
        }

        Ok(config)
    }
}
