// Recording module
// Multi-stream recording model, XDF ingestion and stream selection

pub mod header;
pub mod sync;
pub mod xdf;

#[cfg(test)]
pub(crate) mod test_support;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use header::{ChannelFormat, FileHeader, HeaderError, StreamInfo};
pub use sync::LoadOptions;
pub use xdf::{ingest_xdf, load_xdf, LoadError};

#[derive(Debug, Error)]
#[error("No stream named {name:?} in recording (available: {available:?})")]
pub struct StreamNotFoundError {
    pub name: String,
    pub available: Vec<String>,
}

#[derive(Debug, Error)]
#[error("Stream {name:?} has {timestamps} timestamps but {rows} sample rows")]
pub struct StreamShapeError {
    pub name: String,
    pub timestamps: usize,
    pub rows: usize,
}

/// One clock offset measurement from a ClockOffset chunk
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockOffset {
    /// Recorder-side time the offset was measured at
    pub collection_time: f64,

    /// Seconds to add to the stream's clock to reach the recorder clock
    pub offset: f64,
}

/// Sample values of a stream
#[derive(Debug, Clone, PartialEq)]
pub enum SampleData {
    /// N x C matrix, numeric formats widened to f64
    Numeric(Array2<f64>),

    /// N rows of C strings (marker streams)
    Text(Vec<Vec<String>>),
}

impl SampleData {
    pub fn rows(&self) -> usize {
        match self {
            SampleData::Numeric(m) => m.nrows(),
            SampleData::Text(rows) => rows.len(),
        }
    }
}

/// A named multi-channel time series
#[derive(Debug, Clone)]
pub struct Stream {
    pub info: StreamInfo,

    /// One timestamp per sample row, in seconds
    pub timestamps: Vec<f64>,

    pub data: SampleData,

    pub clock_offsets: Vec<ClockOffset>,

    /// Raw footer XML, if the recorder wrote one
    pub footer: Option<String>,

    /// Sampling rate measured from the timestamps, 0 if unknown
    pub effective_srate: f64,
}

impl Stream {
    /// Build a numeric stream from parts, checking that rows match timestamps
    pub fn numeric(
        name: impl Into<String>,
        timestamps: Vec<f64>,
        samples: Array2<f64>,
    ) -> Result<Self, StreamShapeError> {
        let name = name.into();
        if timestamps.len() != samples.nrows() {
            return Err(StreamShapeError {
                name,
                timestamps: timestamps.len(),
                rows: samples.nrows(),
            });
        }

        let info = StreamInfo {
            name,
            stream_type: String::new(),
            channel_count: samples.ncols(),
            nominal_srate: 0.0,
            channel_format: ChannelFormat::Double64,
            source_id: String::new(),
            hostname: String::new(),
            created_at: None,
            channel_labels: Vec::new(),
        };
        let effective_srate = sync::effective_srate(&timestamps);

        Ok(Stream {
            info,
            timestamps,
            data: SampleData::Numeric(samples),
            clock_offsets: Vec::new(),
            footer: None,
            effective_srate,
        })
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn sample_count(&self) -> usize {
        self.timestamps.len()
    }

    pub fn channel_count(&self) -> usize {
        self.info.channel_count
    }

    /// Numeric sample matrix, `None` for string streams
    pub fn samples(&self) -> Option<&Array2<f64>> {
        match &self.data {
            SampleData::Numeric(m) => Some(m),
            SampleData::Text(_) => None,
        }
    }
}

/// Short per-stream description used for logs and traces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSummary {
    pub name: String,
    pub stream_type: String,
    pub channel_format: ChannelFormat,
    pub channels: usize,
    pub samples: usize,
    pub nominal_srate: f64,
    pub effective_srate: f64,
}

impl From<&Stream> for StreamSummary {
    fn from(stream: &Stream) -> Self {
        StreamSummary {
            name: stream.info.name.clone(),
            stream_type: stream.info.stream_type.clone(),
            channel_format: stream.info.channel_format,
            channels: stream.channel_count(),
            samples: stream.sample_count(),
            nominal_srate: stream.info.nominal_srate,
            effective_srate: stream.effective_srate,
        }
    }
}

/// All streams of a recording, in stream header order
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub header: FileHeader,
    pub streams: Vec<Stream>,
}

impl Recording {
    pub fn new(header: FileHeader, streams: Vec<Stream>) -> Self {
        Recording { header, streams }
    }

    /// First stream whose name matches exactly
    pub fn find_stream(&self, name: &str) -> Option<&Stream> {
        self.streams.iter().find(|s| s.name() == name)
    }

    /// Like `find_stream`, but a missing name is an error
    pub fn select_stream(&self, name: &str) -> Result<&Stream, StreamNotFoundError> {
        self.find_stream(name).ok_or_else(|| StreamNotFoundError {
            name: name.to_string(),
            available: self.stream_names().map(str::to_string).collect(),
        })
    }

    pub fn stream_names(&self) -> impl Iterator<Item = &str> {
        self.streams.iter().map(Stream::name)
    }

    pub fn summaries(&self) -> Vec<StreamSummary> {
        self.streams.iter().map(StreamSummary::from).collect()
    }
}
