// XDF ingestion
// Reads the chunked XDF container into a Recording of typed streams

use log::{debug, info, warn};
use ndarray::Array2;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::header::{ChannelFormat, FileHeader, HeaderError, StreamInfo};
use super::sync::{self, LoadOptions};
use super::{ClockOffset, Recording, SampleData, Stream};

const MAGIC: &[u8] = b"XDF:";

const TAG_FILE_HEADER: u16 = 1;
const TAG_STREAM_HEADER: u16 = 2;
const TAG_SAMPLES: u16 = 3;
const TAG_CLOCK_OFFSET: u16 = 4;
const TAG_BOUNDARY: u16 = 5;
const TAG_STREAM_FOOTER: u16 = 6;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read recording {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not an XDF recording: missing \"XDF:\" magic")]
    InvalidMagic,

    #[error("Invalid length width {width} for chunk at byte {offset}")]
    InvalidLengthWidth { width: u8, offset: usize },

    #[error("Malformed chunk at byte {offset}: {reason}")]
    MalformedChunk { offset: usize, reason: String },

    #[error("Invalid header in chunk at byte {offset}: {source}")]
    Header {
        offset: usize,
        #[source]
        source: HeaderError,
    },
}

pub type LoadResult<T> = Result<T, LoadError>;

fn malformed(offset: usize, reason: impl Into<String>) -> LoadError {
    LoadError::MalformedChunk {
        offset,
        reason: reason.into(),
    }
}

/// Little-endian cursor over a byte slice; every read is bounds checked
struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        ByteReader { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.remaining() < n {
            return None;
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Some(slice)
    }

    fn array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N).and_then(|s| s.try_into().ok())
    }

    fn u8(&mut self) -> Option<u8> {
        self.array::<1>().map(|b| b[0])
    }

    fn u16(&mut self) -> Option<u16> {
        self.array().map(u16::from_le_bytes)
    }

    fn u32(&mut self) -> Option<u32> {
        self.array().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> Option<u64> {
        self.array().map(u64::from_le_bytes)
    }

    fn f64(&mut self) -> Option<f64> {
        self.array().map(f64::from_le_bytes)
    }

    /// Integer of the given byte width (1, 4 or 8)
    fn sized(&mut self, width: u8) -> Option<u64> {
        match width {
            1 => self.u8().map(u64::from),
            4 => self.u32().map(u64::from),
            8 => self.u64(),
            _ => None,
        }
    }

    /// Width byte followed by an integer of that width
    fn varlen(&mut self) -> Option<u64> {
        let width = self.u8()?;
        self.sized(width)
    }

    fn value(&mut self, format: ChannelFormat) -> Option<f64> {
        let value = match format {
            ChannelFormat::Float32 => f32::from_le_bytes(self.array()?) as f64,
            ChannelFormat::Double64 => self.f64()?,
            ChannelFormat::Int8 => i8::from_le_bytes(self.array()?) as f64,
            ChannelFormat::Int16 => i16::from_le_bytes(self.array()?) as f64,
            ChannelFormat::Int32 => i32::from_le_bytes(self.array()?) as f64,
            ChannelFormat::Int64 => i64::from_le_bytes(self.array()?) as f64,
            ChannelFormat::String => return None,
        };
        Some(value)
    }

    fn string(&mut self) -> Option<String> {
        let len = usize::try_from(self.varlen()?).ok()?;
        self.take(len)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Per-stream accumulator while chunks are read
struct StreamBuilder {
    info: StreamInfo,
    timestamps: Vec<f64>,
    values: Vec<f64>,
    strings: Vec<Vec<String>>,
    clock_offsets: Vec<ClockOffset>,
    footer: Option<String>,
    last_timestamp: f64,
}

impl StreamBuilder {
    fn new(info: StreamInfo) -> Self {
        StreamBuilder {
            info,
            timestamps: Vec::new(),
            values: Vec::new(),
            strings: Vec::new(),
            clock_offsets: Vec::new(),
            footer: None,
            last_timestamp: 0.0,
        }
    }

    /// Append the samples of one Samples chunk; `None` if the chunk ends early
    fn read_samples(&mut self, chunk: &mut ByteReader<'_>) -> Option<usize> {
        let count = usize::try_from(chunk.varlen()?).ok()?;
        let channels = self.info.channel_count;
        let format = self.info.channel_format;
        let tdiff = if self.info.nominal_srate > 0.0 {
            1.0 / self.info.nominal_srate
        } else {
            0.0
        };

        for _ in 0..count {
            let timestamp = match chunk.u8()? {
                8 => chunk.f64()?,
                0 => self.last_timestamp + tdiff,
                _ => return None,
            };

            if format.is_numeric() {
                for _ in 0..channels {
                    let v = chunk.value(format)?;
                    self.values.push(v);
                }
            } else {
                let row = (0..channels)
                    .map(|_| chunk.string())
                    .collect::<Option<Vec<_>>>()?;
                self.strings.push(row);
            }

            self.timestamps.push(timestamp);
            self.last_timestamp = timestamp;
        }

        Some(count)
    }

    fn finish(self, options: &LoadOptions) -> LoadResult<Stream> {
        let StreamBuilder {
            info,
            mut timestamps,
            values,
            strings,
            clock_offsets,
            footer,
            ..
        } = self;

        let data = if info.channel_format.is_numeric() {
            let matrix = Array2::from_shape_vec((timestamps.len(), info.channel_count), values)
                .map_err(|e| malformed(0, format!("stream {:?}: {}", info.name, e)))?;
            SampleData::Numeric(matrix)
        } else {
            SampleData::Text(strings)
        };

        if options.synchronize_clocks {
            sync::synchronize_clocks(&mut timestamps, &clock_offsets);
        }
        if options.dejitter_timestamps {
            sync::dejitter(&mut timestamps, info.nominal_srate, options);
        }
        let effective_srate = sync::effective_srate(&timestamps);

        Ok(Stream {
            info,
            timestamps,
            data,
            clock_offsets,
            footer,
            effective_srate,
        })
    }
}

/// Read the whole recording file; the handle is closed before parsing starts
pub fn read_recording_file(path: &Path) -> LoadResult<Vec<u8>> {
    fs::read(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Load an XDF recording from disk
pub fn load_xdf(path: &Path, options: &LoadOptions) -> LoadResult<Recording> {
    let data = read_recording_file(path)?;
    let recording = ingest_xdf(&data, options)?;

    info!(
        "Loaded {} ({} bytes, {} streams)",
        path.display(),
        data.len(),
        recording.streams.len()
    );

    Ok(recording)
}

/// Parse an XDF recording from raw bytes
pub fn ingest_xdf(data: &[u8], options: &LoadOptions) -> LoadResult<Recording> {
    if !data.starts_with(MAGIC) {
        return Err(LoadError::InvalidMagic);
    }

    let mut reader = ByteReader::new(data);
    reader.pos = MAGIC.len();

    let mut file_header: Option<FileHeader> = None;
    let mut builders: Vec<StreamBuilder> = Vec::new();
    let mut index: HashMap<u32, usize> = HashMap::new();

    while reader.remaining() > 0 {
        let offset = reader.pos;

        let width = reader.u8().unwrap_or_default();
        if !matches!(width, 1 | 4 | 8) {
            return Err(LoadError::InvalidLengthWidth { width, offset });
        }

        let Some(length) = reader.sized(width) else {
            warn!("Recording truncated inside the length of the chunk at byte {}", offset);
            break;
        };
        let length = usize::try_from(length)
            .map_err(|_| malformed(offset, format!("chunk length {} too large", length)))?;
        if length < 2 {
            return Err(malformed(offset, "chunk shorter than its tag"));
        }

        let Some(body) = reader.take(length) else {
            warn!(
                "Recording truncated: chunk at byte {} declares {} bytes but {} remain",
                offset,
                length,
                reader.remaining()
            );
            break;
        };

        let mut chunk = ByteReader::new(body);
        let tag = chunk.u16().unwrap_or_default();

        match tag {
            TAG_FILE_HEADER => {
                let xml = String::from_utf8_lossy(&body[2..]);
                let header = FileHeader::from_xml(&xml)
                    .map_err(|source| LoadError::Header { offset, source })?;
                if file_header.is_none() {
                    file_header = Some(header);
                }
            }
            TAG_STREAM_HEADER => {
                let id = chunk
                    .u32()
                    .ok_or_else(|| malformed(offset, "stream header without stream id"))?;
                let xml = String::from_utf8_lossy(&body[6..]);
                let info = StreamInfo::from_xml(&xml)
                    .map_err(|source| LoadError::Header { offset, source })?;

                if index.contains_key(&id) {
                    warn!("Ignoring repeated header for stream id {} ({:?})", id, info.name);
                    continue;
                }

                debug!(
                    "Stream {} header: {:?}, {} x {}, {} Hz",
                    id,
                    info.name,
                    info.channel_count,
                    info.channel_format.as_str(),
                    info.nominal_srate
                );
                index.insert(id, builders.len());
                builders.push(StreamBuilder::new(info));
            }
            TAG_SAMPLES => {
                let id = chunk
                    .u32()
                    .ok_or_else(|| malformed(offset, "samples chunk without stream id"))?;
                let Some(&slot) = index.get(&id) else {
                    warn!("Skipping samples for undeclared stream id {}", id);
                    continue;
                };

                let stream = &mut builders[slot];
                if stream.read_samples(&mut chunk).is_none() {
                    return Err(malformed(
                        offset,
                        format!("samples for stream {:?} end early", stream.info.name),
                    ));
                }
            }
            TAG_CLOCK_OFFSET => {
                let (Some(id), Some(collection_time), Some(offset_value)) =
                    (chunk.u32(), chunk.f64(), chunk.f64())
                else {
                    return Err(malformed(offset, "clock offset chunk too short"));
                };
                match index.get(&id) {
                    Some(&slot) => builders[slot].clock_offsets.push(ClockOffset {
                        collection_time,
                        offset: offset_value,
                    }),
                    None => warn!("Skipping clock offset for undeclared stream id {}", id),
                }
            }
            TAG_STREAM_FOOTER => {
                let id = chunk
                    .u32()
                    .ok_or_else(|| malformed(offset, "stream footer without stream id"))?;
                match index.get(&id) {
                    Some(&slot) => {
                        builders[slot].footer = Some(String::from_utf8_lossy(&body[6..]).into_owned())
                    }
                    None => warn!("Skipping footer for undeclared stream id {}", id),
                }
            }
            TAG_BOUNDARY => {}
            other => debug!("Skipping chunk with unknown tag {} at byte {}", other, offset),
        }
    }

    let streams = builders
        .into_iter()
        .map(|b| b.finish(options))
        .collect::<LoadResult<Vec<_>>>()?;

    Ok(Recording::new(file_header.unwrap_or_default(), streams))
}
