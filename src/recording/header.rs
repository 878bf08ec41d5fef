// XDF header parsing
// File, stream header and footer chunks carry XML; this turns them into typed info

use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HeaderError {
    #[error("Malformed header XML: {0}")]
    Xml(String),

    #[error("Header has no root element")]
    Empty,

    #[error("Stream header is missing <{0}>")]
    MissingField(&'static str),

    #[error("Invalid value for <{field}>: {value:?}")]
    InvalidValue { field: &'static str, value: String },

    #[error("Unsupported channel format: {0}")]
    UnsupportedChannelFormat(String),
}

pub type HeaderResult<T> = Result<T, HeaderError>;

fn xml_error(error: impl Display) -> HeaderError {
    HeaderError::Xml(error.to_string())
}

/// Minimal element tree for header documents
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmlElement {
    pub name: String,
    pub text: String,
    pub children: Vec<XmlElement>,
}

impl XmlElement {
    fn new(name: String) -> Self {
        XmlElement {
            name,
            ..Default::default()
        }
    }

    /// First direct child with the given tag name
    pub fn child(&self, name: &str) -> Option<&XmlElement> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All direct children with the given tag name, in document order
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a XmlElement> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Follow a chain of child names
    pub fn path(&self, names: &[&str]) -> Option<&XmlElement> {
        names.iter().try_fold(self, |node, name| node.child(name))
    }

    /// Trimmed text of a direct child, `None` if absent or blank
    pub fn child_text(&self, name: &str) -> Option<&str> {
        self.child(name)
            .map(|c| c.text.trim())
            .filter(|t| !t.is_empty())
    }
}

/// Parse an XML document into its root element
pub fn parse_xml(xml: &str) -> HeaderResult<XmlElement> {
    // Text is kept verbatim; callers trim where a field is numeric or free-form
    let mut reader = Reader::from_str(xml);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                stack.push(XmlElement::new(name));
            }
            Event::Empty(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                attach(&mut stack, &mut root, XmlElement::new(name));
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(xml_error)?;
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&String::from_utf8_lossy(&data));
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| HeaderError::Xml("unbalanced closing tag".to_string()))?;
                attach(&mut stack, &mut root, element);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if !stack.is_empty() {
        return Err(HeaderError::Xml(format!(
            "unclosed element <{}>",
            stack[stack.len() - 1].name
        )));
    }

    root.ok_or(HeaderError::Empty)
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None => {
            // Only the first top-level element counts as the document root
            if root.is_none() {
                *root = Some(element);
            }
        }
    }
}

/// Value encoding of a stream's channels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelFormat {
    Float32,
    Double64,
    String,
    Int8,
    Int16,
    Int32,
    Int64,
}

impl ChannelFormat {
    pub fn parse(s: &str) -> HeaderResult<Self> {
        match s.trim() {
            "float32" => Ok(ChannelFormat::Float32),
            "double64" => Ok(ChannelFormat::Double64),
            "string" => Ok(ChannelFormat::String),
            "int8" => Ok(ChannelFormat::Int8),
            "int16" => Ok(ChannelFormat::Int16),
            "int32" => Ok(ChannelFormat::Int32),
            "int64" => Ok(ChannelFormat::Int64),
            other => Err(HeaderError::UnsupportedChannelFormat(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelFormat::Float32 => "float32",
            ChannelFormat::Double64 => "double64",
            ChannelFormat::String => "string",
            ChannelFormat::Int8 => "int8",
            ChannelFormat::Int16 => "int16",
            ChannelFormat::Int32 => "int32",
            ChannelFormat::Int64 => "int64",
        }
    }

    pub fn is_numeric(&self) -> bool {
        !matches!(self, ChannelFormat::String)
    }
}

/// Metadata from a stream header chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamInfo {
    pub name: String,

    /// Content type, e.g. "EEG" or "Gaze"
    pub stream_type: String,

    pub channel_count: usize,

    /// Declared sampling rate in Hz; 0 marks an irregular stream
    pub nominal_srate: f64,

    pub channel_format: ChannelFormat,

    pub source_id: String,
    pub hostname: String,
    pub created_at: Option<f64>,

    /// Labels from desc/channels/channel/label, empty when not declared
    pub channel_labels: Vec<String>,
}

impl StreamInfo {
    /// Parse a stream header XML document (`<info>...</info>`)
    pub fn from_xml(xml: &str) -> HeaderResult<Self> {
        let root = parse_xml(xml)?;

        // Stream selection matches names exactly, so surrounding whitespace is kept
        let name = root
            .child("name")
            .map(|c| c.text.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or(HeaderError::MissingField("name"))?;

        let channel_count = root
            .child_text("channel_count")
            .ok_or(HeaderError::MissingField("channel_count"))
            .and_then(|v| parse_field::<usize>("channel_count", v))?;

        let nominal_srate = match root.child_text("nominal_srate") {
            Some(v) => parse_field::<f64>("nominal_srate", v)?,
            None => 0.0,
        };
        if !nominal_srate.is_finite() || nominal_srate < 0.0 {
            return Err(HeaderError::InvalidValue {
                field: "nominal_srate",
                value: nominal_srate.to_string(),
            });
        }

        let channel_format = ChannelFormat::parse(
            root.child_text("channel_format")
                .ok_or(HeaderError::MissingField("channel_format"))?,
        )?;

        let created_at = root
            .child_text("created_at")
            .map(|v| parse_field::<f64>("created_at", v))
            .transpose()?;

        let channel_labels = root
            .path(&["desc", "channels"])
            .map(|channels| {
                channels
                    .children_named("channel")
                    .map(|ch| ch.child_text("label").unwrap_or_default().to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(StreamInfo {
            name,
            stream_type: root.child_text("type").unwrap_or_default().to_string(),
            channel_count,
            nominal_srate,
            channel_format,
            source_id: root.child_text("source_id").unwrap_or_default().to_string(),
            hostname: root.child_text("hostname").unwrap_or_default().to_string(),
            created_at,
            channel_labels,
        })
    }
}

fn parse_field<T: std::str::FromStr>(field: &'static str, value: &str) -> HeaderResult<T> {
    value.trim().parse::<T>().map_err(|_| HeaderError::InvalidValue {
        field,
        value: value.to_string(),
    })
}

/// File-level header: the leaf fields of the root element
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileHeader {
    pub fields: BTreeMap<String, String>,
}

impl FileHeader {
    pub fn from_xml(xml: &str) -> HeaderResult<Self> {
        let root = parse_xml(xml)?;
        let fields = root
            .children
            .iter()
            .filter(|c| c.children.is_empty())
            .map(|c| (c.name.clone(), c.text.trim().to_string()))
            .collect();
        Ok(FileHeader { fields })
    }

    pub fn version(&self) -> Option<&str> {
        self.fields.get("version").map(String::as_str)
    }
}
