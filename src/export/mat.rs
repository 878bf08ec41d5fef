// MAT-file export
// Writes a single double matrix as an uncompressed MATLAB Level 5 file

use chrono::{DateTime, Utc};
use ndarray::ArrayView2;
use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

const HEADER_TEXT_LEN: usize = 116;
const MAT_VERSION: u16 = 0x0100;

// Data element types
const MI_INT8: u32 = 1;
const MI_INT32: u32 = 5;
const MI_UINT32: u32 = 6;
const MI_DOUBLE: u32 = 9;
const MI_MATRIX: u32 = 14;

const MX_DOUBLE_CLASS: u32 = 6;

/// MATLAB's namelengthmax
const MAX_NAME_LEN: usize = 63;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Failed to write {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid MATLAB variable name: {0:?}")]
    InvalidVariableName(String),

    #[error("Matrix of {rows} x {cols} is too large for a Level 5 MAT-file")]
    TooLarge { rows: usize, cols: usize },
}

pub type WriteResult<T> = Result<T, WriteError>;

/// Check MATLAB identifier rules: a letter, then letters, digits or underscores
pub fn validate_variable_name(name: &str) -> WriteResult<()> {
    let mut chars = name.chars();
    let starts_with_letter = chars.next().is_some_and(|c| c.is_ascii_alphabetic());
    let rest_valid = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if starts_with_letter && rest_valid && name.len() <= MAX_NAME_LEN {
        Ok(())
    } else {
        Err(WriteError::InvalidVariableName(name.to_string()))
    }
}

fn padding(len: usize) -> usize {
    (8 - len % 8) % 8
}

fn push_tag(buf: &mut Vec<u8>, data_type: u32, byte_count: u32) {
    buf.extend_from_slice(&data_type.to_le_bytes());
    buf.extend_from_slice(&byte_count.to_le_bytes());
}

fn header(created: DateTime<Utc>) -> Vec<u8> {
    let mut text = format!(
        "MATLAB 5.0 MAT-file, Platform: {}, Created on: {}",
        std::env::consts::OS,
        created.format("%a %b %e %H:%M:%S %Y")
    )
    .into_bytes();
    text.resize(HEADER_TEXT_LEN, b' ');

    let mut buf = Vec::with_capacity(128);
    buf.extend_from_slice(&text);
    buf.extend_from_slice(&[0u8; 8]); // no subsystem data
    buf.extend_from_slice(&MAT_VERSION.to_le_bytes());
    buf.extend_from_slice(b"IM");
    buf
}

/// Encode a complete MAT-file holding `matrix` under `variable`
pub fn encode_mat(
    variable: &str,
    matrix: ArrayView2<'_, f64>,
    created: DateTime<Utc>,
) -> WriteResult<Vec<u8>> {
    validate_variable_name(variable)?;

    let (rows, cols) = matrix.dim();
    let too_large = || WriteError::TooLarge { rows, cols };

    let rows_i32 = i32::try_from(rows).map_err(|_| too_large())?;
    let cols_i32 = i32::try_from(cols).map_err(|_| too_large())?;
    let data_bytes = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(8))
        .ok_or_else(too_large)?;

    let name = variable.as_bytes();
    // flags (16) + dimensions (16) + name + data
    let matrix_bytes = 16 + 16 + 8 + name.len() + padding(name.len()) + 8 + data_bytes;
    let matrix_len = u32::try_from(matrix_bytes).map_err(|_| too_large())?;
    let data_len = u32::try_from(data_bytes).map_err(|_| too_large())?;

    let mut buf = header(created);
    buf.reserve(8 + matrix_bytes);

    push_tag(&mut buf, MI_MATRIX, matrix_len);

    push_tag(&mut buf, MI_UINT32, 8);
    buf.extend_from_slice(&MX_DOUBLE_CLASS.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());

    push_tag(&mut buf, MI_INT32, 8);
    buf.extend_from_slice(&rows_i32.to_le_bytes());
    buf.extend_from_slice(&cols_i32.to_le_bytes());

    push_tag(&mut buf, MI_INT8, name.len() as u32);
    buf.extend_from_slice(name);
    buf.resize(buf.len() + padding(name.len()), 0);

    // Column-major, as MATLAB stores arrays
    push_tag(&mut buf, MI_DOUBLE, data_len);
    for column in matrix.columns() {
        for value in column {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }

    Ok(buf)
}

/// Sibling file the encoded bytes are staged in before the final rename
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".partial");
    path.with_file_name(name)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

/// Write `matrix` to `path` as variable `variable`
///
/// The file is only created once encoding succeeded, and it only appears
/// under `path` once every byte is on disk, so a failed write leaves nothing
/// behind.
pub fn write_mat(path: &Path, variable: &str, matrix: ArrayView2<'_, f64>) -> WriteResult<()> {
    let bytes = encode_mat(variable, matrix, Utc::now())?;

    let staging = staging_path(path);
    if let Err(source) = write_bytes(&staging, &bytes).and_then(|()| fs::rename(&staging, path)) {
        // The staging file may not exist if creating it was what failed
        let _ = fs::remove_file(&staging);
        return Err(WriteError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    log::info!(
        "Wrote {} x {} matrix {:?} to {}",
        matrix.nrows(),
        matrix.ncols(),
        variable,
        path.display()
    );

    Ok(())
}

/// Decode the first double matrix of a file produced by `encode_mat`
#[cfg(test)]
pub(crate) fn decode_mat(bytes: &[u8]) -> (String, ndarray::Array2<f64>) {
    let u32_at = |i: usize| u32::from_le_bytes(bytes[i..i + 4].try_into().unwrap());
    let i32_at = |i: usize| i32::from_le_bytes(bytes[i..i + 4].try_into().unwrap());

    assert_eq!(&bytes[126..128], b"IM");
    assert_eq!(u32_at(128), MI_MATRIX);
    assert_eq!(u32_at(136), MI_UINT32);
    assert_eq!(u32_at(144) & 0xff, MX_DOUBLE_CLASS);

    let rows = i32_at(160) as usize;
    let cols = i32_at(164) as usize;

    let name_len = u32_at(172) as usize;
    let name = String::from_utf8(bytes[176..176 + name_len].to_vec()).unwrap();

    let data_tag = 176 + name_len + padding(name_len);
    assert_eq!(u32_at(data_tag), MI_DOUBLE);
    let values: Vec<f64> = bytes[data_tag + 8..data_tag + 8 + rows * cols * 8]
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes(c.try_into().unwrap()))
        .collect();

    let matrix = ndarray::Array2::from_shape_vec((cols, rows), values)
        .unwrap()
        .reversed_axes();
    (name, matrix)
}
