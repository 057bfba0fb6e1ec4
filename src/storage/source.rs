//! Table sources behind the FROM clause.
//!
//! The byte-level codec is the `csv` crate; this module wraps it behind
//! the loader interface the executor consumes: (path|stdin, encoding,
//! delimiter, no-header) in, (columns, records, FileInfo) out. Loader
//! diagnostics keep their own format and are surfaced verbatim.

use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::{Encoding, Flags};
use crate::error::{Error, ErrorKind, Result};
use crate::executor::view::FileInfo;
use crate::storage::value::Value;

#[derive(Debug, Clone, PartialEq)]
pub struct LoadedTable {
    pub columns: Vec<String>,
    pub records: Vec<Vec<Value>>,
    pub file_info: FileInfo,
}

/// Resolve an unqualified table identifier against the repository
/// directory. A bare name additionally tries the `.csv` suffix.
pub fn resolve_path(name: &str, flags: &Flags) -> Option<PathBuf> {
    let direct = if Path::new(name).is_absolute() {
        PathBuf::from(name)
    } else {
        flags.repository.join(name)
    };
    if direct.is_file() {
        return Some(direct);
    }
    if Path::new(name).extension().is_none() {
        let with_ext = direct.with_extension("csv");
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    None
}

/// Display name for a table identifier as written: the stem of the
/// final path component.
pub fn resolve_display_name(name: &str) -> String {
    table_name_of(Path::new(name))
}

/// Default view name for a loaded file: the file stem.
pub fn table_name_of(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Load a delimited file from disk.
pub fn load_file(path: &Path, flags: &Flags) -> Result<LoadedTable> {
    let bytes = fs::read(path)
        .map_err(|e| Error::unplaced(ErrorKind::ReadFile(format!("{}: {}", path.display(), e))))?;
    let delimiter = flags.delimiter.unwrap_or(b',');
    let (columns, records) = parse_delimited(
        &bytes,
        delimiter,
        flags.encoding,
        flags.no_header,
        &path.display().to_string(),
    )?;
    if columns.is_empty() {
        return Err(Error::unplaced(ErrorKind::Load(format!(
            "file {} is empty",
            path.display()
        ))));
    }
    Ok(LoadedTable {
        columns,
        records,
        file_info: FileInfo::new(path.to_path_buf(), delimiter, flags.encoding, flags.no_header),
    })
}

/// Load the stdin stream (its bytes are handed in by the driver).
pub fn load_stdin(bytes: Option<&[u8]>, flags: &Flags) -> Result<LoadedTable> {
    let bytes = bytes.filter(|b| !b.is_empty()).ok_or_else(|| Error::unplaced(ErrorKind::StdinEmpty))?;
    let delimiter = flags.delimiter.unwrap_or(b',');
    let (columns, records) =
        parse_delimited(bytes, delimiter, flags.encoding, flags.no_header, "stdin")?;
    if columns.is_empty() {
        return Err(Error::unplaced(ErrorKind::StdinEmpty));
    }
    let mut info = FileInfo::new(PathBuf::from("STDIN"), delimiter, flags.encoding, flags.no_header);
    info.is_temporary = true;
    Ok(LoadedTable {
        columns,
        records,
        file_info: info,
    })
}

fn decode(bytes: &[u8], encoding: Encoding) -> Cow<'_, str> {
    match encoding {
        Encoding::Utf8 => String::from_utf8_lossy(bytes),
        Encoding::Sjis => {
            let (text, _, _) = encoding_rs::SHIFT_JIS.decode(bytes);
            text
        }
    }
}

fn parse_delimited(
    bytes: &[u8],
    delimiter: u8,
    encoding: Encoding,
    no_header: bool,
    display_name: &str,
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let text = decode(bytes, encoding);
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(false)
        .from_reader(text.as_bytes());

    let mut rows: Vec<Vec<String>> = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(display_name, &e))?;
        rows.push(record.iter().map(|f| f.to_string()).collect());
    }

    if rows.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let (columns, data) = if no_header {
        let width = rows[0].len();
        let columns = (1..=width).map(|i| format!("c{}", i)).collect();
        (columns, rows)
    } else {
        let mut iter = rows.into_iter();
        let columns = iter.next().unwrap_or_default();
        (columns, iter.collect())
    };

    let records = data
        .into_iter()
        .map(|row| row.into_iter().map(Value::String).collect())
        .collect();
    Ok((columns, records))
}

/// Diagnostics carry `line L, column C`; the column is the 1-based
/// position of the first field that breaks the expected record shape.
fn csv_error(display_name: &str, err: &csv::Error) -> Error {
    let (line, column, reason) = match err.kind() {
        csv::ErrorKind::UnequalLengths {
            pos,
            expected_len,
            len,
        } => (
            pos.as_ref().map(|p| p.line()).unwrap_or(0),
            (*expected_len).min(*len) + 1,
            "wrong number of fields in line".to_string(),
        ),
        csv::ErrorKind::Utf8 { pos, err } => (
            pos.as_ref().map(|p| p.line()).unwrap_or(0),
            err.field() as u64 + 1,
            "invalid character encoding".to_string(),
        ),
        other => (0, 0, format!("{:?}", other)),
    };
    Error::unplaced(ErrorKind::Load(format!(
        "csv parse error in file {}: line {}, column {}: {}",
        display_name, line, column, reason
    )))
}
