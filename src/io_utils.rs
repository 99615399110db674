//! Input plumbing: stdin/file selection, encoding, and the delimited reader.
//!
//! Extracts are plain delimited text with no quoting: a delimiter byte always
//! separates fields, and empty trailing fields are kept.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use anyhow::{Result, anyhow};
use encoding_rs::{Encoding, UTF_8};

use crate::error::{LoadError, LoadResult};

pub const DEFAULT_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn open_input(path: &Path) -> io::Result<Box<dyn Read + Send>> {
    if is_dash(path) {
        Ok(Box::new(io::stdin()))
    } else {
        Ok(Box::new(BufReader::new(File::open(path)?)))
    }
}

pub fn delimited_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(false)
        .delimiter(delimiter)
        .quoting(false)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> LoadResult<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(LoadError::Input(format!(
            "Failed to decode text with encoding {}",
            encoding.name()
        )))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> LoadResult<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Reads and decodes the header line; an empty input has no headers.
pub fn read_headers<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> LoadResult<Option<Vec<String>>> {
    let mut record = csv::ByteRecord::new();
    if !reader
        .read_byte_record(&mut record)
        .map_err(|err| LoadError::Input(format!("Reading header line: {err}")))?
    {
        return Ok(None);
    }
    let headers = decode_record(&record, encoding)?
        .into_iter()
        .map(|header| header.trim().to_string())
        .collect();
    Ok(Some(headers))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_split_without_quoting() {
        let input = "a\tb\tc\n\"x\t\ty\t\n";
        let mut reader = delimited_reader(input.as_bytes(), b'\t');
        let headers = read_headers(&mut reader, UTF_8).unwrap().unwrap();
        assert_eq!(headers, vec!["a", "b", "c"]);

        let mut record = csv::ByteRecord::new();
        assert!(reader.read_byte_record(&mut record).unwrap());
        let fields = decode_record(&record, UTF_8).unwrap();
        assert_eq!(fields, vec!["\"x", "", "y", ""]);
    }

    #[test]
    fn decoding_honours_the_input_encoding() {
        let latin1 = resolve_encoding(Some("latin1")).unwrap();
        assert_eq!(decode_bytes(&[0x63, 0x61, 0x66, 0xE9], latin1).unwrap(), "café");
        assert!(decode_bytes(&[0xFF, 0xFE, 0xFD], UTF_8).is_err());
        assert!(resolve_encoding(Some("klingon")).is_err());
    }

    #[test]
    fn empty_input_has_no_headers() {
        let mut reader = delimited_reader("".as_bytes(), b'\t');
        assert!(read_headers(&mut reader, UTF_8).unwrap().is_none());
    }
}
