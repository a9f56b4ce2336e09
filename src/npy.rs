// SPDX-License-Identifier: Apache-2.0
//
// Copyright 2025 Cisco Systems, Inc. and its affiliates
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! numpy `.npy` array files.
//!
//! an `.npy` file is a magic prefix, a format version, and a Python-dict
//! header declaring dtype, order and shape. arrays of plain numeric dtypes
//! are inert data; an object dtype (`'O'` type code in `descr`) means the
//! array body is a pickle stream and must be scanned like one.

use std::io::{Read, Seek};

use byteorder::{LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::result::ScanResult;
use crate::scan::{peek_bytes, Scanner, NUMPY_MAGIC, ZIP_EMPTY_MAGIC, ZIP_LOCAL_MAGIC};

/// parsed `.npy` header fields the scanner cares about.
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct NpyHeader {
    pub descr: String,
}

impl NpyHeader {
    /// whether the declared dtype carries Python objects.
    pub(crate) fn has_object(&self) -> bool {
        self.descr.contains('O')
    }
}

/// read the version and header dict, leaving the stream at the array body.
///
/// assumes the 6-byte magic has already been consumed.
pub(crate) fn read_header<R: Read>(data: &mut R) -> Result<NpyHeader> {
    let major = data.read_u8().map_err(truncated)?;
    let minor = data.read_u8().map_err(truncated)?;
    if !(1..=3).contains(&major) {
        return Err(Error::Format(format!(
            "unsupported npy format version {}.{}",
            major, minor
        )));
    }

    let header_len = if major == 1 {
        u64::from(data.read_u16::<LittleEndian>().map_err(truncated)?)
    } else {
        u64::from(data.read_u32::<LittleEndian>().map_err(truncated)?)
    };

    let mut header = Vec::new();
    data.take(header_len)
        .read_to_end(&mut header)
        .map_err(Error::Io)?;
    if (header.len() as u64) != header_len {
        return Err(Error::Format("truncated npy header".to_string()));
    }
    let header = String::from_utf8(header)
        .map_err(|_| Error::Format("npy header is not valid UTF-8".to_string()))?;

    let descr = header_field(&header, "descr")
        .ok_or_else(|| Error::Format("npy header has no 'descr' field".to_string()))?;
    Ok(NpyHeader {
        descr: descr.to_string(),
    })
}

fn truncated(e: std::io::Error) -> Error {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::Format("truncated npy header".to_string())
    } else {
        Error::Io(e)
    }
}

/// slice out the value of `key` from the header's dict literal.
///
/// values are either a quoted string (`'<f8'`), or a bracketed structure for
/// structured dtypes (`[('a', '<i4'), ('b', '|O')]`).
fn header_field<'a>(header: &'a str, key: &str) -> Option<&'a str> {
    let pattern = format!("'{}':", key);
    let start = header.find(&pattern)? + pattern.len();
    let rest = header[start..].trim_start();

    let mut chars = rest.char_indices();
    let (_, first) = chars.next()?;
    match first {
        '\'' | '"' => {
            let end = rest[1..].find(first)? + 1;
            Some(&rest[1..end])
        }
        '[' | '(' => {
            let close = if first == '[' { ']' } else { ')' };
            let mut depth = 0usize;
            for (i, c) in rest.char_indices() {
                if c == first {
                    depth += 1;
                } else if c == close {
                    depth -= 1;
                    if depth == 0 {
                        return Some(&rest[..=i]);
                    }
                }
            }
            None
        }
        _ => {
            let end = rest
                .find([',', '}'])
                .unwrap_or(rest.len());
            Some(rest[..end].trim_end())
        }
    }
}

impl Scanner {
    /// scan a numpy array stream.
    ///
    /// zip bytes reaching this scanner are a dispatch bug upstream (`.npz`
    /// belongs to the zip walker) and are rejected. a stream without the
    /// numpy magic falls back to the raw pickle scanner.
    pub(crate) fn scan_numpy<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
        depth: usize,
    ) -> Result<ScanResult> {
        if self.depth_exceeded(file_id, depth) {
            return Ok(ScanResult::erred());
        }

        let magic = peek_bytes(data, NUMPY_MAGIC.len())?;
        if magic.starts_with(ZIP_LOCAL_MAGIC) || magic.starts_with(ZIP_EMPTY_MAGIC) {
            return Err(Error::Format(format!(
                ".npz file not handled as zip file: {}",
                file_id
            )));
        }
        if magic != NUMPY_MAGIC {
            return self.scan_pickle_stream(data, file_id, true);
        }

        // consume the magic, then the header
        let mut consumed = [0u8; 6];
        data.read_exact(&mut consumed).map_err(Error::Io)?;
        let header = read_header(data)?;

        if header.has_object() {
            // the array body is itself a pickle stream
            self.scan_pickle_stream(data, file_id, true)
        } else {
            Ok(ScanResult {
                scanned_files: 1,
                ..ScanResult::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::SafetyLevel;
    use std::io::Cursor;

    pub(crate) fn npy_bytes(descr: &str, body: &[u8]) -> Vec<u8> {
        let header = format!(
            "{{'descr': {}, 'fortran_order': False, 'shape': (1,), }}",
            descr
        );
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"\x93NUMPY\x01\x00");
        bytes.extend_from_slice(&(header.len() as u16).to_le_bytes());
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn test_header_field_quoted_string() {
        let header = "{'descr': '<f8', 'fortran_order': False, 'shape': (3,), }";
        assert_eq!(header_field(header, "descr"), Some("<f8"));
    }

    #[test]
    fn test_header_field_structured_dtype() {
        let header = "{'descr': [('a', '<i4'), ('b', '|O')], 'fortran_order': False, }";
        assert_eq!(header_field(header, "descr"), Some("[('a', '<i4'), ('b', '|O')]"));
    }

    #[test]
    fn test_object_dtype_detection() {
        assert!(NpyHeader { descr: "|O".to_string() }.has_object());
        assert!(NpyHeader { descr: "[('a', '<i4'), ('b', '|O')]".to_string() }.has_object());
        assert!(!NpyHeader { descr: "<f8".to_string() }.has_object());
        assert!(!NpyHeader { descr: "<i4".to_string() }.has_object());
    }

    #[test]
    fn test_non_object_array_is_clean() {
        let bytes = npy_bytes("'<f8'", &1.0f64.to_le_bytes());
        let mut data = Cursor::new(bytes);
        let result = Scanner::new().scan_numpy(&mut data, "x.npy", 0).unwrap();
        assert_eq!(result.scanned_files, 1);
        assert_eq!(result.issues_count, 0);
        assert!(result.globals.is_empty());
    }

    #[test]
    fn test_object_array_body_is_scanned_as_pickle() {
        let bytes = npy_bytes("'|O'", b"cposix\nsystem\n.");
        let mut data = Cursor::new(bytes);
        let result = Scanner::new().scan_numpy(&mut data, "x.npy", 0).unwrap();
        assert_eq!(result.issues_count, 1);
        assert_eq!(result.globals[0].module, "posix");
        assert_eq!(result.globals[0].safety, SafetyLevel::Dangerous);
    }

    #[test]
    fn test_zip_bytes_are_rejected() {
        let mut data = Cursor::new(b"PK\x03\x04rest".to_vec());
        let err = Scanner::new().scan_numpy(&mut data, "x.npy", 0).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }

    #[test]
    fn test_unrecognized_prefix_falls_back_to_pickle() {
        let mut data = Cursor::new(b"cos\nsystem\n.".to_vec());
        let result = Scanner::new().scan_numpy(&mut data, "x.npy", 0).unwrap();
        assert_eq!(result.issues_count, 1);
    }

    #[test]
    fn test_truncated_header_is_format_error() {
        let mut bytes = b"\x93NUMPY\x01\x00".to_vec();
        bytes.extend_from_slice(&100u16.to_le_bytes());
        bytes.extend_from_slice(b"{'descr'");
        let mut data = Cursor::new(bytes);
        let err = Scanner::new().scan_numpy(&mut data, "x.npy", 0).unwrap_err();
        assert!(matches!(err, Error::Format(_)));
    }
}
