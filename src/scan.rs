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

//! format dispatch and scan entry points.
//!
//! [`Scanner`] is the front door: hand it a seekable byte stream (or a file
//! or directory path) and it sniffs magic bytes and extension hints, unwraps
//! container formats, and routes every embedded pickle stream through the
//! extractor and classifier exactly once.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use rayon::prelude::*;
use tracing::{debug, error, warn};
use walkdir::WalkDir;

use crate::classify::build_scan_result;
use crate::error::{Error, Result};
use crate::extract::list_globals;
use crate::result::ScanResult;

/// extensions routed straight to the pickle scanner.
pub(crate) const PICKLE_FILE_EXTENSIONS: &[&str] =
    &[".pkl", ".pickle", ".joblib", ".dat", ".data"];
/// extensions of tensor checkpoint archives (zip, 7z or legacy framing).
pub(crate) const TENSOR_FILE_EXTENSIONS: &[&str] = &[".bin", ".pt", ".pth", ".ckpt"];
/// numpy array files. `.npz` is a zip and is handled by sniffing.
pub(crate) const NUMPY_FILE_EXTENSIONS: &[&str] = &[".npy"];
/// generic archive extensions, only used to pre-filter directory walks.
pub(crate) const ARCHIVE_FILE_EXTENSIONS: &[&str] = &[".zip", ".npz", ".7z"];

pub(crate) const ZIP_LOCAL_MAGIC: &[u8] = b"PK\x03\x04";
pub(crate) const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";
pub(crate) const SEVEN_ZIP_MAGIC: &[u8] = &[0x37, 0x7a, 0xbc, 0xaf, 0x27, 0x1c];
pub(crate) const NUMPY_MAGIC: &[u8] = b"\x93NUMPY";

/// pickle files carry no real magic, but protocol 2+ streams start with a
/// PROTO opcode followed by the protocol number.
pub(crate) fn is_pickle_magic(bytes: &[u8]) -> bool {
    bytes.len() >= 2 && bytes[0] == 0x80 && bytes[1] <= 0x05
}

/// read up to `n` bytes and restore the stream position.
pub(crate) fn peek_bytes<R: Read + Seek>(data: &mut R, n: usize) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; n];
    let mut filled = 0usize;
    while filled < n {
        let read = data.read(&mut buf[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    buf.truncate(filled);
    data.seek(SeekFrom::Current(-(filled as i64)))?;
    Ok(buf)
}

/// lowercased extension of `path`, with the leading dot.
pub(crate) fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
}

fn is_scannable_extension(ext: &str) -> bool {
    PICKLE_FILE_EXTENSIONS.contains(&ext)
        || TENSOR_FILE_EXTENSIONS.contains(&ext)
        || NUMPY_FILE_EXTENSIONS.contains(&ext)
        || ARCHIVE_FILE_EXTENSIONS.contains(&ext)
}

/// static pickle scanner.
///
/// stateless between scans; each entry point builds a fresh [`ScanResult`].
///
/// # Examples
///
/// ```no_run
/// use pickle_scanner::Scanner;
///
/// let scanner = Scanner::new();
/// let result = scanner.scan_file("model.pt").unwrap();
/// if result.infected_files > 0 {
///     eprintln!("model loads dangerous imports");
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Scanner {
    /// maximum nested-archive depth before a scan is abandoned
    pub max_depth: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Self { max_depth: 8 }
    }
}

impl Scanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// set the maximum nested-archive depth.
    ///
    /// exceeding the limit does not fail the scan; it records `scan_err` and
    /// returns an empty result for the too-deep stream.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// scan a byte stream, optionally steered by a lowercased extension hint
    /// (with leading dot).
    pub fn scan_bytes<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
        file_ext: Option<&str>,
    ) -> Result<ScanResult> {
        self.scan_bytes_at(data, file_id, file_ext, 0)
    }

    pub(crate) fn scan_bytes_at<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
        file_ext: Option<&str>,
        depth: usize,
    ) -> Result<ScanResult> {
        if self.depth_exceeded(file_id, depth) {
            return Ok(ScanResult::erred());
        }

        if let Some(ext) = file_ext {
            if TENSOR_FILE_EXTENSIONS.contains(&ext) {
                return match self.scan_tensor_archive(data, file_id, depth) {
                    Err(Error::InvalidMagic { file_id }) => {
                        error!("invalid magic number for file {}", file_id);
                        Ok(ScanResult::erred())
                    }
                    other => other,
                };
            }
            if NUMPY_FILE_EXTENSIONS.contains(&ext) {
                return self.scan_numpy(data, file_id, depth);
            }
        }

        let magic = peek_bytes(data, 6)?;
        if magic.starts_with(ZIP_LOCAL_MAGIC) || magic.starts_with(ZIP_EMPTY_MAGIC) {
            self.scan_zip_bytes(data, file_id, depth)
        } else if magic.starts_with(SEVEN_ZIP_MAGIC) {
            self.scan_7z_bytes(data, file_id, depth)
        } else {
            self.scan_pickle_stream(data, file_id, true)
        }
    }

    /// disassemble a pickle stream and report issues.
    ///
    /// parse failures never escape: they classify whatever was recovered and
    /// record `scan_err`. only genuine I/O failures propagate.
    pub fn scan_pickle_bytes<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
    ) -> Result<ScanResult> {
        self.scan_pickle_stream(data, file_id, true)
    }

    pub(crate) fn scan_pickle_stream<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
        multiple_pickles: bool,
    ) -> Result<ScanResult> {
        match list_globals(data, multiple_pickles) {
            Ok(raw_globals) => {
                debug!("global imports in {}: {:?}", file_id, raw_globals);
                Ok(build_scan_result(raw_globals, file_id, false))
            }
            Err(Error::Parse {
                position,
                message,
                partial_globals,
            }) => {
                error!("parsing pickle in {} at byte {}: {}", file_id, position, message);
                Ok(build_scan_result(
                    partial_globals.unwrap_or_default(),
                    file_id,
                    true,
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// scan one file on disk, dispatching on its extension and magic bytes.
    pub fn scan_file(&self, path: impl AsRef<Path>) -> Result<ScanResult> {
        self.scan_file_at(path.as_ref(), 0)
    }

    pub(crate) fn scan_file_at(&self, path: &Path, depth: usize) -> Result<ScanResult> {
        let file_ext = file_extension(path);
        let file_id = path.display().to_string();
        debug!("scanning file {}", file_id);
        let mut data = BufReader::new(File::open(path)?);
        self.scan_bytes_at(&mut data, &file_id, file_ext.as_deref(), depth)
    }

    /// recursively scan every model-like file under `path`.
    ///
    /// files scan in parallel; the merged result lists globals in path order.
    /// a file that fails to read is logged, recorded as `scan_err`, and does
    /// not stop the walk.
    pub fn scan_directory(&self, path: impl AsRef<Path>) -> Result<ScanResult> {
        let mut files = Vec::new();
        let mut walk_err = false;
        for entry in WalkDir::new(path.as_ref()) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    error!("walking {}: {}", path.as_ref().display(), e);
                    walk_err = true;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(ext) = file_extension(entry.path()) else {
                continue;
            };
            if is_scannable_extension(&ext) {
                files.push(entry.into_path());
            }
        }
        files.sort();

        let per_file: Vec<Result<ScanResult>> =
            files.par_iter().map(|file| self.scan_file(file)).collect();

        let mut total = ScanResult {
            scan_err: walk_err,
            ..ScanResult::default()
        };
        for (file, result) in files.iter().zip(per_file) {
            match result {
                Ok(r) => total.merge(r),
                Err(e) => {
                    error!("scanning {}: {}", file.display(), e);
                    total.merge(ScanResult::erred());
                }
            }
        }
        Ok(total)
    }

    pub(crate) fn depth_exceeded(&self, file_id: &str, depth: usize) -> bool {
        if depth > self.max_depth {
            warn!(
                "{}: nested archive depth {} exceeds limit {}, giving up",
                file_id, depth, self.max_depth
            );
            return true;
        }
        false
    }
}

/// scan a byte stream with the default scanner configuration.
pub fn scan_bytes<R: Read + Seek>(
    data: &mut R,
    file_id: &str,
    file_ext: Option<&str>,
) -> Result<ScanResult> {
    Scanner::new().scan_bytes(data, file_id, file_ext)
}

/// scan one file with the default scanner configuration.
pub fn scan_file_path(path: impl AsRef<Path>) -> Result<ScanResult> {
    Scanner::new().scan_file(path)
}

/// scan a directory tree with the default scanner configuration.
pub fn scan_directory_path(path: impl AsRef<Path>) -> Result<ScanResult> {
    Scanner::new().scan_directory(path)
}
