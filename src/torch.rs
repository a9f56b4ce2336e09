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

//! pytorch checkpoint containers.
//!
//! modern checkpoints are zip archives and legacy ones may even be 7z; both
//! delegate to the archive walkers. everything else is treated as the legacy
//! framed format: a pickled magic-number frame, then protocol-version and
//! sysinfo frames, then the object pickle and its storage-key list, followed
//! by raw storage bytes. the leading frames carry no imports, so scanning a
//! fixed number of single-pickle frames covers exactly the pickled prefix
//! without running into tensor data.

use std::io::{Read, Seek};

use tracing::debug;

use crate::error::{Error, Result};
use crate::result::ScanResult;
use crate::scan::{peek_bytes, Scanner, SEVEN_ZIP_MAGIC, ZIP_EMPTY_MAGIC, ZIP_LOCAL_MAGIC};

/// byte prefix of the legacy format's magic-number frame: PROTO 2, LONG1 with
/// a 10-byte payload, and the first four little-endian bytes of the constant
/// 0x1950a86a20f9469cfc6c.
pub(crate) const LEGACY_MAGIC: [u8; 8] = [0x80, 0x02, 0x8a, 0x0a, 0x6c, 0xfc, 0x9c, 0x46];

/// pickle frames at the head of a legacy checkpoint: magic number, protocol
/// version, sysinfo, the serialized object, and its storage-key list.
const LEGACY_PICKLE_FRAMES: usize = 5;

impl Scanner {
    /// scan a tensor checkpoint stream in any of its container forms.
    pub(crate) fn scan_tensor_archive<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
        depth: usize,
    ) -> Result<ScanResult> {
        let magic = peek_bytes(data, 6)?;
        if magic.starts_with(ZIP_LOCAL_MAGIC) || magic.starts_with(ZIP_EMPTY_MAGIC) {
            return self.scan_zip_bytes(data, file_id, depth);
        }
        if magic.starts_with(SEVEN_ZIP_MAGIC) {
            return self.scan_7z_bytes(data, file_id, depth);
        }
        self.scan_legacy_archive(data, file_id)
    }

    /// scan the legacy framed format.
    ///
    /// the framing magic is validated by peeking so the magic frame itself is
    /// still the first of the scanned frames. whatever the frames contribute,
    /// the archive counts as a single scanned file.
    fn scan_legacy_archive<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
    ) -> Result<ScanResult> {
        let magic = peek_bytes(data, LEGACY_MAGIC.len())?;
        if magic != LEGACY_MAGIC {
            return Err(Error::InvalidMagic {
                file_id: file_id.to_string(),
            });
        }

        let mut result = ScanResult::default();
        for frame in 0..LEGACY_PICKLE_FRAMES {
            if peek_bytes(data, 1)?.is_empty() {
                debug!("{}: legacy archive ended after {} frames", file_id, frame);
                break;
            }
            result.merge(self.scan_pickle_stream(data, file_id, false)?);
        }

        result.scanned_files = 1;
        result.infected_files = u32::from(result.issues_count > 0);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::SafetyLevel;
    use std::io::Cursor;

    /// a minimal legacy checkpoint: the real magic-number frame, two inert
    /// frames, and an object frame importing `module.name`.
    pub(crate) fn legacy_archive(module: &str, name: &str) -> Vec<u8> {
        let mut bytes = Vec::new();
        // frame 1: pickled magic number (PROTO 2, LONG1(10), payload, STOP)
        bytes.extend_from_slice(&LEGACY_MAGIC);
        bytes.extend_from_slice(&[0xf9, 0x20, 0x6a, 0xa8, 0x50, 0x19]);
        bytes.push(b'.');
        // frame 2: protocol version
        bytes.extend_from_slice(b"I1001\n.");
        // frame 3: sysinfo (empty dict)
        bytes.extend_from_slice(b"}.");
        // frame 4: the object
        bytes.push(b'c');
        bytes.extend_from_slice(module.as_bytes());
        bytes.push(b'\n');
        bytes.extend_from_slice(name.as_bytes());
        bytes.push(b'\n');
        bytes.push(b'.');
        bytes
    }

    #[test]
    fn test_legacy_archive_extracts_object_imports() {
        let mut data = Cursor::new(legacy_archive("os", "system"));
        let result = Scanner::new()
            .scan_tensor_archive(&mut data, "model.pt", 0)
            .unwrap();
        assert_eq!(result.scanned_files, 1);
        assert_eq!(result.issues_count, 1);
        assert_eq!(result.infected_files, 1);
        assert_eq!(result.globals[0].module, "os");
        assert_eq!(result.globals[0].safety, SafetyLevel::Dangerous);
    }

    #[test]
    fn test_legacy_archive_counts_one_file() {
        let mut data = Cursor::new(legacy_archive("collections", "OrderedDict"));
        let result = Scanner::new()
            .scan_tensor_archive(&mut data, "model.pt", 0)
            .unwrap();
        assert_eq!(result.scanned_files, 1);
        assert_eq!(result.infected_files, 0);
    }

    #[test]
    fn test_bad_magic_is_invalid_magic_error() {
        let mut data = Cursor::new(b"definitely not a checkpoint".to_vec());
        let err = Scanner::new()
            .scan_tensor_archive(&mut data, "model.pt", 0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { .. }));
    }

    #[test]
    fn test_short_stream_is_invalid_magic_error() {
        let mut data = Cursor::new(vec![0x80, 0x02]);
        let err = Scanner::new()
            .scan_tensor_archive(&mut data, "model.pt", 0)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMagic { .. }));
    }

    #[test]
    fn test_frame_limit_stops_before_storage_bytes() {
        let mut bytes = legacy_archive("os", "system");
        // frame 5: storage key list
        bytes.extend_from_slice(b"]q\x00.");
        // raw storage data that is not valid pickle
        bytes.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 0x00, 0x01]);
        let mut data = Cursor::new(bytes);
        let result = Scanner::new()
            .scan_tensor_archive(&mut data, "model.pt", 0)
            .unwrap();
        assert!(!result.scan_err);
        assert_eq!(result.issues_count, 1);
        assert_eq!(result.scanned_files, 1);
    }
}
