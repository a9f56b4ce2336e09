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

//! zip and 7-zip archive walkers.
//!
//! both walkers enumerate members, pick out the ones that can hold pickle
//! data, and feed each back through the scanner. member-level failures
//! (corrupt entries, unsupported compression, encryption) skip the member
//! and keep the archive scan alive. zip members are re-sniffed by content so
//! a pickle hiding behind an innocent member name is still found; member
//! reads go through the central directory, which tolerates the sloppy local
//! headers some checkpoint writers emit.

use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::result::ScanResult;
use crate::scan::{
    file_extension, is_pickle_magic, Scanner, NUMPY_MAGIC, PICKLE_FILE_EXTENSIONS,
};

fn has_pickle_extension(name: &str) -> bool {
    file_extension(Path::new(name))
        .is_some_and(|ext| PICKLE_FILE_EXTENSIONS.contains(&ext.as_str()))
}

impl Scanner {
    /// walk a zip archive, scanning pickle and numpy members.
    pub(crate) fn scan_zip_bytes<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
        depth: usize,
    ) -> Result<ScanResult> {
        if self.depth_exceeded(file_id, depth) {
            return Ok(ScanResult::erred());
        }

        let mut archive = zip::ZipArchive::new(data)?;
        debug!("{} members in zip archive {}", archive.len(), file_id);

        let mut result = ScanResult::default();
        for index in 0..archive.len() {
            if let Err(e) = self.scan_zip_member(&mut archive, index, file_id, depth, &mut result)
            {
                // decompression issues (password protected, corrupted, ...)
                // lose the member, not the archive
                warn!(
                    "invalid file at index {} in zip archive {}: {}",
                    index, file_id, e
                );
            }
        }
        Ok(result)
    }

    fn scan_zip_member<R: Read + Seek>(
        &self,
        archive: &mut zip::ZipArchive<&mut R>,
        index: usize,
        file_id: &str,
        depth: usize,
        result: &mut ScanResult,
    ) -> Result<()> {
        let (name, magic) = {
            let mut member = archive.by_index(index)?;
            if member.is_dir() {
                return Ok(());
            }
            let name = member.name().to_string();
            let mut magic = [0u8; 8];
            let mut filled = 0usize;
            while filled < magic.len() {
                let read = member.read(&mut magic[filled..]).map_err(Error::Io)?;
                if read == 0 {
                    break;
                }
                filled += read;
            }
            (name, magic[..filled].to_vec())
        };

        let member_id = format!("{}:{}", file_id, name);
        let ext = file_extension(Path::new(&name));
        let ext = ext.as_deref();

        if ext.is_some_and(|e| PICKLE_FILE_EXTENSIONS.contains(&e)) || is_pickle_magic(&magic) {
            debug!("scanning member {} in zip archive {}", name, file_id);
            let mut body = Cursor::new(read_member(archive, index)?);
            result.merge(self.scan_pickle_bytes(&mut body, &member_id)?);
        } else if ext == Some(".npy") || magic.starts_with(NUMPY_MAGIC) {
            debug!("scanning member {} in zip archive {}", name, file_id);
            let mut body = Cursor::new(read_member(archive, index)?);
            result.merge(self.scan_numpy(&mut body, &member_id, depth + 1)?);
        }
        Ok(())
    }

    /// walk a 7z archive.
    ///
    /// 7z offers no random access into members, so matching members are
    /// extracted into a scoped temporary directory and scanned from disk.
    /// the directory is removed on every exit path.
    pub(crate) fn scan_7z_bytes<R: Read + Seek>(
        &self,
        data: &mut R,
        file_id: &str,
        depth: usize,
    ) -> Result<ScanResult> {
        if self.depth_exceeded(file_id, depth) {
            return Ok(ScanResult::erred());
        }

        let len = data.seek(SeekFrom::End(0))?;
        data.seek(SeekFrom::Start(0))?;
        let mut archive =
            sevenz_rust::SevenZReader::new(&mut *data, len, sevenz_rust::Password::empty())?;

        let tempdir = tempfile::tempdir()?;
        let root = tempdir.path().to_path_buf();
        let mut extracted: Vec<PathBuf> = Vec::new();

        archive.for_each_entries(|entry, reader| {
            let name = entry.name();
            if entry.is_directory() || !has_pickle_extension(name) {
                return Ok(true);
            }
            // member names feed a filesystem path; refuse escapes
            if name.split(['/', '\\']).any(|part| part == "..") {
                return Ok(true);
            }
            let dest = root.join(name);
            sevenz_rust::default_entry_extract_fn(entry, reader, &dest)?;
            extracted.push(dest);
            Ok(true)
        })?;
        debug!(
            "extracted {} members from 7z archive {}",
            extracted.len(),
            file_id
        );

        let mut result = ScanResult::default();
        for path in &extracted {
            if !path.is_file() {
                continue;
            }
            debug!("scanning file {} from 7z archive {}", path.display(), file_id);
            match self.scan_file_at(path, depth + 1) {
                Ok(r) => result.merge(r),
                Err(e) => {
                    error!(
                        "scanning {} from 7z archive {}: {}",
                        path.display(),
                        file_id,
                        e
                    );
                    result.merge(ScanResult::erred());
                }
            }
        }
        Ok(result)
    }
}

fn read_member<R: Read + Seek>(
    archive: &mut zip::ZipArchive<&mut R>,
    index: usize,
) -> Result<Vec<u8>> {
    let mut member = archive.by_index(index)?;
    let mut buf = Vec::new();
    member.read_to_end(&mut buf).map_err(Error::Io)?;
    Ok(buf)
}
