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

use crate::extract::GlobalsSet;

/// Errors produced while scanning a byte stream or archive.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// malformed pickle opcode stream.
    ///
    /// carries the byte position of the offending opcode and any global
    /// imports recovered before the failure, so callers can still classify
    /// what a partially broken pickle would load.
    #[error("malformed pickle at byte {position}: {message}")]
    Parse {
        position: u64,
        message: String,
        partial_globals: Option<GlobalsSet>,
    },

    /// legacy tensor-archive framing magic mismatch.
    #[error("invalid tensor archive magic in {file_id}")]
    InvalidMagic { file_id: String },

    /// unexpected container shape, e.g. a zip stream handed to the numpy scanner.
    #[error("unexpected container format: {0}")]
    Format(String),

    /// zip/7z member could not be enumerated or extracted.
    #[error("archive error: {0}")]
    Archive(String),

    /// underlying stream read failure, propagated unchanged.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// build a `Parse` error without partial globals.
    pub(crate) fn parse(position: u64, message: impl Into<String>) -> Self {
        Error::Parse {
            position,
            message: message.into(),
            partial_globals: None,
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::Archive(err.to_string())
    }
}

impl From<sevenz_rust::Error> for Error {
    fn from(err: sevenz_rust::Error) -> Self {
        Error::Archive(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
