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

//! A static security scanner for Python pickle streams and the ML artifact
//! formats that embed them.
//!
//! `pickle-scanner` disassembles pickle bytecode without executing it,
//! recovers every `(module, name)` import the stream would resolve when
//! unpickled — including imports assembled on the VM stack via
//! `STACK_GLOBAL` and the memo table — and classifies each one as innocuous,
//! suspicious or dangerous against curated allow/deny tables. Container
//! formats (pytorch checkpoints, zip/npz, 7z, numpy arrays) are unwrapped so
//! every embedded pickle is scanned exactly once.
//!
//! A clean result is evidence, not proof: adversarial streams can hide
//! imports from static analysis, which is why anything unresolvable is
//! reported as dangerous rather than ignored.
//!
//! # Examples
//!
//! ```no_run
//! use pickle_scanner::{scan_file_path, SafetyLevel};
//!
//! let result = scan_file_path("model.pt").unwrap();
//! for global in result.globals_at_least(SafetyLevel::Dangerous) {
//!     eprintln!("dangerous import: {} {}", global.module, global.name);
//! }
//! assert_eq!(result.infected_files, 0);
//! ```
//!
//! ```no_run
//! use std::io::Cursor;
//! use pickle_scanner::Scanner;
//!
//! let bytes = std::fs::read("suspect.pkl").unwrap();
//! let scanner = Scanner::new().with_max_depth(4);
//! let result = scanner
//!     .scan_bytes(&mut Cursor::new(bytes), "suspect.pkl", Some(".pkl"))
//!     .unwrap();
//! println!("{} dangerous imports", result.issues_count);
//! ```

mod archive;
mod classify;
mod cli;
mod error;
mod extract;
mod npy;
mod opcodes;
mod reader;
mod result;
mod scan;
mod torch;

pub use classify::{classify_global, Global, NameFilter, SafetyLevel};
pub use cli::Cli;
pub use error::{Error, Result};
pub use extract::GlobalsSet;
pub use opcodes::{ArgCodec, OpcodeInfo, OpcodeKind, PICKLE_OPCODES};
pub use reader::{Op, OpArg, OpReader};
pub use result::ScanResult;
pub use scan::{scan_bytes, scan_directory_path, scan_file_path, Scanner};
