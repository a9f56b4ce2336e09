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

//! safety classification of extracted imports.
//!
//! the allow/deny tables below are the security contract of the scanner:
//! a module either grants specific names (or every name, `Any`), and a pair
//! matching neither table is merely suspicious. the tables are process
//! constants; there is no runtime override.

use phf::phf_map;
use tracing::warn;

use crate::extract::{GlobalsSet, UNKNOWN};
use crate::result::ScanResult;

/// verdict on one symbolic import.
///
/// the ordering is reporting priority only: `Dangerous > Suspicious >
/// Innocuous`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum SafetyLevel {
    Innocuous,
    Suspicious,
    Dangerous,
}

impl std::fmt::Display for SafetyLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            SafetyLevel::Innocuous => "innocuous",
            SafetyLevel::Suspicious => "suspicious",
            SafetyLevel::Dangerous => "dangerous",
        };
        f.write_str(text)
    }
}

/// one classified import found in a scanned stream.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Global {
    pub module: String,
    pub name: String,
    pub safety: SafetyLevel,
}

/// which names of a module a table entry covers.
#[derive(Debug, Clone, Copy)]
pub enum NameFilter {
    /// every name in the module
    Any,
    /// a finite set of names
    Names(&'static [&'static str]),
}

impl NameFilter {
    fn matches(&self, name: &str) -> bool {
        match self {
            NameFilter::Any => true,
            NameFilter::Names(names) => names.contains(&name),
        }
    }
}

const UNSAFE_BUILTINS: &[&str] = &[
    "eval",
    "compile",
    "getattr",
    "apply",
    "exec",
    "open",
    "breakpoint",
];

/// imports that are part of the ordinary ML serialization vocabulary.
static SAFE_GLOBALS: phf::Map<&'static str, NameFilter> = phf_map! {
    "collections" => NameFilter::Names(&["OrderedDict"]),
    "torch" => NameFilter::Names(&[
        "LongStorage",
        "FloatStorage",
        "HalfStorage",
        "QUInt2x4Storage",
        "QUInt4x2Storage",
        "QInt32Storage",
        "QInt8Storage",
        "QUInt8Storage",
        "ComplexFloatStorage",
        "ComplexDoubleStorage",
        "DoubleStorage",
        "BFloat16Storage",
        "BoolStorage",
        "CharStorage",
        "ShortStorage",
        "IntStorage",
        "ByteStorage",
    ]),
    "numpy" => NameFilter::Names(&["dtype", "ndarray"]),
    "numpy._core.multiarray" => NameFilter::Names(&["_reconstruct"]),
    "numpy.core.multiarray" => NameFilter::Names(&["_reconstruct"]),
    "torch._utils" => NameFilter::Names(&["_rebuild_tensor_v2"]),
};

/// imports that execute code, touch the filesystem or network, or load
/// further untrusted payloads when resolved by an unpickler.
static UNSAFE_GLOBALS: phf::Map<&'static str, NameFilter> = phf_map! {
    // pickle protocols 0-2 resolve builtins under '__builtin__'
    "__builtin__" => NameFilter::Names(UNSAFE_BUILTINS),
    "builtins" => NameFilter::Names(UNSAFE_BUILTINS),
    "aiohttp.client" => NameFilter::Any,
    "asyncio" => NameFilter::Any,
    "bdb" => NameFilter::Any,
    // python 2 precursor to subprocess
    "commands" => NameFilter::Any,
    // functools.partial(os.system, "echo pwned")
    "functools" => NameFilter::Names(&["partial"]),
    // includes http.client.HTTPSConnection()
    "httplib" => NameFilter::Any,
    // runstring() in this module is a synonym for exec()
    "numpy.testing._private.utils" => NameFilter::Any,
    // alias for 'os' on Windows
    "nt" => NameFilter::Any,
    // alias for 'os' on Linux
    "posix" => NameFilter::Any,
    // operator.attrgetter("system")(__import__("os"))("echo pwned")
    "operator" => NameFilter::Names(&["attrgetter"]),
    "os" => NameFilter::Any,
    "requests.api" => NameFilter::Any,
    "runpy" => NameFilter::Any,
    "shutil" => NameFilter::Any,
    "socket" => NameFilter::Any,
    // DNS exfiltration via ssl.get_server_certificate()
    "ssl" => NameFilter::Any,
    "subprocess" => NameFilter::Any,
    "sys" => NameFilter::Any,
    "pdb" => NameFilter::Any,
    "pickle" => NameFilter::Any,
    "_pickle" => NameFilter::Any,
    "pip" => NameFilter::Any,
    // pydoc.pipepager('help', 'echo pwned')
    "pydoc" => NameFilter::Names(&["pipepager"]),
    "timeit" => NameFilter::Any,
    // compile_file('', '', ['sh', '-c', '$(echo pwned)'])
    "torch._inductor.codecache" => NameFilter::Names(&["compile_file"]),
    // torch.serialization.load can pull in a different pickle file
    "torch.serialization" => NameFilter::Names(&["load"]),
    "venv" => NameFilter::Any,
    // includes webbrowser.open()
    "webbrowser" => NameFilter::Any,
};

/// classify one `(module, name)` pair against the tables.
pub fn classify_global(module: &str, name: &str) -> SafetyLevel {
    if module.contains(UNKNOWN) || name.contains(UNKNOWN) {
        return SafetyLevel::Dangerous;
    }
    if let Some(filter) = UNSAFE_GLOBALS.get(module) {
        if filter.matches(name) {
            return SafetyLevel::Dangerous;
        }
    }
    if let Some(filter) = SAFE_GLOBALS.get(module) {
        if filter.matches(name) {
            return SafetyLevel::Innocuous;
        }
    }
    SafetyLevel::Suspicious
}

/// classify a set of raw pairs into a per-file [`ScanResult`].
///
/// every dangerous import is reported at warning level with the file id it
/// was found in. a file with at least one issue counts as one infected file.
pub(crate) fn build_scan_result(
    raw_globals: GlobalsSet,
    file_id: &str,
    scan_err: bool,
) -> ScanResult {
    let mut globals = Vec::with_capacity(raw_globals.len());
    let mut issues_count = 0u32;

    for (module, name) in raw_globals {
        let safety = classify_global(&module, &name);
        if safety == SafetyLevel::Dangerous {
            warn!("{}: {} import '{} {}' FOUND", file_id, safety, module, name);
            issues_count += 1;
        }
        globals.push(Global {
            module,
            name,
            safety,
        });
    }

    ScanResult {
        globals,
        scanned_files: 1,
        issues_count,
        infected_files: u32::from(issues_count > 0),
        scan_err,
    }
}
