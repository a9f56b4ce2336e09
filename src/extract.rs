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

//! recovery of `(module, name)` imports from a disassembled pickle stream.
//!
//! this is the heart of the scanner: given the opcode sequence of one or more
//! concatenated pickles, work out every symbolic import the stream would
//! resolve if it were ever unpickled. direct `GLOBAL`/`INST` opcodes carry
//! their target inline; `STACK_GLOBAL` takes its two operands from the
//! virtual-machine stack, so we reconstruct them by scanning backwards
//! through string literals, memo stores and memo fetches.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use tracing::debug;

use crate::error::{Error, Result};
use crate::opcodes::OpcodeKind;
use crate::reader::{Op, OpArg, OpReader};

/// set of `(module, name)` pairs recovered from a stream.
///
/// ordered so that reports and logs come out deterministic; the ordering
/// itself carries no meaning.
pub type GlobalsSet = std::collections::BTreeSet<(String, String)>;

/// placeholder substituted when a `STACK_GLOBAL` operand cannot be recovered
/// statically. the classifier treats any pair containing it as dangerous.
pub(crate) const UNKNOWN: &str = "unknown";

/// list every global import in `data`.
///
/// in multi-pickle mode, keeps scanning frames until the stream is exhausted,
/// accumulating into one set; the memo table is discarded between frames.
/// a reader failure surfaces as [`Error::Parse`] carrying whatever globals
/// were recovered before the failure.
pub(crate) fn list_globals<R: Read + Seek>(
    data: &mut R,
    multiple_pickles: bool,
) -> Result<GlobalsSet> {
    let mut globals = GlobalsSet::new();

    loop {
        // probe one byte so an exhausted stream ends the scan cleanly,
        // then give it back
        let mut probe = [0u8; 1];
        let n = data.read(&mut probe).map_err(Error::Io)?;
        if n == 0 {
            break;
        }
        data.seek(SeekFrom::Current(-1)).map_err(Error::Io)?;

        let mut ops: Vec<Op> = Vec::new();
        let mut parse_failure: Option<(u64, String)> = None;
        for op in OpReader::new(&mut *data) {
            match op {
                Ok(op) => ops.push(op),
                Err(Error::Parse {
                    position, message, ..
                }) => {
                    parse_failure = Some((position, message));
                }
                Err(e) => return Err(e),
            }
        }

        // extract from the partial op sequence even when parsing failed;
        // a broken tail does not unsee the imports before it
        if let Err((position, message)) = extract_frame(&ops, &mut globals) {
            return Err(parse_error(position, message, globals));
        }
        if let Some((position, message)) = parse_failure {
            return Err(parse_error(position, message, globals));
        }

        if !multiple_pickles {
            break;
        }
    }

    Ok(globals)
}

fn parse_error(position: u64, message: String, globals: GlobalsSet) -> Error {
    Error::Parse {
        position,
        message,
        partial_globals: if globals.is_empty() {
            None
        } else {
            Some(globals)
        },
    }
}

/// walk one frame's op sequence, maintaining the memo table and collecting
/// `(module, name)` pairs into `globals`.
fn extract_frame(
    ops: &[Op],
    globals: &mut GlobalsSet,
) -> std::result::Result<(), (u64, String)> {
    let mut memo: HashMap<u64, OpArg> = HashMap::new();

    for (n, op) in ops.iter().enumerate() {
        match op.kind {
            OpcodeKind::Memoize if n > 0 => {
                memo.insert(memo.len() as u64, ops[n - 1].arg.clone());
            }
            OpcodeKind::Put | OpcodeKind::BinPut | OpcodeKind::LongBinPut if n > 0 => {
                if let Some(index) = op.arg.as_uint() {
                    memo.insert(index, ops[n - 1].arg.clone());
                }
            }
            OpcodeKind::Global | OpcodeKind::Inst => {
                let argument = op.arg.as_text().unwrap_or_default();
                match argument.split_once(' ') {
                    Some((module, name)) => {
                        globals.insert((module.to_string(), name.to_string()));
                    }
                    None => {
                        debug!(
                            opcode = %op.kind,
                            "global argument without separator, treating name as unknown"
                        );
                        globals.insert((argument.to_string(), UNKNOWN.to_string()));
                    }
                }
            }
            OpcodeKind::StackGlobal => {
                let (module, name) = reconstruct_stack_global(&ops[..n], &memo)
                    .map_err(|count| {
                        (
                            op.position,
                            format!(
                                "found {} values for STACK_GLOBAL at position {} instead of 2",
                                count, n
                            ),
                        )
                    })?;
                globals.insert((module, name));
            }
            _ => {}
        }
    }

    Ok(())
}

/// recover the two string operands a `STACK_GLOBAL` would pop.
///
/// scans backwards over the ops preceding it: memoization opcodes are
/// transparent, memo fetches resolve through the memo table, string literals
/// contribute their value, and anything else contributes the `"unknown"`
/// placeholder. the deeper of the two recovered values is the module.
fn reconstruct_stack_global(
    preceding: &[Op],
    memo: &HashMap<u64, OpArg>,
) -> std::result::Result<(String, String), usize> {
    let mut values: Vec<String> = Vec::with_capacity(2);

    for op in preceding.iter().rev() {
        match op.kind {
            OpcodeKind::Memoize
            | OpcodeKind::Put
            | OpcodeKind::BinPut
            | OpcodeKind::LongBinPut => continue,
            OpcodeKind::Get | OpcodeKind::BinGet | OpcodeKind::LongBinGet => {
                match op.arg.as_uint().and_then(|index| memo.get(&index)) {
                    Some(OpArg::Text(text)) => values.push(text.clone()),
                    _ => {
                        debug!(opcode = %op.kind, "unresolvable memo fetch, operand is unknown");
                        values.push(UNKNOWN.to_string());
                    }
                }
            }
            OpcodeKind::ShortBinUnicode
            | OpcodeKind::Unicode
            | OpcodeKind::BinUnicode
            | OpcodeKind::BinUnicode8 => match op.arg.as_text() {
                Some(text) => values.push(text.to_string()),
                None => values.push(UNKNOWN.to_string()),
            },
            _ => {
                debug!(
                    opcode = %op.kind,
                    "non-string opcode feeding STACK_GLOBAL, operand is unknown"
                );
                values.push(UNKNOWN.to_string());
            }
        }
        if values.len() == 2 {
            break;
        }
    }

    if values.len() != 2 {
        return Err(values.len());
    }
    let name = values.swap_remove(0);
    let module = values.swap_remove(0);
    Ok((module, name))
}
