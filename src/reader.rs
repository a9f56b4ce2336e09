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

//! pickle opcode stream disassembly.
//!
//! `OpReader` walks a byte stream forward and yields one decoded operation at
//! a time, without executing anything. it stops after the `STOP` opcode or on
//! the first malformed/truncated opcode, whichever comes first. argument
//! decoding is driven entirely by the static table in [`crate::opcodes`].

use std::io::Read;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::opcodes::{ArgCodec, OpcodeKind, PICKLE_OPCODES};

/// decoded inline argument of a single opcode.
#[derive(Debug, Clone, PartialEq)]
pub enum OpArg {
    /// opcode takes no argument
    None,
    /// signed binary integer (BININT, EXT4, ...)
    Int(i64),
    /// unsigned binary integer (BININT1, FRAME, memo indices, ...)
    Uint(u64),
    /// float (FLOAT, BINFLOAT)
    Float(f64),
    /// decoded text (unicode strings, protocol-0 lines, GLOBAL pairs)
    Text(String),
    /// raw bytes (BINBYTES family, LONG1/LONG4 two's-complement payloads)
    Bytes(Vec<u8>),
}

impl OpArg {
    /// the argument as a memo index, if it is one.
    pub fn as_uint(&self) -> Option<u64> {
        match self {
            OpArg::Uint(v) => Some(*v),
            OpArg::Int(v) if *v >= 0 => Some(*v as u64),
            _ => None,
        }
    }

    /// the argument as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OpArg::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// one disassembled pickle operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Op {
    pub kind: OpcodeKind,
    pub arg: OpArg,
    /// offset of the opcode byte, relative to the start of this pickle frame
    pub position: u64,
}

/// forward-only disassembler over a byte stream.
///
/// yields `Result<Op>` and fuses after `STOP` or the first error. the reader
/// never seeks; concatenated-pickle probing is the caller's concern.
#[derive(Debug)]
pub struct OpReader<'a, R: Read> {
    data: &'a mut R,
    position: u64,
    done: bool,
}

impl<'a, R: Read> OpReader<'a, R> {
    pub fn new(data: &'a mut R) -> Self {
        Self {
            data,
            position: 0,
            done: false,
        }
    }

    /// bytes consumed so far, relative to where the reader started.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn next_op(&mut self) -> Result<Op> {
        let op_position = self.position;
        let mut byte = [0u8; 1];
        let n = self.data.read(&mut byte).map_err(Error::Io)?;
        if n == 0 {
            return Err(Error::parse(
                op_position,
                "pickle exhausted before seeing STOP",
            ));
        }
        self.position += 1;

        let info = PICKLE_OPCODES.get(&byte[0]).ok_or_else(|| {
            Error::parse(
                op_position,
                format!("unknown opcode {:#04x}", byte[0]),
            )
        })?;

        let arg = self.read_arg(info.arg, op_position)?;
        Ok(Op {
            kind: info.kind,
            arg,
            position: op_position,
        })
    }

    fn read_arg(&mut self, codec: ArgCodec, op_position: u64) -> Result<OpArg> {
        let arg = match codec {
            ArgCodec::None => OpArg::None,
            ArgCodec::U8 => OpArg::Uint(self.fixed(op_position, 1, |d| d.read_u8().map(u64::from))?),
            ArgCodec::U16 => OpArg::Uint(self.fixed(op_position, 2, |d| {
                d.read_u16::<LittleEndian>().map(u64::from)
            })?),
            ArgCodec::U32 => OpArg::Uint(self.fixed(op_position, 4, |d| {
                d.read_u32::<LittleEndian>().map(u64::from)
            })?),
            ArgCodec::U64 => {
                OpArg::Uint(self.fixed(op_position, 8, |d| d.read_u64::<LittleEndian>())?)
            }
            ArgCodec::I32 => OpArg::Int(self.fixed(op_position, 4, |d| {
                d.read_i32::<LittleEndian>().map(i64::from)
            })?),
            ArgCodec::F64 => {
                OpArg::Float(self.fixed(op_position, 8, |d| d.read_f64::<BigEndian>())?)
            }
            ArgCodec::DecimalNl => {
                let line = self.read_line(op_position)?;
                let text = String::from_utf8_lossy(&line);
                let value = text.trim().parse::<u64>().map_err(|_| {
                    Error::parse(
                        op_position,
                        format!("invalid decimal memo index {:?}", text),
                    )
                })?;
                OpArg::Uint(value)
            }
            ArgCodec::FloatNl => {
                let line = self.read_line(op_position)?;
                let text = String::from_utf8_lossy(&line);
                let value = text.trim().parse::<f64>().map_err(|_| {
                    Error::parse(op_position, format!("invalid float literal {:?}", text))
                })?;
                OpArg::Float(value)
            }
            ArgCodec::StringNl => {
                let line = self.read_line(op_position)?;
                OpArg::Text(String::from_utf8_lossy(&line).into_owned())
            }
            ArgCodec::StringNlPair => {
                let first = self.read_line(op_position)?;
                let second = self.read_line(op_position)?;
                let first = String::from_utf8(first).map_err(|_| {
                    Error::parse(op_position, "global module line is not UTF-8")
                })?;
                let second = String::from_utf8(second).map_err(|_| {
                    Error::parse(op_position, "global name line is not UTF-8")
                })?;
                OpArg::Text(format!("{} {}", first, second))
            }
            ArgCodec::Bytes1 => {
                let len = self.fixed(op_position, 1, |d| d.read_u8().map(u64::from))?;
                OpArg::Bytes(self.counted(op_position, len)?)
            }
            ArgCodec::BytesI4 => {
                let len = self.fixed(op_position, 4, |d| d.read_i32::<LittleEndian>())?;
                if len < 0 {
                    return Err(Error::parse(op_position, "negative length prefix"));
                }
                OpArg::Bytes(self.counted(op_position, len as u64)?)
            }
            ArgCodec::Bytes4 => {
                let len = self.fixed(op_position, 4, |d| {
                    d.read_u32::<LittleEndian>().map(u64::from)
                })?;
                OpArg::Bytes(self.counted(op_position, len)?)
            }
            ArgCodec::Bytes8 => {
                let len = self.fixed(op_position, 8, |d| d.read_u64::<LittleEndian>())?;
                OpArg::Bytes(self.counted(op_position, len)?)
            }
            ArgCodec::Utf8Len1 => {
                let len = self.fixed(op_position, 1, |d| d.read_u8().map(u64::from))?;
                self.counted_utf8(op_position, len)?
            }
            ArgCodec::Utf8Len4 => {
                let len = self.fixed(op_position, 4, |d| {
                    d.read_u32::<LittleEndian>().map(u64::from)
                })?;
                self.counted_utf8(op_position, len)?
            }
            ArgCodec::Utf8Len8 => {
                let len = self.fixed(op_position, 8, |d| d.read_u64::<LittleEndian>())?;
                self.counted_utf8(op_position, len)?
            }
        };
        Ok(arg)
    }

    /// read a fixed-width argument, mapping EOF to a truncation parse error.
    fn fixed<T>(
        &mut self,
        op_position: u64,
        width: u64,
        read: impl FnOnce(&mut &'a mut R) -> std::io::Result<T>,
    ) -> Result<T> {
        match read(&mut self.data) {
            Ok(value) => {
                self.position += width;
                Ok(value)
            }
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(Error::parse(
                op_position,
                "stream truncated inside opcode argument",
            )),
            Err(e) => Err(Error::Io(e)),
        }
    }

    /// read exactly `len` bytes of a length-prefixed argument.
    ///
    /// growth is bounded by the bytes actually present, so a forged length
    /// cannot force a huge allocation up front.
    fn counted(&mut self, op_position: u64, len: u64) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        (&mut *self.data)
            .take(len)
            .read_to_end(&mut buf)
            .map_err(Error::Io)?;
        self.position += buf.len() as u64;
        if (buf.len() as u64) != len {
            return Err(Error::parse(
                op_position,
                format!(
                    "stream truncated: expected {} argument bytes, found {}",
                    len,
                    buf.len()
                ),
            ));
        }
        Ok(buf)
    }

    fn counted_utf8(&mut self, op_position: u64, len: u64) -> Result<OpArg> {
        let buf = self.counted(op_position, len)?;
        let text = String::from_utf8(buf)
            .map_err(|_| Error::parse(op_position, "string argument is not UTF-8"))?;
        Ok(OpArg::Text(text))
    }

    /// read a newline-terminated protocol-0 argument line (newline stripped).
    fn read_line(&mut self, op_position: u64) -> Result<Vec<u8>> {
        let mut line = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            let n = self.data.read(&mut byte).map_err(Error::Io)?;
            if n == 0 {
                return Err(Error::parse(
                    op_position,
                    "stream truncated inside newline-terminated argument",
                ));
            }
            self.position += 1;
            if byte[0] == b'\n' {
                return Ok(line);
            }
            line.push(byte[0]);
        }
    }
}

impl<R: Read> Iterator for OpReader<'_, R> {
    type Item = Result<Op>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_op() {
            Ok(op) => {
                if op.kind == OpcodeKind::Stop {
                    self.done = true;
                }
                Some(Ok(op))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
