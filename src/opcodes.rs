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

use phf::phf_map;

/// enumeration of all pickle opcodes across protocols 0-5
/// source: https://github.com/python/cpython/blob/main/Lib/pickletools.py
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum OpcodeKind {
    Int,             // 0x49
    BinInt,          // 0x4a
    BinInt1,         // 0x4b
    BinInt2,         // 0x4d
    Long,            // 0x4c
    Long1,           // 0x8a
    Long4,           // 0x8b
    String,          // 0x53
    BinString,       // 0x54
    ShortBinString,  // 0x55
    BinBytes,        // 0x42
    ShortBinBytes,   // 0x43
    BinBytes8,       // 0x8e
    ByteArray8,      // 0x96
    NextBuffer,      // 0x97
    ReadOnlyBuffer,  // 0x98
    None,            // 0x4e
    NewTrue,         // 0x88
    NewFalse,        // 0x89
    Unicode,         // 0x56
    ShortBinUnicode, // 0x8c
    BinUnicode,      // 0x58
    BinUnicode8,     // 0x8d
    Float,           // 0x46
    BinFloat,        // 0x47
    EmptyList,       // 0x5d
    Append,          // 0x61
    Appends,         // 0x65
    List,            // 0x6c
    EmptyTuple,      // 0x29
    Tuple,           // 0x74
    Tuple1,          // 0x85
    Tuple2,          // 0x86
    Tuple3,          // 0x87
    EmptyDict,       // 0x7d
    Dict,            // 0x64
    SetItem,         // 0x73
    SetItems,        // 0x75
    EmptySet,        // 0x8f
    AddItems,        // 0x90
    FrozenSet,       // 0x91
    Pop,             // 0x30
    Dup,             // 0x32
    Mark,            // 0x28
    PopMark,         // 0x31
    Get,             // 0x67
    BinGet,          // 0x68
    LongBinGet,      // 0x6a
    Put,             // 0x70
    BinPut,          // 0x71
    LongBinPut,      // 0x72
    Memoize,         // 0x94
    Ext1,            // 0x82
    Ext2,            // 0x83
    Ext4,            // 0x84
    Global,          // 0x63
    StackGlobal,     // 0x93
    Reduce,          // 0x52
    Build,           // 0x62
    Inst,            // 0x69
    Obj,             // 0x6f
    NewObj,          // 0x81
    NewObjEx,        // 0x92
    Proto,           // 0x80
    Stop,            // 0x2e
    Frame,           // 0x95
    PersID,          // 0x50
    BinPersID,       // 0x51
}

impl OpcodeKind {
    /// canonical pickletools name, as reported in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            OpcodeKind::Int => "INT",
            OpcodeKind::BinInt => "BININT",
            OpcodeKind::BinInt1 => "BININT1",
            OpcodeKind::BinInt2 => "BININT2",
            OpcodeKind::Long => "LONG",
            OpcodeKind::Long1 => "LONG1",
            OpcodeKind::Long4 => "LONG4",
            OpcodeKind::String => "STRING",
            OpcodeKind::BinString => "BINSTRING",
            OpcodeKind::ShortBinString => "SHORT_BINSTRING",
            OpcodeKind::BinBytes => "BINBYTES",
            OpcodeKind::ShortBinBytes => "SHORT_BINBYTES",
            OpcodeKind::BinBytes8 => "BINBYTES8",
            OpcodeKind::ByteArray8 => "BYTEARRAY8",
            OpcodeKind::NextBuffer => "NEXT_BUFFER",
            OpcodeKind::ReadOnlyBuffer => "READONLY_BUFFER",
            OpcodeKind::None => "NONE",
            OpcodeKind::NewTrue => "NEWTRUE",
            OpcodeKind::NewFalse => "NEWFALSE",
            OpcodeKind::Unicode => "UNICODE",
            OpcodeKind::ShortBinUnicode => "SHORT_BINUNICODE",
            OpcodeKind::BinUnicode => "BINUNICODE",
            OpcodeKind::BinUnicode8 => "BINUNICODE8",
            OpcodeKind::Float => "FLOAT",
            OpcodeKind::BinFloat => "BINFLOAT",
            OpcodeKind::EmptyList => "EMPTY_LIST",
            OpcodeKind::Append => "APPEND",
            OpcodeKind::Appends => "APPENDS",
            OpcodeKind::List => "LIST",
            OpcodeKind::EmptyTuple => "EMPTY_TUPLE",
            OpcodeKind::Tuple => "TUPLE",
            OpcodeKind::Tuple1 => "TUPLE1",
            OpcodeKind::Tuple2 => "TUPLE2",
            OpcodeKind::Tuple3 => "TUPLE3",
            OpcodeKind::EmptyDict => "EMPTY_DICT",
            OpcodeKind::Dict => "DICT",
            OpcodeKind::SetItem => "SETITEM",
            OpcodeKind::SetItems => "SETITEMS",
            OpcodeKind::EmptySet => "EMPTY_SET",
            OpcodeKind::AddItems => "ADDITEMS",
            OpcodeKind::FrozenSet => "FROZENSET",
            OpcodeKind::Pop => "POP",
            OpcodeKind::Dup => "DUP",
            OpcodeKind::Mark => "MARK",
            OpcodeKind::PopMark => "POP_MARK",
            OpcodeKind::Get => "GET",
            OpcodeKind::BinGet => "BINGET",
            OpcodeKind::LongBinGet => "LONG_BINGET",
            OpcodeKind::Put => "PUT",
            OpcodeKind::BinPut => "BINPUT",
            OpcodeKind::LongBinPut => "LONG_BINPUT",
            OpcodeKind::Memoize => "MEMOIZE",
            OpcodeKind::Ext1 => "EXT1",
            OpcodeKind::Ext2 => "EXT2",
            OpcodeKind::Ext4 => "EXT4",
            OpcodeKind::Global => "GLOBAL",
            OpcodeKind::StackGlobal => "STACK_GLOBAL",
            OpcodeKind::Reduce => "REDUCE",
            OpcodeKind::Build => "BUILD",
            OpcodeKind::Inst => "INST",
            OpcodeKind::Obj => "OBJ",
            OpcodeKind::NewObj => "NEWOBJ",
            OpcodeKind::NewObjEx => "NEWOBJ_EX",
            OpcodeKind::Proto => "PROTO",
            OpcodeKind::Stop => "STOP",
            OpcodeKind::Frame => "FRAME",
            OpcodeKind::PersID => "PERSID",
            OpcodeKind::BinPersID => "BINPERSID",
        }
    }
}

impl std::fmt::Display for OpcodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// wire encoding of an opcode's inline argument.
///
/// pickle arguments come in three families: fixed-width binary integers,
/// length-prefixed strings/bytes, and newline-terminated ASCII lines
/// (protocol 0). the reader drives decoding off this table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgCodec {
    /// no inline argument
    None,
    /// 1-byte unsigned int
    U8,
    /// 2-byte little-endian unsigned int
    U16,
    /// 4-byte little-endian signed int
    I32,
    /// 4-byte little-endian unsigned int
    U32,
    /// 8-byte little-endian unsigned int
    U64,
    /// 8-byte big-endian IEEE 754 double (BINFLOAT)
    F64,
    /// newline-terminated decimal integer (GET/PUT)
    DecimalNl,
    /// newline-terminated decimal float (FLOAT)
    FloatNl,
    /// newline-terminated text line (INT, LONG, STRING, UNICODE, PERSID)
    StringNl,
    /// two newline-terminated lines, joined with a single space (GLOBAL, INST)
    StringNlPair,
    /// bytes with a 1-byte length prefix
    Bytes1,
    /// bytes with a 4-byte signed length prefix (BINSTRING, LONG4)
    BytesI4,
    /// bytes with a 4-byte unsigned length prefix
    Bytes4,
    /// bytes with an 8-byte length prefix
    Bytes8,
    /// UTF-8 string with a 1-byte length prefix
    Utf8Len1,
    /// UTF-8 string with a 4-byte length prefix
    Utf8Len4,
    /// UTF-8 string with an 8-byte length prefix
    Utf8Len8,
}

/// decode entry for one opcode byte.
#[derive(Debug, Clone, Copy)]
pub struct OpcodeInfo {
    pub kind: OpcodeKind,
    pub arg: ArgCodec,
}

macro_rules! op {
    ($kind:ident, $arg:ident) => {
        OpcodeInfo {
            kind: OpcodeKind::$kind,
            arg: ArgCodec::$arg,
        }
    };
}

/// static decode table keyed by opcode byte.
///
/// unknown bytes are absent from the map and surface as parse errors.
pub static PICKLE_OPCODES: phf::Map<u8, OpcodeInfo> = phf_map! {
    // protocol 0
    0x28_u8 => op!(Mark, None),
    0x2e_u8 => op!(Stop, None),
    0x30_u8 => op!(Pop, None),
    0x31_u8 => op!(PopMark, None),
    0x32_u8 => op!(Dup, None),
    0x46_u8 => op!(Float, FloatNl),
    0x49_u8 => op!(Int, StringNl),
    0x4a_u8 => op!(BinInt, I32),
    0x4b_u8 => op!(BinInt1, U8),
    0x4c_u8 => op!(Long, StringNl),
    0x4d_u8 => op!(BinInt2, U16),
    0x4e_u8 => op!(None, None),
    0x50_u8 => op!(PersID, StringNl),
    0x51_u8 => op!(BinPersID, None),
    0x52_u8 => op!(Reduce, None),
    0x53_u8 => op!(String, StringNl),
    0x54_u8 => op!(BinString, BytesI4),
    0x55_u8 => op!(ShortBinString, Bytes1),
    0x56_u8 => op!(Unicode, StringNl),
    0x58_u8 => op!(BinUnicode, Utf8Len4),
    0x61_u8 => op!(Append, None),
    0x62_u8 => op!(Build, None),
    0x63_u8 => op!(Global, StringNlPair),
    0x64_u8 => op!(Dict, None),
    0x7d_u8 => op!(EmptyDict, None),
    0x65_u8 => op!(Appends, None),
    0x67_u8 => op!(Get, DecimalNl),
    0x68_u8 => op!(BinGet, U8),
    0x69_u8 => op!(Inst, StringNlPair),
    0x6a_u8 => op!(LongBinGet, U32),
    0x6c_u8 => op!(List, None),
    0x5d_u8 => op!(EmptyList, None),
    0x6f_u8 => op!(Obj, None),
    0x70_u8 => op!(Put, DecimalNl),
    0x71_u8 => op!(BinPut, U8),
    0x72_u8 => op!(LongBinPut, U32),
    0x73_u8 => op!(SetItem, None),
    0x74_u8 => op!(Tuple, None),
    0x29_u8 => op!(EmptyTuple, None),
    0x75_u8 => op!(SetItems, None),
    0x47_u8 => op!(BinFloat, F64),
    // protocol 2
    0x80_u8 => op!(Proto, U8),
    0x81_u8 => op!(NewObj, None),
    0x82_u8 => op!(Ext1, U8),
    0x83_u8 => op!(Ext2, U16),
    0x84_u8 => op!(Ext4, I32),
    0x85_u8 => op!(Tuple1, None),
    0x86_u8 => op!(Tuple2, None),
    0x87_u8 => op!(Tuple3, None),
    0x88_u8 => op!(NewTrue, None),
    0x89_u8 => op!(NewFalse, None),
    0x8a_u8 => op!(Long1, Bytes1),
    0x8b_u8 => op!(Long4, BytesI4),
    // protocol 3
    0x42_u8 => op!(BinBytes, Bytes4),
    0x43_u8 => op!(ShortBinBytes, Bytes1),
    // protocol 4
    0x8c_u8 => op!(ShortBinUnicode, Utf8Len1),
    0x8d_u8 => op!(BinUnicode8, Utf8Len8),
    0x8e_u8 => op!(BinBytes8, Bytes8),
    0x8f_u8 => op!(EmptySet, None),
    0x90_u8 => op!(AddItems, None),
    0x91_u8 => op!(FrozenSet, None),
    0x92_u8 => op!(NewObjEx, None),
    0x93_u8 => op!(StackGlobal, None),
    0x94_u8 => op!(Memoize, None),
    0x95_u8 => op!(Frame, U64),
    // protocol 5
    0x96_u8 => op!(ByteArray8, Bytes8),
    0x97_u8 => op!(NextBuffer, None),
    0x98_u8 => op!(ReadOnlyBuffer, None),
};
