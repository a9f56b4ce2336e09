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

use std::io::{Cursor, Write};

use pickle_scanner::{scan_bytes, scan_directory_path, scan_file_path, SafetyLevel, Scanner};

/// protocol-0 pickle importing `module.name` via GLOBAL.
fn global_pickle(module: &str, name: &str) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.push(b'c');
    bytes.extend_from_slice(module.as_bytes());
    bytes.push(b'\n');
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(b'\n');
    bytes.push(b'.');
    bytes
}

/// protocol-4 pickle importing `module.name` via STACK_GLOBAL.
fn stack_global_pickle(module: &str, name: &str) -> Vec<u8> {
    let mut bytes = vec![0x80, 0x04];
    bytes.push(0x8c);
    bytes.push(module.len() as u8);
    bytes.extend_from_slice(module.as_bytes());
    bytes.push(0x94); // MEMOIZE
    bytes.push(0x8c);
    bytes.push(name.len() as u8);
    bytes.extend_from_slice(name.as_bytes());
    bytes.push(0x93); // STACK_GLOBAL
    bytes.push(b'.');
    bytes
}

fn zip_of(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Stored);
    for (name, bytes) in members {
        writer.start_file(*name, options).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn npy_of(descr: &str, body: &[u8]) -> Vec<u8> {
    let header = format!(
        "{{'descr': '{}', 'fortran_order': False, 'shape': (1,), }}",
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
fn test_global_os_system_is_dangerous() {
    let mut data = Cursor::new(global_pickle("os", "system"));
    let result = scan_bytes(&mut data, "payload.pkl", None).unwrap();
    assert_eq!(result.globals.len(), 1);
    assert_eq!(result.globals[0].module, "os");
    assert_eq!(result.globals[0].name, "system");
    assert_eq!(result.globals[0].safety, SafetyLevel::Dangerous);
    assert_eq!(result.issues_count, 1);
    assert_eq!(result.infected_files, 1);
    assert!(!result.scan_err);
}

#[test]
fn test_stack_global_ordereddict_is_innocuous() {
    let mut data = Cursor::new(stack_global_pickle("collections", "OrderedDict"));
    let result = scan_bytes(&mut data, "model.pkl", None).unwrap();
    assert_eq!(result.globals.len(), 1);
    assert_eq!(result.globals[0].module, "collections");
    assert_eq!(result.globals[0].name, "OrderedDict");
    assert_eq!(result.globals[0].safety, SafetyLevel::Innocuous);
    assert_eq!(result.issues_count, 0);
    assert_eq!(result.infected_files, 0);
}

#[test]
fn test_inductor_codecache_compile_file_is_dangerous() {
    let mut data = Cursor::new(global_pickle("torch._inductor.codecache", "compile_file"));
    let result = scan_bytes(&mut data, "payload.pkl", None).unwrap();
    assert_eq!(result.globals[0].safety, SafetyLevel::Dangerous);
    assert_eq!(result.issues_count, 1);
}

#[test]
fn test_unlisted_import_is_suspicious() {
    let mut data = Cursor::new(global_pickle("mymodule", "my_symbol"));
    let result = scan_bytes(&mut data, "custom.pkl", None).unwrap();
    assert_eq!(result.globals[0].safety, SafetyLevel::Suspicious);
    assert_eq!(result.issues_count, 0);
    assert_eq!(result.infected_files, 0);
}

#[test]
fn test_zip_with_dangerous_pickle_member() {
    let archive = zip_of(&[("model.pkl", &global_pickle("builtins", "eval"))]);
    let mut data = Cursor::new(archive);
    let result = scan_bytes(&mut data, "model.zip", Some(".zip")).unwrap();
    assert_eq!(result.globals.len(), 1);
    assert_eq!(result.globals[0].module, "builtins");
    assert_eq!(result.globals[0].name, "eval");
    assert_eq!(result.globals[0].safety, SafetyLevel::Dangerous);
    assert_eq!(result.scanned_files, 1);
    assert_eq!(result.infected_files, 1);
}

#[test]
fn test_npy_object_array_surfaces_dangerous_global() {
    let npy = npy_of("|O", &global_pickle("posix", "system"));
    let mut data = Cursor::new(npy);
    let result = scan_bytes(&mut data, "arr.npy", Some(".npy")).unwrap();
    assert_eq!(result.globals.len(), 1);
    assert_eq!(result.globals[0].module, "posix");
    assert_eq!(result.globals[0].safety, SafetyLevel::Dangerous);
    assert_eq!(result.issues_count, 1);
}

#[test]
fn test_npy_numeric_array_is_clean() {
    let npy = npy_of("<f8", &1.0f64.to_le_bytes());
    let mut data = Cursor::new(npy);
    let result = scan_bytes(&mut data, "arr.npy", Some(".npy")).unwrap();
    assert!(result.globals.is_empty());
    assert_eq!(result.scanned_files, 1);
    assert!(!result.scan_err);
}

#[test]
fn test_concatenated_pickles_union_their_globals() {
    let mut first = global_pickle("os", "system");
    let second = global_pickle("collections", "OrderedDict");

    let mut only_first = Cursor::new(first.clone());
    let first_result = scan_bytes(&mut only_first, "a.pkl", None).unwrap();
    let mut only_second = Cursor::new(second.clone());
    let second_result = scan_bytes(&mut only_second, "b.pkl", None).unwrap();

    first.extend_from_slice(&second);
    let mut both = Cursor::new(first);
    let combined = scan_bytes(&mut both, "both.pkl", None).unwrap();

    assert_eq!(
        combined.globals.len(),
        first_result.globals.len() + second_result.globals.len()
    );
    assert_eq!(combined.issues_count, 1);
}

#[test]
fn test_truncated_pickle_reports_partial_and_scan_err() {
    let mut bytes = global_pickle("os", "system");
    bytes.extend_from_slice(b"cposix\n"); // second pickle cut off mid-GLOBAL
    let mut data = Cursor::new(bytes);
    let result = scan_bytes(&mut data, "broken.pkl", None).unwrap();
    assert!(result.scan_err);
    assert_eq!(result.issues_count, 1);
    assert_eq!(result.infected_files, 1);
}

#[test]
fn test_nested_zip_is_depth_limited() {
    let inner = zip_of(&[("model.pkl", &global_pickle("os", "system"))]);
    let outer = zip_of(&[("inner.npz", &inner)]);
    let mut data = Cursor::new(outer);
    // the zip walker does not recurse into zip members, so the inner archive
    // is simply skipped; nothing should panic or loop
    let result = scan_bytes(&mut data, "outer.zip", None).unwrap();
    assert_eq!(result.scanned_files, 0);
    assert!(!result.scan_err);
}

#[test]
fn test_scan_directory_merges_per_file_results() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.pkl"), global_pickle("os", "system")).unwrap();
    std::fs::write(
        dir.path().join("good.pkl"),
        global_pickle("collections", "OrderedDict"),
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"not scanned").unwrap();

    let result = scan_directory_path(dir.path()).unwrap();
    assert_eq!(result.scanned_files, 2);
    assert_eq!(result.infected_files, 1);
    assert_eq!(result.issues_count, 1);
}

#[test]
fn test_scan_file_path_uses_extension_hint() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("weights.bin");
    std::fs::write(&path, b"garbage that is not a checkpoint").unwrap();

    // tensor-archive extension with a bad magic records the error quietly
    let result = scan_file_path(&path).unwrap();
    assert!(result.scan_err);
    assert!(result.globals.is_empty());
}

#[test]
fn test_7z_archive_member_is_extracted_and_scanned() {
    let dir = tempfile::tempdir().unwrap();
    let payload_path = dir.path().join("model.pkl");
    std::fs::write(&payload_path, global_pickle("os", "system")).unwrap();
    let archive_path = dir.path().join("model.7z");

    let mut writer = sevenz_rust::SevenZWriter::create(&archive_path).unwrap();
    writer
        .push_archive_entry(
            sevenz_rust::SevenZArchiveEntry::from_path(&payload_path, "model.pkl".to_string()),
            Some(std::fs::File::open(&payload_path).unwrap()),
        )
        .unwrap();
    writer.finish().unwrap();

    let result = scan_file_path(&archive_path).unwrap();
    assert_eq!(result.scanned_files, 1);
    assert_eq!(result.issues_count, 1);
    assert_eq!(result.globals[0].module, "os");
    assert_eq!(result.globals[0].safety, SafetyLevel::Dangerous);
}

#[test]
fn test_max_depth_zero_rejects_archive_recursion() {
    let npy = npy_of("|O", &global_pickle("posix", "system"));
    let archive = zip_of(&[("arr.npy", &npy)]);
    let scanner = Scanner::new().with_max_depth(0);
    let mut data = Cursor::new(archive);
    let result = scanner.scan_bytes(&mut data, "outer.zip", None).unwrap();
    // the npy member sits one level deep and is abandoned
    assert!(result.scan_err);
    assert_eq!(result.issues_count, 0);
}

#[test]
fn test_scan_err_does_not_hide_findings() {
    // a pickle that parses partially but already revealed a dangerous import
    // still counts as infected
    let mut bytes = global_pickle("builtins", "eval");
    bytes.pop(); // drop the STOP opcode
    bytes.extend_from_slice(&[0xff]); // and corrupt the tail
    let mut data = Cursor::new(bytes);
    let result = scan_bytes(&mut data, "evil.pkl", None).unwrap();
    assert!(result.scan_err);
    assert_eq!(result.infected_files, 1);
}
