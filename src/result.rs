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

use crate::classify::{Global, SafetyLevel};

/// aggregated findings for one file, archive, or scan run.
///
/// results start empty, grow by [`merge`](ScanResult::merge), and are handed
/// to the caller as a plain value. merging sums the counters, ORs the error
/// flag, and appends globals in merge order.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ScanResult {
    /// every import found, classified
    pub globals: Vec<Global>,
    /// number of files actually scanned
    pub scanned_files: u32,
    /// number of dangerous imports found
    pub issues_count: u32,
    /// number of files containing at least one dangerous import
    pub infected_files: u32,
    /// whether any part of the scan failed to parse or read
    pub scan_err: bool,
}

impl ScanResult {
    /// a result that records a failed scan and nothing else.
    pub(crate) fn erred() -> Self {
        ScanResult {
            scan_err: true,
            ..ScanResult::default()
        }
    }

    /// fold another result into this one.
    pub fn merge(&mut self, other: ScanResult) {
        self.globals.extend(other.globals);
        self.scanned_files += other.scanned_files;
        self.issues_count += other.issues_count;
        self.infected_files += other.infected_files;
        self.scan_err = self.scan_err || other.scan_err;
    }

    /// imports at or above `level`, for reporting.
    pub fn globals_at_least(&self, level: SafetyLevel) -> impl Iterator<Item = &Global> {
        self.globals.iter().filter(move |g| g.safety >= level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(module: &str, safety: SafetyLevel, issues: u32) -> ScanResult {
        ScanResult {
            globals: vec![Global {
                module: module.to_string(),
                name: "f".to_string(),
                safety,
            }],
            scanned_files: 1,
            issues_count: issues,
            infected_files: u32::from(issues > 0),
            scan_err: false,
        }
    }

    #[test]
    fn test_merge_sums_counters_and_appends_globals() {
        let mut a = sample("os", SafetyLevel::Dangerous, 1);
        let b = sample("collections", SafetyLevel::Innocuous, 0);
        a.merge(b);
        assert_eq!(a.scanned_files, 2);
        assert_eq!(a.issues_count, 1);
        assert_eq!(a.infected_files, 1);
        assert_eq!(a.globals.len(), 2);
        assert_eq!(a.globals[0].module, "os");
        assert_eq!(a.globals[1].module, "collections");
    }

    #[test]
    fn test_merge_is_associative() {
        let a = sample("os", SafetyLevel::Dangerous, 1);
        let b = sample("collections", SafetyLevel::Innocuous, 0);
        let c = sample("mymodule", SafetyLevel::Suspicious, 0);

        let mut left = a.clone();
        left.merge(b.clone());
        left.merge(c.clone());

        let mut right_tail = b;
        right_tail.merge(c);
        let mut right = a;
        right.merge(right_tail);

        assert_eq!(left, right);
    }

    #[test]
    fn test_merge_ors_scan_err() {
        let mut a = ScanResult::default();
        assert!(!a.scan_err);
        a.merge(ScanResult::erred());
        assert!(a.scan_err);
        a.merge(ScanResult::default());
        assert!(a.scan_err);
    }

    #[test]
    fn test_invariants_hold_after_merge() {
        let mut total = ScanResult::default();
        for issues in [0u32, 2, 1, 0] {
            total.merge(sample("m", SafetyLevel::Dangerous, issues));
        }
        assert!(total.infected_files <= total.scanned_files);
        assert!(total.issues_count >= total.infected_files);
    }

    #[test]
    fn test_globals_at_least_filters_by_priority() {
        let mut result = sample("os", SafetyLevel::Dangerous, 1);
        result.merge(sample("collections", SafetyLevel::Innocuous, 0));
        result.merge(sample("mymodule", SafetyLevel::Suspicious, 0));
        assert_eq!(result.globals_at_least(SafetyLevel::Dangerous).count(), 1);
        assert_eq!(result.globals_at_least(SafetyLevel::Suspicious).count(), 2);
        assert_eq!(result.globals_at_least(SafetyLevel::Innocuous).count(), 3);
    }
}
