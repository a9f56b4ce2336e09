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
//
// SPDX-License-Identifier: Apache-2.0

use std::process::ExitCode;

use clap::Parser;
use color_eyre::Result;
use pickle_scanner::{Cli, SafetyLevel, ScanResult, Scanner};
use tracing_subscriber::EnvFilter;

fn main() -> Result<ExitCode> {
    color_eyre::install()?;

    let args = Cli::parse();

    // RUST_LOG wins over -v so scripted invocations can steer logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let scanner = Scanner::new().with_max_depth(args.max_depth);

    let mut total = ScanResult::default();
    for path in &args.paths {
        let result = if path.is_dir() {
            scanner.scan_directory(path)
        } else {
            scanner.scan_file(path)
        };
        match result {
            Ok(r) => total.merge(r),
            Err(e) => {
                eprintln!("ERROR: scanning {}: {}", path.display(), e);
                total.merge(ScanResult {
                    scan_err: true,
                    ..ScanResult::default()
                });
            }
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&total)?);
    } else {
        print_report(&total, args.globals);
    }

    // 0 = clean, 1 = dangerous imports found, 2 = scan errors
    let code = if total.scan_err {
        2
    } else if total.infected_files > 0 {
        1
    } else {
        0
    };
    Ok(ExitCode::from(code))
}

fn print_report(total: &ScanResult, print_globals: bool) {
    if print_globals {
        for global in &total.globals {
            println!("{}: {} {}", global.safety, global.module, global.name);
        }
    } else {
        for global in total.globals_at_least(SafetyLevel::Dangerous) {
            println!("dangerous import: {} {}", global.module, global.name);
        }
    }

    println!("----------- SCAN SUMMARY -----------");
    println!("Scanned files: {}", total.scanned_files);
    println!("Infected files: {}", total.infected_files);
    println!("Dangerous globals: {}", total.issues_count);
    if total.scan_err {
        println!("Scan errors: one or more files could not be fully scanned");
    }
}
