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

use std::path::PathBuf;

use clap::Parser;

/// Command-line interface for pickle-scanner.
///
/// Scans files and directories for pickle streams that would resolve
/// dangerous imports when deserialized.
#[derive(Parser, Debug)]
#[command(name = "pickle-scanner")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// files or directories to scan
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// print every extracted import, not only the dangerous ones
    #[arg(short, long)]
    pub globals: bool,

    /// emit the merged scan result as JSON instead of the summary
    #[arg(long)]
    pub json: bool,

    /// maximum nested archive depth before a stream is given up on
    #[arg(long, default_value_t = 8)]
    pub max_depth: usize,

    /// increase log verbosity (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    /// tracing filter directive matching the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "pickle_scanner=warn",
            1 => "pickle_scanner=info",
            _ => "pickle_scanner=debug",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_at_least_one_path() {
        assert!(Cli::try_parse_from(["pickle-scanner"]).is_err());
        assert!(Cli::try_parse_from(["pickle-scanner", "model.pkl"]).is_ok());
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["pickle-scanner", "model.pkl"]).unwrap();
        assert!(!cli.globals);
        assert!(!cli.json);
        assert_eq!(cli.max_depth, 8);
        assert_eq!(cli.verbose, 0);
    }

    #[test]
    fn test_verbosity_maps_to_filter() {
        let quiet = Cli::try_parse_from(["pickle-scanner", "x"]).unwrap();
        assert_eq!(quiet.log_filter(), "pickle_scanner=warn");
        let loud = Cli::try_parse_from(["pickle-scanner", "-vv", "x"]).unwrap();
        assert_eq!(loud.log_filter(), "pickle_scanner=debug");
    }

    #[test]
    fn test_multiple_paths() {
        let cli = Cli::try_parse_from(["pickle-scanner", "a.pkl", "b.pt", "models/"]).unwrap();
        assert_eq!(cli.paths.len(), 3);
    }
}
