// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
//! af-cli
#![deny(unsafe_code)]

/// Subcommand implementations.
pub mod commands;
/// Human/JSON output helpers.
pub mod format;

/// Exit code: success.
pub const EXIT_OK: i32 = 0;
/// Exit code: recoverable problem (e.g. missing optional dependency).
pub const EXIT_RECOVERABLE: i32 = 1;
/// Exit code: integrity failure (tampered chain or backup).
pub const EXIT_INTEGRITY: i32 = 2;
/// Exit code: configuration error.
pub const EXIT_CONFIG: i32 = 3;
