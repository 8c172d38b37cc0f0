// SPDX-License-Identifier: MIT OR Apache-2.0
//! Output helpers: every command can speak human or JSON.

use serde::Serialize;

/// Print a value as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("failed to encode output: {e}"),
    }
}

/// Render a pass/fail marker for human output.
#[must_use]
pub fn status_marker(ok: bool) -> &'static str {
    if ok { "ok" } else { "FAILED" }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers() {
        assert_eq!(status_marker(true), "ok");
        assert_eq!(status_marker(false), "FAILED");
    }
}
