use std::path::Path;

use roomsync_config::{Severity, ValidationResult, validate};

const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

/// Print diagnostics for the config file; returns whether it has errors.
pub fn check(path: Option<&Path>, verbose: bool) -> bool {
    let result = validate::validate(path);
    report(&result, verbose);
    result.has_errors()
}

fn report(result: &ValidationResult, verbose: bool) {
    if let Some(ref path) = result.config_path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found.\n");
    }

    let mut shown = 0;
    for d in &result.diagnostics {
        if d.severity == Severity::Info && !verbose {
            continue;
        }
        let color = match d.severity {
            Severity::Error => RED,
            Severity::Warning => YELLOW,
            Severity::Info => CYAN,
        };
        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{}{RESET} {}", d.severity, d.message);
        } else {
            eprintln!("  {BOLD}{color}{}{RESET} {}: {}", d.severity, d.path, d.message);
        }
        shown += 1;
    }
    if shown > 0 {
        eprintln!();
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);
    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_file_has_no_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roomsync.toml");
        std::fs::write(
            &path,
            "[[sinks]]\ncredential_key = \"xoxb-1\"\nsynced_rooms = [[\"C1\", \"V1\", \"Team\"]]\n",
        )
        .unwrap();
        assert!(!check(Some(&path), false));
    }

    #[test]
    fn broken_file_has_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("roomsync.toml");
        std::fs::write(&path, "[[sinks]]\ncredential_key = \"\"\nsynced_rooms = [[\"C1\"]]\n")
            .unwrap();
        assert!(check(Some(&path), true));
    }
}
