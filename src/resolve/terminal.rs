//! Interactive conflict prompt

use super::ConflictPrompt;
use crate::types::{ConflictDetails, Resolution, SnapshotEntry};
use console::{style, Term};
use indicatif::HumanBytes;
use std::io::{self, BufRead};

/// Asks the operator on the terminal, one conflict at a time.
///
/// Output goes to stderr so it interleaves with progress bars; answers are
/// read from stdin. End of input or a read error defers the conflict.
pub struct TerminalPrompt {
    term: Term,
}

impl TerminalPrompt {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
        }
    }
}

impl Default for TerminalPrompt {
    fn default() -> Self {
        Self::new()
    }
}

impl ConflictPrompt for TerminalPrompt {
    fn ask(&mut self, conflict: &ConflictDetails) -> Option<Resolution> {
        let _ = self.term.write_line("");
        let _ = self.term.write_line(&format!(
            "{} {}",
            style("Conflict:").yellow().bold(),
            style(conflict.path.as_str()).bold()
        ));
        for line in describe_conflict(conflict) {
            let _ = self.term.write_line(&format!("   {}", line));
        }

        let stdin = io::stdin();
        loop {
            let _ = self.term.write_str("   [u]pload / [d]ownload / [s]kip: ");
            let _ = self.term.flush();

            let mut input = String::new();
            match stdin.lock().read_line(&mut input) {
                Ok(0) => {
                    let _ = self.term.write_line("");
                    let _ = self
                        .term
                        .write_line("   End of input, deferring this conflict.");
                    return None;
                }
                Ok(_) => match parse_choice(&input) {
                    Some(resolution) => return Some(resolution),
                    None => {
                        let _ = self.term.write_line(&format!(
                            "   Invalid choice '{}'. Try again.",
                            input.trim()
                        ));
                    }
                },
                Err(e) => {
                    let _ = self
                        .term
                        .write_line(&format!("   Error reading input: {}. Deferring.", e));
                    return None;
                }
            }
        }
    }
}

/// Parse an operator answer. Accepts the initial or the full word.
pub fn parse_choice(input: &str) -> Option<Resolution> {
    match input.trim().to_ascii_lowercase().as_str() {
        "u" | "upload" => Some(Resolution::Upload),
        "d" | "download" => Some(Resolution::Download),
        "s" | "skip" => Some(Resolution::Skip),
        _ => None,
    }
}

/// Lines describing both sides of a conflict.
pub fn describe_conflict(conflict: &ConflictDetails) -> Vec<String> {
    vec![
        conflict.kind().describe().to_string(),
        format!("local:  {}", describe_side(conflict.local.as_ref())),
        format!("remote: {}", describe_side(conflict.remote.as_ref())),
    ]
}

fn describe_side(entry: Option<&SnapshotEntry>) -> String {
    match entry {
        None => "deleted".to_string(),
        Some(entry) => {
            let modified = entry
                .modified
                .map(|m| m.format("%Y-%m-%d %H:%M:%S UTC").to_string())
                .unwrap_or_else(|| "unknown time".to_string());
            format!(
                "{} | {} | {}",
                HumanBytes(entry.size),
                modified,
                entry.fingerprint.short()
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::types::RelPath;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_parse_choice() {
        assert_eq!(parse_choice("u\n"), Some(Resolution::Upload));
        assert_eq!(parse_choice(" Download "), Some(Resolution::Download));
        assert_eq!(parse_choice("S"), Some(Resolution::Skip));
        assert_eq!(parse_choice(""), None);
        assert_eq!(parse_choice("both"), None);
    }

    #[test]
    fn test_describe_conflict_shows_both_sides() {
        let modified = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let details = ConflictDetails {
            path: RelPath::parse("main.tex").unwrap(),
            local: Some(SnapshotEntry::new(hash_bytes(b"local"), 2048).with_modified(modified)),
            remote: None,
            prior: Some(hash_bytes(b"base")),
        };

        let lines = describe_conflict(&details);
        assert_eq!(lines[0], "modified locally, deleted remotely");
        assert!(lines[1].contains("2.00 KiB"));
        assert!(lines[1].contains("2024-03-01 12:30:00 UTC"));
        assert!(lines[1].contains(&hash_bytes(b"local").short()));
        assert_eq!(lines[2], "remote: deleted");
    }
}
