//! Command handlers

pub mod admin;
pub mod chat;
pub mod config;
pub mod problem;
pub mod tip;

use std::io::{self, Write};

use anyhow::{bail, Result};

use crate::output::short_id;

/// Resolve an id given in full or as a unique prefix
///
/// `candidates` yields `(id, label)` pairs; labels are shown when the prefix
/// is ambiguous.
pub fn resolve_id<'a>(
    kind: &str,
    wanted: &str,
    candidates: impl IntoIterator<Item = (&'a str, &'a str)>,
) -> Result<String> {
    let candidates: Vec<_> = candidates.into_iter().collect();

    if candidates.iter().any(|(id, _)| *id == wanted) {
        return Ok(wanted.to_string());
    }

    let matches: Vec<_> = candidates
        .iter()
        .filter(|(id, _)| id.starts_with(wanted))
        .collect();

    match matches.len() {
        0 => bail!("No {} found matching: {}", kind, wanted),
        1 => Ok(matches[0].0.to_string()),
        _ => {
            eprintln!("Multiple {}s match '{}':", kind, wanted);
            for (id, label) in &matches {
                eprintln!("  {} - {}", short_id(id), label);
            }
            bail!("Ambiguous ID. Please provide more characters.");
        }
    }
}

/// Ask a yes/no question on stdin
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(matches!(input.trim().to_lowercase().as_str(), "y" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: [(&str, &str); 3] = [
        ("3f2b9c1e-0001", "Cannot sleep"),
        ("3f2b9c1e-0002", "Exam stress"),
        ("a91c0000-0003", "Lonely"),
    ];

    #[test]
    fn test_resolve_full_id() {
        assert_eq!(
            resolve_id("problem", "3f2b9c1e-0002", IDS).unwrap(),
            "3f2b9c1e-0002"
        );
    }

    #[test]
    fn test_resolve_unique_prefix() {
        assert_eq!(resolve_id("problem", "a91", IDS).unwrap(), "a91c0000-0003");
    }

    #[test]
    fn test_resolve_ambiguous_or_missing() {
        let err = resolve_id("problem", "3f2b", IDS).unwrap_err();
        assert!(err.to_string().contains("Ambiguous"));

        let err = resolve_id("problem", "zzz", IDS).unwrap_err();
        assert!(err.to_string().contains("No problem found"));
    }
}
