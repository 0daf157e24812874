//! Output formatting for CLI
//!
//! Provides consistent output formatting across all commands:
//! - Human-readable default output
//! - JSON output (--json flag)
//! - Quiet mode for scripting (--quiet flag)

use serde::Serialize;

use sanad_core::{Comment, Item, Problem, Report, ReportTarget};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output (default)
    Human,
    /// JSON output
    Json,
    /// Quiet mode - minimal output
    Quiet,
}

impl OutputFormat {
    /// Create format from CLI flags
    pub fn from_flags(json: bool, quiet: bool) -> Self {
        if quiet {
            OutputFormat::Quiet
        } else if json {
            OutputFormat::Json
        } else {
            OutputFormat::Human
        }
    }
}

/// Output helper for consistent formatting
pub struct Output {
    /// The output format
    pub format: OutputFormat,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Check if output is in quiet mode
    pub fn is_quiet(&self) -> bool {
        matches!(self.format, OutputFormat::Quiet)
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    /// Print one chat message as it arrives
    pub fn print_item(&self, item: &Item) {
        match self.format {
            OutputFormat::Human => println!("{}", format_item(item)),
            OutputFormat::Json => print_json_line(item),
            OutputFormat::Quiet => println!("{}", item.id),
        }
    }

    /// Print chat messages, oldest first
    pub fn print_items(&self, items: &[Item]) {
        match self.format {
            OutputFormat::Human => {
                if items.is_empty() {
                    println!("No messages yet.");
                    return;
                }
                for item in items {
                    println!("{}", format_item(item));
                }
                println!("\n{} message(s)", items.len());
            }
            OutputFormat::Json => print_json(&items),
            OutputFormat::Quiet => {
                for item in items {
                    println!("{}", item.id);
                }
            }
        }
    }

    /// Print a list of problems
    pub fn print_problems(&self, problems: &[&Problem]) {
        match self.format {
            OutputFormat::Human => {
                if problems.is_empty() {
                    println!("No problems found.");
                    return;
                }
                for problem in problems {
                    let comments = if problem.comments.is_empty() {
                        String::new()
                    } else {
                        format!(" [{}]", problem.comments.len())
                    };
                    println!(
                        "{} | {}{} | {}",
                        short_id(&problem.id),
                        truncate(&problem.title, 35),
                        comments,
                        truncate_line(&problem.description, 45)
                    );
                }
                println!("\n{} problem(s)", problems.len());
            }
            OutputFormat::Json => print_json(&problems),
            OutputFormat::Quiet => {
                for problem in problems {
                    println!("{}", problem.id);
                }
            }
        }
    }

    /// Print a single problem with its comments
    pub fn print_problem(&self, problem: &Problem) {
        match self.format {
            OutputFormat::Human => {
                println!("ID:          {}", problem.id);
                println!("Title:       {}", problem.title);
                println!("Created:     {}", problem.created_at.format("%Y-%m-%d %H:%M"));
                println!();
                println!("{}", problem.description);

                println!();
                if problem.comments.is_empty() {
                    println!("── No comments yet ──");
                    return;
                }
                println!(
                    "── Comments ({}, {} helpful) ──",
                    problem.comments.len(),
                    problem.helpful_count()
                );
                for comment in &problem.comments {
                    println!("{}", format_comment(comment));
                }
            }
            OutputFormat::Json => print_json(problem),
            OutputFormat::Quiet => println!("{}", problem.id),
        }
    }

    pub fn print_comment(&self, comment: &Comment) {
        match self.format {
            OutputFormat::Human => println!("{}", format_comment(comment)),
            OutputFormat::Json => print_json(comment),
            OutputFormat::Quiet => println!("{}", comment.id),
        }
    }

    /// Print reports with a one-line description of what they point at
    pub fn print_reports(&self, reports: &[(&Report, String)]) {
        match self.format {
            OutputFormat::Human => {
                if reports.is_empty() {
                    println!("No open reports.");
                    return;
                }
                for (report, subject) in reports {
                    let kind = match report.target {
                        ReportTarget::Problem(_) => "problem",
                        ReportTarget::Comment(_) => "comment",
                    };
                    println!(
                        "{} | {} | {:<7} {} | {} | {}",
                        short_id(&report.id),
                        report.created_at.format("%Y-%m-%d %H:%M"),
                        kind,
                        short_id(report.target.id()),
                        truncate(&report.reason, 24),
                        truncate_line(subject, 40)
                    );
                }
                println!("\n{} report(s)", reports.len());
            }
            OutputFormat::Json => {
                let rows: Vec<_> = reports
                    .iter()
                    .map(|(report, subject)| {
                        serde_json::json!({
                            "id": report.id,
                            "target": report.target,
                            "reason": report.reason,
                            "created_at": report.created_at,
                            "subject": subject,
                        })
                    })
                    .collect();
                print_json(&rows);
            }
            OutputFormat::Quiet => {
                for (report, _) in reports {
                    println!("{}", report.id);
                }
            }
        }
    }

    /// Print a self-help tip
    pub fn print_tip(&self, tip: &str) {
        match self.format {
            OutputFormat::Human => println!("💡 {}", tip),
            OutputFormat::Json => println!("{}", serde_json::json!({ "tip": tip })),
            OutputFormat::Quiet => println!("{}", tip),
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        match self.format {
            OutputFormat::Human => println!("✓ {}", message),
            OutputFormat::Json => {
                println!(
                    "{}",
                    serde_json::json!({"status": "success", "message": message})
                );
            }
            OutputFormat::Quiet => {}
        }
    }

    /// Print a warning to stderr (suppressed in quiet mode)
    pub fn warn(&self, message: &str) {
        if !self.is_quiet() {
            eprintln!("⚠ {}", message);
        }
    }

    /// Check if we should prompt for confirmation
    pub fn should_prompt(&self) -> bool {
        self.format == OutputFormat::Human
    }

    /// Print an informational message
    pub fn message(&self, msg: &str) {
        match self.format {
            OutputFormat::Human => println!("{}", msg),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"message": msg}));
            }
            OutputFormat::Quiet => {}
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

/// One compact JSON object per line, for streaming
fn print_json_line<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

pub fn format_item(item: &Item) -> String {
    let who = if item.is_local() { "you" } else { "anon" };
    format!(
        "[{}] {:>4}: {}",
        item.created_at.format("%H:%M"),
        who,
        item.text
    )
}

fn format_comment(comment: &Comment) -> String {
    let verdict = match comment.is_helpful {
        Some(true) => "👍",
        Some(false) => "👎",
        None => "  ",
    };
    format!(
        "{} {} [{}] {}",
        short_id(&comment.id),
        verdict,
        comment.created_at.format("%Y-%m-%d"),
        comment.text
    )
}

/// First eight characters of an id
pub fn short_id(id: &str) -> &str {
    match id.char_indices().nth(8) {
        Some((end, _)) => &id[..end],
        None => id,
    }
}

/// Truncate a string to max length, adding "..." if truncated
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// Truncate to first line and max length
fn truncate_line(s: &str, max_len: usize) -> String {
    let first_line = s.lines().next().unwrap_or("");
    truncate(first_line, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_flags() {
        assert_eq!(OutputFormat::from_flags(false, false), OutputFormat::Human);
        assert_eq!(OutputFormat::from_flags(true, false), OutputFormat::Json);
        assert_eq!(OutputFormat::from_flags(false, true), OutputFormat::Quiet);
        // Quiet takes precedence
        assert_eq!(OutputFormat::from_flags(true, true), OutputFormat::Quiet);
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("this is a long string", 10), "this is...");
        // Multi-byte text is cut on character boundaries
        assert_eq!(truncate("مرحبا بكم في سند", 8), "مرحبا...");
    }

    #[test]
    fn test_truncate_line() {
        assert_eq!(truncate_line("single line", 20), "single line");
        assert_eq!(truncate_line("line one\nline two", 20), "line one");
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id("3f2b9c1e-aaaa-bbbb"), "3f2b9c1e");
        assert_eq!(short_id("mem-1"), "mem-1");
    }

    #[test]
    fn test_format_item_marks_author() {
        let mut item: Item = serde_json::from_value(serde_json::json!({
            "id": "x",
            "text": "hello",
            "created_at": "2024-05-01T10:07:00Z"
        }))
        .unwrap();
        assert_eq!(format_item(&item), "[10:07] anon: hello");

        item.origin = sanad_core::Origin::Local;
        assert_eq!(format_item(&item), "[10:07]  you: hello");
    }
}
