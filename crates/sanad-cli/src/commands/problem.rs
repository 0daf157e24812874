//! Problem and comment command handlers

use std::sync::Arc;

use anyhow::{Context, Result};

use sanad_core::{BoardError, Config, Gateway, ProblemBoard, ReportReason, VoteLedger};

use super::resolve_id;
use crate::output::{short_id, Output};

/// Open the board and load every problem
async fn open_board(gateway: Arc<dyn Gateway>, config: &Config, output: &Output) -> Result<ProblemBoard> {
    let votes = VoteLedger::with_path(config.votes_path()).map_err(|e| report(e, output))?;
    let mut board = ProblemBoard::new(gateway, votes);
    board.refresh().await.map_err(|e| report(e, output))?;
    Ok(board)
}

fn problem_id(board: &ProblemBoard, wanted: &str) -> Result<String> {
    resolve_id(
        "problem",
        wanted,
        board.problems().iter().map(|p| (p.id.as_str(), p.title.as_str())),
    )
}

fn comment_id(board: &ProblemBoard, wanted: &str) -> Result<String> {
    resolve_id(
        "comment",
        wanted,
        board.comments().map(|c| (c.id.as_str(), c.text.as_str())),
    )
}

/// Post a new problem
pub async fn add(
    gateway: Arc<dyn Gateway>,
    config: &Config,
    title: String,
    description: String,
    output: &Output,
) -> Result<()> {
    let mut board = open_board(gateway, config, output).await?;
    let problem = board
        .add_problem(&title, &description)
        .await
        .map_err(|e| report(e, output))?;

    if output.is_quiet() {
        println!("{}", problem.id);
    } else {
        output.success(&format!("Posted problem {}: {}", short_id(&problem.id), problem.title));
    }
    Ok(())
}

/// List problems, optionally filtered by a search term
pub async fn list(
    gateway: Arc<dyn Gateway>,
    config: &Config,
    search: Option<String>,
    output: &Output,
) -> Result<()> {
    let board = open_board(gateway, config, output).await?;
    let problems = board.filtered(search.as_deref().unwrap_or(""));
    output.print_problems(&problems);
    Ok(())
}

/// Show a problem with its comments
pub async fn show(gateway: Arc<dyn Gateway>, config: &Config, id: String, output: &Output) -> Result<()> {
    let board = open_board(gateway, config, output).await?;
    let id = problem_id(&board, &id)?;
    let problem = board
        .problem(&id)
        .with_context(|| format!("Problem not found: {}", id))?;

    output.print_problem(problem);
    Ok(())
}

/// Reply to a problem
pub async fn comment(
    gateway: Arc<dyn Gateway>,
    config: &Config,
    problem: String,
    text: String,
    output: &Output,
) -> Result<()> {
    let mut board = open_board(gateway, config, output).await?;
    let problem = problem_id(&board, &problem)?;
    let comment = board
        .add_comment(&problem, &text)
        .await
        .map_err(|e| report(e, output))?;

    if output.is_quiet() || output.is_json() {
        output.print_comment(&comment);
    } else {
        output.success(&format!("Added comment {}", short_id(&comment.id)));
    }
    Ok(())
}

/// Mark a comment helpful or not
pub async fn vote(
    gateway: Arc<dyn Gateway>,
    config: &Config,
    comment: String,
    helpful: bool,
    output: &Output,
) -> Result<()> {
    let mut board = open_board(gateway, config, output).await?;
    let comment = comment_id(&board, &comment)?;
    let updated = board
        .vote(&comment, helpful)
        .await
        .map_err(|e| report(e, output))?;

    let verdict = if helpful { "helpful" } else { "not helpful" };
    output.success(&format!("Marked comment {} as {}", short_id(&updated.id), verdict));
    Ok(())
}

/// Report a problem
pub async fn report_problem(
    gateway: Arc<dyn Gateway>,
    config: &Config,
    id: String,
    reason: ReportReason,
    output: &Output,
) -> Result<()> {
    let board = open_board(gateway, config, output).await?;
    let id = problem_id(&board, &id)?;
    board
        .report_problem(&id, reason)
        .await
        .map_err(|e| report(e, output))?;

    output.success(&format!("Reported problem {} ({})", short_id(&id), reason));
    Ok(())
}

/// Report a comment
pub async fn report_comment(
    gateway: Arc<dyn Gateway>,
    config: &Config,
    id: String,
    reason: ReportReason,
    output: &Output,
) -> Result<()> {
    let board = open_board(gateway, config, output).await?;
    let id = comment_id(&board, &id)?;
    board
        .report_comment(&id, reason)
        .await
        .map_err(|e| report(e, output))?;

    output.success(&format!("Reported comment {} ({})", short_id(&id), reason));
    Ok(())
}

/// Show the recovery hint and hand the error back for the exit status
pub fn report(error: BoardError, output: &Output) -> anyhow::Error {
    if let Some(hint) = error.recovery_suggestion() {
        output.warn(hint);
    }
    error.into()
}
