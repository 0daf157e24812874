//! Admin command handlers

use std::sync::Arc;

use anyhow::Result;

use sanad_core::{AdminReview, Gateway, ReportTarget};

use super::problem::report;
use super::{confirm, resolve_id};
use crate::output::{short_id, Output};

async fn open_review(gateway: Arc<dyn Gateway>, output: &Output) -> Result<AdminReview> {
    let mut review = AdminReview::new(gateway);
    review.load().await.map_err(|e| report(e, output))?;
    Ok(review)
}

/// What a report points at, for display
fn subject(review: &AdminReview, target: &ReportTarget) -> String {
    match target {
        ReportTarget::Problem(id) => review
            .problem(id)
            .map(|p| p.title.clone())
            .unwrap_or_else(|| "(deleted problem)".to_string()),
        ReportTarget::Comment(id) => review
            .comment(id)
            .map(|c| c.text.clone())
            .unwrap_or_else(|| "(deleted comment)".to_string()),
    }
}

/// List open reports, newest first within each kind
pub async fn reports(gateway: Arc<dyn Gateway>, output: &Output) -> Result<()> {
    let review = open_review(gateway, output).await?;
    let rows: Vec<_> = review
        .reports()
        .map(|r| (r, subject(&review, &r.target)))
        .collect();

    output.print_reports(&rows);
    Ok(())
}

/// Delete a problem and all of its comments
pub async fn delete_problem(
    gateway: Arc<dyn Gateway>,
    id: String,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let mut review = open_review(gateway, output).await?;
    let id = resolve_id(
        "problem",
        &id,
        review.problems().iter().map(|p| (p.id.as_str(), p.title.as_str())),
    )?;

    if !yes && output.should_prompt() {
        if let Some(problem) = review.problem(&id) {
            println!(
                "Delete problem: {} - {} ({} comment(s))",
                short_id(&problem.id),
                problem.title,
                problem.comments.len()
            );
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    review
        .delete_problem(&id)
        .await
        .map_err(|e| report(e, output))?;
    output.success(&format!("Deleted problem: {}", id));
    Ok(())
}

/// Delete one comment
pub async fn delete_comment(
    gateway: Arc<dyn Gateway>,
    id: String,
    yes: bool,
    output: &Output,
) -> Result<()> {
    let mut review = open_review(gateway, output).await?;
    let comments: Vec<_> = review
        .problems()
        .iter()
        .flat_map(|p| p.comments.iter())
        .map(|c| (c.id.as_str(), c.text.as_str()))
        .collect();
    let id = resolve_id("comment", &id, comments)?;

    if !yes && output.should_prompt() {
        if let Some(comment) = review.comment(&id) {
            println!("Delete comment: {} - {}", short_id(&comment.id), comment.text);
        }
        if !confirm("Are you sure?")? {
            println!("Cancelled.");
            return Ok(());
        }
    }

    review
        .delete_comment(&id)
        .await
        .map_err(|e| report(e, output))?;
    output.success(&format!("Deleted comment: {}", id));
    Ok(())
}

/// Close a report, keeping the reported content
pub async fn dismiss(gateway: Arc<dyn Gateway>, id: String, output: &Output) -> Result<()> {
    let mut review = open_review(gateway, output).await?;
    let id = resolve_id(
        "report",
        &id,
        review.reports().map(|r| (r.id.as_str(), r.reason.as_str())),
    )?;

    review
        .dismiss_report(&id)
        .await
        .map_err(|e| report(e, output))?;
    output.success(&format!("Dismissed report: {}", id));
    Ok(())
}
