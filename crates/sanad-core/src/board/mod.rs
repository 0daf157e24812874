//! Problem board
//!
//! Problems are listed newest first, each with its comments oldest first.
//! New problems and comments are merged into the loaded board by id, the
//! same dedup contract the chat feed uses.

mod votes;

use std::collections::HashSet;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::error::{BoardError, BoardResult};
use crate::gateway::{Direction, Gateway, GatewayError, GatewayResult, Query, Row};
use crate::models::{tables, Comment, Problem, Report, ReportReason, ReportTarget};

pub use votes::VoteLedger;

/// Problems with their comments, as the board shows them
pub struct ProblemBoard {
    gateway: Arc<dyn Gateway>,
    problems: Vec<Problem>,
    votes: VoteLedger,
}

impl ProblemBoard {
    pub fn new(gateway: Arc<dyn Gateway>, votes: VoteLedger) -> Self {
        Self {
            gateway,
            problems: Vec::new(),
            votes,
        }
    }

    /// Reload every problem and its comments
    pub async fn refresh(&mut self) -> BoardResult<usize> {
        self.problems = load_problems(self.gateway.as_ref())
            .await
            .map_err(BoardError::Fetch)?;
        Ok(self.problems.len())
    }

    /// Problems, newest first
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn problem(&self, id: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    pub fn comment(&self, id: &str) -> Option<&Comment> {
        self.comments().find(|c| c.id == id)
    }

    /// Every loaded comment
    pub fn comments(&self) -> impl Iterator<Item = &Comment> {
        self.problems.iter().flat_map(|p| p.comments.iter())
    }

    /// Problems whose title or description contains `term`
    pub fn filtered(&self, term: &str) -> Vec<&Problem> {
        self.problems.iter().filter(|p| p.matches(term)).collect()
    }

    pub fn votes(&self) -> &VoteLedger {
        &self.votes
    }

    /// Post a new problem
    pub async fn add_problem(&mut self, title: &str, description: &str) -> BoardResult<Problem> {
        let title = title.trim();
        let description = description.trim();
        if title.is_empty() {
            return Err(BoardError::InvalidProblem("title is required".into()));
        }
        if description.is_empty() {
            return Err(BoardError::InvalidProblem("description is required".into()));
        }

        let row = to_row(json!({ "title": title, "description": description }));
        let problem: Problem = self.insert(tables::PROBLEMS, row).await?;
        info!("Added problem {}", problem.id);

        if self.problem(&problem.id).is_none() {
            self.problems.insert(0, problem.clone());
        }
        Ok(problem)
    }

    /// Reply to a loaded problem
    pub async fn add_comment(&mut self, problem_id: &str, text: &str) -> BoardResult<Comment> {
        let text = text.trim();
        if text.is_empty() {
            return Err(BoardError::EmptyComment);
        }
        if self.problem(problem_id).is_none() {
            return Err(BoardError::not_found("problem", problem_id));
        }

        let row = to_row(json!({ "problem_id": problem_id, "text": text }));
        let comment: Comment = self.insert(tables::COMMENTS, row).await?;
        info!("Added comment {} to problem {}", comment.id, problem_id);

        if let Some(problem) = self.problems.iter_mut().find(|p| p.id == problem_id) {
            if !problem.comments.iter().any(|c| c.id == comment.id) {
                problem.comments.push(comment.clone());
            }
        }
        Ok(comment)
    }

    /// Mark a comment helpful or unhelpful, once per voter
    pub async fn vote(&mut self, comment_id: &str, helpful: bool) -> BoardResult<Comment> {
        if self.votes.has_voted(comment_id) {
            return Err(BoardError::AlreadyVoted(comment_id.to_string()));
        }
        if self.comment(comment_id).is_none() {
            return Err(BoardError::not_found("comment", comment_id));
        }

        // Ledger first: a vote that reached the backend is always on disk
        self.votes.record(comment_id, helpful);
        if let Err(e) = self.votes.save() {
            self.votes.forget(comment_id);
            return Err(e);
        }

        let patch = to_row(json!({ "is_helpful": helpful }));
        let row = match self.gateway.update(tables::COMMENTS, comment_id, patch).await {
            Ok(row) => row,
            Err(e) => {
                self.votes.forget(comment_id);
                if let Err(save_err) = self.votes.save() {
                    warn!("Could not roll back vote on {}: {}", comment_id, save_err);
                }
                return Err(match e {
                    GatewayError::NotFound { .. } => BoardError::not_found("comment", comment_id),
                    other => BoardError::Submission(other),
                });
            }
        };
        let updated: Comment = decode(row).map_err(BoardError::Submission)?;
        debug!("Voted {} on comment {}", helpful, comment_id);

        for problem in &mut self.problems {
            if let Some(slot) = problem.comments.iter_mut().find(|c| c.id == comment_id) {
                *slot = updated.clone();
            }
        }
        Ok(updated)
    }

    pub async fn report_problem(&self, id: &str, reason: ReportReason) -> BoardResult<Report> {
        if self.problem(id).is_none() {
            return Err(BoardError::not_found("problem", id));
        }
        self.report(ReportTarget::Problem(id.to_string()), reason).await
    }

    pub async fn report_comment(&self, id: &str, reason: ReportReason) -> BoardResult<Report> {
        if self.comment(id).is_none() {
            return Err(BoardError::not_found("comment", id));
        }
        self.report(ReportTarget::Comment(id.to_string()), reason).await
    }

    async fn report(&self, target: ReportTarget, reason: ReportReason) -> BoardResult<Report> {
        let key = match target {
            ReportTarget::Problem(_) => "problem_id",
            ReportTarget::Comment(_) => "comment_id",
        };
        let row = to_row(json!({ key: target.id(), "reason": reason.label() }));
        let report: Report = self.insert(target.table(), row).await?;
        info!("Reported {} {} ({})", key, target.id(), reason.key());
        Ok(report)
    }

    async fn insert<T: DeserializeOwned>(&self, table: &str, row: Row) -> BoardResult<T> {
        let stored = self
            .gateway
            .insert(table, row)
            .await
            .map_err(BoardError::Submission)?;
        decode(stored).map_err(BoardError::Submission)
    }
}

/// Every problem, newest first, each with its comments oldest first
///
/// A failed comment fetch leaves that problem without comments.
pub(crate) async fn load_problems(gateway: &dyn Gateway) -> GatewayResult<Vec<Problem>> {
    let rows = gateway
        .select(&Query::table(tables::PROBLEMS).order_by("created_at", Direction::Descending))
        .await?;

    let mut seen = HashSet::new();
    let mut problems = Vec::with_capacity(rows.len());
    for row in rows {
        match decode::<Problem>(row) {
            Ok(problem) if seen.insert(problem.id.clone()) => problems.push(problem),
            Ok(_) => {}
            Err(e) => warn!("Skipping undecodable problem: {}", e),
        }
    }

    for problem in &mut problems {
        problem.comments = match load_comments(gateway, &problem.id).await {
            Ok(comments) => comments,
            Err(e) => {
                warn!("Failed to load comments for problem {}: {}", problem.id, e);
                Vec::new()
            }
        };
    }

    debug!("Loaded {} problems", problems.len());
    Ok(problems)
}

async fn load_comments(gateway: &dyn Gateway, problem_id: &str) -> GatewayResult<Vec<Comment>> {
    let query = Query::table(tables::COMMENTS)
        .eq("problem_id", problem_id)
        .order_by("created_at", Direction::Ascending);

    let mut seen = HashSet::new();
    Ok(gateway
        .select(&query)
        .await?
        .into_iter()
        .filter_map(|row| match decode::<Comment>(row) {
            Ok(comment) => Some(comment),
            Err(e) => {
                warn!("Skipping undecodable comment: {}", e);
                None
            }
        })
        .filter(|c| seen.insert(c.id.clone()))
        .collect())
}

pub(crate) fn decode<T: DeserializeOwned>(row: Row) -> GatewayResult<T> {
    Ok(serde_json::from_value(Value::Object(row))?)
}

fn to_row(value: Value) -> Row {
    match value {
        Value::Object(row) => row,
        _ => Row::new(),
    }
}
