//! Admin review
//!
//! Lists every problem with its comments alongside open reports, and removes
//! reported content. Signing in as the admin is handled by the backend and
//! is not part of this client.

use std::sync::Arc;

use tracing::{info, warn};

use crate::board::{decode, load_problems};
use crate::error::{BoardError, BoardResult};
use crate::gateway::{Filter, Gateway, GatewayResult, Query};
use crate::models::{tables, Comment, Problem, Report, ReportTarget};

/// Moderation view over problems and reports
pub struct AdminReview {
    gateway: Arc<dyn Gateway>,
    problems: Vec<Problem>,
    problem_reports: Vec<Report>,
    comment_reports: Vec<Report>,
}

impl AdminReview {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self {
            gateway,
            problems: Vec::new(),
            problem_reports: Vec::new(),
            comment_reports: Vec::new(),
        }
    }

    /// Load problems and both report lists
    pub async fn load(&mut self) -> BoardResult<()> {
        let gateway = self.gateway.as_ref();
        self.problems = load_problems(gateway).await.map_err(BoardError::Fetch)?;
        self.problem_reports = load_reports(gateway, tables::PROBLEM_REPORTS)
            .await
            .map_err(BoardError::Fetch)?;
        self.comment_reports = load_reports(gateway, tables::COMMENT_REPORTS)
            .await
            .map_err(BoardError::Fetch)?;

        info!(
            "Loaded {} problems, {} problem reports, {} comment reports",
            self.problems.len(),
            self.problem_reports.len(),
            self.comment_reports.len()
        );
        Ok(())
    }

    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn problem(&self, id: &str) -> Option<&Problem> {
        self.problems.iter().find(|p| p.id == id)
    }

    pub fn comment(&self, id: &str) -> Option<&Comment> {
        self.problems
            .iter()
            .flat_map(|p| p.comments.iter())
            .find(|c| c.id == id)
    }

    /// Problem reports, newest first
    pub fn problem_reports(&self) -> &[Report] {
        &self.problem_reports
    }

    /// Comment reports, newest first
    pub fn comment_reports(&self) -> &[Report] {
        &self.comment_reports
    }

    /// Every open report
    pub fn reports(&self) -> impl Iterator<Item = &Report> {
        self.problem_reports.iter().chain(self.comment_reports.iter())
    }

    /// Delete a problem, its comments, and the reports filed against them
    ///
    /// Comments go first so none is left pointing at a missing problem.
    pub async fn delete_problem(&mut self, id: &str) -> BoardResult<()> {
        let comment_ids: Vec<String> = self
            .problem(id)
            .ok_or_else(|| BoardError::not_found("problem", id))?
            .comments
            .iter()
            .map(|c| c.id.clone())
            .collect();

        for comment_id in &comment_ids {
            self.remove(tables::COMMENT_REPORTS, Filter::eq("comment_id", comment_id.as_str()))
                .await?;
        }
        self.remove(tables::PROBLEM_REPORTS, Filter::eq("problem_id", id)).await?;
        self.remove(tables::COMMENTS, Filter::eq("problem_id", id)).await?;
        self.remove(tables::PROBLEMS, Filter::eq("id", id)).await?;

        self.problems.retain(|p| p.id != id);
        self.problem_reports
            .retain(|r| r.target != ReportTarget::Problem(id.to_string()));
        self.comment_reports.retain(|r| match &r.target {
            ReportTarget::Comment(c) => !comment_ids.contains(c),
            ReportTarget::Problem(_) => true,
        });

        info!("Deleted problem {} and {} comment(s)", id, comment_ids.len());
        Ok(())
    }

    /// Delete one comment and the reports filed against it
    pub async fn delete_comment(&mut self, id: &str) -> BoardResult<()> {
        if self.comment(id).is_none() {
            return Err(BoardError::not_found("comment", id));
        }

        self.remove(tables::COMMENT_REPORTS, Filter::eq("comment_id", id)).await?;
        self.remove(tables::COMMENTS, Filter::eq("id", id)).await?;

        for problem in &mut self.problems {
            problem.comments.retain(|c| c.id != id);
        }
        self.comment_reports
            .retain(|r| r.target != ReportTarget::Comment(id.to_string()));

        info!("Deleted comment {}", id);
        Ok(())
    }

    /// Close a report without touching the reported content
    pub async fn dismiss_report(&mut self, id: &str) -> BoardResult<()> {
        let table = self
            .reports()
            .find(|r| r.id == id)
            .map(|r| r.target.table())
            .ok_or_else(|| BoardError::not_found("report", id))?;

        self.remove(table, Filter::eq("id", id)).await?;

        self.problem_reports.retain(|r| r.id != id);
        self.comment_reports.retain(|r| r.id != id);
        info!("Dismissed report {}", id);
        Ok(())
    }

    async fn remove(&self, table: &str, filter: Filter) -> BoardResult<u64> {
        self.gateway
            .delete(table, &filter)
            .await
            .map_err(BoardError::Submission)
    }
}

/// Reports from one table, newest first
async fn load_reports(gateway: &dyn Gateway, table: &str) -> GatewayResult<Vec<Report>> {
    let mut reports: Vec<Report> = gateway
        .select(&Query::table(table))
        .await?
        .into_iter()
        .filter_map(|row| match decode::<Report>(row) {
            Ok(report) => Some(report),
            Err(e) => {
                warn!("Skipping undecodable report in {}: {}", table, e);
                None
            }
        })
        .collect();

    reports.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(reports)
}
