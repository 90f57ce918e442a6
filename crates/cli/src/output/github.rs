//! GitHub PR report sink.
//!
//! Publishes findings as inline review comments and the grouped summary as a
//! single issue comment, via the GitHub REST API. Every body carries a
//! `<!-- diffsentry:MARKER -->` marker; re-runs update the matching comment
//! in place instead of posting a duplicate.
//!
//! Required environment variables (all standard GitHub Actions variables):
//! - `GITHUB_TOKEN`      — Personal access token or `secrets.GITHUB_TOKEN`
//! - `GITHUB_REPOSITORY` — `owner/repo` (e.g. `acme/myapp`)
//! - `GITHUB_PR_NUMBER`  — Pull request number as a string
//! - `GITHUB_SHA`        — Full SHA of the HEAD commit being reviewed

use diffsentry_core::{extract_marker, Conclusion, PublishError, RenderedFinding, ReportSink};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Marker the summary comment carries, distinct from any finding marker.
const SUMMARY_MARKER: &str = "summary";

/// Context needed to call the GitHub API.
#[derive(Debug, Clone)]
pub struct GitHubContext {
    pub token: String,
    pub owner: String,
    pub repo: String,
    pub pr_number: u64,
    pub commit_sha: String,
}

impl GitHubContext {
    /// Build context from environment variables set by GitHub Actions.
    ///
    /// Returns `None` if any required variable is missing, so callers can
    /// print a helpful message rather than crashing.
    pub fn from_env() -> Option<Self> {
        let token = std::env::var("GITHUB_TOKEN").ok()?;
        let repository = std::env::var("GITHUB_REPOSITORY").ok()?;
        let pr_number: u64 = std::env::var("GITHUB_PR_NUMBER")
            .ok()?
            .trim()
            .parse()
            .ok()?;
        let commit_sha = std::env::var("GITHUB_SHA")
            .or_else(|_| std::env::var("GITHUB_HEAD_SHA"))
            .ok()?;

        let (owner, repo) = repository.split_once('/')?;

        Some(Self {
            token,
            owner: owner.to_string(),
            repo: repo.to_string(),
            pr_number,
            commit_sha,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!(
            "https://api.github.com/repos/{}/{}/{}",
            self.owner, self.repo, path
        )
    }
}

// ── GitHub API types ─────────────────────────────────────────────

#[derive(Deserialize)]
struct ExistingComment {
    id: u64,
    body: String,
}

#[derive(Serialize)]
struct NewReviewComment<'a> {
    body: &'a str,
    commit_id: &'a str,
    path: &'a str,
    line: usize,
    side: &'static str,
}

#[derive(Serialize)]
struct CommentBody<'a> {
    body: &'a str,
}

// ── Sink ─────────────────────────────────────────────────────────

/// Marker-keyed sink over the GitHub REST API.
pub struct GitHubSink {
    client: Client,
    ctx: GitHubContext,
    /// marker → review comment id, loaded once at construction
    review_comments: HashMap<String, u64>,
    /// marker → issue comment id (the summary lives here)
    issue_comments: HashMap<String, u64>,
}

impl GitHubSink {
    /// Build the sink and load existing diffsentry comments for dedup.
    pub fn new(ctx: GitHubContext) -> Result<Self, PublishError> {
        let client = Client::builder()
            .user_agent(format!("diffsentry/{}", diffsentry_core::VERSION))
            .build()
            .map_err(|e| PublishError::Surface(format!("build HTTP client: {}", e)))?;

        let review_comments = fetch_markers(
            &client,
            &ctx,
            &ctx.api_url(&format!("pulls/{}/comments?per_page=100", ctx.pr_number)),
        )?;
        let issue_comments = fetch_markers(
            &client,
            &ctx,
            &ctx.api_url(&format!("issues/{}/comments?per_page=100", ctx.pr_number)),
        )?;

        Ok(Self {
            client,
            ctx,
            review_comments,
            issue_comments,
        })
    }

    fn send(&self, req: reqwest::blocking::RequestBuilder) -> Result<(), PublishError> {
        let resp = req
            .header("Authorization", format!("Bearer {}", self.ctx.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
            .send()
            .map_err(|e| PublishError::Surface(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().unwrap_or_default();
            return Err(PublishError::Surface(format!(
                "GitHub API error {}: {}",
                status, text
            )));
        }
        Ok(())
    }
}

impl ReportSink for GitHubSink {
    fn upsert_finding(&mut self, finding: &RenderedFinding) -> Result<(), PublishError> {
        if let Some(&id) = self.review_comments.get(&finding.marker) {
            let url = self.ctx.api_url(&format!("pulls/comments/{}", id));
            let body = CommentBody {
                body: &finding.body,
            };
            return self.send(self.client.patch(&url).json(&body));
        }

        let url = self
            .ctx
            .api_url(&format!("pulls/{}/comments", self.ctx.pr_number));
        let comment = NewReviewComment {
            body: &finding.body,
            commit_id: &self.ctx.commit_sha,
            path: &finding.file,
            line: finding.line,
            side: "RIGHT",
        };
        self.send(self.client.post(&url).json(&comment))
    }

    fn publish_summary(
        &mut self,
        summary: &str,
        _conclusion: Conclusion,
    ) -> Result<(), PublishError> {
        let body_text = format!("{}\n<!-- diffsentry:{} -->", summary, SUMMARY_MARKER);
        let body = CommentBody { body: &body_text };

        if let Some(&id) = self.issue_comments.get(SUMMARY_MARKER) {
            let url = self.ctx.api_url(&format!("issues/comments/{}", id));
            return self.send(self.client.patch(&url).json(&body));
        }

        let url = self
            .ctx
            .api_url(&format!("issues/{}/comments", self.ctx.pr_number));
        self.send(self.client.post(&url).json(&body))
    }
}

/// Fetch a comment listing and index it by embedded marker.
fn fetch_markers(
    client: &Client,
    ctx: &GitHubContext,
    url: &str,
) -> Result<HashMap<String, u64>, PublishError> {
    let resp = client
        .get(url)
        .header("Authorization", format!("Bearer {}", ctx.token))
        .header("Accept", "application/vnd.github+json")
        .header("X-GitHub-Api-Version", "2022-11-28")
        .send()
        .map_err(|e| PublishError::Surface(format!("fetch existing comments: {}", e)))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let text = resp.text().unwrap_or_default();
        return Err(PublishError::Surface(format!(
            "GitHub API error {}: {}",
            status, text
        )));
    }

    let comments: Vec<ExistingComment> = resp
        .json()
        .map_err(|e| PublishError::Surface(format!("parse existing comments: {}", e)))?;

    Ok(comments
        .into_iter()
        .filter_map(|c| extract_marker(&c.body).map(|m| (m, c.id)))
        .collect())
}
