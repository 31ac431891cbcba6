use std::time::Duration;

use ghwatch_core::{DataSource, FetchError, Job, Listing, RepoKey, Run, RunId, Workflow};
use time::format_description::well_known::Rfc3339;
use time::{OffsetDateTime, UtcOffset};

use crate::page::{collect_pages, decode_page, Page};

pub const DEFAULT_API_URL: &str = "https://api.github.com";

const API_VERSION: &str = "2022-11-28";
const USER_AGENT: &str = concat!("ghwatch/", env!("CARGO_PKG_VERSION"));

// ── Config ──

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub api_url: String,
    pub token: Option<String>,
    /// Page size, 1..=100.
    pub per_page: u32,
    /// Upper bound for a single request, connect to last byte.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            per_page: 100,
            timeout: Duration::from_secs(30),
        }
    }
}

// ── Client ──

/// Blocking GitHub Actions client scoped to one repository.
#[derive(Clone)]
pub struct GitHubClient {
    agent: ureq::Agent,
    repo: RepoKey,
    config: ClientConfig,
}

impl GitHubClient {
    pub fn new(repo: RepoKey, config: ClientConfig) -> Self {
        let agent = ureq::Agent::config_builder()
            .timeout_global(Some(config.timeout))
            .build()
            .new_agent();
        Self {
            agent,
            repo,
            config,
        }
    }

    pub fn repo(&self) -> &RepoKey {
        &self.repo
    }

    fn repo_url(&self, tail: &str) -> String {
        format!(
            "{}/repos/{}/{}/{}",
            self.config.api_url.trim_end_matches('/'),
            self.repo.owner(),
            self.repo.name(),
            tail
        )
    }

    /// GET every page of a list endpoint.
    fn get_all<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        field: &str,
        filters: &[(&str, String)],
    ) -> Result<Listing<T>, FetchError> {
        collect_pages(self.config.per_page, |page| {
            let body = self.get_page(url, filters, page)?;
            let decoded: Page<T> = decode_page(&body, field, url)?;
            Ok(decoded)
        })
    }

    fn get_page(
        &self,
        url: &str,
        filters: &[(&str, String)],
        page: u32,
    ) -> Result<String, FetchError> {
        let mut req = self
            .agent
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("User-Agent", USER_AGENT)
            .query("per_page", self.config.per_page.to_string())
            .query("page", page.to_string());
        for (key, value) in filters {
            req = req.query(*key, value);
        }
        if let Some(token) = &self.config.token {
            req = req.header("Authorization", format!("Bearer {token}"));
        }

        tracing::debug!(url, page, "GET");
        let mut resp = req.call().map_err(|e| map_ureq_error(url, e))?;
        resp.body_mut()
            .read_to_string()
            .map_err(|e| map_ureq_error(url, e))
    }
}

impl DataSource for GitHubClient {
    fn list_workflows(&self) -> Result<Vec<Workflow>, FetchError> {
        let url = self.repo_url("actions/workflows");
        Ok(self.get_all(&url, "workflows", &[])?.items)
    }

    fn list_runs_since(&self, since: OffsetDateTime) -> Result<Listing<Run>, FetchError> {
        let url = self.repo_url("actions/runs");
        let created = created_filter(since).map_err(|message| FetchError::Transport {
            url: url.clone(),
            message,
        })?;
        self.get_all(&url, "workflow_runs", &[("created", created)])
    }

    fn list_jobs(&self, run_id: RunId) -> Result<Listing<Job>, FetchError> {
        let url = self.repo_url(&format!("actions/runs/{run_id}/jobs"));
        self.get_all(&url, "jobs", &[])
    }
}

/// `created` search qualifier: `>=2026-01-02T03:04:05Z`, second precision, UTC.
fn created_filter(since: OffsetDateTime) -> Result<String, String> {
    let utc = since.to_offset(UtcOffset::UTC);
    let utc = utc.replace_nanosecond(0).unwrap_or(utc);
    utc.format(&Rfc3339)
        .map(|ts| format!(">={ts}"))
        .map_err(|e| format!("cannot format timestamp {since}: {e}"))
}

fn map_ureq_error(url: &str, err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(status) => FetchError::Status {
            url: url.to_string(),
            status,
        },
        other => FetchError::Transport {
            url: url.to_string(),
            message: other.to_string(),
        },
    }
}
