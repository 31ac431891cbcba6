use std::path::Path;

use ghwatch_core::{DataSource, RepoKey, Workflow};
use ghwatch_github::GitHubClient;

use crate::cmd_watch::client_config;
use crate::config::{self, Layer};

/// `ghwatch workflows <owner/repo>`
pub fn execute(
    repo: &str,
    json: bool,
    token: Option<String>,
    api_url: Option<String>,
    config: Option<&Path>,
) -> anyhow::Result<()> {
    let repo: RepoKey = repo.parse()?;
    let flags = Layer {
        token,
        api_url,
        ..Layer::default()
    };
    let (_, settings) = config::load(config, flags)?;
    let client = GitHubClient::new(repo, client_config(&settings));
    let mut workflows = client.list_workflows()?;
    workflows.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));

    if json {
        println!("{}", serde_json::to_string_pretty(&workflows)?);
    } else {
        for line in render(&workflows) {
            println!("{line}");
        }
    }
    Ok(())
}

fn render(workflows: &[Workflow]) -> Vec<String> {
    if workflows.is_empty() {
        return vec!["(no workflows)".to_string()];
    }
    let width = workflows.iter().map(|w| w.name.len()).max().unwrap_or(0);
    workflows
        .iter()
        .map(|w| format!("{:>12}  {:<width$}  {}  {}", w.id, w.name, w.path, w.state))
        .collect()
}
