use std::path::{Path, PathBuf};

use anyhow::Context;
use ghwatch_core::{CheckpointStore, MemoryCheckpointStore, RepoKey};
use ghwatch_github::{ClientConfig, GitHubClient};
use ghwatch_store::{RepoLock, SqliteCheckpointStore};
use ghwatch_tracker::{
    run_scheduler, JsonReporter, Reporter, SchedulerConfig, TextReporter, Tracker, TrackerConfig,
};
use tokio_util::sync::CancellationToken;

use crate::config::{self, Layer, Settings};

pub struct WatchParams<'a> {
    pub repo: &'a str,
    pub interval: Option<u64>,
    pub seed_hours: Option<u64>,
    pub json: bool,
    pub once: bool,
    pub ephemeral: bool,
    pub token: Option<String>,
    pub api_url: Option<String>,
    pub db: Option<PathBuf>,
    pub config: Option<&'a Path>,
}

impl WatchParams<'_> {
    fn flags(&self) -> Layer {
        Layer {
            token: self.token.clone(),
            poll_interval_secs: self.interval,
            seed_window_hours: self.seed_hours,
            api_url: self.api_url.clone(),
            db_path: self.db.clone(),
            ..Layer::default()
        }
    }
}

/// `ghwatch watch <owner/repo>`
pub fn execute(params: WatchParams<'_>) -> anyhow::Result<()> {
    let repo: RepoKey = params.repo.parse()?;
    let (paths, settings) = config::load(params.config, params.flags())?;
    if settings.token.is_none() {
        tracing::warn!("no GitHub token configured, requests are unauthenticated");
    }

    paths.ensure_layout()?;
    let lock = RepoLock::acquire(&paths, &repo)?;

    let store: Box<dyn CheckpointStore + Send> = if params.ephemeral {
        Box::new(MemoryCheckpointStore::new())
    } else {
        let store = SqliteCheckpointStore::open_or_create(&settings.db_path)
            .with_context(|| format!("cannot open {}", settings.db_path.display()))?;
        Box::new(store)
    };
    let reporter: Box<dyn Reporter + Send> = if params.json {
        Box::new(JsonReporter::new(std::io::stdout()))
    } else {
        Box::new(TextReporter::new(std::io::stdout()))
    };
    let client = GitHubClient::new(repo.clone(), client_config(&settings));
    let tracker_config = tracker_config(&settings);
    let scheduler_config = SchedulerConfig {
        interval: settings.poll_interval,
        max_cycles: params.once.then_some(1),
    };

    let cancel = CancellationToken::new();
    ctrlc_cancel(cancel.clone());

    eprintln!("Watching {repo} every {}s. Press Ctrl-C to stop.", settings.poll_interval.as_secs());
    let rt = tokio::runtime::Runtime::new()?;
    let stats = rt.block_on(run_scheduler(
        move || Tracker::bootstrap(repo, client, store, reporter, tracker_config),
        scheduler_config,
        cancel,
    ))?;
    drop(lock);

    if params.once && stats.failed > 0 {
        anyhow::bail!("poll cycle failed");
    }
    Ok(())
}

pub fn client_config(settings: &Settings) -> ClientConfig {
    ClientConfig {
        api_url: settings.api_url.clone(),
        token: settings.token.clone(),
        per_page: settings.per_page,
        timeout: settings.http_timeout,
    }
}

fn tracker_config(settings: &Settings) -> TrackerConfig {
    TrackerConfig {
        seed_window: time::Duration::hours(i64::try_from(settings.seed_window_hours).unwrap_or(i64::MAX / 3_600)),
        fetch_concurrency: settings.fetch_concurrency,
    }
}

fn ctrlc_cancel(cancel: CancellationToken) {
    if let Err(e) = ctrlc::set_handler(move || {
        cancel.cancel();
    }) {
        tracing::warn!(error = %e, "cannot install Ctrl-C handler");
    }
}
