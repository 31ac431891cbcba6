mod cmd_checkpoint;
mod cmd_config;
mod cmd_watch;
mod cmd_workflows;
mod config;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ghwatch", version, about = "Watch GitHub Actions workflow runs of a repository")]
struct Cli {
    /// Config file (default: <data dir>/ghwatch/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll a repository and report run, job and step changes
    Watch {
        /// Repository (owner/repo)
        repo: String,
        /// Seconds between polls (default: 30)
        #[arg(long)]
        interval: Option<u64>,
        /// Look-back window in hours on first contact (default: 72)
        #[arg(long)]
        seed_hours: Option<u64>,
        /// One JSON object per event instead of text lines
        #[arg(long)]
        json: bool,
        /// Run a single poll cycle and exit
        #[arg(long)]
        once: bool,
        /// Keep the checkpoint in memory only
        #[arg(long)]
        ephemeral: bool,
        /// GitHub token (default: GITHUB_TOKEN / GH_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// API base URL, for GitHub Enterprise
        #[arg(long)]
        api_url: Option<String>,
        /// Checkpoint database path
        #[arg(long)]
        db: Option<PathBuf>,
    },
    /// Inspect or reset stored checkpoints
    Checkpoint {
        #[command(subcommand)]
        cmd: cmd_checkpoint::CheckpointCmd,
    },
    /// List the workflows of a repository
    Workflows {
        /// Repository (owner/repo)
        repo: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// GitHub token (default: GITHUB_TOKEN / GH_TOKEN)
        #[arg(long)]
        token: Option<String>,
        /// API base URL, for GitHub Enterprise
        #[arg(long)]
        api_url: Option<String>,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        cmd: cmd_config::ConfigCmd,
    },
}

fn init_logging(verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_env("GHWATCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = cli.config.as_deref();

    match cli.cmd {
        Command::Watch {
            repo,
            interval,
            seed_hours,
            json,
            once,
            ephemeral,
            token,
            api_url,
            db,
        } => cmd_watch::execute(cmd_watch::WatchParams {
            repo: &repo,
            interval,
            seed_hours,
            json,
            once,
            ephemeral,
            token,
            api_url,
            db,
            config,
        }),
        Command::Checkpoint { cmd } => cmd_checkpoint::run(cmd, config),
        Command::Workflows {
            repo,
            json,
            token,
            api_url,
        } => cmd_workflows::execute(&repo, json, token, api_url, config),
        Command::Config { cmd } => cmd_config::run(cmd, config),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn watch_flags_parse() {
        let cli = Cli::try_parse_from([
            "ghwatch", "watch", "octo/hello", "--interval", "10", "--once", "--json", "-vv",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.cmd {
            Command::Watch {
                repo,
                interval,
                once,
                json,
                ephemeral,
                ..
            } => {
                assert_eq!(repo, "octo/hello");
                assert_eq!(interval, Some(10));
                assert!(once && json && !ephemeral);
            }
            _ => panic!("expected watch"),
        }
    }

    #[test]
    fn global_config_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["ghwatch", "config", "list", "--config", "/tmp/c.json"]).unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/c.json")));
    }

    #[test]
    fn checkpoint_reset_requires_repo() {
        assert!(Cli::try_parse_from(["ghwatch", "checkpoint", "reset"]).is_err());
    }
}
