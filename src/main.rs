use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gitlab_composer::{
    config::Config,
    gitlab::GitLabClient,
    poller::Poller,
    repository::ComposerRepository,
    server,
};

/// Serve a Composer repository built from the projects of a GitLab instance
#[derive(Parser, Debug)]
#[command(name = "gitlab-composer", version, about)]
struct Cli {
    /// Config file (default: ~/.config/gitlab-composer/config.yaml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// GitLab API url including version string, e.g. https://gitlab.com/api/v4/
    #[arg(long)]
    url: Option<String>,

    /// GitLab API token
    #[arg(long)]
    token: Option<String>,

    /// Verify the GitLab TLS certificate
    #[arg(long = "verify-ssl")]
    verify_ssl: Option<bool>,

    /// HTTP server address
    #[arg(long)]
    addr: Option<String>,

    /// Minutes between updates
    #[arg(long)]
    interval: Option<u64>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Config file and environment, overridden by command line flags
    fn config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref())?;

        if let Some(url) = &self.url {
            config.url = url.clone();
        }
        if let Some(token) = &self.token {
            config.token = token.clone();
        }
        if let Some(verify_ssl) = self.verify_ssl {
            config.verify_ssl = verify_ssl;
        }
        if let Some(addr) = &self.addr {
            config.listen_addr = addr.clone();
        }
        if let Some(interval) = self.interval {
            config.interval_minutes = interval;
        }

        config.validate()?;
        Ok(config)
    }
}

fn initialize_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_tracing(&cli.log_level);

    let config = cli.config()?;
    tracing::debug!(?config.url, interval = config.interval_minutes, "Configuration loaded");

    let client = GitLabClient::new(
        &config.url,
        &config.token,
        config.verify_ssl,
        config.request_timeout(),
    )?;
    let repository = ComposerRepository::new(client, config.engine_options());
    let cache = repository.cache();

    // Bind first so an unusable address fails before any polling starts
    let runtime = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    let listener = runtime.block_on(server::bind(&config.socket_addr()))?;

    // The blocking GitLab client lives on its own thread, outside the runtime
    let poller = Poller::spawn(repository, config.interval())?;
    let result = runtime.block_on(server::serve(listener, cache));

    poller.shutdown();
    result
}
