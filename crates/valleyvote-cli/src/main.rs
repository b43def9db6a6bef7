mod display;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use valleyvote_core::{CanonicalRegistry, Config, RawMention};
use valleyvote_pipeline::orchestrator::REGISTRY_DOCUMENT;
use valleyvote_pipeline::{Orchestrator, PipelineError, resolve_mentions};
use valleyvote_store::{DirectorySink, JsonMentionFile, load_json, save_json};
use valleyvote_sync::{FetchError, LegiScanHttp, RemoteSource};

#[derive(Parser)]
#[command(name = "valleyvote", version, about = "LegiScan dataset sync and legislator entity resolution")]
struct Cli {
    /// JSON config file. Flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sync sessions in range, rebuild tables and resolve mentions.
    Sync {
        #[command(flatten)]
        scope: Scope,
        #[command(flatten)]
        api: Api,
        /// JSON array of scraped mentions to resolve after the sync.
        #[arg(long)]
        mentions: Option<PathBuf>,
    },
    /// Show what a sync of one session would fetch, without fetching it.
    Plan {
        session_id: u64,
        #[command(flatten)]
        scope: Scope,
        #[command(flatten)]
        api: Api,
    },
    /// Resolve a mentions file against a stored registry. Offline.
    Resolve {
        /// JSON array of scraped mentions.
        mentions: PathBuf,
        /// Registry document; defaults to the one in the data directory.
        #[arg(long)]
        registry: Option<PathBuf>,
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Write match results here as JSON.
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct Scope {
    /// Two-letter state code.
    #[arg(long)]
    state: Option<String>,
    #[arg(long)]
    year_start: Option<i32>,
    #[arg(long)]
    year_end: Option<i32>,
    #[arg(long)]
    data_dir: Option<PathBuf>,
    /// Sessions processed at once.
    #[arg(long)]
    concurrency: Option<usize>,
}

impl Scope {
    fn apply(self, config: &mut Config) {
        if let Some(state) = self.state {
            config.state = state.to_uppercase();
        }
        if let Some(y) = self.year_start {
            config.year_start = y;
        }
        if let Some(y) = self.year_end {
            config.year_end = y;
        }
        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(n) = self.concurrency {
            config.concurrency = n;
        }
    }
}

#[derive(Args)]
struct Api {
    #[arg(long, env = "LEGISCAN_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[arg(long)]
    api_base_url: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("valleyvote v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        Command::Sync { scope, api, mentions } => {
            scope.apply(&mut config);
            let source = legiscan_source(&mut config, api)?;
            let sink = Arc::new(DirectorySink::new(&config.data_dir));
            let mentions = mentions.or_else(|| config.mentions_file.clone());

            let cancel = CancellationToken::new();
            tokio::spawn({
                let cancel = cancel.clone();
                async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        tracing::warn!("interrupted, saving progress");
                        cancel.cancel();
                    }
                }
            });

            let mut orchestrator = Orchestrator::new(config, source, sink)
                .context("setting up run")?
                .with_cancellation(cancel);
            if let Some(path) = mentions {
                orchestrator = orchestrator.with_mentions(Arc::new(JsonMentionFile::new(path)));
            }
            let summary = orchestrator.run().await.context("sync run")?;
            display::print_run_summary(&summary);
        }
        Command::Plan { session_id, scope, api } => {
            scope.apply(&mut config);
            let source = legiscan_source(&mut config, api)?;
            let sink = Arc::new(DirectorySink::new(&config.data_dir));
            let orchestrator = Orchestrator::new(config, source, sink).context("setting up plan")?;
            let plan = orchestrator
                .plan_session(session_id)
                .await
                .with_context(|| format!("planning session {session_id}"))?;
            display::print_session_plan(&plan);
        }
        Command::Resolve {
            mentions,
            registry,
            threshold,
            data_dir,
            output,
        } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(t) = threshold {
                config.matching.threshold = t;
            }
            config.validate()?;

            let registry_path =
                registry.unwrap_or_else(|| DirectorySink::new(&config.data_dir).document_path(REGISTRY_DOCUMENT));
            let registry: CanonicalRegistry = load_json(&registry_path)
                .with_context(|| format!("reading registry {}", registry_path.display()))?;
            let mentions: Vec<RawMention> =
                load_json(&mentions).with_context(|| format!("reading mentions {}", mentions.display()))?;

            let (results, counts) = resolve_mentions(&registry, &mentions, &config.matching, Vec::new());
            display::print_match_results(&results)?;
            display::print_mention_counts(&counts);
            if let Some(path) = output {
                save_json(&path, &results).with_context(|| format!("writing {}", path.display()))?;
                println!("Wrote {} results to {}", results.len(), path.display());
            }
        }
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(p) => Config::from_json_file(p).with_context(|| format!("loading config {}", p.display())),
        None => Ok(Config::default()),
    }
}

fn legiscan_source(config: &mut Config, api: Api) -> anyhow::Result<Arc<dyn RemoteSource>> {
    if let Some(url) = api.api_base_url {
        config.api_base_url = url;
    }
    let key = api.api_key.unwrap_or_default();
    match LegiScanHttp::new(&config.api_base_url, &key) {
        Ok(http) => Ok(Arc::new(http)),
        Err(FetchError::MissingCredential) => {
            Err(PipelineError::MissingCredential).context("pass --api-key or set LEGISCAN_API_KEY")
        }
        Err(e) => Err(e).context("building LegiScan client"),
    }
}
