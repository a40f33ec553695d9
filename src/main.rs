use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use probe_engine::config::EngineConfig;
use probe_engine::controller::SessionController;
use probe_engine::session::Pacing;
use probe_engine::types::{ProbeInput, ProbeKind, SessionView, TargetDescriptor};
use probe_engine::{inputs, server, tables};

/// probe-engine: sequential probe runner with pluggable outcome strategies.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "probe-engine",
    version,
    about = "Sequential probe runner: port scan, banner grab, directory discovery and credential checks.",
    long_about = None
)]
struct Cli {
    /// JSON config file with tables, rates and default input lists.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Seed for reproducible outcomes.
    #[arg(long, global = true)]
    seed: Option<u64>,

    /// Fixed delay before each probe in milliseconds (overrides module pacing).
    #[arg(long = "delay-ms", global = true)]
    delay_ms: Option<u64>,

    /// Random extra delay per probe in milliseconds; needs --delay-ms.
    #[arg(long = "jitter-ms", global = true, requires = "delay_ms")]
    jitter_ms: Option<u64>,

    /// Write the final session snapshot as pretty JSON to this path.
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Report open/closed ports with service names.
    Ports {
        #[command(flatten)]
        ports: PortArgs,
        /// Scan ports 1-100 instead of the common list.
        #[arg(long)]
        full: bool,
    },
    /// Grab service banners.
    Banners {
        #[command(flatten)]
        ports: PortArgs,
    },
    /// Discover directories and files under a base URL.
    Dirs {
        /// Base URL, e.g. http://example.com
        #[arg(long)]
        target: String,
        /// Wordlist file, one path per line.
        #[arg(long)]
        wordlist: Option<PathBuf>,
    },
    /// Try every username/password combination.
    Brute {
        /// Login URL.
        #[arg(long)]
        target: String,
        #[arg(long)]
        usernames: Option<PathBuf>,
        #[arg(long)]
        passwords: Option<PathBuf>,
    },
    /// Serve the HTTP control API.
    Serve {
        #[arg(long, default_value = "127.0.0.1:8080")]
        bind: String,
    },
}

#[derive(Debug, Clone, Args)]
struct PortArgs {
    /// Target IP or host name.
    #[arg(long)]
    target: String,
    /// Ports, e.g. "21,22,8000-8010".
    #[arg(long, conflicts_with = "ports_file")]
    ports: Option<String>,
    /// File with one port or range per line.
    #[arg(long = "ports-file")]
    ports_file: Option<PathBuf>,
}

impl PortArgs {
    fn resolve(&self, fallback: &[u16]) -> Result<Vec<ProbeInput>> {
        let ports = match (&self.ports, &self.ports_file) {
            (Some(list), _) => inputs::parse_ports_str(list)?,
            (None, Some(path)) => inputs::load_ports_from_path(path)?,
            (None, None) => fallback.to_vec(),
        };
        Ok(inputs::port_inputs(&ports))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "probe_engine=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli)?;

    let (kind, target, probe_inputs) = match &cli.command {
        Command::Serve { bind } => {
            let controller = Arc::new(SessionController::new(config));
            let shutdown = controller.clone();
            tokio::spawn(async move {
                let _ = tokio::signal::ctrl_c().await;
                shutdown.shutdown();
            });
            return server::spawn_server(bind, controller).await;
        }
        Command::Ports { ports, full } => {
            let fallback = if *full { tables::full_ports() } else { config.port.ports.clone() };
            (ProbeKind::Port, ports.target.clone(), ports.resolve(&fallback)?)
        }
        Command::Banners { ports } => (
            ProbeKind::Banner,
            ports.target.clone(),
            ports.resolve(&config.banner.ports)?,
        ),
        Command::Dirs { target, wordlist } => {
            let paths = match wordlist {
                Some(path) => inputs::load_wordlist_from_path(path)?,
                None => config.directory.wordlist.clone(),
            };
            (ProbeKind::Directory, target.clone(), inputs::path_inputs(&paths))
        }
        Command::Brute {
            target,
            usernames,
            passwords,
        } => {
            let users = match usernames {
                Some(path) => inputs::load_wordlist_from_path(path)?,
                None => config.credential.usernames.clone(),
            };
            let pws = match passwords {
                Some(path) => inputs::load_wordlist_from_path(path)?,
                None => config.credential.passwords.clone(),
            };
            (ProbeKind::Credential, target.clone(), inputs::credential_inputs(&users, &pws))
        }
    };

    let controller = Arc::new(SessionController::new(config));
    let strategy = controller.config().strategy(kind);
    let id = controller
        .start_scan(TargetDescriptor::new(target), probe_inputs, strategy)
        .await?;

    // Ctrl-C cancels the session; the log stream then ends on its own.
    let cancel_ctrlc = controller.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = cancel_ctrlc.cancel(id).await;
    });

    let mut log = Box::pin(controller.subscribe(id).await?);
    while let Some(entry) = log.next().await {
        println!("{entry}");
    }

    controller.wait(id).await?;
    let summary = controller.get_summary(id).await?;
    let view = controller.get_snapshot(id).await?;
    print_results_table(&view);
    println!(
        "\nState: {}  visited: {}/{}  succeeded: {}",
        summary.final_state, summary.visited_count, summary.total_inputs, summary.success_count
    );

    if let Some(path) = cli.output.as_deref() {
        match write_view_json(path, &view) {
            Ok(()) => println!("Wrote JSON results to {}", path.display()),
            Err(e) => eprintln!("Failed to write JSON to {}: {e:#}", path.display()),
        }
    }
    Ok(())
}

fn build_config(cli: &Cli) -> Result<EngineConfig> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    if let Some(ms) = cli.delay_ms {
        config.pacing = Some(Pacing::new(ms, cli.jitter_ms.unwrap_or(0)));
    }
    Ok(config)
}

fn print_results_table(view: &SessionView) {
    let idx_w = 3usize.max(view.results.len().to_string().len());
    let mut input_w = "input".len();
    for input in view.inputs.iter().take(view.results.len()) {
        input_w = input_w.max(input.to_string().chars().count().min(40));
    }

    println!("\nResults ({} of {} visited):", view.results.len(), view.inputs.len());
    println!(
        "{:>idx_w$}  {:<input_w$}  {:<6}  {}",
        "#",
        "input",
        "result",
        "detail",
        idx_w = idx_w,
        input_w = input_w
    );
    println!(
        "{:->idx_w$}  {:-<input_w$}  {:-<6}  {:-<6}",
        "",
        "",
        "",
        "",
        idx_w = idx_w,
        input_w = input_w
    );
    for (i, (input, outcome)) in view.inputs.iter().zip(&view.results).enumerate() {
        let shown: String = input.to_string().chars().take(40).collect();
        println!(
            "{:>idx_w$}  {:<input_w$}  {:<6}  {}",
            i,
            shown,
            if outcome.succeeded { "ok" } else { "-" },
            outcome.label,
            idx_w = idx_w,
            input_w = input_w
        );
    }
}

fn write_view_json(path: &Path, view: &SessionView) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    serde_json::to_writer_pretty(file, view)?;
    Ok(())
}
