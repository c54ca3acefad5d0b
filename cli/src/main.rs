//! kubeforward CLI - Run Kubernetes port forwards side by side
//!
//! An interactive TUI with one row per forward, plus one-shot commands for
//! listing namespaces and resources and for forwarding from scripts.

mod commands;
mod logging;
mod tui;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use kubeforward_core::{ForwardEngine, ResourceKind, SettingsStore};
use tokio::runtime::Builder;

#[derive(Parser)]
#[command(name = "kubeforward")]
#[command(author, version, about = "Run Kubernetes port forwards side by side")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// kubeconfig file to use instead of kubectl's default lookup
    #[arg(long, global = true, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Disable interactive TUI mode
    #[arg(long, global = true)]
    no_tui: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List namespaces
    #[command(alias = "ns")]
    Namespaces,

    /// List forwardable resources in a namespace
    #[command(alias = "ls")]
    Resources {
        /// Namespace to list
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Resource kind: pods, deployments, replicasets or services
        #[arg(short, long, default_value = "pods")]
        kind: ResourceKind,
    },

    /// Forward one or more targets until interrupted
    #[command(alias = "fwd")]
    Forward {
        /// Namespace of the targets
        #[arg(short, long, default_value = "default")]
        namespace: String,

        /// Targets as kind/name:local:remote (or kind/name:port)
        #[arg(required = true, value_name = "TARGET")]
        targets: Vec<String>,
    },

    /// Show current configuration
    Config,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let runtime = Builder::new_multi_thread()
        .thread_name("kubeforward-worker")
        .enable_all()
        .build()?;
    let store = SettingsStore::new()?;
    let mut settings = runtime.block_on(store.load())?;
    if let Some(path) = cli.kubeconfig {
        settings.kubeconfig = Some(path);
    }

    let interactive = cli.command.is_none() && !cli.no_tui && atty::is(atty::Stream::Stdout);
    logging::init(&settings.log_filter, interactive)?;

    // Needs no cluster access, so it works without kubectl
    if let Some(Commands::Config) = cli.command {
        return commands::config::show(&store, &settings, cli.json);
    }

    let (engine, subscriber) = ForwardEngine::with_runtime(runtime, settings)?;

    let result = match cli.command {
        None if interactive => tui::run(&engine, subscriber),
        None | Some(Commands::Namespaces) => commands::namespaces::run(&engine, cli.json),
        Some(Commands::Resources { namespace, kind }) => {
            commands::resources::run(&engine, &namespace, kind, cli.json)
        }
        Some(Commands::Forward { namespace, targets }) => {
            commands::forward::run(&engine, subscriber, &namespace, &targets, cli.json)
        }
        Some(Commands::Config) => commands::config::show(&store, engine.settings(), cli.json),
    };

    engine.shutdown();
    result
}
