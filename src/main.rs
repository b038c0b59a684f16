use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use pim::paths::{PathResolver, ResourceKind};
use pim::{InterfaceId, PluginManager, PluginSummary};

/// pim - Load plugin configurations and inspect what they provide
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load configuration files, report the plugins and extensions, then unload
    Check {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,

        /// Fail if extensions are still held when the manager shuts down
        #[arg(long)]
        strict: bool,

        /// Plugin configuration files
        #[arg(required = true)]
        configs: Vec<String>,
    },

    /// Print the path a configuration or plugin name resolves to
    Resolve {
        #[arg(short, long, value_enum, default_value_t = Kind::Plugin)]
        kind: Kind,

        name: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Kind {
    Plugin,
    Config,
}

impl From<Kind> for ResourceKind {
    fn from(kind: Kind) -> Self {
        match kind {
            Kind::Plugin => ResourceKind::Plugin,
            Kind::Config => ResourceKind::Config,
        }
    }
}

#[derive(Serialize)]
struct InterfaceReport {
    interface: InterfaceId,
    extensions: usize,
    providers: Vec<String>,
}

#[derive(Serialize)]
struct CheckReport {
    plugins: Vec<PluginSummary>,
    interfaces: Vec<InterfaceReport>,
}

impl CheckReport {
    fn from_manager(manager: &PluginManager) -> Self {
        let interfaces = manager
            .registry()
            .iter()
            .map(|(interface, handles)| InterfaceReport {
                interface: interface.clone(),
                extensions: handles.len(),
                providers: handles.iter().map(|h| h.plugin_name().to_string()).collect(),
            })
            .collect();

        Self {
            plugins: manager.plugins(),
            interfaces,
        }
    }

    fn print_text(&self) {
        println!("Plugins ({}):", self.plugins.len());
        for plugin in &self.plugins {
            println!(
                "  {} -> {} ({} extensions)",
                plugin.name,
                plugin.path.display(),
                plugin.extensions
            );
        }

        println!("Interfaces ({}):", self.interfaces.len());
        for interface in &self.interfaces {
            println!(
                "  {}: {} [{}]",
                interface.interface,
                interface.extensions,
                interface.providers.join(", ")
            );
        }
    }
}

fn check(configs: Vec<String>, json: bool, strict: bool) -> Result<()> {
    let manager = PluginManager::load(configs).context("Failed to load plugin configuration")?;
    if strict {
        manager.fail_hard_at_shutdown_if_cached_plugins_remain();
    }

    let report = CheckReport::from_manager(&manager);
    if json {
        let rendered =
            serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{rendered}");
    } else {
        report.print_text();
    }

    drop(manager);
    Ok(())
}

fn resolve(kind: Kind, name: &str) -> Result<()> {
    let path = PathResolver::new()
        .resolve(name, kind.into())
        .with_context(|| format!("Failed to resolve {name}"))?;
    println!("{}", path.display());
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so reports on stdout stay machine readable
    let log_level = if args.debug {
        Level::DEBUG
    } else {
        Level::INFO
    };

    // RUST_LOG overrides the level picked by --debug
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_ascii_lowercase()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")?;

    match args.command {
        Command::Check {
            json,
            strict,
            configs,
        } => check(configs, json, strict),
        Command::Resolve { kind, name } => resolve(kind, &name),
    }
}
