use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "tis")]
#[command(about = "Threat indicator sync: MISP feed -> Graph tiIndicators", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile a feed file against the remote indicator store.
    Sync {
        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,

        /// Feed file: JSON Lines or a JSON array of indicator objects
        #[arg(long)]
        feed: PathBuf,

        /// Refuse to run when the config has keys the sync does not read
        #[arg(long, default_value_t = false)]
        strict_config: bool,
    },

    /// Remote indicator store utilities
    Remote {
        #[command(subcommand)]
        cmd: RemoteCmd,
    },

    /// Local state utilities
    State {
        #[command(subcommand)]
        cmd: StateCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Audit trail utilities
    Audit {
        #[command(subcommand)]
        cmd: AuditCmd,
    },
}

#[derive(Subcommand)]
enum RemoteCmd {
    /// Print the remote indicator collection as JSON.
    List {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum StateCmd {
    /// Print the expiration date and known indicator count. Read-only.
    Show {
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum AuditCmd {
    /// Verify the hash chain of an audit JSONL file.
    Verify {
        #[arg(long)]
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Sync {
            config_paths,
            feed,
            strict_config,
        } => commands::sync::run(&config_paths, &feed, strict_config)?,

        Commands::Remote { cmd } => match cmd {
            RemoteCmd::List { config_paths } => commands::remote::list(&config_paths)?,
        },

        Commands::State { cmd } => match cmd {
            StateCmd::Show { config_paths } => commands::state::show(&config_paths)?,
        },

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = tis_config::load_layered_yaml(&path_refs)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Audit { cmd } => match cmd {
            AuditCmd::Verify { path } => commands::audit_verify(&path)?,
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays `key=value` output.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
}
