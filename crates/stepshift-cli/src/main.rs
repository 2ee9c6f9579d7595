use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use stepshift_rollout::RolloutError;

mod commands;

#[derive(Parser)]
#[command(
    name = "stepshift",
    about = "stepshift: gradual, alarm-gated rollouts of versioned aliases",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Directory holding the local registry database
    #[arg(long, global = true, default_value = ".stepshift")]
    data_dir: PathBuf,
    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Shift an alias to a new version of a resource.
    ///
    /// Strategies: allatonce (blue/green), canary, linear. Alarms are
    /// polled while traffic moves and the alias is rolled back to the
    /// previous version if any of them fires.
    Deploy(commands::deploy::DeployArgs),
    /// Upload a definition file as the latest revision of a resource
    Upload {
        #[arg(long)]
        resource: String,
        #[arg(long)]
        file: PathBuf,
    },
    /// Publish the latest revision of a resource as a new version
    Publish {
        #[arg(long)]
        resource: String,
    },
    /// List published versions of a resource, newest first
    Versions {
        #[arg(long)]
        resource: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Inspect aliases
    Alias {
        #[command(subcommand)]
        action: AliasAction,
    },
    /// Manage alarm conditions in the local registry
    Alarm {
        #[command(subcommand)]
        action: AlarmAction,
    },
}

#[derive(Subcommand)]
enum AliasAction {
    /// Print the routing configuration of an alias
    Show {
        #[arg(long)]
        resource: String,
        #[arg(long)]
        alias: String,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[derive(Subcommand)]
enum AlarmAction {
    /// Create or update an alarm (OK unless --firing)
    Set {
        name: String,
        /// Put the alarm in the ALARM state
        #[arg(long, conflicts_with = "ok")]
        firing: bool,
        /// Put the alarm in the OK state
        #[arg(long)]
        ok: bool,
    },
    /// Delete an alarm
    Delete { name: String },
    /// List alarms and their state
    List,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let data_dir = cli.data_dir;
    match cli.command {
        Commands::Deploy(args) => commands::deploy::deploy(&data_dir, args).await,
        Commands::Upload { resource, file } => {
            commands::registry::upload(&data_dir, &resource, &file).await
        }
        Commands::Publish { resource } => commands::registry::publish(&data_dir, &resource),
        Commands::Versions { resource, format } => {
            commands::registry::versions(&data_dir, &resource, &format)
        }
        Commands::Alias { action } => match action {
            AliasAction::Show {
                resource,
                alias,
                format,
            } => commands::registry::show_alias(&data_dir, &resource, &alias, &format),
        },
        Commands::Alarm { action } => match action {
            AlarmAction::Set { name, firing, .. } => commands::alarm::set(&data_dir, &name, firing),
            AlarmAction::Delete { name } => commands::alarm::delete(&data_dir, &name),
            AlarmAction::List => commands::alarm::list(&data_dir),
        },
    }
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// 2 when traffic was rolled back, 130 when interrupted, 1 otherwise.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<RolloutError>() {
        Some(RolloutError::RolledBack { .. }) => 2,
        Some(
            RolloutError::Cancelled { .. }
            | RolloutError::Interrupted { .. }
            | RolloutError::Aborted { .. },
        ) => 130,
        _ => 1,
    }
}
