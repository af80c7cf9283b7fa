use anyhow::Result;
use clap::{Parser, Subcommand};
use oasis::auth::KeyScope;
use oasis::config::OasisConfig;
use tracing::info;

#[derive(Parser)]
#[command(
    name = "oasis",
    about = "Oasis — self-hosted update distribution and telemetry backend",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// HTTP listen port
    #[arg(long, env = "OASIS_PORT")]
    port: Option<u16>,

    /// Data directory for the SQLite database and config.toml
    #[arg(long, env = "OASIS_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "OASIS_LOG")]
    log: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "OASIS_LOG_FILE")]
    log_file: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Start the API server (default when no subcommand given).
    Serve,
    /// Manage bearer keys from the command line.
    ///
    /// The admin API itself requires a bearer key, so the first admin key
    /// must be minted here:
    ///
    ///   oasis key create --name bootstrap
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Subcommand)]
enum KeyAction {
    /// Mint a bearer key and print the plaintext (shown exactly once).
    Create {
        /// Human-readable key name, e.g. "bootstrap" or "gh-actions".
        #[arg(long)]
        name: String,

        /// Key scope: "admin" (global) or "ci" (single app).
        #[arg(long, default_value = "admin")]
        scope: String,

        /// App slug to bind a ci key to.
        #[arg(long)]
        app: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = OasisConfig::new(args.port, args.data_dir, args.log);

    let _log_guard = init_logging(&config.log, args.log_file.as_deref());

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Key { action } => match action {
            KeyAction::Create { name, scope, app } => create_key(config, &name, &scope, app).await,
        },
    }
}

async fn serve(config: OasisConfig) -> Result<()> {
    info!(
        data_dir = %config.data_dir.display(),
        port = config.port,
        "starting oasis"
    );
    let ctx = oasis::build_context(config).await?;
    oasis::rest::serve(ctx).await
}

async fn create_key(
    config: OasisConfig,
    name: &str,
    scope: &str,
    app_slug: Option<String>,
) -> Result<()> {
    let ctx = oasis::build_context(config).await?;

    let scope = KeyScope::parse(scope).map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let app_id = match (&scope, app_slug) {
        (KeyScope::Ci, Some(slug)) => Some(
            ctx.apps
                .require_by_slug(&slug)
                .await
                .map_err(|e| anyhow::anyhow!(e.to_string()))?
                .id,
        ),
        (KeyScope::Ci, None) => anyhow::bail!("--app <slug> is required for ci keys"),
        (KeyScope::Admin, Some(_)) => anyhow::bail!("--app is only valid for ci keys"),
        (KeyScope::Admin, None) => None,
    };

    let (plaintext, row) = ctx
        .keys
        .create_bearer_key(name, scope, app_id.as_deref())
        .await
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;

    println!("created {} key '{}' ({})", row.scope, row.name, row.id);
    println!();
    println!("  {plaintext}");
    println!();
    println!("Store it now — the plaintext is not recoverable.");
    Ok(())
}

/// Stdout logging, optionally teeing into a daily-rotated file.
/// The returned guard must stay alive for the file writer to flush.
fn init_logging(
    log: &str,
    log_file: Option<&std::path::Path>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_new(log).unwrap_or_else(|_| EnvFilter::new("info"));

    match log_file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
            let file = path
                .file_name()
                .map(|f| f.to_string_lossy().into_owned())
                .unwrap_or_else(|| "oasis.log".to_string());
            let appender = tracing_appender::rolling::daily(dir, file);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}
