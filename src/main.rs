use callsign::app::App;
use callsign::bridge::Host;
use callsign::services::logger::{LogLevel, Logger};
use callsign::utils::paths::StatePaths;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

/// Host process for the callsign OpenAPI client. Speaks newline-delimited
/// JSON on stdin/stdout; logs go to stderr.
#[derive(Debug, Parser)]
#[command(name = "callsign", version)]
struct Args {
    /// Directory holding state documents, secrets and the encryption key.
    #[arg(long, env = "CALLSIGN_STATE_DIR")]
    state_dir: Option<PathBuf>,

    /// error, warn, info or debug.
    #[arg(long)]
    log_level: Option<String>,

    /// Working directory for code generators.
    #[arg(long)]
    workspace_root: Option<PathBuf>,
}

async fn run(args: Args) -> Result<(), callsign::errors::CommandError> {
    let mut logger = Logger::new("callsign");
    if let Some(level) = args.log_level.as_deref().and_then(LogLevel::parse) {
        logger = logger.with_level(level);
    }
    let paths = match args.state_dir {
        Some(dir) => StatePaths::in_dir(dir),
        None => StatePaths::from_env(),
    };
    let workspace_root = match args.workspace_root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let app = Arc::new(App::initialize(logger, &paths, workspace_root)?);
    Host::new(app).run_stdio().await
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Args::parse()).await {
        eprintln!("callsign: {}", err.to_reply_text());
        std::process::exit(1);
    }
}
