// cc: multi-turn Claude Code sessions from the command line.
//
// One-shot verbs print exactly one JSON record on stdout and exit 1 when it
// carries an error. `cc serve` keeps processes alive across many requests.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use claude_code_session::cli::Cli;
use claude_code_session::{
    ClaudeProcessController, FileStore, Record, SessionError, SessionManager, SessionRegistry,
};

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .target(env_logger::Target::Stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.config;

    let manager = match build_manager(&config) {
        Ok(manager) => Arc::new(manager),
        Err(e) => {
            log::error!("Failed to open session store: {e}");
            println!("{}", Record::from_error(None, &e).to_json());
            std::process::exit(1);
        }
    };

    let Some(request) = cli.command.into_request() else {
        let shutdown = CancellationToken::new();
        let on_signal = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                on_signal.cancel();
            }
        });

        claude_code_session::serve::serve(
            manager,
            tokio::io::stdin(),
            tokio::io::stdout(),
            shutdown,
        )
        .await?;
        return Ok(());
    };

    let record = manager.dispatch(request, &CancellationToken::new()).await;
    manager.detach_all().await;

    println!("{}", record.to_json());
    if record.is_error() {
        std::process::exit(1);
    }
    Ok(())
}

fn build_manager(
    config: &claude_code_session::cli::Config,
) -> Result<SessionManager<ClaudeProcessController>, SessionError> {
    let store = FileStore::open(config.sessions_dir()?)?;
    log::debug!("Using session store at {}", store.dir().display());

    Ok(SessionManager::new(
        SessionRegistry::new(store),
        ClaudeProcessController::new(config.controller_options()),
        config.manager_options(),
    ))
}
