//! Sandbox Launchpad CLI
//!
//! Boots a local sandbox, mounts a project, installs dependencies and runs the
//! development server, streaming the terminal transcript to stdout.

use std::io::Write;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use launchpad::config::CONFIG_ENV;
use launchpad::{
    AttemptOutcome, JsonFileProvider, LaunchpadConfig, LocalRuntime, Orchestrator,
    TemplateProvider, TerminalEvent, TerminalSink, TreeProvider, Validate,
};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().skip(1).any(|a| a == "-h" || a == "--help") || args.len() > 2 {
        eprintln!("Usage: {} [tree.json]", args[0]);
        eprintln!("\nBoots a sandbox, installs dependencies and starts the dev server.");
        eprintln!("Without a tree document the built-in Vite + React starter is used.");
        eprintln!("\nEnvironment variables:");
        eprintln!("  {}=<path>  TOML configuration file", CONFIG_ENV);
        std::process::exit(if args.len() > 2 { 1 } else { 0 });
    }

    let mut config = match std::env::var(CONFIG_ENV) {
        Ok(path) => match LaunchpadConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        },
        Err(_) => LaunchpadConfig::default(),
    };
    if let Some(tree_path) = args.get(1) {
        config = config.with_tree_path(tree_path);
    }

    match config.validate().into_result() {
        Ok(warnings) => {
            for warning in warnings {
                tracing::warn!(%warning, "configuration warning");
            }
        }
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    let provider: Box<dyn TreeProvider> = match &config.tree_path {
        Some(path) => {
            tracing::info!(path = ?path, "using tree document");
            Box::new(JsonFileProvider::new(path))
        }
        None => {
            tracing::info!("using built-in starter project");
            Box::new(TemplateProvider::new())
        }
    };

    let terminal = Arc::new(TerminalSink::with_event_capacity(config.terminal_capacity));
    let printer = spawn_printer(&terminal);
    terminal.attach();

    let orchestrator = Orchestrator::new(
        LocalRuntime::new(&config.base_dir),
        provider,
        Arc::clone(&terminal),
    );

    if orchestrator.boot().await.is_err() {
        std::process::exit(1);
    }

    let started = tokio::select! {
        started = orchestrator.start() => Some(started),
        _ = tokio::signal::ctrl_c() => None,
    };
    let exit_code = match started {
        Some(Ok(AttemptOutcome::Launched { .. })) => wait_for_server(&orchestrator).await,
        Some(Ok(AttemptOutcome::Failed { .. })) => 1,
        Some(Err(e)) => {
            eprintln!("{}", e);
            1
        }
        None => {
            tracing::info!("interrupted before the server started");
            130
        }
    };

    orchestrator.shutdown().await;
    if let Err(e) = LocalRuntime::release().await {
        tracing::warn!(error = %e, "failed to remove sandbox directory");
    }

    // Closing the sink lets the printer drain buffered lines and finish.
    drop(orchestrator);
    drop(terminal);
    let _ = printer.await;

    std::process::exit(exit_code);
}

/// Waits for readiness, then serves until Ctrl-C.
async fn wait_for_server(orchestrator: &Orchestrator<LocalRuntime>) -> i32 {
    tokio::select! {
        settled = orchestrator.wait_until_settled() => {
            match settled {
                Ok(status) if status.server_ready => {}
                Ok(_) => return 1,
                Err(e) => {
                    eprintln!("{}", e);
                    return 1;
                }
            }
        }
        _ = tokio::signal::ctrl_c() => return 130,
    }

    if let Some(endpoint) = orchestrator.preview().borrow().clone() {
        println!("\nPreview: {}  (Ctrl-C to stop)", endpoint.url);
    }

    let _ = tokio::signal::ctrl_c().await;
    0
}

/// Prints rendered terminal lines to stdout as they arrive.
fn spawn_printer(terminal: &TerminalSink) -> tokio::task::JoinHandle<()> {
    let mut events = terminal.subscribe();

    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(TerminalEvent::Line(line)) => {
                    let mut stdout = std::io::stdout().lock();
                    let _ = stdout.write_all(line.render().as_bytes());
                    let _ = stdout.flush();
                }
                Ok(TerminalEvent::Cleared) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "terminal printer lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
