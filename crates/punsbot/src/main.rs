//! punsbot - console front-end for the response engine.
//!
//! Reads `chat_id<TAB>text` lines from stdin and writes replies to stdout.
//! Logs go to stderr.

mod console;

use std::io::Stdout;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use punsbot_core::{
    InboundMessage, PunEngine, PunsConfig, SqliteChatConfigStore, SqliteRuleStore,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use console::ConsoleTransport;

type Engine = PunEngine<SqliteRuleStore, SqliteChatConfigStore>;
type Console = ConsoleTransport<Stdout>;

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Config from `PUNSBOT_CONFIG` if set, with environment overrides on top.
fn load_config() -> anyhow::Result<PunsConfig> {
    match std::env::var_os("PUNSBOT_CONFIG") {
        Some(path) => {
            let path = PathBuf::from(path);
            let config = PunsConfig::from_file(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?;
            Ok(config.merge_env()?)
        }
        None => Ok(PunsConfig::from_env()?),
    }
}

/// Handle messages routed to this worker in arrival order.
async fn chat_worker(
    mut rx: mpsc::UnboundedReceiver<InboundMessage>,
    engine: Arc<Engine>,
    transport: Arc<Console>,
) {
    while let Some(message) = rx.recv().await {
        let chat_id = message.chat_id;
        let engine = engine.clone();
        let transport = transport.clone();

        match tokio::task::spawn_blocking(move || engine.dispatch(&message, transport.as_ref()))
            .await
        {
            Ok(Some(reply)) => debug!(chat_id, kind = ?reply.kind, "Replied"),
            Ok(None) => {}
            Err(e) => warn!(chat_id, error = %e, "Message handler panicked"),
        }
    }
}

/// Read stdin until EOF, routing each chat to one of a fixed set of workers.
///
/// A chat always lands on the same worker, so its messages stay ordered.
async fn serve(engine: Arc<Engine>, transport: Arc<Console>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut workers = JoinSet::new();
    let senders: Vec<mpsc::UnboundedSender<InboundMessage>> = (0..console::worker_count())
        .map(|_| {
            let (tx, rx) = mpsc::unbounded_channel();
            workers.spawn(chat_worker(rx, engine.clone(), transport.clone()));
            tx
        })
        .collect();
    debug!(workers = senders.len(), "Started chat workers");
    let mut line_number = 0usize;

    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        if line.trim().is_empty() {
            continue;
        }

        let Some(message) = console::parse_line(&line) else {
            warn!(line_number, "Ignoring input line, expected chat_id<TAB>text");
            continue;
        };

        let sender = &senders[console::worker_for(message.chat_id, senders.len())];
        if let Err(e) = sender.send(message) {
            warn!(chat_id = e.0.chat_id, "Chat worker gone, dropping message");
        }
    }

    // Closing the channels lets each worker drain and exit.
    drop(senders);
    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "Chat worker failed");
        }
    }

    info!(lines = line_number, "Input closed");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing; stdout carries replies, so logs go to stderr
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_ansi(false))
        .with(
            EnvFilter::from_default_env()
                .add_directive(Level::INFO.into())
                .add_directive("punsbot=debug".parse()?)
                .add_directive("punsbot_core=debug".parse()?),
        )
        .init();

    let config = load_config()?;
    info!(
        db_path = %config.db_path.display(),
        seed = ?config.seed_corpus_path,
        "Starting punsbot {}",
        env!("CARGO_PKG_VERSION")
    );

    // Seeding finishes here, before the first input line is read.
    let bootstrap_config = config.clone();
    let (engine, report) =
        tokio::task::spawn_blocking(move || PunEngine::bootstrap(&bootstrap_config))
            .await?
            .context("failed to open stores")?;

    if let Some(report) = report {
        info!(
            inserted = report.inserted,
            existing = report.existing,
            skipped = report.skipped.len(),
            "Seeding complete"
        );
    }

    let engine = Arc::new(engine);
    let transport = Arc::new(ConsoleTransport::stdout());

    tokio::select! {
        result = serve(engine, transport) => result?,
        _ = shutdown_signal() => info!("Shutdown signal received"),
    }

    info!("punsbot stopped");
    Ok(())
}
