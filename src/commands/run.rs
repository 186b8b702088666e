//! Mirroring session command

use crate::config::SyncConfig;
use crate::poller::run_remote_poller;
use crate::session::SessionContext;
use crate::transport::{self, Transport};
use crate::types::{Direction, SyncError};
use crate::ui::ProgressReporter;
use crate::watcher::run_local_watcher;
use console::style;
use std::fs;
use std::sync::Arc;
use tracing::{error, info};

/// Create the local folder when it is the mirror target
///
/// Returns `true` when the folder had to be created.
pub fn prepare_local_root(config: &SyncConfig) -> Result<bool, SyncError> {
    if config.direction != Direction::RemoteToLocal || config.local_root.is_dir() {
        return Ok(false);
    }
    fs::create_dir_all(&config.local_root).map_err(|source| SyncError::Local {
        path: config.local_root.clone(),
        source,
    })?;
    Ok(true)
}

/// Progress display for a session; nothing is drawn in quiet mode
pub fn reporter_for(config: &SyncConfig) -> ProgressReporter {
    if config.quiet {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::new()
    }
}

/// Run a session against the configured server until Ctrl-C
pub async fn run(config: SyncConfig, reporter: &ProgressReporter) -> Result<(), SyncError> {
    let session = Arc::new(SessionContext::new());

    let token = session.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping after the current operation");
            token.cancel();
        }
    });

    if !config.quiet {
        eprintln!("{}", format_summary(&config));
    }
    for line in summary_lines(&config) {
        info!("{}", line);
    }

    let transport = transport::create(&config.endpoint);
    run_with_transport(&config, transport, &session, reporter).await
}

/// Connect, run the loop for the configured direction, disconnect
pub async fn run_with_transport(
    config: &SyncConfig,
    transport: Arc<dyn Transport>,
    session: &SessionContext,
    reporter: &ProgressReporter,
) -> Result<(), SyncError> {
    transport.connect().await.map_err(|err| {
        error!("Could not connect to {}: {}", config.endpoint.address(), err);
        SyncError::Connection(err.to_string())
    })?;

    let result = match config.direction {
        Direction::RemoteToLocal => {
            run_remote_poller(Arc::clone(&transport), config, session, reporter).await
        }
        Direction::LocalToRemote => {
            run_local_watcher(Arc::clone(&transport), config, session, reporter).await
        }
    };

    transport.disconnect().await;
    reporter.finish();

    if let Err(err) = &result {
        error!("Session ended: {}", err);
    } else {
        info!("Session ended");
    }
    result
}

fn direction_label(direction: Direction) -> &'static str {
    match direction {
        Direction::RemoteToLocal => "remote -> local",
        Direction::LocalToRemote => "local -> remote",
    }
}

/// Plain settings lines (no secret)
fn summary_lines(config: &SyncConfig) -> Vec<String> {
    let mut lines = vec![
        format!(
            "Server: {} {}@{}",
            config.endpoint.kind.label(),
            config.endpoint.username,
            config.endpoint.address()
        ),
        format!("Remote folder: {}", config.remote_root),
        format!("Local folder: {}", config.local_root.display()),
        format!("Direction: {}", direction_label(config.direction)),
        format!("Base interval: {}s", config.base_interval.as_secs()),
    ];
    if !config.exclude.is_empty() {
        lines.push(format!("Excluded: {}", config.exclude.join(", ")));
    }
    lines
}

/// Styled startup summary for the terminal
fn format_summary(config: &SyncConfig) -> String {
    let mut out = vec![format!(
        "{} v{}",
        style("mirrorwatch").bold().cyan(),
        crate::VERSION
    )];
    out.extend(summary_lines(config).into_iter().map(|line| match line.split_once(": ") {
        Some((key, value)) => format!("  {} {}", style(format!("{}:", key)).dim(), value),
        None => format!("  {}", line),
    }));
    out.join("\n")
}

/// Hint shown next to a fatal error
pub fn suggestion(err: &SyncError) -> Option<&'static str> {
    match err {
        SyncError::Connection(_) => {
            Some("Check the host, port, and credentials, and that the server is reachable.")
        }
        SyncError::Config(_) => Some("Run `mirrorwatch run --help` for the available options."),
        SyncError::Local { .. } | SyncError::Io(_) => {
            Some("Check that the local folder exists and is writable.")
        }
        SyncError::Watch(_) => Some("The local folder could not be watched; check its permissions."),
        _ => None,
    }
}
