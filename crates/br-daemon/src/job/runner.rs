//! One run of the pipeline
//!
//! Opens both sessions, wires source stdout through a [`StreamRelay`] into
//! destination stdin, and waits for both commands. Sessions are closed on
//! every return path; on unwind they are released by drop.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use br_core::config::{AppConfig, EndpointConfig};
use br_core::traits::{RemoteSession, SessionFactory};
use br_core::{LogSink, RunError};
use br_relay::{RelayStats, StreamRelay};

/// Execute the pipeline once
pub(crate) async fn run_pipeline(
    factory: Arc<dyn SessionFactory>,
    config: Arc<AppConfig>,
    cancel: CancellationToken,
) -> Result<RelayStats, RunError> {
    let mut source = open(factory.as_ref(), &config.source, &cancel).await?;
    let mut destination = match open(factory.as_ref(), &config.destination, &cancel).await {
        Ok(session) => session,
        Err(e) => {
            source.close().await;
            return Err(e);
        }
    };

    let result = transfer(source.as_mut(), destination.as_mut(), &config, &cancel).await;

    destination.close().await;
    source.close().await;
    result
}

async fn open(
    factory: &dyn SessionFactory,
    endpoint: &EndpointConfig,
    cancel: &CancellationToken,
) -> Result<Box<dyn RemoteSession>, RunError> {
    tracing::info!("Opening session to {}", endpoint.label());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled),
        session = factory.open(endpoint) => session,
    }
}

async fn start(
    session: &mut dyn RemoteSession,
    command: &str,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    tracing::info!("Starting command on {}", session.host());
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled),
        started = session.start(command) => started,
    }
}

async fn wait_for_exit(
    session: &mut dyn RemoteSession,
    cancel: &CancellationToken,
) -> Result<(), RunError> {
    let host = session.host().to_string();
    let exit = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(RunError::Cancelled),
        exit = session.wait() => exit,
    };
    if exit.is_ok() {
        tracing::info!("Command on {} completed", host);
    }
    exit
}

/// Wait for `session` to exit; a failed exit tears down the rest of the transfer
async fn exit_or_abort(
    session: &mut dyn RemoteSession,
    abort: &CancellationToken,
) -> Result<(), RunError> {
    let exit = wait_for_exit(session, abort).await;
    if exit.is_err() {
        abort.cancel();
    }
    exit
}

async fn transfer(
    source: &mut dyn RemoteSession,
    destination: &mut dyn RemoteSession,
    config: &AppConfig,
    cancel: &CancellationToken,
) -> Result<RelayStats, RunError> {
    let upstream = source.output_stream()?;
    let downstream = destination.input_stream()?;
    source.set_error_sink(Box::new(LogSink::new("source stderr")));
    destination.set_output_sink(Box::new(LogSink::new("destination stdout")));
    destination.set_error_sink(Box::new(LogSink::new("destination stderr")));

    // Destination first: it must be accepting input before the source produces
    start(destination, &config.destination.command, cancel).await?;
    start(source, &config.source.command, cancel).await?;

    // Any failure below tears down the whole transfer, not just one side
    let abort = cancel.child_token();
    let relay = StreamRelay::with_read_chunk(config.relay.threshold_bytes, config.relay.read_chunk_bytes)
        .with_cancel(abort.clone());
    tracing::debug!("Relaying with a {} byte threshold", relay.threshold());

    let (relayed, source_exit, destination_exit) = tokio::join!(
        async {
            let relayed = relay.run(upstream, downstream).await;
            if relayed.is_err() {
                abort.cancel();
            }
            relayed
        },
        exit_or_abort(source, &abort),
        exit_or_abort(destination, &abort),
    );

    let mut failures = Vec::new();
    let stats = match relayed {
        Ok(stats) => Some(stats),
        Err(e) => {
            failures.push(RunError::from(e));
            None
        }
    };
    failures.extend(source_exit.err());
    failures.extend(destination_exit.err());

    match (stats, primary_failure(failures)) {
        (_, Some(failure)) => Err(failure),
        (Some(stats), None) => Ok(stats),
        (None, None) => Err(RunError::Internal("relay finished without a result".to_string())),
    }
}

/// Pick the failure to report: the first one that is not merely a
/// consequence of cancellation.
fn primary_failure(failures: Vec<RunError>) -> Option<RunError> {
    let mut primary: Option<RunError> = None;
    for failure in failures {
        match &primary {
            None => primary = Some(failure),
            Some(current) if current.is_cancelled() && !failure.is_cancelled() => {
                tracing::debug!("Superseded by {}: {}", failure.kind(), current);
                primary = Some(failure);
            }
            Some(_) => tracing::warn!("Additional failure during run: {}", failure),
        }
    }
    primary
}
