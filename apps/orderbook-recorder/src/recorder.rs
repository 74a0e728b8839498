//! Recorder Wiring
//!
//! Starts the log writer, the reference price synchronizer, the optional
//! health server and one market channel session, and tears them down in
//! order: session drain, sink release, writer flush.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::ports::{Clock, ReferencePricePort};
use crate::application::services::ReferencePriceSynchronizer;
use crate::domain::reference::ReferenceState;
use crate::infrastructure::config::RecorderConfig;
use crate::infrastructure::health::{HealthServer, HealthServerState};
use crate::infrastructure::storage::{EventLogWriter, PersistenceError, WriterStats};
use crate::infrastructure::venue::{
    ConnectionError, MessageDispatcher, Session, SessionState, SessionSummary,
};

/// Fatal recorder failure.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The market channel session failed.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The log writer failed.
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The log writer did not finish flushing in time.
    #[error("log writer did not finish within {0:?}")]
    WriterTimeout(Duration),

    /// A background task panicked.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// What a clean run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderSummary {
    /// Session counters (`None` if shutdown arrived before the session opened).
    pub session: Option<SessionSummary>,
    /// Records written per kind.
    pub writer: WriterStats,
}

/// Record until `cancel` fires or a fatal error occurs.
///
/// # Errors
///
/// Returns the first fatal error. A persistence failure takes precedence
/// over the session error it causes.
pub async fn run(
    config: &RecorderConfig,
    source: Arc<dyn ReferencePricePort>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> Result<RecorderSummary, RecorderError> {
    let run_cancel = cancel.child_token();
    let reference = ReferenceState::new();

    let (writer, sink) =
        EventLogWriter::channel(&config.storage.data_dir, config.storage.buffer_capacity);
    let writer_cancel = run_cancel.clone();
    let writer_handle = tokio::spawn(async move {
        let result = writer.run().await;
        if result.is_err() {
            writer_cancel.cancel();
        }
        result
    });

    let synchronizer = ReferencePriceSynchronizer::new(
        source,
        reference.clone(),
        Arc::clone(&clock),
        config.synchronizer_config(),
    );
    let sync_handle = tokio::spawn(synchronizer.run(run_cancel.clone()));

    let session_config = config.session_config();
    let status = session_config.status.clone();

    let health_handle = (config.server.health_port != 0).then(|| {
        let state = Arc::new(HealthServerState::new(
            env!("CARGO_PKG_VERSION").to_string(),
            status.clone(),
            reference.clone(),
            Arc::clone(&clock),
            config.reference.max_age,
        ));
        let server = HealthServer::new(config.server.health_port, state, run_cancel.clone());
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!(error = %e, "Health server error");
            }
        })
    });

    let dispatcher = MessageDispatcher::new(
        reference,
        sink,
        config.storage.toggles,
        config.reference.max_age,
        clock,
    );

    // A shutdown during the handshake still lets it finish within the grace
    // period so the peer gets a close frame.
    let grace = config.venue.shutdown_grace;
    let open = Session::open(session_config, config.venue.targets.clone());
    tokio::pin!(open);
    let opened = tokio::select! {
        result = &mut open => Some(result),
        () = run_cancel.cancelled() => tokio::time::timeout(grace, &mut open).await.ok(),
    };

    let session_result = match opened {
        Some(Ok(session)) => session.run(dispatcher, run_cancel.clone()).await.map(Some),
        Some(Err(e)) => {
            drop(dispatcher);
            Err(e)
        }
        None => {
            drop(dispatcher);
            status.set(SessionState::Closed);
            tracing::warn!("Session did not open before shutdown completed");
            Ok(None)
        }
    };

    run_cancel.cancel();

    let writer_result = match tokio::time::timeout(grace, writer_handle).await {
        Ok(joined) => joined?,
        Err(_) => {
            tracing::error!(grace_ms = grace.as_millis(), "Log writer did not finish in time");
            return Err(RecorderError::WriterTimeout(grace));
        }
    };

    sync_handle.await?;
    if let Some(handle) = health_handle {
        handle.await?;
    }

    let writer_stats = writer_result?;
    let session = session_result?;

    tracing::info!(
        records = writer_stats.total_records(),
        bytes = writer_stats.total_bytes(),
        "Recorder stopped"
    );

    Ok(RecorderSummary {
        session,
        writer: writer_stats,
    })
}
