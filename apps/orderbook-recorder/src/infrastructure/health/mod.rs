//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, session status reporting, and Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Liveness probe (simple OK)
//! - `GET /readyz` - Readiness probe (ready while the session is subscribed)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::ports::Clock;
use crate::domain::reference::{Direction, ReferenceState};
use crate::infrastructure::metrics::get_metrics_handle;
use crate::infrastructure::venue::{SessionState, SessionStatus};

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Recorder version.
    pub version: String,
    /// Process uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Market channel session state.
    pub session: String,
    /// Reference price view.
    pub reference: ReferenceStatus,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Subscribed with a fresh reference pair.
    Healthy,
    /// Subscribed, but snapshots are being written without fresh enrichment.
    Degraded,
    /// Not subscribed.
    Unhealthy,
}

/// Reference price fields as last published.
#[derive(Debug, Clone, Serialize)]
pub struct ReferenceStatus {
    /// Latest real-time value.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub current: Option<Decimal>,
    /// When `current` was observed.
    pub observed_at: Option<DateTime<Utc>>,
    /// Open of the latest fetched period.
    #[serde(with = "rust_decimal::serde::str_option")]
    pub period_open: Option<Decimal>,
    /// Start of that period.
    pub period_start: Option<DateTime<Utc>>,
    /// Direction of the running period.
    pub direction: Option<Direction>,
    /// Whether the pair is complete and `current` is within the age limit.
    pub fresh: bool,
    /// Why the pair is not fresh.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unavailable: Option<String>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    session: SessionStatus,
    reference: ReferenceState,
    clock: Arc<dyn Clock>,
    max_age: Duration,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(
        version: String,
        session: SessionStatus,
        reference: ReferenceState,
        clock: Arc<dyn Clock>,
        max_age: Duration,
    ) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            session,
            reference,
            clock,
            max_age,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
#[derive(Debug)]
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Bind the configured port and serve until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if the HTTP server fails.
    pub async fn serve(self, listener: TcpListener) -> Result<(), HealthServerError> {
        let app = Router::new()
            .route("/health", get(health_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(self.state);

        if let Ok(addr) = listener.local_addr() {
            tracing::info!(%addr, "Health server listening");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.session.get() == SessionState::Subscribed {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let now = state.clock.now();
    let snapshot = state.reference.snapshot();
    let freshness = snapshot.freshness(now, state.max_age);

    let reference = ReferenceStatus {
        current: snapshot.current.as_ref().map(|c| c.value),
        observed_at: snapshot.current.as_ref().map(|c| c.observed_at),
        period_open: snapshot.period_open.as_ref().map(|o| o.value),
        period_start: snapshot.period_open.as_ref().map(|o| o.period_start),
        direction: snapshot.direction(),
        fresh: freshness.is_ok(),
        unavailable: freshness.err().map(|e| e.to_string()),
    };

    let session = state.session.get();

    HealthResponse {
        status: determine_health_status(session, reference.fresh),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: now,
        session: session.as_str().to_string(),
        reference,
    }
}

const fn determine_health_status(session: SessionState, reference_fresh: bool) -> HealthStatus {
    match (session, reference_fresh) {
        (SessionState::Subscribed, true) => HealthStatus::Healthy,
        (SessionState::Subscribed, false) => HealthStatus::Degraded,
        _ => HealthStatus::Unhealthy,
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::domain::reference::{PeriodOpen, ReferencePrice};

    #[derive(Debug)]
    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, h, m, s).unwrap()
    }

    fn state_at(now: DateTime<Utc>) -> (Arc<HealthServerState>, SessionStatus, ReferenceState) {
        let session = SessionStatus::new();
        let reference = ReferenceState::new();
        let state = Arc::new(HealthServerState::new(
            "test".to_string(),
            session.clone(),
            reference.clone(),
            Arc::new(FixedClock(now)),
            Duration::from_secs(10),
        ));
        (state, session, reference)
    }

    async fn spawn(state: Arc<HealthServerState>) -> (SocketAddr, CancellationToken) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let cancel = CancellationToken::new();
        let server = HealthServer::new(0, state, cancel.clone());
        tokio::spawn(server.serve(listener));
        (addr, cancel)
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn status_follows_session_and_reference() {
        assert_eq!(
            determine_health_status(SessionState::Subscribed, true),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(SessionState::Subscribed, false),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(SessionState::Connecting, true),
            HealthStatus::Unhealthy
        );
        assert_eq!(
            determine_health_status(SessionState::Closing, true),
            HealthStatus::Unhealthy
        );
    }

    #[test]
    fn response_reports_reference_pair() {
        let (state, session, reference) = state_at(at(10, 30, 0));
        session.set(SessionState::Subscribed);
        reference.publish_current(ReferencePrice {
            value: Decimal::new(101, 0),
            observed_at: at(10, 29, 55),
        });
        reference.publish_period_open(PeriodOpen {
            value: Decimal::new(100, 0),
            period_start: at(10, 0, 0),
        });

        let response = build_health_response(&state);
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.session, "subscribed");
        assert!(response.reference.fresh);
        assert_eq!(response.reference.direction, Some(Direction::Up));

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["reference"]["current"], "101");
        assert_eq!(json["reference"]["period_open"], "100");
        assert!(json["reference"].get("unavailable").is_none());
    }

    #[test]
    fn stale_reference_degrades() {
        let (state, session, reference) = state_at(at(10, 30, 0));
        session.set(SessionState::Subscribed);
        reference.publish_current(ReferencePrice {
            value: Decimal::new(101, 0),
            observed_at: at(10, 0, 0),
        });
        reference.publish_period_open(PeriodOpen {
            value: Decimal::new(100, 0),
            period_start: at(10, 0, 0),
        });

        let response = build_health_response(&state);
        assert_eq!(response.status, HealthStatus::Degraded);
        assert!(!response.reference.fresh);
        assert!(response.reference.unavailable.is_some());
    }

    #[tokio::test]
    async fn readiness_tracks_subscription() {
        let (state, session, _reference) = state_at(at(10, 0, 0));
        let (addr, cancel) = spawn(state).await;
        let client = reqwest::Client::new();

        let before = client
            .get(format!("http://{addr}/readyz"))
            .send()
            .await
            .unwrap();
        assert_eq!(before.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);

        session.set(SessionState::Subscribed);
        let after = client
            .get(format!("http://{addr}/readyz"))
            .send()
            .await
            .unwrap();
        assert_eq!(after.status(), reqwest::StatusCode::OK);

        let live = client
            .get(format!("http://{addr}/healthz"))
            .send()
            .await
            .unwrap();
        assert_eq!(live.text().await.unwrap(), "OK");

        cancel.cancel();
    }

    #[tokio::test]
    async fn health_endpoint_serves_json() {
        let (state, _session, _reference) = state_at(at(10, 0, 0));
        let (addr, cancel) = spawn(state).await;

        let response = reqwest::get(format!("http://{addr}/health")).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = response.json().await.unwrap();
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["session"], "connecting");
        assert_eq!(body["reference"]["fresh"], false);

        cancel.cancel();
    }
}
