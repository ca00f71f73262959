//! Request surface route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::engine::aggregator::{Aggregator, FeedConfig, FeedFilter};
use crate::engine::batch::UnitFailure;
use crate::engine::{FeedReport, GradingReport};
use crate::grading::record::RecordSummary;
use crate::types::{EdgeSignal, SignalType};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Latest scan and grading results, replaced wholesale after each run.
pub struct DashboardState {
    pub feed: RwLock<Option<FeedReport>>,
    pub grades: RwLock<Option<GradingReport>>,
    aggregator: Aggregator,
    started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(feed_config: FeedConfig) -> Self {
        Self {
            feed: RwLock::new(None),
            grades: RwLock::new(None),
            aggregator: Aggregator::new(feed_config),
            started_at: Utc::now(),
        }
    }

    /// Publish a scan. The report must hold the unfiltered ranking.
    pub async fn publish_feed(&self, report: FeedReport) {
        *self.feed.write().await = Some(report);
    }

    pub async fn publish_grades(&self, report: GradingReport) {
        *self.grades.write().await = Some(report);
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct EdgesQuery {
    #[serde(rename = "type")]
    pub signal_type: Option<String>,
    pub min_confidence: Option<f64>,
    pub high_confidence_only: Option<bool>,
    pub limit: Option<usize>,
}

impl EdgesQuery {
    fn into_filter(self) -> Result<FeedFilter, String> {
        let signal_type = match self.signal_type.as_deref() {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<SignalType>().map_err(|e| e.to_string())?),
        };
        if let Some(m) = self.min_confidence {
            if !(0.0..=1.0).contains(&m) {
                return Err(format!("min_confidence must be within 0..1, got {m}"));
            }
        }
        Ok(FeedFilter {
            signal_type,
            min_confidence: self.min_confidence,
            high_confidence_only: self.high_confidence_only.unwrap_or(false),
            limit: self.limit,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct EdgesResponse {
    pub as_of: Option<DateTime<Utc>>,
    pub total: usize,
    pub signals: Vec<EdgeSignal>,
    pub failed_units: usize,
    pub skipped_inputs: usize,
    pub cancelled: bool,
}

#[derive(Debug, Serialize)]
pub struct GradesResponse {
    pub record: RecordSummary,
    pub win_rate: Option<f64>,
    pub report: Option<GradingReport>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub uptime_secs: i64,
    pub last_scan: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/edges
pub async fn get_edges(
    State(state): State<AppState>,
    Query(query): Query<EdgesQuery>,
) -> Result<Json<EdgesResponse>, (StatusCode, Json<ErrorResponse>)> {
    let filter = query
        .into_filter()
        .map_err(|error| (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })))?;

    let feed = state.feed.read().await;
    let response = match feed.as_ref() {
        Some(report) => EdgesResponse {
            as_of: Some(report.as_of),
            total: report.signals.len(),
            signals: state.aggregator.filter(&report.signals, &filter),
            failed_units: report.failures.len(),
            skipped_inputs: report.skipped.len(),
            cancelled: report.cancelled,
        },
        None => EdgesResponse {
            as_of: None,
            total: 0,
            signals: Vec::new(),
            failed_units: 0,
            skipped_inputs: 0,
            cancelled: false,
        },
    };
    Ok(Json(response))
}

/// GET /api/failures
pub async fn get_failures(State(state): State<AppState>) -> Json<Vec<UnitFailure>> {
    let feed = state.feed.read().await;
    Json(feed.as_ref().map(|r| r.failures.clone()).unwrap_or_default())
}

/// GET /api/grades
pub async fn get_grades(State(state): State<AppState>) -> Json<GradesResponse> {
    let grades = state.grades.read().await;
    let record = grades.as_ref().map(|g| g.record()).unwrap_or_default();
    Json(GradesResponse {
        record,
        win_rate: record.win_rate(),
        report: grades.clone(),
    })
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let last_scan = state.feed.read().await.as_ref().map(|r| r.as_of);
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            uptime_secs: (Utc::now() - state.started_at).num_seconds(),
            last_scan,
        }),
    )
}
