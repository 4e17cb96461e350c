//! HTTP API server for the Tally node.
//!
//! Provides REST endpoints for node health, the hosted parties, record
//! queries against each party's vault, and the two boundary operations.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tally_core::{ObligationRecord, SettlementRecord};
use tally_settlement::{DateRange, PartyRole, RecordStatus, SettlementNode};

use crate::commands::{NodeCommand, TransactionResponse};
use crate::state::NodeState;

type ApiError = (StatusCode, Json<ErrorResponse>);

// --- Response types ---

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub committed: usize,
}

#[derive(Serialize)]
pub struct NodeInfo {
    pub name: String,
    pub owning_key: String,
}

#[derive(Serialize)]
pub struct NodesResponse {
    pub nodes: Vec<NodeInfo>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct PeersResponse {
    pub peers: Vec<String>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct ObligationsResponse {
    pub obligations: Vec<ObligationRecord>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct SettlementsResponse {
    pub settlements: Vec<SettlementRecord>,
    pub count: usize,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// --- Request types ---

#[derive(Deserialize)]
pub struct CreateObligationRequest {
    pub value: i64,
    pub viewer: String,
    pub lender: String,
    pub borrower: String,
}

#[derive(Deserialize)]
pub struct CompensateRequest {
    pub viewer: String,
    pub counterparty: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct ObligationQuery {
    pub role: Option<String>,
    pub party: Option<String>,
    pub party_a: Option<String>,
    pub party_b: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub status: Option<String>,
}

#[derive(Deserialize, Default)]
pub struct StatusQuery {
    pub status: Option<String>,
}

// --- Helpers ---

fn bad_request(error: impl ToString) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn lookup_node(state: &NodeState, name: &str) -> Result<Arc<SettlementNode>, ApiError> {
    state.node(name).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("unknown node '{}'", name),
            }),
        )
    })
}

fn parse_status(status: Option<&str>) -> Result<RecordStatus, ApiError> {
    status
        .map(|s| s.parse::<RecordStatus>().map_err(bad_request))
        .transpose()
        .map(Option::unwrap_or_default)
}

fn parse_date(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, ApiError> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|at| at.with_timezone(&Utc))
                .map_err(|e| bad_request(format!("invalid '{}' date '{}': {}", field, v, e)))
        })
        .transpose()
}

fn parse_range(from: Option<&str>, to: Option<&str>) -> Result<DateRange, ApiError> {
    DateRange::new(parse_date("from", from)?, parse_date("to", to)?).map_err(bad_request)
}

// --- Handlers ---

async fn handle_health(State(state): State<Arc<NodeState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        committed: state.committed(),
    })
}

async fn handle_nodes(State(state): State<Arc<NodeState>>) -> Json<NodesResponse> {
    let nodes: Vec<NodeInfo> = state
        .cluster
        .nodes()
        .iter()
        .map(|n| NodeInfo {
            name: n.me().name().to_string(),
            owning_key: n.me().owning_key().to_string(),
        })
        .collect();
    let count = nodes.len();
    Json(NodesResponse { nodes, count })
}

async fn handle_me(
    State(state): State<Arc<NodeState>>,
    Path(node): Path<String>,
) -> Result<Json<NodeInfo>, ApiError> {
    let node = lookup_node(&state, &node)?;
    Ok(Json(NodeInfo {
        name: node.me().name().to_string(),
        owning_key: node.me().owning_key().to_string(),
    }))
}

async fn handle_peers(
    State(state): State<Arc<NodeState>>,
    Path(node): Path<String>,
) -> Result<Json<PeersResponse>, ApiError> {
    let node = lookup_node(&state, &node)?;
    let peers: Vec<String> = node
        .peers()
        .await
        .iter()
        .map(|p| p.name().to_string())
        .collect();
    let count = peers.len();
    Ok(Json(PeersResponse { peers, count }))
}

async fn handle_obligations(
    State(state): State<Arc<NodeState>>,
    Path(node): Path<String>,
    Query(query): Query<ObligationQuery>,
) -> Result<Json<ObligationsResponse>, ApiError> {
    let node = lookup_node(&state, &node)?;
    let status = parse_status(query.status.as_deref())?;
    let dated = query.from.is_some() || query.to.is_some();

    let obligations = match (&query.role, &query.party, &query.party_a, &query.party_b) {
        (None, None, None, None) if !dated => node.obligations(status).await,
        (Some(role), Some(party), None, None) if !dated => {
            let role: PartyRole = role.parse().map_err(bad_request)?;
            node.obligations_by_role(role, party, status)
                .await
                .map_err(bad_request)?
        }
        (None, None, Some(a), Some(b)) => {
            let range = parse_range(query.from.as_deref(), query.to.as_deref())?;
            node.obligations_between(a, b, range, status)
                .await
                .map_err(bad_request)?
        }
        _ => {
            return Err(bad_request(
                "query by role and party, or by party_a and party_b with an optional from/to",
            ))
        }
    };

    let count = obligations.len();
    Ok(Json(ObligationsResponse { obligations, count }))
}

async fn handle_settlements(
    State(state): State<Arc<NodeState>>,
    Path(node): Path<String>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<SettlementsResponse>, ApiError> {
    let node = lookup_node(&state, &node)?;
    let status = parse_status(query.status.as_deref())?;
    let settlements = node.settlements(status).await;
    let count = settlements.len();
    Ok(Json(SettlementsResponse { settlements, count }))
}

async fn handle_create_obligation(
    State(state): State<Arc<NodeState>>,
    Path(node): Path<String>,
    Json(req): Json<CreateObligationRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let node = lookup_node(&state, &node)?;
    let value = u64::try_from(req.value)
        .map_err(|_| bad_request("the obligation's value must be positive"))?;
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();

    let cmd = NodeCommand::CreateObligation {
        node: node.me().name().to_string(),
        value,
        viewer: req.viewer,
        lender: req.lender,
        borrower: req.borrower,
        reply: reply_tx,
    };

    send_command_and_await(&state, cmd, reply_rx)
        .await
        .map(|json| (StatusCode::CREATED, json))
}

async fn handle_compensate(
    State(state): State<Arc<NodeState>>,
    Path(node): Path<String>,
    Json(req): Json<CompensateRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    let node = lookup_node(&state, &node)?;
    let range = parse_range(req.from.as_deref(), req.to.as_deref())?;
    let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();

    let cmd = NodeCommand::Compensate {
        node: node.me().name().to_string(),
        viewer: req.viewer,
        counterparty: req.counterparty,
        range,
        reply: reply_tx,
    };

    send_command_and_await(&state, cmd, reply_rx)
        .await
        .map(|json| (StatusCode::CREATED, json))
}

/// Helper to send a command and await the reply.
async fn send_command_and_await<T: Serialize>(
    state: &Arc<NodeState>,
    cmd: NodeCommand,
    reply_rx: tokio::sync::oneshot::Receiver<Result<T, String>>,
) -> Result<Json<T>, ApiError> {
    state.command_tx.send(cmd).await.map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "node event loop not running".into(),
            }),
        )
    })?;

    match reply_rx.await {
        Ok(Ok(resp)) => Ok(Json(resp)),
        Ok(Err(e)) => Err(bad_request(e)),
        Err(_) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "event loop dropped the reply channel".into(),
            }),
        )),
    }
}

// --- Server ---

pub fn build_router(state: Arc<NodeState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(handle_health))
        .route("/api/v1/nodes", get(handle_nodes))
        .route("/api/v1/nodes/{node}/me", get(handle_me))
        .route("/api/v1/nodes/{node}/peers", get(handle_peers))
        .route(
            "/api/v1/nodes/{node}/obligations",
            get(handle_obligations).post(handle_create_obligation),
        )
        .route("/api/v1/nodes/{node}/settlements", get(handle_settlements))
        .route("/api/v1/nodes/{node}/compensate", post(handle_compensate))
        .with_state(state)
}

pub async fn start_api_server(
    listen_addr: SocketAddr,
    state: Arc<NodeState>,
) -> anyhow::Result<()> {
    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(%listen_addr, "HTTP API server started");
    axum::serve(listener, app).await?;
    Ok(())
}
