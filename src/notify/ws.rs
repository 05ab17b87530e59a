//! WebSocket + REST surface for the moderation service.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{get, patch, post},
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use super::hub::{Event, Liveness, NotificationHub, ProbeAction};
use crate::bus::MessageBus;
use crate::error::IngestError;
use crate::feed;
use crate::model::{ContentStatus, ContentSubmission, EnrichedAnalysis, NewRule, RulePatch};
use crate::pipeline::{IngestionStage, PipelineMessage};
use crate::store::{Storage, enrich_analyses};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn Storage>,
    pub hub: Arc<NotificationHub>,
    pub ingestion: Arc<IngestionStage>,
    pub bus: Arc<MessageBus<PipelineMessage>>,
    /// Page size of the pending-analyses snapshot sent on connect.
    pub sync_page_size: u32,
    pub heartbeat_interval: Duration,
    pub max_missed_probes: u8,
    pub feed_url: String,
}

/// Build the Axum router with the WebSocket and REST routes.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .route("/api/content", post(submit_content).get(list_content))
        .route("/api/content/search", get(search_content))
        .route("/api/content-analysis", get(list_analyses))
        .route("/api/content-analysis/{id}/status", patch(update_status))
        .route("/api/ai-rules", get(list_rules).post(create_rule))
        .route("/api/ai-rules/{id}", patch(update_rule))
        .route("/api/stats", get(get_stats))
        .route("/api/fetch-news", post(fetch_news))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "modwatch"
    }))
}

// ── Content ─────────────────────────────────────────────────────────

async fn submit_content(
    State(state): State<ApiState>,
    Json(submission): Json<ContentSubmission>,
) -> impl IntoResponse {
    match state.ingestion.ingest(submission).await {
        Ok(_item) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"message": "Content received for processing"})),
        ),
        Err(IngestError::Invalid(reason)) => (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"message": "Invalid content data", "error": reason})),
        ),
        Err(IngestError::Storage(e)) => {
            warn!(error = %e, "Content submission failed at persistence");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to process content"})),
            )
        }
    }
}

#[derive(Deserialize)]
struct PageQuery {
    limit: Option<u32>,
    offset: Option<u32>,
}

async fn list_content(
    State(state): State<ApiState>,
    Query(page): Query<PageQuery>,
) -> impl IntoResponse {
    let limit = page.limit.unwrap_or(10);
    let offset = page.offset.unwrap_or(0);
    match state.store.list_contents(limit, offset).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!(items))),
        Err(e) => {
            warn!(error = %e, "Failed to list content");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to retrieve content list"})),
            )
        }
    }
}

#[derive(Deserialize)]
struct SearchQuery {
    q: Option<String>,
}

async fn search_content(
    State(state): State<ApiState>,
    Query(search): Query<SearchQuery>,
) -> impl IntoResponse {
    let Some(query) = search.q.filter(|q| !q.trim().is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"message": "Search query is required"})),
        );
    };

    match state.store.search_contents(&query).await {
        Ok(items) => (StatusCode::OK, Json(serde_json::json!(items))),
        Err(e) => {
            warn!(error = %e, "Content search failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to search content"})),
            )
        }
    }
}

// ── Analyses ────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct AnalysisQuery {
    limit: Option<u32>,
    offset: Option<u32>,
    status: Option<String>,
}

async fn list_analyses(
    State(state): State<ApiState>,
    Query(query): Query<AnalysisQuery>,
) -> impl IntoResponse {
    let status = match query.status.as_deref() {
        Some(raw) => match raw.parse::<ContentStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"message": "Invalid status value"})),
                );
            }
        },
        None => None,
    };

    let limit = query.limit.unwrap_or(10);
    let offset = query.offset.unwrap_or(0);

    let analyses = match state.store.list_analyses(limit, offset, status).await {
        Ok(analyses) => analyses,
        Err(e) => {
            warn!(error = %e, "Failed to list analyses");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to retrieve content analyses"})),
            );
        }
    };

    match enrich_analyses(&state.store, analyses).await {
        Ok(enriched) => (StatusCode::OK, Json(serde_json::json!(enriched))),
        Err(e) => {
            warn!(error = %e, "Failed to enrich analyses");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to retrieve content analyses"})),
            )
        }
    }
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

async fn update_status(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<StatusBody>,
) -> impl IntoResponse {
    let Ok(status) = body.status.parse::<ContentStatus>() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"message": "Invalid status value"})),
        );
    };

    let updated = match state.store.update_analysis_status(id, status).await {
        Ok(Some(analysis)) => analysis,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({"message": "Content analysis not found"})),
            );
        }
        Err(e) => {
            warn!(error = %e, "Failed to update analysis status");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to update content analysis status"})),
            );
        }
    };

    info!(id, status = %status, "Analysis status changed by moderator");

    // Notify connected clients, with the content attached.
    let content = state.store.get_content(updated.content_id).await.ok().flatten();
    state
        .hub
        .broadcast(Event::ContentStatusUpdate(EnrichedAnalysis {
            analysis: updated.clone(),
            content,
        }))
        .await;

    (StatusCode::OK, Json(serde_json::json!(updated)))
}

// ── Rules ───────────────────────────────────────────────────────────

async fn list_rules(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_rules().await {
        Ok(rules) => (StatusCode::OK, Json(serde_json::json!(rules))),
        Err(e) => {
            warn!(error = %e, "Failed to list rules");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to retrieve AI rules"})),
            )
        }
    }
}

async fn create_rule(
    State(state): State<ApiState>,
    Json(new_rule): Json<NewRule>,
) -> impl IntoResponse {
    if let Err(reason) = new_rule.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"message": "Invalid rule data", "error": reason})),
        );
    }

    match state.store.create_rule(&new_rule).await {
        Ok(rule) => {
            state.hub.broadcast(Event::AiRuleCreated(rule.clone())).await;
            (StatusCode::CREATED, Json(serde_json::json!(rule)))
        }
        Err(e) => {
            warn!(error = %e, "Failed to create rule");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to create AI rule"})),
            )
        }
    }
}

async fn update_rule(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(patch): Json<RulePatch>,
) -> impl IntoResponse {
    if let Err(reason) = patch.validate() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"message": "Invalid rule data", "error": reason})),
        );
    }

    match state.store.update_rule(id, &patch).await {
        Ok(Some(rule)) => {
            state.hub.broadcast(Event::AiRuleUpdated(rule.clone())).await;
            (StatusCode::OK, Json(serde_json::json!(rule)))
        }
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"message": "AI rule not found"})),
        ),
        Err(e) => {
            warn!(error = %e, "Failed to update rule");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to update AI rule"})),
            )
        }
    }
}

// ── Stats ───────────────────────────────────────────────────────────

async fn get_stats(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.latest_stats().await {
        Ok(Some(stats)) => (StatusCode::OK, Json(serde_json::json!(stats))),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"message": "Stats not found"})),
        ),
        Err(e) => {
            warn!(error = %e, "Failed to read stats");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"message": "Failed to retrieve stats"})),
            )
        }
    }
}

// ── News feed ───────────────────────────────────────────────────────

async fn fetch_news(State(state): State<ApiState>) -> impl IntoResponse {
    let bus = Arc::clone(&state.bus);
    let store = Arc::clone(&state.store);
    let hub = Arc::clone(&state.hub);
    let feed_url = state.feed_url.clone();

    // Runs in the background; the caller gets an immediate acknowledgement.
    tokio::spawn(async move {
        match feed::ingest_articles(&bus, &feed_url).await {
            Ok(count) => {
                info!(count, "News ingestion complete");
                if let Ok(Some(stats)) = store.latest_stats().await {
                    hub.broadcast(Event::StatsUpdate(stats)).await;
                }
            }
            Err(e) => warn!(error = %e, "News ingestion failed"),
        }
    });

    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({"message": "News fetching started"})),
    )
}

// ── WebSocket ───────────────────────────────────────────────────────

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ApiState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: ApiState) {
    info!(clients = state.hub.client_count() + 1, "WebSocket client connected");

    // Subscribe before the initial sync so no event falls in between.
    let mut rx = state.hub.subscribe();

    if !send_initial_sync(&mut socket, &state).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    let mut liveness = Liveness::new();
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + state.heartbeat_interval,
        state.heartbeat_interval,
    );

    loop {
        tokio::select! {
            // Forward broadcast events to this client.
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if !send_event(&mut socket, &event).await {
                            debug!("Client disconnected during send");
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        // Re-sync from the last-payload cache.
                        for event in state.hub.cached_all().await {
                            if !send_event(&mut socket, &event).await {
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            // Probe the peer; evict after too many missed pongs.
            _ = heartbeat.tick() => {
                match liveness.on_probe(state.max_missed_probes) {
                    ProbeAction::Ping => {
                        if socket.send(Message::Ping(Bytes::new())).await.is_err() {
                            break;
                        }
                    }
                    ProbeAction::Terminate => {
                        warn!("Terminating unresponsive WebSocket connection");
                        break;
                    }
                }
            }

            // Inbound frames: liveness only.
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &mut socket).await;
                    }
                    Some(Ok(Message::Pong(_))) => {
                        liveness.on_pong();
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

/// Send the latest known state to a newly connected client: stats
/// snapshot, the current pending-review page, and the rule set.
async fn send_initial_sync(socket: &mut WebSocket, state: &ApiState) -> bool {
    if let Ok(Some(stats)) = state.store.latest_stats().await
        && !send_event(socket, &Event::StatsUpdate(stats)).await
    {
        return false;
    }

    let pending = match state
        .store
        .list_analyses(state.sync_page_size, 0, Some(ContentStatus::Pending))
        .await
    {
        Ok(analyses) => enrich_analyses(&state.store, analyses)
            .await
            .unwrap_or_default(),
        Err(e) => {
            warn!(error = %e, "Initial sync: failed to load pending analyses");
            Vec::new()
        }
    };
    if !send_event(socket, &Event::FlaggedContentUpdate(pending)).await {
        return false;
    }

    match state.store.list_rules().await {
        Ok(rules) => send_event(socket, &Event::AiRulesUpdate(rules)).await,
        Err(e) => {
            warn!(error = %e, "Initial sync: failed to load rules");
            true
        }
    }
}

async fn send_event(socket: &mut WebSocket, event: &Event) -> bool {
    match serde_json::to_string(event) {
        Ok(json) => socket.send(Message::Text(json.into())).await.is_ok(),
        Err(e) => {
            warn!(error = %e, "Failed to serialize event");
            true
        }
    }
}

async fn handle_client_message(text: &str, socket: &mut WebSocket) {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value) if value["type"] == "ping" => {
            let pong = serde_json::json!({
                "type": "pong",
                "timestamp": chrono::Utc::now().timestamp_millis(),
            });
            let _ = socket.send(Message::Text(pong.to_string().into())).await;
        }
        Ok(value) => {
            debug!(message_type = %value["type"], "Ignoring client message");
        }
        Err(e) => {
            debug!(error = %e, text, "Unrecognized WS message from client");
        }
    }
}

