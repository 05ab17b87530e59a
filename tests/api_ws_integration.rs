//! Integration tests for the moderation API + WebSocket fan-out.
//!
//! Each test spins up an Axum server on a random port with an in-memory
//! store and the keyword fallback classifier, then exercises the real
//! REST / WS contract end to end.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use modwatch::bus::MessageBus;
use modwatch::classifier::FallbackClassifier;
use modwatch::notify::{ApiState, NotificationHub, api_routes};
use modwatch::pipeline::{
    ClassificationStage, IngestionStage, StatsTracker, register_consumers,
};
use modwatch::store::{LibSqlStore, Storage, seed_defaults};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct TestServer {
    port: u16,
    store: Arc<dyn Storage>,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    fn ws_url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }
}

/// Start a full pipeline + API server on a random port.
async fn start_server() -> TestServer {
    let store: Arc<dyn Storage> = Arc::new(LibSqlStore::memory().await.unwrap());
    seed_defaults(&store).await.unwrap();

    let bus = Arc::new(MessageBus::new());
    let hub = NotificationHub::new_shared();
    let stats = Arc::new(StatsTracker::new(Arc::clone(&store)));

    let ingestion = Arc::new(IngestionStage::new(
        Arc::clone(&store),
        Arc::clone(&bus),
        Arc::clone(&stats),
    ));
    let classification = Arc::new(ClassificationStage::new(
        Arc::clone(&store),
        Arc::new(FallbackClassifier::new()),
        Arc::clone(&stats),
        Arc::clone(&hub),
        5,
    ));
    register_consumers(&bus, Arc::clone(&ingestion), classification).await;

    let state = ApiState {
        store: Arc::clone(&store),
        hub,
        ingestion,
        bus,
        sync_page_size: 5,
        heartbeat_interval: Duration::from_secs(30),
        max_missed_probes: 2,
        feed_url: "http://127.0.0.1:9/unused".into(),
    };
    let app = api_routes(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer { port, store }
}

fn submission_json(content: &str, content_id: &str) -> Value {
    serde_json::json!({
        "kind": "text",
        "content": content,
        "content_id": content_id,
    })
}

/// Parse a WS text frame into a serde_json::Value.
fn parse_ws_json(msg: &Message) -> Value {
    match msg {
        Message::Text(txt) => serde_json::from_str(txt).expect("invalid JSON from server"),
        other => panic!("expected Text frame, got {:?}", other),
    }
}

/// Read frames until the next text frame (skipping protocol ping/pong).
async fn next_json<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = ws.next().await.unwrap().unwrap();
        if matches!(msg, Message::Text(_)) {
            return parse_ws_json(&msg);
        }
    }
}

/// Consume the three initial-sync events sent on connect.
async fn consume_initial_sync<S>(ws: &mut S)
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    for _ in 0..3 {
        let _ = next_json(ws).await;
    }
}

/// Poll a REST endpoint until the returned array is non-empty.
async fn poll_for_analyses(server: &TestServer, status: &str) -> Vec<Value> {
    let client = reqwest::Client::new();
    let url = server.url(&format!("/api/content-analysis?status={status}"));
    for _ in 0..100 {
        let body: Vec<Value> = client.get(&url).send().await.unwrap().json().await.unwrap();
        if !body.is_empty() {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("no analyses with status '{status}' appeared in time");
}

// ── WebSocket initial sync ───────────────────────────────────────────

#[tokio::test]
async fn ws_connect_receives_initial_state() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let (mut ws, _resp) = connect_async(server.ws_url())
            .await
            .expect("WS connect failed");

        // 1. Stats snapshot.
        let stats = next_json(&mut ws).await;
        assert_eq!(stats["type"], "stats_update");
        assert_eq!(stats["data"]["total_content"], 0);
        assert_eq!(stats["data"]["flagged_content"], 0);

        // 2. Pending analyses page (empty).
        let flagged = next_json(&mut ws).await;
        assert_eq!(flagged["type"], "flagged_content_update");
        assert!(flagged["data"].as_array().unwrap().is_empty());

        // 3. Seeded rule set.
        let rules = next_json(&mut ws).await;
        assert_eq!(rules["type"], "ai_rules_update");
        let rule_list = rules["data"].as_array().unwrap();
        assert_eq!(rule_list.len(), 4);
        assert!(
            rule_list
                .iter()
                .any(|r| r["category"] == "spam" && r["sensitivity"] == 90)
        );
    })
    .await
    .expect("test timed out");
}

// ── Submission pipeline ──────────────────────────────────────────────

#[tokio::test]
async fn spam_submission_is_auto_removed() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(server.url("/api/content"))
            .json(&submission_json("buy now limited time discount", "c1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);

        // The seeded Spam rule (sensitivity 90, auto_remove) removes it.
        let removed = poll_for_analyses(&server, "removed").await;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0]["category"], "spam");
        assert_eq!(removed[0]["confidence"], 90);
        assert_eq!(removed[0]["flagged"], true);
        assert_eq!(removed[0]["content"]["content_id"], "c1");

        // Stats reflect the flag (written just after the analysis row, so poll).
        let mut stats = Value::Null;
        for _ in 0..100 {
            stats = client
                .get(server.url("/api/stats"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            if stats["flagged_content"] == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        assert_eq!(stats["total_content"], 1);
        assert_eq!(stats["flagged_content"], 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn safe_submission_is_approved() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(server.url("/api/content"))
            .json(&submission_json("hello world", "c2"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);

        let approved = poll_for_analyses(&server, "approved").await;
        assert_eq!(approved[0]["category"], "safe");
        assert_eq!(approved[0]["confidence"], 0);
        assert_eq!(approved[0]["flagged"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn disabled_rule_lets_keyword_content_through() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        // Find and disable the seeded hate speech rule.
        let rules: Vec<Value> = client
            .get(server.url("/api/ai-rules"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let hate_rule = rules.iter().find(|r| r["category"] == "hate_speech").unwrap();
        let resp = client
            .patch(server.url(&format!("/api/ai-rules/{}", hate_rule["id"])))
            .json(&serde_json::json!({"active": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        client
            .post(server.url("/api/content"))
            .json(&submission_json("some racist rant", "c3"))
            .send()
            .await
            .unwrap();

        let approved = poll_for_analyses(&server, "approved").await;
        assert_eq!(approved[0]["category"], "hate_speech");
        assert_eq!(approved[0]["flagged"], false);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn submission_roundtrip_preserves_fields() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(server.url("/api/content"))
            .json(&serde_json::json!({
                "kind": "news",
                "content": "article body",
                "content_id": "news-7",
                "source_user_id": "reporter",
                "metadata": {"title": "Headline", "url": "https://example.com"},
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);

        let items: Vec<Value> = client
            .get(server.url("/api/content"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item["kind"], "news");
        assert_eq!(item["content"], "article body");
        assert_eq!(item["content_id"], "news-7");
        assert_eq!(item["source_user_id"], "reporter");
        assert_eq!(item["metadata"]["title"], "Headline");
        assert!(item["id"].as_i64().unwrap() > 0);
        assert!(item["created_at"].is_string());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_submission_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(server.url("/api/content"))
            .json(&submission_json("   ", "c1"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        // Unknown kind is rejected by deserialization.
        let resp = client
            .post(server.url("/api/content"))
            .json(&serde_json::json!({
                "kind": "hologram",
                "content": "hi",
                "content_id": "c1",
            }))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_client_error());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn search_finds_submitted_content() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        client
            .post(server.url("/api/content"))
            .json(&submission_json("an entirely unremarkable sentence", "c1"))
            .send()
            .await
            .unwrap();

        let hits: Vec<Value> = client
            .get(server.url("/api/content/search?q=unremarkable"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);

        let resp = client
            .get(server.url("/api/content/search"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);
    })
    .await
    .expect("test timed out");
}

// ── Moderator actions ────────────────────────────────────────────────

#[tokio::test]
async fn status_change_broadcasts_to_all_clients() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        // Harassment keywords: seeded rule flags for review (pending).
        client
            .post(server.url("/api/content"))
            .json(&submission_json("stop trying to bully me", "c1"))
            .send()
            .await
            .unwrap();
        let pending = poll_for_analyses(&server, "pending").await;
        let analysis_id = pending[0]["id"].as_i64().unwrap();

        // Two connected moderator dashboards.
        let (mut ws1, _) = connect_async(server.ws_url()).await.unwrap();
        let (mut ws2, _) = connect_async(server.ws_url()).await.unwrap();
        consume_initial_sync(&mut ws1).await;
        consume_initial_sync(&mut ws2).await;

        let resp = client
            .patch(server.url(&format!("/api/content-analysis/{analysis_id}/status")))
            .json(&serde_json::json!({"status": "removed"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        for ws in [&mut ws1, &mut ws2] {
            // Skip any late pipeline broadcasts that raced the connect.
            let event = loop {
                let event = next_json(ws).await;
                if event["type"] == "content_status_update" {
                    break event;
                }
            };
            assert_eq!(event["data"]["id"], analysis_id);
            assert_eq!(event["data"]["status"], "removed");
            // Enriched with the content item.
            assert_eq!(event["data"]["content"]["content_id"], "c1");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn status_change_validates_input() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .patch(server.url("/api/content-analysis/1/status"))
            .json(&serde_json::json!({"status": "vaporized"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = client
            .patch(server.url("/api/content-analysis/9999/status"))
            .json(&serde_json::json!({"status": "removed"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

// ── Rule management ──────────────────────────────────────────────────

#[tokio::test]
async fn rule_lifecycle_broadcasts_events() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();
        consume_initial_sync(&mut ws).await;

        let resp = client
            .post(server.url("/api/ai-rules"))
            .json(&serde_json::json!({
                "name": "Aggressive Spam Detection",
                "description": "Stricter spam threshold for campaigns.",
                "category": "spam",
                "sensitivity": 60,
                "auto_action": "flag_for_review",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 201);
        let created: Value = resp.json().await.unwrap();
        let rule_id = created["id"].as_i64().unwrap();

        let event = next_json(&mut ws).await;
        assert_eq!(event["type"], "ai_rule_created");
        assert_eq!(event["data"]["id"], rule_id);
        assert_eq!(event["data"]["sensitivity"], 60);

        let resp = client
            .patch(server.url(&format!("/api/ai-rules/{rule_id}")))
            .json(&serde_json::json!({"sensitivity": 45}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let event = next_json(&mut ws).await;
        assert_eq!(event["type"], "ai_rule_updated");
        assert_eq!(event["data"]["sensitivity"], 45);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rule_validation_rejects_bad_input() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        // "safe" is never ruled.
        let resp = client
            .post(server.url("/api/ai-rules"))
            .json(&serde_json::json!({
                "name": "Safe rule",
                "description": "",
                "category": "safe",
                "sensitivity": 50,
                "auto_action": "none",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        // Out-of-range sensitivity on update.
        let resp = client
            .patch(server.url("/api/ai-rules/1"))
            .json(&serde_json::json!({"sensitivity": 180}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 400);

        let resp = client
            .patch(server.url("/api/ai-rules/9999"))
            .json(&serde_json::json!({"active": false}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    })
    .await
    .expect("test timed out");
}

// ── Misc surface ─────────────────────────────────────────────────────

#[tokio::test]
async fn health_endpoint() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let resp = reqwest::get(server.url("/health")).await.unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "modwatch");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn ws_answers_json_ping() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;

        let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();
        consume_initial_sync(&mut ws).await;

        ws.send(Message::Text(r#"{"type":"ping"}"#.into()))
            .await
            .unwrap();

        let pong = next_json(&mut ws).await;
        assert_eq!(pong["type"], "pong");
        assert!(pong["timestamp"].is_i64());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn image_content_is_stored_but_not_analyzed() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let resp = client
            .post(server.url("/api/content"))
            .json(&serde_json::json!({
                "kind": "image",
                "content": "https://example.com/cat.png",
                "content_id": "img-1",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 202);

        // Stored...
        let items: Vec<Value> = client
            .get(server.url("/api/content"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(items.len(), 1);

        // ...but never analyzed.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let analyses: Vec<Value> = client
            .get(server.url("/api/content-analysis"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert!(analyses.is_empty());

        // The item still counts toward totals.
        let stats: Value = client
            .get(server.url("/api/stats"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["total_content"], 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn flagged_submission_pushes_live_updates() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server().await;
        let client = reqwest::Client::new();

        let (mut ws, _) = connect_async(server.ws_url()).await.unwrap();
        consume_initial_sync(&mut ws).await;

        client
            .post(server.url("/api/content"))
            .json(&submission_json("threat level rising", "c1"))
            .send()
            .await
            .unwrap();

        // The pipeline pushes a stats update and then the pending page.
        let stats = next_json(&mut ws).await;
        assert_eq!(stats["type"], "stats_update");
        assert_eq!(stats["data"]["total_content"], 1);

        let mut saw_flagged_page = false;
        for _ in 0..3 {
            let event = next_json(&mut ws).await;
            if event["type"] == "flagged_content_update" {
                let page = event["data"].as_array().unwrap();
                assert_eq!(page.len(), 1);
                assert_eq!(page[0]["category"], "harassment");
                assert_eq!(page[0]["content"]["content_id"], "c1");
                saw_flagged_page = true;
                break;
            }
        }
        assert!(saw_flagged_page, "expected a flagged_content_update event");

        // Server-side store agrees with what was pushed.
        let pending = server
            .store
            .list_analyses(5, 0, Some(modwatch::model::ContentStatus::Pending))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    })
    .await
    .expect("test timed out");
}
