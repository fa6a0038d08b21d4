//! Integration tests for the session REST API.
//!
//! Each test spins up an Axum server on a random port against the real
//! catalog shipped under data/ and exercises the HTTP contract with
//! reqwest.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use visaflow::catalog::store::{CatalogStore, CheckBank};
use visaflow::config::EngineConfig;
use visaflow::knowledge::KnowledgeBase;
use visaflow::pipeline::PipelineEngine;
use visaflow::server::{AppState, api_routes};
use visaflow::session::SessionStore;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Start a server on a random port against the shipped data directory.
async fn start_server() -> String {
    let data = Path::new(env!("CARGO_MANIFEST_DIR")).join("data");
    let catalog = Arc::new(CatalogStore::load(data.join("flows")).unwrap());
    let checks = Arc::new(CheckBank::load(data.join("shared/micro_checks.json")).unwrap());
    let knowledge = Arc::new(KnowledgeBase::load(data.join("knowledge_chunks.json")).unwrap());

    let engine = Arc::new(PipelineEngine::new(
        Arc::clone(&catalog),
        Arc::clone(&checks),
        Arc::clone(&knowledge),
        EngineConfig::default(),
    ));
    let app = api_routes(AppState {
        engine,
        sessions: Arc::new(SessionStore::new()),
        catalog,
        checks,
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn start_session(client: &reqwest::Client, base: &str, intent: &str) -> Value {
    let response = client
        .post(format!("{base}/api/session/start"))
        .json(&json!({ "intent": intent }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    response.json().await.unwrap()
}

async fn post_event(client: &reqwest::Client, base: &str, id: &str, event: Value) -> Value {
    let response = client
        .post(format!("{base}/api/session/{id}/event"))
        .json(&event)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    response.json().await.unwrap()
}

#[tokio::test]
async fn health_reports_catalog() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let body: Value = reqwest::get(format!("{base}/api/health"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["flows"], 5);
        assert_eq!(body["sessions"], 0);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn flows_listing_includes_all_packs() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let body: Value = reqwest::get(format!("{base}/api/flows"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let flows = body["flows"].as_array().unwrap();
        assert_eq!(flows.len(), 5);
        let ids: Vec<&str> = flows.iter().map(|f| f["flow_id"].as_str().unwrap()).collect();
        assert!(ids.contains(&"f1_work_basics"));
        assert!(ids.contains(&"cap_gap_transition_prep"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn invalid_start_requests_are_rejected() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/api/session/start"))
            .json(&json!({ "intent": "help" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 422);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("Intent"));

        let response = client
            .post(format!("{base}/api/session/start"))
            .json(&json!({
                "intent": "need help with work authorization",
                "profile": { "stress_level": 9 }
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 422);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();
        let id = uuid::Uuid::new_v4();

        let response = reqwest::get(format!("{base}/api/session/{id}")).await.unwrap();
        assert_eq!(response.status(), 404);

        let response = client
            .post(format!("{base}/api/session/{id}/event"))
            .json(&json!({ "event_type": "inactivity" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn cpt_opt_overlap_offers_disambiguation_and_selection_resolves_it() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let session = start_session(
            &client,
            &base,
            "I'm on CPT and also doing OPT, not sure which applies",
        )
        .await;
        let id = session["session_id"].as_str().unwrap().to_string();

        let flags = session["ambiguity_flags"].as_array().unwrap();
        assert!(flags.iter().any(|f| f == "cpt_opt_overlap"));
        let options = session["disambiguation"]["options"].as_array().unwrap();
        assert!(options.len() >= 2);
        assert!(options.iter().any(|o| o.as_str().unwrap().starts_with("cpt_prep")));

        let body = post_event(
            &client,
            &base,
            &id,
            json!({ "event_type": "select_flow", "payload": { "flow_id": "cpt_prep" } }),
        )
        .await;
        assert_eq!(body["session"]["selected_flow_id"], "cpt_prep");
        assert_eq!(body["session"]["flow_locked"], true);
        assert!(body["session"]["disambiguation"].is_null());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn session_start_carries_the_initial_mode_decision() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let session = start_session(
            &client,
            &base,
            "I have an H-1B petition filed and my F-1 status ends soon, need cap-gap help",
        )
        .await;
        assert_eq!(session["ui"]["new_mode"], "transition");
        assert_eq!(session["ui"]["new_mode"], session["current_mode"]);
        assert!(!session["ui"]["reason"].as_str().unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn cap_gap_session_enters_transition_mode_until_petition_is_set() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let session = start_session(
            &client,
            &base,
            "I have an H-1B petition filed and my F-1 status ends soon, need cap-gap help",
        )
        .await;
        let id = session["session_id"].as_str().unwrap().to_string();

        assert_eq!(session["selected_flow_id"], "cap_gap_transition_prep");
        assert_eq!(session["current_mode"], "transition");
        let missing = session["missing_items"].as_array().unwrap();
        assert!(missing.iter().any(|m| m == "petition_status"));

        // Confirming the petition state releases the transition rule.
        let body = post_event(
            &client,
            &base,
            &id,
            json!({
                "event_type": "field_update",
                "payload": { "field": "petition_status", "value": "filed" }
            }),
        )
        .await;
        assert_ne!(body["session"]["current_mode"], "transition");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn explicit_mode_choice_is_locked_across_refreshes() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let session = start_session(&client, &base, "need help with employment paperwork soon").await;
        let id = session["session_id"].as_str().unwrap().to_string();

        let body = post_event(
            &client,
            &base,
            &id,
            json!({ "event_type": "mode_change", "payload": { "mode": "explain" } }),
        )
        .await;
        assert_eq!(body["ui"]["new_mode"], "explain");
        assert_eq!(body["session"]["mode_lock_remaining"], 3);

        let body = post_event(&client, &base, &id, json!({ "event_type": "inactivity" })).await;
        assert_eq!(body["session"]["current_mode"], "explain");
        assert_eq!(body["session"]["mode_lock_remaining"], 2);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn fully_specified_intent_reaches_timeline_mode() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let session = start_session(
            &client,
            &base,
            "I'm an enrolled F-1 student needing work authorization help",
        )
        .await;
        assert_eq!(session["selected_flow_id"], "f1_work_basics");
        assert_eq!(session["fields"]["status_type"], "f1");
        assert_eq!(session["fields"]["program_stage"], "enrolled");
        assert!(session["missing_items"].as_array().unwrap().is_empty());
        assert_eq!(session["current_mode"], "timeline");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn micro_checks_round_trip() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let session = start_session(
            &client,
            &base,
            "I have an H-1B petition filed and my F-1 status ends soon, need cap-gap help",
        )
        .await;
        let id = session["session_id"].as_str().unwrap().to_string();

        // The bank check referenced by the cap-gap pack is present.
        let checks = session["available_checks"].as_array().unwrap();
        assert!(checks.iter().any(|c| c["check_id"] == "mc_cap_gap_bridge"));

        // Top missing entity is the correct answer for the generated check.
        let top_missing = session["missing_items"][0].as_str().unwrap();
        let response = client
            .post(format!("{base}/api/session/{id}/micro-check"))
            .json(&json!({
                "check_id": "missing_item_check",
                "selected_option": top_missing
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["result"]["is_correct"], true);
        assert!(
            body["result"]["feedback"]
                .as_str()
                .unwrap()
                .starts_with("Correct.")
        );

        let response = client
            .post(format!("{base}/api/session/{id}/micro-check"))
            .json(&json!({ "check_id": "no_such_check", "selected_option": "a" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 404);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn packet_renders_markdown_brief() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();

        let session = start_session(
            &client,
            &base,
            "I have an H-1B petition filed and my F-1 status ends soon, need cap-gap help",
        )
        .await;
        let id = session["session_id"].as_str().unwrap().to_string();

        let response = client
            .post(format!("{base}/api/session/{id}/packet"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        let packet = body["packet_markdown"].as_str().unwrap();
        assert!(packet.starts_with("# Advisor Handoff Packet"));
        assert!(packet.contains("Cap-Gap Transition Preparation"));
        assert!(packet.contains("Not legal advice"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn catalog_reload_reports_counts() {
    timeout(TEST_TIMEOUT, async {
        let base = start_server().await;
        let client = reqwest::Client::new();
        let response = client
            .post(format!("{base}/api/catalog/reload"))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["flows"], 5);
        assert_eq!(body["checks"], 6);
    })
    .await
    .expect("test timed out");
}
