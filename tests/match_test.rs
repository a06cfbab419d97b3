//! Integration tests for match proposal, the transition state machine,
//! cascaded need/offer updates, and withdrawal.

use serde_json::json;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Helper: start the server on a random port and return the base URL.
async fn start_test_server() -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = aidlink_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = aidlink_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state = aidlink_server::state::AppState {
        db,
        jwt_secret,
        connections: aidlink_server::ws::ConnectionRegistry::new(),
    };

    let app = aidlink_server::routes::build_router(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    (format!("http://{}", addr), addr)
}

/// Register a user and return (user_id, access_token).
async fn register_user(base_url: &str, display_name: &str, role: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/register", base_url))
        .json(&json!({ "display_name": display_name, "role": role }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201, "Registration failed for {}", display_name);
    let body: serde_json::Value = resp.json().await.unwrap();
    (
        body["user_id"].as_str().unwrap().to_string(),
        body["access_token"].as_str().unwrap().to_string(),
    )
}

async fn create_need(base_url: &str, token: &str, title: &str, category: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/needs", base_url))
        .bearer_auth(token)
        .json(&json!({ "title": title, "category": category }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn create_offer(base_url: &str, token: &str, title: &str, category: &str) -> String {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/offers", base_url))
        .bearer_auth(token)
        .json(&json!({ "title": title, "category": category }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    body["id"].as_str().unwrap().to_string()
}

async fn propose_match(
    base_url: &str,
    token: &str,
    need_id: Option<&str>,
    offer_id: Option<&str>,
) -> reqwest::Response {
    let client = reqwest::Client::new();
    client
        .post(format!("{}/api/matches", base_url))
        .bearer_auth(token)
        .json(&json!({ "need_id": need_id, "offer_id": offer_id }))
        .send()
        .await
        .unwrap()
}

async fn transition_match(
    base_url: &str,
    token: &str,
    match_id: &str,
    status: &str,
) -> reqwest::Response {
    let client = reqwest::Client::new();
    client
        .post(format!("{}/api/matches/{}/status", base_url, match_id))
        .bearer_auth(token)
        .json(&json!({ "status": status }))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_end_to_end_requester_helper_flow() {
    let (base_url, _addr) = start_test_server().await;
    let (requester_id, requester_token) = register_user(&base_url, "Rosa", "requester").await;
    let (_helper_id, helper_token) = register_user(&base_url, "Hamid", "helper").await;

    let need_id = create_need(&base_url, &requester_token, "Need a room", "shelter").await;
    let offer_id = create_offer(&base_url, &helper_token, "Spare room", "housing").await;

    // Helper proposes; cross-category shelter/housing is allowed
    let resp = propose_match(&base_url, &helper_token, Some(&need_id), Some(&offer_id)).await;
    assert_eq!(resp.status(), 201);
    let match_body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(match_body["status"], "pending");
    assert!(match_body["responded_by"].is_null());
    let match_id = match_body["id"].as_str().unwrap().to_string();

    // Requester accepts: need cascades to matched, responded_by recorded
    let resp = transition_match(&base_url, &requester_token, &match_id, "accepted").await;
    assert_eq!(resp.status(), 200);
    let accepted: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(accepted["status"], "accepted");
    assert_eq!(accepted["responded_by"], requester_id);

    let client = reqwest::Client::new();
    let need: serde_json::Value = client
        .get(format!("{}/api/needs/{}", base_url, need_id))
        .bearer_auth(&requester_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(need["status"], "matched");

    // Requester completes: need fulfilled, helped_count goes 0 -> 1
    let resp = transition_match(&base_url, &requester_token, &match_id, "completed").await;
    assert_eq!(resp.status(), 200);

    let need: serde_json::Value = client
        .get(format!("{}/api/needs/{}", base_url, need_id))
        .bearer_auth(&requester_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(need["status"], "fulfilled");

    let offer: serde_json::Value = client
        .get(format!("{}/api/offers/{}", base_url, offer_id))
        .bearer_auth(&helper_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(offer["helped_count"], 1);

    // responded_by stays at the first responder
    let final_match: serde_json::Value = client
        .get(format!("{}/api/matches/{}", base_url, match_id))
        .bearer_auth(&helper_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(final_match["responded_by"], requester_id);
}

#[tokio::test]
async fn test_duplicate_pair_is_conflict() {
    let (base_url, _addr) = start_test_server().await;
    let (_r_id, r_token) = register_user(&base_url, "Rita", "requester").await;
    let (_h_id, h_token) = register_user(&base_url, "Hugo", "helper").await;

    let need_id = create_need(&base_url, &r_token, "Food parcels", "food").await;
    let offer_id = create_offer(&base_url, &h_token, "Weekly groceries", "food").await;

    let resp = propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_id)).await;
    assert_eq!(resp.status(), 201);

    // Same pair again, even from the other party, is a conflict
    let resp = propose_match(&base_url, &r_token, Some(&need_id), Some(&offer_id)).await;
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["kind"], "conflict");
}

#[tokio::test]
async fn test_incompatible_categories_rejected() {
    let (base_url, _addr) = start_test_server().await;
    let (_r_id, r_token) = register_user(&base_url, "Rana", "requester").await;
    let (_h_id, h_token) = register_user(&base_url, "Hans", "helper").await;

    let need_id = create_need(&base_url, &r_token, "Prescription refill", "medical").await;
    let offer_id = create_offer(&base_url, &h_token, "Pro bono counsel", "legal").await;

    let resp = propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_id)).await;
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_proposal_requires_need_or_offer() {
    let (base_url, _addr) = start_test_server().await;
    let (_id, token) = register_user(&base_url, "Nils", "helper").await;

    let resp = propose_match(&base_url, &token, None, None).await;
    assert_eq!(resp.status(), 400);

    let resp = propose_match(&base_url, &token, Some("no-such-need"), None).await;
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_terminal_states_reject_all_transitions() {
    let (base_url, _addr) = start_test_server().await;
    let (_r_id, r_token) = register_user(&base_url, "Rami", "requester").await;
    let (_h_id, h_token) = register_user(&base_url, "Hana", "helper").await;

    let need_id = create_need(&base_url, &r_token, "Winter coats", "clothing").await;
    let offer_id = create_offer(&base_url, &h_token, "Coat drive", "clothing").await;

    let resp = propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_id)).await;
    let match_id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = transition_match(&base_url, &r_token, &match_id, "rejected").await;
    assert_eq!(resp.status(), 200);

    for status in ["pending", "accepted", "completed"] {
        let resp = transition_match(&base_url, &r_token, &match_id, status).await;
        assert_eq!(resp.status(), 409, "rejected -> {} should conflict", status);
    }
}

#[tokio::test]
async fn test_helped_count_increments_exactly_once() {
    let (base_url, _addr) = start_test_server().await;
    let (_r_id, r_token) = register_user(&base_url, "Rena", "requester").await;
    let (_h_id, h_token) = register_user(&base_url, "Hal", "helper").await;

    let need_id = create_need(&base_url, &r_token, "Ride to clinic", "transport").await;
    let offer_id = create_offer(&base_url, &h_token, "Car pool seat", "transport").await;

    let resp = propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_id)).await;
    let match_id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    transition_match(&base_url, &r_token, &match_id, "accepted").await;
    let resp = transition_match(&base_url, &r_token, &match_id, "completed").await;
    assert_eq!(resp.status(), 200);

    // A retried completion is rejected by the state machine and must not
    // bump the counter again
    let resp = transition_match(&base_url, &r_token, &match_id, "completed").await;
    assert_eq!(resp.status(), 409);

    let client = reqwest::Client::new();
    let offer: serde_json::Value = client
        .get(format!("{}/api/offers/{}", base_url, offer_id))
        .bearer_auth(&h_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(offer["helped_count"], 1);
}

#[tokio::test]
async fn test_non_party_cannot_transition() {
    let (base_url, _addr) = start_test_server().await;
    let (_r_id, r_token) = register_user(&base_url, "Raya", "requester").await;
    let (_h_id, h_token) = register_user(&base_url, "Hank", "helper").await;
    let (_s_id, s_token) = register_user(&base_url, "Sven", "helper").await;

    let need_id = create_need(&base_url, &r_token, "School books", "education").await;
    let offer_id = create_offer(&base_url, &h_token, "Used textbooks", "education").await;

    let resp = propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_id)).await;
    let match_id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let resp = transition_match(&base_url, &s_token, &match_id, "accepted").await;
    assert_eq!(resp.status(), 403);

    // And the match itself is invisible to outsiders
    let client = reqwest::Client::new();
    let resp = client
        .get(format!("{}/api/matches/{}", base_url, match_id))
        .bearer_auth(&s_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_need_must_be_open_for_new_proposals() {
    let (base_url, _addr) = start_test_server().await;
    let (_r_id, r_token) = register_user(&base_url, "Ruth", "requester").await;
    let (_h_id, h_token) = register_user(&base_url, "Herb", "helper").await;

    let need_id = create_need(&base_url, &r_token, "Temporary housing", "housing").await;
    let offer_a = create_offer(&base_url, &h_token, "Guest room", "housing").await;
    let offer_b = create_offer(&base_url, &h_token, "Studio flat", "shelter").await;

    let resp = propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_a)).await;
    let match_id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();
    transition_match(&base_url, &r_token, &match_id, "accepted").await;

    // Need is now matched, so a second proposal against it conflicts even
    // with a different offer
    let resp = propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_b)).await;
    assert_eq!(resp.status(), 409);
}

#[tokio::test]
async fn test_withdraw_is_initiator_only() {
    let (base_url, _addr) = start_test_server().await;
    let (_r_id, r_token) = register_user(&base_url, "Rhea", "requester").await;
    let (_h_id, h_token) = register_user(&base_url, "Hani", "helper").await;

    let need_id = create_need(&base_url, &r_token, "Legal advice", "legal").await;
    let offer_id = create_offer(&base_url, &h_token, "Legal aid hours", "legal").await;

    let resp = propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_id)).await;
    let match_id = resp.json::<serde_json::Value>().await.unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let client = reqwest::Client::new();

    // The other party cannot withdraw
    let resp = client
        .delete(format!("{}/api/matches/{}", base_url, match_id))
        .bearer_auth(&r_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    // The initiator can
    let resp = client
        .delete(format!("{}/api/matches/{}", base_url, match_id))
        .bearer_auth(&h_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 204);

    let resp = client
        .get(format!("{}/api/matches/{}", base_url, match_id))
        .bearer_auth(&h_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn test_list_matches_is_party_scoped() {
    let (base_url, _addr) = start_test_server().await;
    let (_r_id, r_token) = register_user(&base_url, "Rina", "requester").await;
    let (_h_id, h_token) = register_user(&base_url, "Hiro", "helper").await;
    let (_s_id, s_token) = register_user(&base_url, "Sol", "helper").await;

    let need_id = create_need(&base_url, &r_token, "Bus fare", "transport").await;
    let offer_id = create_offer(&base_url, &h_token, "Transit passes", "transport").await;
    propose_match(&base_url, &h_token, Some(&need_id), Some(&offer_id)).await;

    let client = reqwest::Client::new();

    for token in [&r_token, &h_token] {
        let matches: serde_json::Value = client
            .get(format!("{}/api/matches", base_url))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(matches.as_array().unwrap().len(), 1);
    }

    let matches: serde_json::Value = client
        .get(format!("{}/api/matches", base_url))
        .bearer_auth(&s_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(matches.as_array().unwrap().is_empty());
}
