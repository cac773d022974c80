//! Identity-provider hook integration tests.

mod common;

use common::TestHarness;
use serde_json::json;

use commutecast_store::Store;

#[tokio::test]
async fn post_confirmation_creates_the_profile() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .post("/hooks/post-confirmation")
        .json(&json!({
            "userId": harness.test_user_id.to_string(),
            "email": "a@example.com"
        }))
        .await;

    response.assert_status_ok();
    let profile = harness
        .store
        .get_profile(&harness.test_user_id)
        .unwrap()
        .unwrap();
    assert_eq!(profile.email, "a@example.com");
    assert_eq!(profile.route_count, 0);
}

#[tokio::test]
async fn duplicate_hook_is_ignored_and_keeps_created_at() {
    let harness = TestHarness::new();
    let payload = json!({
        "userId": harness.test_user_id.to_string(),
        "email": "a@example.com"
    });

    harness
        .server
        .post("/hooks/post-confirmation")
        .json(&payload)
        .await
        .assert_status_ok();
    let first = harness
        .store
        .get_profile(&harness.test_user_id)
        .unwrap()
        .unwrap();

    // Second delivery of the same hook.
    harness
        .server
        .post("/hooks/post-confirmation")
        .json(&json!({
            "userId": harness.test_user_id.to_string(),
            "email": "changed@example.com"
        }))
        .await
        .assert_status_ok();

    let second = harness
        .store
        .get_profile(&harness.test_user_id)
        .unwrap()
        .unwrap();
    assert_eq!(second.email, "a@example.com");
    assert_eq!(second.created_at, first.created_at);
}

#[tokio::test]
async fn missing_attributes_block_confirmation() {
    let harness = TestHarness::new();

    harness
        .server
        .post("/hooks/post-confirmation")
        .json(&json!({ "userId": harness.test_user_id.to_string() }))
        .await
        .assert_status_bad_request();

    harness
        .server
        .post("/hooks/post-confirmation")
        .json(&json!({ "email": "a@example.com" }))
        .await
        .assert_status_bad_request();

    assert!(harness
        .store
        .get_profile(&harness.test_user_id)
        .unwrap()
        .is_none());
}
