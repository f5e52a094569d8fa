// Cache preference order, disk fallback, forced reissue and graceful
// degradation, each against a counting mock identity provider.

use std::time::Duration;

use http::StatusCode;
use serde_json::{json, Value};

use crate::error::TokenError;
use crate::manager::{authorization_header, TokenManager};
use crate::tests::common::*;

const MARGIN: i64 = 20;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn new_token_is_issued_persisted_and_reused() {
    let exp = now() as u64 + 3600;
    let jwt = sample_jwt(exp);
    let idp = MockIdp::start(IdpBehavior::issuing(&jwt)).await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    let token = manager.get_token().await.expect("token issued");
    assert_eq!(token.value, jwt);
    assert_eq!(token.expires_at, exp);
    assert!(token.expires_at as i64 > now() + MARGIN);
    assert_eq!(idp.discovery_requests(), 1);
    assert_eq!(idp.token_requests(), 1);

    // client-credentials form
    let forms = idp.token_forms.lock().unwrap().clone();
    assert_eq!(forms[0].get("grant_type").map(String::as_str), Some("client_credentials"));
    assert_eq!(forms[0].get("client_id").map(String::as_str), Some(CLIENT_ID));
    assert_eq!(forms[0].get("client_secret").map(String::as_str), Some(CLIENT_SECRET));

    // persisted record
    let persisted = read_token_file(&path);
    assert_eq!(persisted["token"], json!(jwt));
    assert_eq!(persisted["expired_timestamp"], json!(exp));
    let last_update = persisted["last_update"].as_i64().unwrap();
    assert!((now() - last_update).abs() <= 5);

    let again = manager.get_token().await.unwrap();
    assert_eq!(again, token);
    assert_eq!(idp.token_requests(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn valid_memory_token_needs_no_disk_or_network() {
    let idp = MockIdp::start(IdpBehavior::issuing(&sample_jwt(now() as u64 + 3600))).await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    let first = manager.get_token().await.unwrap();
    std::fs::remove_file(&path).unwrap();

    let second = manager.get_token().await.unwrap();
    assert_eq!(second, first);
    assert_eq!(idp.discovery_requests(), 1);
    assert_eq!(idp.token_requests(), 1);
    assert!(!path.exists(), "memory hit must not write the token file");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn valid_persisted_token_is_used_without_network() {
    let idp = MockIdp::start(IdpBehavior::issuing("should-not-be-issued")).await;
    let (_dir, path) = temp_token_path();
    write_token_file(&path, "xyz", now() + 3600, now() - 10);
    let manager = manager_for(&idp.base_url, &path);

    let token = manager.get_token().await.unwrap();
    assert_eq!(token.value, "xyz");
    assert_eq!(idp.discovery_requests(), 0);
    assert_eq!(idp.token_requests(), 0);

    // adopted into memory: still served once the file is gone
    std::fs::remove_file(&path).unwrap();
    assert_eq!(manager.current().await.map(|t| t.value), Some("xyz".to_owned()));
    assert_eq!(manager.get_token().await.unwrap().value, "xyz");
    assert_eq!(idp.token_requests(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_persisted_token_is_replaced() {
    let jwt = sample_jwt(now() as u64 + 1800);
    let idp = MockIdp::start(IdpBehavior::issuing(&jwt)).await;
    let (_dir, path) = temp_token_path();
    write_token_file(&path, "abc", now() - 100, now() - 200);
    let manager = manager_for(&idp.base_url, &path);

    let token = manager.get_token().await.unwrap();
    assert_eq!(token.value, jwt);
    assert_eq!(idp.token_requests(), 1);

    let persisted = read_token_file(&path);
    assert_eq!(persisted["token"], json!(jwt));
    assert!(persisted["expired_timestamp"].as_i64().unwrap() > now());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn persisted_token_inside_safety_margin_is_replaced() {
    let idp = MockIdp::start(IdpBehavior::issuing(&sample_jwt(now() as u64 + 900))).await;
    let (_dir, path) = temp_token_path();
    write_token_file(&path, "almost-expired", now() + 10, now() - 3590);
    let manager = manager_for(&idp.base_url, &path);

    let token = manager.get_token().await.unwrap();
    assert_ne!(token.value, "almost-expired");
    assert_eq!(idp.token_requests(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn corrupt_token_file_is_treated_as_missing() {
    let corrupt = [
        "{not json".to_owned(),
        json!({ "token": "abc", "last_update": now() }).to_string(),
        json!({ "token": "", "expired_timestamp": now() + 3600 }).to_string(),
        json!({ "token": "abc", "expired_timestamp": "tomorrow" }).to_string(),
    ];

    for content in corrupt {
        let jwt = sample_jwt(now() as u64 + 600);
        let idp = MockIdp::start(IdpBehavior::issuing(&jwt)).await;
        let (_dir, path) = temp_token_path();
        std::fs::write(&path, &content).unwrap();
        let manager = manager_for(&idp.base_url, &path);

        let token = manager.get_token().await.unwrap_or_else(|e| panic!("{content}: {e}"));
        assert_eq!(token.value, jwt, "content: {content}");
        assert_eq!(idp.token_requests(), 1, "content: {content}");
        assert_eq!(read_token_file(&path)["token"], json!(jwt));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn persistence_failure_still_returns_token() {
    let jwt = sample_jwt(now() as u64 + 3600);
    let idp = MockIdp::start(IdpBehavior::issuing(&jwt)).await;
    let (dir, _) = temp_token_path();
    // parent of the token file is a regular file: reads and writes both fail
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    let path = blocker.join("token.json");
    let manager = manager_for(&idp.base_url, &path);

    let token = manager.get_token().await.expect("write failure is not surfaced");
    assert_eq!(token.value, jwt);

    let again = manager.get_token().await.unwrap();
    assert_eq!(again.value, jwt);
    assert_eq!(idp.token_requests(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn opaque_token_gets_default_lifetime() {
    let idp = MockIdp::start(IdpBehavior::issuing("opaque-token")).await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    let token = manager.get_token().await.unwrap();
    let expected = now() + 3600;
    assert!((token.expires_at as i64 - expected).abs() <= 5);
    assert_eq!(read_token_file(&path)["expired_timestamp"], json!(token.expires_at));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expires_in_is_used_when_token_has_no_claim() {
    let idp = MockIdp::start(IdpBehavior::issuing_sequence(vec![
        json!({ "access_token": "opaque-token", "expires_in": 300 }),
    ]))
    .await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    let token = manager.get_token().await.unwrap();
    assert!((token.expires_at as i64 - (now() + 300)).abs() <= 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn loosely_typed_expires_in_does_not_block_issuance() {
    let cases = [
        (json!("300"), 300),
        (json!(300.0), 300),
        (json!(-1), 3600),
        (json!("soon"), 3600),
        (Value::Null, 3600),
    ];
    for (expires_in, lifetime) in cases {
        let idp = MockIdp::start(IdpBehavior::issuing_sequence(vec![
            json!({ "access_token": "opaque-token", "expires_in": expires_in }),
        ]))
        .await;
        let (_dir, path) = temp_token_path();
        let manager = manager_for(&idp.base_url, &path);

        let token = manager
            .get_token()
            .await
            .unwrap_or_else(|e| panic!("expires_in {expires_in}: {e}"));
        assert_eq!(token.value, "opaque-token");
        assert!(
            (token.expires_at as i64 - (now() + lifetime)).abs() <= 5,
            "expires_in {expires_in}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn token_expiring_on_issue_is_not_handed_out() {
    let idp = MockIdp::start(IdpBehavior::issuing(&sample_jwt(now() as u64 + 5))).await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    let err = manager.get_token().await.unwrap_err();
    assert!(matches!(err, TokenError::TokenEndpoint(_)), "{err}");
    assert!(!path.exists());
    assert!(manager.current().await.is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn provider_failure_never_returns_stale_token() {
    let mut behavior = IdpBehavior::issuing("unused");
    behavior.token_status = StatusCode::SERVICE_UNAVAILABLE;
    let idp = MockIdp::start(behavior).await;
    let (_dir, path) = temp_token_path();
    write_token_file(&path, "abc", now() - 100, now() - 200);
    let manager = manager_for(&idp.base_url, &path);

    let err = manager.get_token().await.unwrap_err();
    assert!(matches!(err, TokenError::TokenEndpoint(ref m) if m.contains("503")), "{err}");
    assert_eq!(read_token_file(&path)["token"], json!("abc"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidate_forces_new_acquisition() {
    let exp = now() as u64 + 3600;
    let (first, second) = (sample_jwt(exp), sample_jwt(exp + 1));
    let idp = MockIdp::start(IdpBehavior::issuing_sequence(vec![
        json!({ "access_token": first }),
        json!({ "access_token": second }),
    ]))
    .await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    assert_eq!(manager.get_token().await.unwrap().value, first);
    manager.invalidate().await;
    assert!(!path.exists());
    assert!(manager.current().await.is_none());

    assert_eq!(manager.get_token().await.unwrap().value, second);
    assert_eq!(idp.token_requests(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn expired_memory_token_is_replaced() {
    let short_lived = sample_jwt(now() as u64 + MARGIN as u64 + 3);
    let long_lived = sample_jwt(now() as u64 + 3600);
    let idp = MockIdp::start(IdpBehavior::issuing_sequence(vec![
        json!({ "access_token": short_lived }),
        json!({ "access_token": long_lived }),
    ]))
    .await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    let first = manager.get_token().await.unwrap();
    assert_eq!(first.value, short_lived);
    assert_eq!(idp.token_requests(), 1);

    // let the in-memory (and persisted) record fall inside the margin
    tokio::time::sleep(Duration::from_secs(4)).await;
    assert!(!first.is_fresh_at(now() as u64, MARGIN as u64));
    assert!(manager.current().await.is_none());

    let second = manager.get_token().await.unwrap();
    assert_eq!(second.value, long_lived);
    assert_eq!(idp.token_requests(), 2);
    assert_eq!(read_token_file(&path)["token"], json!(long_lived));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidate_with_undeletable_file_still_succeeds() {
    let exp = now() as u64 + 3600;
    let (first, second) = (sample_jwt(exp), sample_jwt(exp + 1));
    let idp = MockIdp::start(IdpBehavior::issuing_sequence(vec![
        json!({ "access_token": first }),
        json!({ "access_token": second }),
    ]))
    .await;
    // a directory at the token path: reads, writes and removal all fail
    let (_dir, path) = temp_token_path();
    std::fs::create_dir(&path).unwrap();
    std::fs::write(path.join("keep"), "x").unwrap();
    let manager = manager_for(&idp.base_url, &path);

    assert_eq!(manager.get_token().await.unwrap().value, first);
    manager.invalidate().await;
    assert!(manager.current().await.is_none());
    assert!(path.is_dir());

    assert_eq!(manager.get_token().await.unwrap().value, second);
    assert_eq!(idp.token_requests(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalidate_token_only_drops_the_rejected_value() {
    let exp = now() as u64 + 3600;
    let (first, second) = (sample_jwt(exp), sample_jwt(exp + 1));
    let idp = MockIdp::start(IdpBehavior::issuing_sequence(vec![
        json!({ "access_token": first }),
        json!({ "access_token": second }),
    ]))
    .await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    assert_eq!(manager.get_token().await.unwrap().value, first);
    assert!(!manager.invalidate_token("some-older-token").await);
    assert_eq!(manager.get_token().await.unwrap().value, first);
    assert_eq!(idp.token_requests(), 1);

    assert!(manager.invalidate_token(&first).await);
    assert_eq!(manager.get_token().await.unwrap().value, second);
    assert_eq!(idp.token_requests(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_manager_picks_up_persisted_token() {
    let jwt = sample_jwt(now() as u64 + 3600);
    let idp = MockIdp::start(IdpBehavior::issuing(&jwt)).await;
    let (_dir, path) = temp_token_path();

    let first_run = manager_for(&idp.base_url, &path);
    first_run.get_token().await.unwrap();
    drop(first_run);

    let second_run = manager_for(&idp.base_url, &path);
    assert_eq!(second_run.get_token().await.unwrap().value, jwt);
    assert_eq!(idp.token_requests(), 1);
}

#[tokio::test]
async fn empty_credentials_fail_at_construction() {
    let (_dir, path) = temp_token_path();
    let mut identity = identity_for("http://127.0.0.1:1", &path);
    identity.client_secret = String::new();

    let err = TokenManager::new(&identity, &test_settings()).err().expect("must fail");
    assert!(matches!(err, TokenError::Configuration(ref m) if m.contains("client_secret")), "{err}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bearer_provider_yields_authorization_header() {
    let jwt = sample_jwt(now() as u64 + 3600);
    let idp = MockIdp::start(IdpBehavior::issuing(&jwt)).await;
    let (_dir, path) = temp_token_path();
    let manager = manager_for(&idp.base_url, &path);

    assert_eq!(authorization_header(&manager).await.unwrap(), format!("Bearer {}", jwt));
}
