// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serde_json::json;

use super::*;
use crate::credential::refresh::REFRESH_PATH;
use crate::http::{Body, Method};
use crate::test_support::{bearer, seeded_credentials, FakeTransport, Reply};

/// Server that accepts only `Bearer <valid>` and issues `A2` on refresh.
fn rotating_server(valid: &'static str, refresh_delay_ms: u64) -> Arc<FakeTransport> {
    FakeTransport::new(move |req| {
        if req.path == REFRESH_PATH {
            return Reply::json(200, json!({ "access_token": "A2", "token_type": "Bearer" }))
                .after(refresh_delay_ms);
        }
        if bearer(req) == Some(format!("Bearer {valid}")) {
            Reply::json(200, json!({ "path": req.path })).after(10)
        } else {
            Reply::json(401, json!({ "detail": "Could not validate credentials" })).after(10)
        }
    })
}

fn auth_headers(transport: &FakeTransport, path: &str) -> Vec<Option<String>> {
    transport.requests().iter().filter(|r| r.path == path).map(bearer).collect()
}

#[tokio::test(start_paused = true)]
async fn attaches_stored_credential() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = rotating_server("A1", 0);
    let client = AuthenticatedClient::new(transport.clone(), creds);

    let resp = client.request(ApiRequest::get("/api/messages/unread/count")).await?;
    assert_eq!(resp.status, 200);
    assert_eq!(auth_headers(&transport, "/api/messages/unread/count"), vec![Some("Bearer A1".into())]);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn concurrent_unauthorized_requests_share_one_refresh() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = rotating_server("A2", 50);
    let client = AuthenticatedClient::new(transport.clone(), creds.clone());

    let (c1, c2, c3) = tokio::join!(
        client.request(ApiRequest::get("/api/c1")),
        client.request(ApiRequest::get("/api/c2")),
        client.request(ApiRequest::get("/api/c3")),
    );
    assert_eq!(c1?.status, 200);
    assert_eq!(c2?.status, 200);
    assert_eq!(c3?.status, 200);

    assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
    for path in ["/api/c1", "/api/c2", "/api/c3"] {
        assert_eq!(
            auth_headers(&transport, path),
            vec![Some("Bearer A1".to_owned()), Some("Bearer A2".to_owned())],
            "{path} should be replayed once with the refreshed token"
        );
    }
    assert_eq!(creds.get()?.access.map(|a| a.token).as_deref(), Some("A2"));
    assert!(!client.coordinator().is_refreshing());
    assert_eq!(client.coordinator().queued(), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refresh_sends_stored_refresh_token() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = rotating_server("A2", 0);
    let client = AuthenticatedClient::new(transport.clone(), creds.clone());

    client.request(ApiRequest::get("/api/x")).await?;

    let refresh = transport.requests().into_iter().find(|r| r.path == REFRESH_PATH);
    let body = refresh.map(|r| r.body);
    assert_eq!(body, Some(Body::Json(json!({ "refresh_token": "R1" }))));
    // Server did not rotate the refresh token, so the old one is kept.
    assert_eq!(creds.get()?.refresh_token.as_deref(), Some("R1"));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn failed_refresh_expires_every_waiter() -> anyhow::Result<()> {
    let (store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = FakeTransport::new(|req| {
        if req.path == REFRESH_PATH {
            return Reply::json(401, json!({ "detail": "refresh token revoked" })).after(30);
        }
        Reply::status(401).after(10)
    });
    let client = AuthenticatedClient::new(transport.clone(), creds);
    let mut events = client.subscribe();

    let (c1, c2, c3) = tokio::join!(
        client.request(ApiRequest::get("/api/c1")),
        client.request(ApiRequest::get("/api/c2")),
        client.request(ApiRequest::get("/api/c3")),
    );
    for result in [c1, c2, c3] {
        let err = result.err().map(|e| e.code);
        assert_eq!(err, Some(ErrorCode::SessionExpired));
    }
    assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
    // No replays after a failed refresh.
    assert_eq!(transport.count(Method::Get, "/api/"), 3);
    assert!(store.keys().is_empty());
    assert!(matches!(events.try_recv(), Ok(SessionEvent::LoggedOut { .. })));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn refresh_network_failure_forces_logout() -> anyhow::Result<()> {
    let (store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = FakeTransport::new(|req| {
        if req.path == REFRESH_PATH {
            return Reply::network().after(20_000);
        }
        Reply::status(401)
    });
    let client = AuthenticatedClient::new(transport, creds);

    let err = client.request(ApiRequest::get("/api/x")).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::SessionExpired));
    assert!(store.keys().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn second_unauthorized_is_terminal() -> anyhow::Result<()> {
    let (store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    // Refresh succeeds but the server keeps rejecting the new token.
    let transport = rotating_server("nobody", 0);
    let client = AuthenticatedClient::new(transport.clone(), creds);

    let err = client.request(ApiRequest::get("/api/x")).await.err();
    assert_eq!(err.as_ref().map(|e| e.code), Some(ErrorCode::SessionExpired));
    assert_eq!(err.and_then(|e| e.status), Some(401));
    assert_eq!(transport.count(Method::Get, "/api/x"), 2);
    assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
    assert!(store.keys().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn forbidden_clears_session_without_refresh() -> anyhow::Result<()> {
    let (store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = FakeTransport::new(|_| Reply::status(403));
    let client = AuthenticatedClient::new(transport.clone(), creds);

    let err = client.request(ApiRequest::get("/api/admin")).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::SessionExpired));
    assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    assert!(store.keys().is_empty());
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn missing_refresh_token_expires_without_calling_endpoint() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(Some("A1"), None)?;
    let transport = FakeTransport::new(|_| Reply::status(401));
    let client = AuthenticatedClient::new(transport.clone(), creds);

    let err = client.request(ApiRequest::get("/api/x")).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::SessionExpired));
    assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn request_started_mid_refresh_waits_for_new_token() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = rotating_server("A2", 100);
    let client = Arc::new(AuthenticatedClient::new(transport.clone(), creds));

    let first = {
        let client = Arc::clone(&client);
        tokio::spawn(async move { client.request(ApiRequest::get("/api/first")).await })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(client.coordinator().is_refreshing());

    let late = client.request(ApiRequest::get("/api/late")).await?;
    assert_eq!(late.status, 200);
    assert_eq!(auth_headers(&transport, "/api/late"), vec![Some("Bearer A2".into())]);
    assert_eq!(first.await??.status, 200);
    assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn late_unauthorized_after_refresh_replays_without_second_refresh() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = FakeTransport::new(|req| {
        if req.path == REFRESH_PATH {
            return Reply::json(200, json!({ "access_token": "A2" })).after(10);
        }
        let delay = if req.path == "/api/slow" { 200 } else { 10 };
        match bearer(req).as_deref() {
            Some("Bearer A2") => Reply::status(200).after(delay),
            _ => Reply::status(401).after(delay),
        }
    });
    let client = AuthenticatedClient::new(transport.clone(), creds);

    let (slow, fast) = tokio::join!(
        client.request(ApiRequest::get("/api/slow")),
        client.request(ApiRequest::get("/api/fast")),
    );
    assert_eq!(slow?.status, 200);
    assert_eq!(fast?.status, 200);
    assert_eq!(transport.count(Method::Post, REFRESH_PATH), 1);
    assert_eq!(
        auth_headers(&transport, "/api/slow"),
        vec![Some("Bearer A1".into()), Some("Bearer A2".into())]
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn validation_errors_are_flattened_and_keep_session() -> anyhow::Result<()> {
    let (store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = FakeTransport::new(|_| {
        Reply::json(
            422,
            json!({ "detail": [{ "loc": ["body", "content"], "msg": "must not be empty" }] }),
        )
    });
    let client = AuthenticatedClient::new(transport, creds);

    let err = client.request(ApiRequest::post_json("/api/messages/", json!({}))).await.err();
    let err = err.ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert_eq!(err.code, ErrorCode::Validation);
    assert_eq!(err.status, Some(422));
    assert_eq!(err.message, "content: must not be empty");
    assert_eq!(store.keys().len(), 3);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn network_failure_is_not_retried() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = FakeTransport::new(|_| Reply::network());
    let client = AuthenticatedClient::new(transport.clone(), creds);

    let err = client.request(ApiRequest::get("/api/x")).await.err();
    assert_eq!(err.map(|e| e.code), Some(ErrorCode::Network));
    assert_eq!(transport.requests().len(), 1);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn login_stores_credential_and_notifies() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(None, None)?;
    let transport = FakeTransport::new(|req| {
        if req.path == LOGIN_PATH {
            return Reply::json(
                200,
                json!({ "access_token": "L1", "token_type": "bearer", "refresh_token": "LR1" }),
            );
        }
        Reply::status(404)
    });
    let client = AuthenticatedClient::new(transport.clone(), creds.clone());
    let mut events = client.subscribe();

    assert!(!client.is_signed_in()?);
    client.login("seller", "hunter2").await?;
    assert!(client.is_signed_in()?);
    assert_eq!(events.try_recv().ok(), Some(SessionEvent::LoggedIn));

    let cred = creds.get()?;
    assert_eq!(cred.access.map(|a| a.authorization()).as_deref(), Some("Bearer L1"));
    assert_eq!(cred.refresh_token.as_deref(), Some("LR1"));

    let login = transport.requests().into_iter().find(|r| r.path == LOGIN_PATH);
    assert_eq!(
        login.map(|r| r.body),
        Some(Body::Form(vec![
            ("username".into(), "seller".into()),
            ("password".into(), "hunter2".into()),
        ]))
    );
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rejected_login_is_unauthenticated_and_never_refreshes() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(None, Some("R1"))?;
    let transport = FakeTransport::new(|_| {
        Reply::json(401, json!({ "detail": "Incorrect username or password" }))
    });
    let client = AuthenticatedClient::new(transport.clone(), creds);

    let err = client.login("seller", "wrong").await.err();
    let err = err.ok_or_else(|| anyhow::anyhow!("expected an error"))?;
    assert_eq!(err.code, ErrorCode::Unauthenticated);
    assert_eq!(err.message, "Incorrect username or password");
    assert_eq!(transport.count(Method::Post, REFRESH_PATH), 0);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn logout_clears_credentials() -> anyhow::Result<()> {
    let (store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let client = AuthenticatedClient::new(FakeTransport::new(|_| Reply::status(200)), creds);
    let mut events = client.subscribe();

    client.logout()?;
    assert!(store.keys().is_empty());
    assert!(matches!(events.try_recv(), Ok(SessionEvent::LoggedOut { .. })));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn token_endpoints_never_trigger_refresh() -> anyhow::Result<()> {
    let (_store, creds) = seeded_credentials(Some("A1"), Some("R1"))?;
    let transport = FakeTransport::new(|req| {
        if req.path.starts_with(LOGIN_PATH) {
            return Reply::json(401, json!({ "detail": "Invalid refresh token" }));
        }
        Reply::status(200)
    });
    let client = AuthenticatedClient::new(transport.clone(), creds);

    let err = client
        .request(ApiRequest::post_json(REFRESH_PATH, json!({ "refresh_token": "bogus" })))
        .await
        .err();
    assert_eq!(err.map(|e| e.status), Some(Some(401)));
    let err = client.request(ApiRequest::get("/auth/token/")).await.err();
    assert_eq!(err.map(|e| e.status), Some(Some(401)));

    // One request each, no refresh round, session untouched.
    assert_eq!(transport.requests().len(), 2);
    assert!(!client.coordinator().is_refreshing());
    assert!(client.is_signed_in()?);
    Ok(())
}
