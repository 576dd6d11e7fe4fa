mod support;

use std::sync::Arc;

use athlete_report::api::{
    BillingInterval, CheckoutRequest, CheckoutSession, RegisterRequest, Role, VideoHost,
    CHECKOUT_ENDPOINT, CURRENT_USER_ENDPOINT, DELETE_REPORTS_ENDPOINT, LOGIN_ENDPOINT,
    UPLOAD_ENDPOINT, VIDEO_URL_ENDPOINT,
};
use athlete_report::client::{ApiRequest, ApiResponse, ClientError, RequestBody};
use athlete_report::model::ReportError;
use athlete_report::session::{TokenPair, TokenStore};
use reqwest::{Method, StatusCode};
use serde_json::json;

use support::{client_with, json_body, ok, rotating_backend, ScriptedTransport};

fn report_listing() -> serde_json::Value {
    json!([
        {
            "id": 7,
            "filename": "match_7.csv",
            "uploaded_at": "2024-03-01T10:00:00Z",
            "file_size_mb": 1.25,
            "uploaded_by": "coach",
            "pdf_data": {
                "athlete_name": "Ana Souza",
                "win/loss_ratio": ["3 wins", "1 loss"],
                "graph_data": {
                    "offense_successes": { "labels": ["Armbar", "Triangle"], "values": [2, 1] }
                }
            }
        },
        { "id": 9, "filename": "match_9.csv", "uploaded_at": "2024-03-02T10:00:00Z" }
    ])
}

#[tokio::test]
async fn login_stores_the_issued_pair() {
    let transport = Arc::new(ScriptedTransport::new(|request| {
        assert!(request.url.ends_with(LOGIN_ENDPOINT));
        assert!(request.bearer.is_none());
        ok(json!({ "access": "A1", "refresh": "R1" }))
    }));
    let (client, store) = client_with(transport.clone(), None);

    let pair = client.login("ana", "secret").await.unwrap();

    assert_eq!(pair, TokenPair::new("A1", "R1"));
    assert_eq!(store.load(), Some(pair));
    let body = json_body(&transport.requests()[0]);
    assert_eq!(body, json!({ "username": "ana", "password": "secret" }));
}

#[tokio::test]
async fn register_sends_the_subscription_form() {
    let transport = Arc::new(ScriptedTransport::new(|_| {
        ok(json!({ "checkout_url": "https://pay.example.com/session/1" }))
    }));
    let (client, store) = client_with(transport.clone(), None);

    let request = RegisterRequest::new("ana", "ana@example.com", "secret").with_plan("pro", "year");
    let response = client.register(&request).await.unwrap();

    assert_eq!(
        response.checkout_url.as_deref(),
        Some("https://pay.example.com/session/1")
    );
    assert_eq!(store.load(), None, "no tokens were issued");
    let body = json_body(&transport.requests()[0]);
    assert_eq!(body["password2"], "secret");
    assert_eq!(body["type"], "subscription");
    assert_eq!(body["plan"], "pro");
    assert_eq!(body["interval"], "year");
}

#[tokio::test]
async fn register_rejects_mismatched_passwords_locally() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(json!({}))));
    let (client, _) = client_with(transport.clone(), None);

    let mut request = RegisterRequest::new("ana", "ana@example.com", "secret");
    request.password2 = "other".to_string();

    let err = client.register(&request).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest(_)));
    assert!(transport.requests().is_empty());
}

#[tokio::test]
async fn athletes_excludes_admins() {
    let transport = Arc::new(ScriptedTransport::new(|_| {
        ok(json!([
            { "id": 1, "email": "root@example.com", "username": "root", "role": "admin" },
            { "id": 2, "email": "ana@example.com", "username": "ana", "role": "athlete" }
        ]))
    }));
    let (client, _) = client_with(transport, Some(TokenPair::new("A1", "R1")));

    let athletes = client.athletes().await.unwrap();
    assert_eq!(athletes.len(), 1);
    assert_eq!(athletes[0].username, "ana");
    assert_eq!(athletes[0].role, Role::Athlete);
}

#[tokio::test]
async fn report_listing_is_parsed_with_defaults() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(report_listing())));
    let (client, _) = client_with(transport, Some(TokenPair::new("A1", "R1")));

    let reports = client.list_reports().await.unwrap();
    assert_eq!(reports.len(), 2);
    let first = &reports[0];
    assert_eq!(first.pdf_data.athlete_name, "Ana Souza");
    assert_eq!(first.pdf_data.win_loss_ratio, vec!["3 wins", "1 loss"]);
    assert_eq!(
        first.pdf_data.graph_data.offense_successes.values,
        vec![2.0, 1.0]
    );
    assert!(reports[1].pdf_data.submissions.is_empty());
    assert!(reports[1].pdf_data.graph_data.defense_attempts.is_empty());
}

#[tokio::test]
async fn misaligned_series_is_rejected_at_the_boundary() {
    let transport = Arc::new(ScriptedTransport::new(|_| {
        ok(json!([{
            "id": 3,
            "filename": "broken.csv",
            "uploaded_at": "2024-03-01T10:00:00Z",
            "pdf_data": {
                "graph_data": {
                    "defense_attempts": { "labels": ["Sweep", "Guard pass"], "values": [4] }
                }
            }
        }]))
    }));
    let (client, _) = client_with(transport, Some(TokenPair::new("A1", "R1")));

    let err = client.list_reports().await.unwrap_err();
    match err {
        ClientError::Report(ReportError::MisalignedSeries {
            report_id,
            labels,
            values,
            ..
        }) => {
            assert_eq!(report_id, 3);
            assert_eq!((labels, values), (2, 1));
        }
        other => panic!("expected misaligned series, got {other:?}"),
    }
}

#[tokio::test]
async fn query_parameters_reach_the_transport() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(json!([]))));
    let (client, _) = client_with(transport.clone(), Some(TokenPair::new("A1", "R1")));

    client
        .send(ApiRequest::get("/reports/my-files/").with_query("page", "2"))
        .await
        .unwrap();

    let request = &transport.requests()[0];
    assert_eq!(request.query, vec![("page".to_string(), "2".to_string())]);
    assert_eq!(request.url, format!("{}/reports/my-files/", support::BASE_URL));
}

#[tokio::test]
async fn fetch_report_reports_unknown_ids() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(report_listing())));
    let (client, _) = client_with(transport, Some(TokenPair::new("A1", "R1")));

    assert_eq!(client.fetch_report(9).await.unwrap().filename, "match_9.csv");
    let err = client.fetch_report(42).await.unwrap_err();
    assert!(matches!(err, ClientError::Report(ReportError::NotFound(42))));
}

#[tokio::test]
async fn delete_sends_keys_and_requires_a_selection() {
    let transport = Arc::new(ScriptedTransport::new(|_| {
        ApiResponse::new(StatusCode::NO_CONTENT, Vec::new())
    }));
    let (client, _) = client_with(transport.clone(), Some(TokenPair::new("A1", "R1")));

    let err = client.delete_reports(&[]).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest(_)));
    assert!(transport.requests().is_empty());

    let keys = vec!["match_7.csv".to_string(), "match_9.csv".to_string()];
    client.delete_reports(&keys).await.unwrap();
    let request = &transport.requests()[0];
    assert_eq!(request.method, Method::DELETE);
    assert!(request.url.ends_with(DELETE_REPORTS_ENDPOINT));
    assert_eq!(json_body(request), json!({ "keys": keys }));
}

#[tokio::test]
async fn video_links_are_checked_before_submission() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(json!({ "status": "queued" }))));
    let (client, _) = client_with(transport.clone(), Some(TokenPair::new("A1", "R1")));

    let err = client
        .submit_video_url("https://vimeo.com/12345")
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest(_)));
    assert!(transport.requests().is_empty());

    let host = client
        .submit_video_url("https://youtu.be/dQw4w9WgXcQ")
        .await
        .unwrap();
    assert_eq!(host, VideoHost::YouTube);
    let request = &transport.requests()[0];
    assert!(request.url.ends_with(VIDEO_URL_ENDPOINT));
    assert_eq!(
        json_body(request),
        json!({ "video_url": "https://youtu.be/dQw4w9WgXcQ" })
    );
}

#[tokio::test]
async fn upload_is_sent_as_a_file_part() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(json!({ "ok": true }))));
    let (client, _) = client_with(transport.clone(), Some(TokenPair::new("A1", "R1")));

    let err = client
        .upload_report_file("empty.csv", Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidRequest(_)));

    client
        .upload_report_file("match.csv", b"round,points\n1,2\n".to_vec())
        .await
        .unwrap();
    let request = &transport.requests()[0];
    assert!(request.url.ends_with(UPLOAD_ENDPOINT));
    match &request.body {
        RequestBody::File {
            field,
            filename,
            bytes,
        } => {
            assert_eq!(field, "file");
            assert_eq!(filename, "match.csv");
            assert_eq!(bytes.as_slice(), b"round,points\n1,2\n");
        }
        other => panic!("expected a file body, got {other:?}"),
    }
}

#[tokio::test]
async fn checkout_session_follows_the_returned_action() {
    let transport = Arc::new(ScriptedTransport::new(|request| {
        if json_body(request)["type"] == "one_time" {
            ok(json!({
                "action": "new_subscription",
                "checkout_url": "https://pay.example.com/session/2"
            }))
        } else {
            ok(json!({
                "action": "manage_existing",
                "billing_portal_url": "https://pay.example.com/portal"
            }))
        }
    }));
    let (client, _) = client_with(transport.clone(), Some(TokenPair::new("A1", "R1")));

    let session = client
        .create_checkout_session(&CheckoutRequest::subscription("pro", BillingInterval::Month))
        .await
        .unwrap();
    assert_eq!(
        session,
        CheckoutSession::ManageExisting {
            billing_portal_url: "https://pay.example.com/portal".to_string()
        }
    );

    let session = client
        .create_checkout_session(&CheckoutRequest::pdf_report())
        .await
        .unwrap();
    assert_eq!(session.url(), "https://pay.example.com/session/2");

    let requests = transport.requests();
    assert!(requests.iter().all(|r| r.url.ends_with(CHECKOUT_ENDPOINT)));
    assert_eq!(
        json_body(&requests[0]),
        json!({ "type": "subscription", "plan": "pro", "interval": "month" })
    );
    assert_eq!(requests[1].authorization().as_deref(), Some("Bearer A1"));
}

#[tokio::test]
async fn typed_calls_recover_from_expiry_too() {
    let transport = Arc::new(ScriptedTransport::new(|request| {
        if request.url.ends_with(CURRENT_USER_ENDPOINT) && request.bearer.as_deref() == Some("A2") {
            return ok(json!({
                "id": 2, "email": "ana@example.com", "username": "ana", "role": "athlete"
            }));
        }
        rotating_backend(request)
    }));
    let (client, store) = client_with(transport.clone(), Some(TokenPair::new("A1", "R1")));

    let user = client.current_user().await.unwrap();
    assert_eq!(user.username, "ana");
    assert_eq!(transport.refresh_calls(), 1);
    assert_eq!(store.load(), Some(TokenPair::new("A2", "R2")));
}

#[tokio::test]
async fn logout_clears_the_session() {
    let transport = Arc::new(ScriptedTransport::new(|_| ok(json!({}))));
    let (client, store) = client_with(transport, Some(TokenPair::new("A1", "R1")));

    client.logout().unwrap();
    assert_eq!(store.load(), None);
}
