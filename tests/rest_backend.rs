use ratelimit_console::api::{AdminApi, RestBackend};
use ratelimit_console::error::{ApiError, ErrorKind};
use ratelimit_console::models::{
    Client, NotificationChannel, NotificationRequest, RateLimitConfig, SystemLimitConfig,
    ThrottlingMode,
};
use ratelimit_console::monitoring::RequestMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request as seen by the test server
struct Captured {
    head: String,
    body: String,
}

impl Captured {
    fn request_line(&self) -> &str {
        self.head.lines().next().unwrap_or_default()
    }

    fn header(&self, name: &str) -> Option<String> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }
}

/// Serve exactly one HTTP exchange with a canned response
async fn serve_once(
    status: &str,
    extra_headers: &[(&str, &str)],
    body: &str,
) -> (String, JoinHandle<Captured>) {
    let mut response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
        status,
        body.len()
    );
    for (name, value) in extra_headers {
        response.push_str(&format!("{}: {}\r\n", name, value));
    }
    response.push_str("\r\n");
    response.push_str(body);

    serve_raw(response).await
}

/// Serve exactly one HTTP exchange, writing `response` verbatim
async fn serve_raw(response: String) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/api", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut buf = [0u8; 4096];

        let head_end = loop {
            let n = socket.read(&mut buf).await.unwrap();
            assert!(n > 0, "connection closed before headers were complete");
            raw.extend_from_slice(&buf[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&raw[..head_end]).to_string();
        let content_length = head
            .lines()
            .find_map(|line| {
                let (key, value) = line.split_once(':')?;
                key.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        while raw.len() < head_end + content_length {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&buf[..n]);
        }

        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();

        Captured {
            head,
            body: String::from_utf8_lossy(&raw[head_end..]).to_string(),
        }
    });

    (base_url, handle)
}

fn backend(base_url: &str) -> RestBackend {
    RestBackend::new(base_url, Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_list_clients() {
    let (url, server) = serve_once(
        "200 OK",
        &[],
        r#"[{"id":1,"clientId":"acme","name":"Acme","createdAt":"2026-01-01T00:00:00"}]"#,
    )
    .await;

    let clients = backend(&url).list_clients().await.unwrap();
    assert_eq!(clients.len(), 1);
    assert_eq!(clients[0].client_id, "acme");

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line(), "GET /api/clients HTTP/1.1");
}

#[tokio::test]
async fn test_create_client_sends_camel_case_body() {
    let (url, server) = serve_once(
        "201 Created",
        &[],
        r#"{"id":3,"clientId":"acme","name":"Acme"}"#,
    )
    .await;

    let mut client = Client::new("acme", "Acme");
    client.contact_email = Some("ops@acme.test".to_string());
    let created = backend(&url).create_client(&client).await.unwrap();
    assert_eq!(created.id, Some(3));

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line(), "POST /api/clients HTTP/1.1");
    let body: serde_json::Value = serde_json::from_str(&captured.body).unwrap();
    assert_eq!(body["clientId"], "acme");
    assert_eq!(body["contactEmail"], "ops@acme.test");
    assert!(body.get("id").is_none());
}

#[tokio::test]
async fn test_update_rate_limit_uses_client_path() {
    let (url, server) = serve_once(
        "200 OK",
        &[],
        r#"{"id":9,"clientId":"acme","timeWindowRequests":5,"timeWindowSeconds":60,"monthlyRequests":100,"throttlingMode":"SOFT"}"#,
    )
    .await;

    let config = RateLimitConfig {
        client_id: "acme".to_string(),
        time_window_requests: 5,
        monthly_requests: 100,
        throttling_mode: ThrottlingMode::Soft,
        ..RateLimitConfig::default()
    };
    let saved = backend(&url)
        .update_rate_limit("acme", &config)
        .await
        .unwrap();
    assert_eq!(saved.throttling_mode, ThrottlingMode::Soft);

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line(), "PUT /api/rate-limits/acme HTTP/1.1");
    assert!(captured.body.contains(r#""throttlingMode":"SOFT""#));
}

#[tokio::test]
async fn test_system_limits_update() {
    let (url, server) = serve_once("200 OK", &[], r#"{"id":1,"globalRequestsPerSecond":250}"#).await;

    let saved = backend(&url)
        .update_system_limits(&SystemLimitConfig {
            id: None,
            global_requests_per_second: 250,
        })
        .await
        .unwrap();
    assert_eq!(saved.global_requests_per_second, 250);

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line(), "PUT /api/system/limits HTTP/1.1");
    assert_eq!(captured.body, r#"{"globalRequestsPerSecond":250}"#);
}

#[tokio::test]
async fn test_delete_with_empty_body() {
    let (url, server) = serve_once("204 No Content", &[], "").await;

    backend(&url).delete_client("acme").await.unwrap();

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line(), "DELETE /api/clients/acme HTTP/1.1");
}

#[tokio::test]
async fn test_notification_carries_client_header_and_quota() {
    let (url, server) = serve_once(
        "200 OK",
        &[
            ("X-RateLimit-TimeWindow-Limit", "10"),
            ("X-RateLimit-TimeWindow-Remaining", "7"),
        ],
        r#"{"message":"SMS sent"}"#,
    )
    .await;

    let response = backend(&url)
        .send_notification(
            NotificationChannel::Sms,
            "acme",
            &NotificationRequest::new("+15550100", "hello"),
        )
        .await
        .unwrap();
    assert_eq!(response.status, 200);
    assert_eq!(response.message.as_deref(), Some("SMS sent"));
    assert_eq!(response.rate_limit().limit, Some(10));
    assert_eq!(response.rate_limit().remaining, Some(7));

    let captured = server.await.unwrap();
    assert_eq!(captured.request_line(), "POST /api/notifications/sms HTTP/1.1");
    assert_eq!(captured.header("x-client-id").as_deref(), Some("acme"));
}

#[tokio::test]
async fn test_throttled_notification_keeps_headers() {
    let (url, server) = serve_once(
        "429 Too Many Requests",
        &[
            ("X-RateLimit-TimeWindow-Limit", "10"),
            ("X-RateLimit-TimeWindow-Remaining", "0"),
        ],
        r#"{"message":"Rate limit exceeded"}"#,
    )
    .await;

    let err = backend(&url)
        .send_notification(
            NotificationChannel::Email,
            "acme",
            &NotificationRequest::new("ops@acme.test", "hello"),
        )
        .await
        .unwrap_err();
    assert!(err.is_rate_limited());
    assert_eq!(err.kind(), ErrorKind::RateLimited);
    assert_eq!(
        err.headers()
            .and_then(|h| h.get("x-ratelimit-timewindow-remaining"))
            .map(String::as_str),
        Some("0")
    );
    assert_eq!(err.body_message().as_deref(), Some("Rate limit exceeded"));
    server.await.unwrap();
}

#[tokio::test]
async fn test_validation_report_is_flattened() {
    let (url, server) = serve_once(
        "400 Bad Request",
        &[],
        r#"{"errors":[{"field":"name","defaultMessage":"name must not be blank"},{"field":"clientId","defaultMessage":"clientId must not be blank"}]}"#,
    )
    .await;

    let err = backend(&url)
        .create_client(&Client::new("", ""))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        err.body_message().as_deref(),
        Some("name must not be blank, clientId must not be blank")
    );
    server.await.unwrap();
}

#[tokio::test]
async fn test_malformed_success_body_is_invalid_response() {
    let (url, server) = serve_once("200 OK", &[], "not json").await;
    let monitor = Arc::new(RequestMonitor::new());

    let err = backend(&url)
        .with_monitor(Arc::clone(&monitor))
        .list_clients()
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
    server.await.unwrap();

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.requests_per_minute, 1);
    assert_eq!(snapshot.successes, 0);
    assert_eq!(snapshot.failures, 1);
}

#[tokio::test]
async fn test_truncated_notification_body_is_invalid_response() {
    let (url, server) = serve_raw(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\nConnection: close\r\n\r\n{\"mess"
            .to_string(),
    )
    .await;
    let monitor = Arc::new(RequestMonitor::new());

    let err = backend(&url)
        .with_monitor(Arc::clone(&monitor))
        .send_notification(
            NotificationChannel::Email,
            "acme",
            &NotificationRequest::new("ops@acme.test", "hello"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::InvalidResponse(_)));
    assert_ne!(err.kind(), ErrorKind::Connectivity);
    server.await.unwrap();

    assert_eq!(monitor.snapshot().failures, 1);
}

#[tokio::test]
async fn test_successful_call_is_recorded_after_decoding() {
    let (url, server) = serve_once("200 OK", &[], r#"{"id":1,"globalRequestsPerSecond":50}"#).await;
    let monitor = Arc::new(RequestMonitor::new());

    backend(&url)
        .with_monitor(Arc::clone(&monitor))
        .get_system_limits()
        .await
        .unwrap();
    server.await.unwrap();

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.successes, 1);
    assert_eq!(snapshot.failures, 0);
}

#[tokio::test]
async fn test_requests_are_recorded_by_monitor() {
    let (url, server) = serve_once("409 Conflict", &[], "").await;
    let monitor = Arc::new(RequestMonitor::new());

    let err = backend(&url)
        .with_monitor(Arc::clone(&monitor))
        .create_rate_limit(&RateLimitConfig {
            client_id: "acme".to_string(),
            ..RateLimitConfig::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    server.await.unwrap();

    let snapshot = monitor.snapshot();
    assert_eq!(snapshot.requests_per_minute, 1);
    assert_eq!(snapshot.failures, 1);
}
