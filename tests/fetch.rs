use std::net::SocketAddr;
use std::time::Duration;

use feedharvest::config::FeedSettings;
use feedharvest::{ConfigError, FeedClient, FetchFailure, HttpFeedClient};
use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

fn response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

/// Serves canned raw responses keyed by request path; unknown paths get 404.
async fn serve(routes: Vec<(&'static str, String)>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let routes = routes.clone();
            tokio::spawn(async move {
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match socket.read(&mut buf).await {
                        Ok(0) | Err(_) => return,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let head = String::from_utf8_lossy(&request);
                let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                let reply = routes
                    .iter()
                    .find(|(route, _)| *route == path)
                    .map(|(_, reply)| reply.clone())
                    .unwrap_or_else(|| response("404 Not Found", ""));
                let _ = socket.write_all(reply.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });
    addr
}

fn settings(addr: SocketAddr) -> FeedSettings {
    FeedSettings {
        base_url: Url::parse(&format!("http://{}/s/", addr)).unwrap(),
        proxy: None,
        timeout: Duration::from_secs(5),
    }
}

/// An address nothing listens on.
async fn closed_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

#[tokio::test]
async fn successful_page_returns_markup_and_status() {
    let addr = serve(vec![(
        "/s/chan?before=40",
        response("200 OK", "<html>feed</html>"),
    )])
    .await;
    let client = HttpFeedClient::new(&settings(addr)).unwrap();

    let page = client.fetch("chan?before=40").await.unwrap();
    assert_eq!(page.status, 200);
    assert_eq!(page.markup, "<html>feed</html>");
}

#[tokio::test]
async fn non_success_status_is_a_status_failure() {
    let addr = serve(vec![]).await;
    let client = HttpFeedClient::new(&settings(addr)).unwrap();

    assert_eq!(client.fetch("missing").await, Err(FetchFailure::Status(404)));
}

#[tokio::test]
async fn unreadable_success_body_becomes_empty_markup() {
    // Promises more bytes than it sends, then closes.
    let truncated =
        "HTTP/1.1 200 OK\r\nContent-Length: 500\r\nConnection: close\r\n\r\n<html>".to_string();
    let addr = serve(vec![("/s/chan", truncated)]).await;
    let client = HttpFeedClient::new(&settings(addr)).unwrap();

    let page = client.fetch("chan").await.unwrap();
    assert_eq!(page.status, 200);
    assert_eq!(page.markup, "");
}

#[tokio::test]
async fn refused_connection_is_a_transport_failure() {
    let addr = closed_addr().await;
    let client = HttpFeedClient::new(&settings(addr)).unwrap();

    assert!(matches!(
        client.fetch("chan").await,
        Err(FetchFailure::Transport(_))
    ));
}

#[tokio::test]
async fn probe_accepts_a_reachable_base() {
    let addr = serve(vec![("/s/", response("200 OK", "ok"))]).await;
    let client = HttpFeedClient::new(&settings(addr)).unwrap();

    assert_eq!(client.probe().await.unwrap(), 200);
}

#[tokio::test]
async fn probe_fails_on_error_status_or_refused_connection() {
    let addr = serve(vec![("/s/", response("502 Bad Gateway", ""))]).await;
    let client = HttpFeedClient::new(&settings(addr)).unwrap();
    assert!(matches!(
        client.probe().await,
        Err(ConfigError::ProxyUnreachable(_))
    ));

    let client = HttpFeedClient::new(&settings(closed_addr().await)).unwrap();
    assert!(matches!(
        client.probe().await,
        Err(ConfigError::ProxyUnreachable(_))
    ));
}

#[test]
fn malformed_proxy_is_rejected_at_construction() {
    let mut settings = settings("127.0.0.1:9".parse().unwrap());
    settings.proxy = Some("http://[::1:80".to_string());
    assert!(matches!(
        HttpFeedClient::new(&settings),
        Err(ConfigError::InvalidProxy(_))
    ));
}
