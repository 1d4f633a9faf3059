//! End-to-end lifecycle over the in-memory backend: serve, sync, shut down.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use stockroom_server::{ApplicationBuilder, Config};
use stockroom_testing::RecordingPublisher;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

fn memory_config() -> Config {
    let vars: HashMap<String, String> = [
        ("DATABASE_DRIVER", "memory"),
        ("HOST", "127.0.0.1"),
        ("PORT", "0"),
        ("SYNC_INTERVAL", "1"),
        ("SHUTDOWN_TIMEOUT", "5"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    Config::from_map(&vars).unwrap()
}

/// Minimal HTTP/1.1 exchange; returns the raw response.
async fn request(addr: SocketAddr, method: &str, path: &str, body: Option<&str>) -> String {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = body.unwrap_or("");
    let raw = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(raw.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}

fn json_body(response: &str) -> serde_json::Value {
    let (_, body) = response.split_once("\r\n\r\n").unwrap();
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn serves_syncs_and_shuts_down_cleanly() {
    let recorder = RecordingPublisher::new();
    let app = ApplicationBuilder::new(memory_config())
        .with_publisher(Arc::new(recorder.clone()))
        .build()
        .await
        .unwrap();
    let addr = app.local_addr().unwrap();

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(app.run_until(async {
        let _ = stop_rx.await;
    }));

    let health = request(addr, "GET", "/health", None).await;
    assert!(health.starts_with("HTTP/1.1 200"), "{health}");

    let created = request(
        addr,
        "POST",
        "/products",
        Some(r#"{"sku":"SKU-1","name":"Widget","price":3.0}"#),
    )
    .await;
    assert!(created.starts_with("HTTP/1.1 201"), "{created}");
    let product_id = json_body(&created)["id"].as_str().unwrap().to_string();

    let stock = request(
        addr,
        "POST",
        "/stock",
        Some(&format!(
            r#"{{"product_id":"{product_id}","store_id":"s1","initial_quantity":10}}"#
        )),
    )
    .await;
    assert!(stock.starts_with("HTTP/1.1 201"), "{stock}");

    // The sync worker ticks every second
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    loop {
        let pending = request(addr, "GET", "/events/pending-count", None).await;
        if json_body(&pending)["pending"] == 0 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "outbox never drained");
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert_eq!(recorder.len(), 1);

    stop_tx.send(()).unwrap();
    server.await.unwrap().unwrap();
    assert!(recorder.is_closed());
}
