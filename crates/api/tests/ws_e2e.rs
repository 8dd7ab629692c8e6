//! End-to-end tests for the job status WebSocket against a real listener.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use common::{body_json, post_json, wait_for_job, FakePipeline, TestApp};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn serve(t: &TestApp) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let app = t.app.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

async fn subscribe(addr: SocketAddr, job_id: &str) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/api/v1/ws/jobs/{job_id}"))
        .await
        .expect("connect");
    client
}

async fn next_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("message before timeout")
            .expect("stream open")
            .expect("frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("JSON frame");
        }
    }
}

async fn submit(t: &TestApp, idea: &str) -> String {
    let response = post_json(t.app.clone(), "/api/v1/jobs", json!({"idea": idea})).await;
    body_json(response).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string()
}

// ---------------------------------------------------------------------------
// Test: unknown job gets a connection notice; ping is answered with pong
// ---------------------------------------------------------------------------

#[tokio::test]
async fn connect_to_unknown_job_and_ping() {
    let t = common::build_test_app(Arc::new(FakePipeline::default())).await;
    let addr = serve(&t).await;

    let mut client = subscribe(addr, "job_nobody_knows").await;

    let greeting = next_json(&mut client).await;
    assert_eq!(greeting["status"], "connected");
    assert_eq!(greeting["job_id"], "job_nobody_knows");

    client
        .send(Message::text(json!({"type": "ping"}).to_string()))
        .await
        .expect("send ping");
    let reply = next_json(&mut client).await;
    assert_eq!(reply["type"], "pong");
}

// ---------------------------------------------------------------------------
// Test: updates produced before anyone connected are flushed in order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_updates_flush_in_order_then_snapshot() {
    let t = common::build_test_app(Arc::new(FakePipeline::default())).await;
    let addr = serve(&t).await;

    let job_id = submit(&t, "a lighthouse at dusk").await;
    wait_for_job(&t.app, &job_id).await;

    let mut client = subscribe(addr, &job_id).await;

    // Initial record, five step starts, completion.
    let mut progress = Vec::new();
    for _ in 0..7 {
        let update = next_json(&mut client).await;
        assert_eq!(update["job_id"], job_id.as_str());
        progress.push(update["progress"].as_u64().expect("progress"));
        if progress.len() < 7 {
            assert_eq!(update["status"], "processing");
        } else {
            assert_eq!(update["status"], "completed");
        }
    }
    assert_eq!(progress, vec![0, 10, 25, 40, 75, 90, 100]);

    // Then the current snapshot.
    let snapshot = next_json(&mut client).await;
    assert_eq!(snapshot["status"], "completed");
    assert_eq!(snapshot["progress"], 100);

    // The queue is empty afterwards: a second subscriber sees only the snapshot.
    drop(client);
    let mut again = subscribe(addr, &job_id).await;
    let first = next_json(&mut again).await;
    assert_eq!(first["status"], "completed");
    again
        .send(Message::text(json!({"type": "ping"}).to_string()))
        .await
        .expect("send ping");
    assert_eq!(next_json(&mut again).await["type"], "pong");
}

// ---------------------------------------------------------------------------
// Test: a live subscriber sees the job through to completion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn live_subscriber_receives_completion() {
    let pipeline = Arc::new(FakePipeline::with_delay(Duration::from_millis(300)));
    let t = common::build_test_app(pipeline).await;
    let addr = serve(&t).await;

    let job_id = submit(&t, "slow clouds").await;
    let mut client = subscribe(addr, &job_id).await;

    let mut last_progress = 0;
    loop {
        let update = next_json(&mut client).await;
        let progress = update["progress"].as_u64().expect("progress");
        assert!(progress >= last_progress, "progress went backwards");
        last_progress = progress;
        if update["status"] == "completed" {
            assert_eq!(
                update["video_url"],
                format!("/videos/{job_id}/final_video.mp4")
            );
            break;
        }
        assert_eq!(update["status"], "processing");
    }
}
