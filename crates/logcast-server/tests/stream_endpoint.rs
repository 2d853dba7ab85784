use std::sync::Arc;
use std::time::Duration;

use logcast_core::EventBus;
use logcast_server::{start, ServerConfig, ServerHandle};

/// Splits a streaming response into `\n\n`-terminated frames.
struct FrameReader {
    resp: reqwest::Response,
    buf: String,
}

impl FrameReader {
    fn new(resp: reqwest::Response) -> Self {
        Self {
            resp,
            buf: String::new(),
        }
    }

    async fn next_frame(&mut self) -> Option<String> {
        loop {
            if let Some(end) = self.buf.find("\n\n") {
                let frame = self.buf[..end + 2].to_string();
                self.buf.drain(..end + 2);
                return Some(frame);
            }
            let chunk = tokio::time::timeout(Duration::from_secs(5), self.resp.chunk())
                .await
                .expect("timed out waiting for frame")
                .expect("stream error")?;
            self.buf.push_str(std::str::from_utf8(&chunk).expect("frames are utf-8"));
        }
    }

    async fn next_event(&mut self) -> serde_json::Value {
        let frame = self.next_frame().await.expect("stream ended");
        let json = frame
            .strip_prefix("data: ")
            .unwrap_or_else(|| panic!("not a data frame: {frame:?}"))
            .trim_end();
        serde_json::from_str(json).unwrap()
    }
}

async fn serve(heartbeat_interval_secs: u64) -> (ServerHandle, Arc<EventBus>) {
    let bus = Arc::new(EventBus::new());
    let config = ServerConfig {
        host: "127.0.0.1".into(),
        port: 0,
        heartbeat_interval_secs,
        ..Default::default()
    };
    let handle = start(config, Arc::clone(&bus)).await.unwrap();
    (handle, bus)
}

async fn connect(handle: &ServerHandle) -> FrameReader {
    let url = format!("http://127.0.0.1:{}/logs/stream", handle.port);
    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["cache-control"], "no-cache, no-transform");
    assert_eq!(resp.headers()["x-accel-buffering"], "no");
    FrameReader::new(resp)
}

async fn wait_for_listeners(bus: &EventBus, expected: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.listener_count() != expected {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("expected {expected} listeners, have {}", bus.listener_count()));
}

#[tokio::test]
async fn observers_receive_published_events() {
    let (handle, bus) = serve(15).await;

    let mut a = connect(&handle).await;
    let mut b = connect(&handle).await;
    for reader in [&mut a, &mut b] {
        let hello = reader.next_event().await;
        assert_eq!(hello["kind"], "INFO");
        assert_eq!(hello["message"], "Connected to log stream");
    }
    wait_for_listeners(&bus, 2).await;

    bus.emit("ERROR", "disk full");

    for reader in [&mut a, &mut b] {
        let event = reader.next_event().await;
        assert_eq!(event["kind"], "ERROR");
        assert_eq!(event["message"], "disk full");
        assert!(event["emittedAt"].as_i64().unwrap() > 0);
    }

    // A late joiner only sees its own greeting.
    let mut c = connect(&handle).await;
    let hello = c.next_event().await;
    assert_eq!(hello["message"], "Connected to log stream");
    wait_for_listeners(&bus, 3).await;
    bus.emit("WARN", "for everyone connected now");
    let next = c.next_event().await;
    assert_eq!(next["message"], "for everyone connected now");

    handle.shutdown().await;
}

#[tokio::test]
async fn events_arrive_in_publish_order() {
    let (handle, bus) = serve(15).await;
    let mut reader = connect(&handle).await;
    let _ = reader.next_event().await;
    wait_for_listeners(&bus, 1).await;

    for i in 0..20 {
        bus.emit("INFO", format!("step {i}"));
    }
    for i in 0..20 {
        let event = reader.next_event().await;
        assert_eq!(event["message"], format!("step {i}"));
    }

    handle.shutdown().await;
}

#[tokio::test]
async fn burst_without_yielding_reaches_reader_intact() {
    let (handle, bus) = serve(15).await;
    let mut reader = connect(&handle).await;
    let _ = reader.next_event().await;
    wait_for_listeners(&bus, 1).await;

    for i in 0..300 {
        bus.emit("INFO", format!("burst {i}"));
    }
    assert_eq!(bus.listener_count(), 1);

    for i in 0..300 {
        let event = reader.next_event().await;
        assert_eq!(event["message"], format!("burst {i}"));
    }
    assert_eq!(bus.listener_count(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn heartbeat_frames_keep_idle_stream_alive() {
    let (handle, bus) = serve(1).await;
    let mut reader = connect(&handle).await;
    let _ = reader.next_event().await;

    for _ in 0..2 {
        let frame = reader.next_frame().await.expect("stream ended");
        assert_eq!(frame, ": heartbeat\n\n");
    }
    assert_eq!(bus.listener_count(), 1);

    handle.shutdown().await;
}

#[tokio::test]
async fn disconnect_releases_session() {
    let (handle, bus) = serve(15).await;
    let mut reader = connect(&handle).await;
    let _ = reader.next_event().await;
    wait_for_listeners(&bus, 1).await;

    drop(reader);

    // Writes after the client is gone surface the disconnect.
    tokio::time::timeout(Duration::from_secs(5), async {
        while bus.listener_count() != 0 {
            bus.emit("INFO", "anyone there?");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("session still subscribed after disconnect");

    handle.shutdown().await;
}

#[tokio::test]
async fn shutdown_ends_open_streams() {
    let (handle, bus) = serve(15).await;
    let mut reader = connect(&handle).await;
    let _ = reader.next_event().await;
    wait_for_listeners(&bus, 1).await;

    handle.shutdown().await;

    assert_eq!(bus.listener_count(), 0);
    assert!(reader.next_frame().await.is_none());
}
