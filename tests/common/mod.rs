//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpListener;
use upprobe::config::UploadConfig;
use upprobe::request::{UploadEvent, UploadListener};
use upprobe::session::{SessionSnapshot, UploadSession};
use url::Url;

/// Small seeded payload cut into 16 KiB slices (16 progress events)
pub fn small_config() -> UploadConfig {
    UploadConfig::new()
        .with_payload_size_mb(0.25)
        .with_chunk_size(16 * 1024)
        .with_payload_seed(42)
}

/// Start the echo server on an ephemeral port
pub async fn spawn_echo_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(upprobe::server::serve(listener));
    addr
}

/// Server that reads the start of each request and then drops the connection
pub async fn spawn_dropping_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            drop(socket);
        }
    });

    addr
}

/// Address nothing is listening on
pub async fn refused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{}{}", addr, path)).unwrap()
}

/// Listener that keeps every event it sees
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<UploadEvent>>,
}

impl EventLog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<UploadEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Payload percentages of the recorded progress events
    pub fn percentages(&self) -> Vec<f64> {
        self.events()
            .iter()
            .filter_map(|event| match event {
                UploadEvent::Progress {
                    loaded,
                    total: Some(total),
                } => Some(*loaded as f64 / *total as f64 * 100.0),
                _ => None,
            })
            .collect()
    }
}

impl UploadListener for EventLog {
    fn on_event(&self, event: &UploadEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

/// Check event ordering: LoadStart, Progress*, exactly one terminal event last
pub fn assert_well_ordered(events: &[UploadEvent]) {
    assert!(
        matches!(events.first(), Some(UploadEvent::LoadStart { .. })),
        "first event should be loadstart: {:?}",
        events.first()
    );

    let terminals = events.iter().filter(|e| e.is_terminal()).count();
    assert_eq!(terminals, 1, "expected exactly one terminal event");
    assert!(events.last().unwrap().is_terminal());

    let mut last_loaded = 0;
    for event in &events[1..events.len() - 1] {
        match event {
            UploadEvent::Progress { loaded, .. } => {
                assert!(*loaded >= last_loaded, "progress went backwards");
                last_loaded = *loaded;
            }
            other => panic!("unexpected event in progress phase: {:?}", other),
        }
    }
}

/// Wait until the session reaches a terminal state
pub async fn settled(session: &UploadSession) -> SessionSnapshot {
    let mut rx = session.subscribe();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|s| s.status.is_terminal()),
    )
    .await
    .expect("session did not settle")
    .unwrap()
    .clone();
    snapshot
}
