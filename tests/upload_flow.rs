//! Integration tests for the event-driven upload flow

mod common;

use common::*;
use reqwest::Client;
use std::sync::{Arc, Mutex};
use upprobe::error::UploadError;
use upprobe::event_transport::EventTransport;
use upprobe::payload::payload_len;
use upprobe::request::{AbortHandle, UploadEvent};
use upprobe::session::UploadStatus;

#[tokio::test]
async fn test_successful_upload_completes() {
    let addr = spawn_echo_server().await;
    let log = EventLog::new();
    let transport = EventTransport::new(Client::new(), small_config()).with_observer(log.clone());

    let handle = transport.upload(url(addr, "/post")).unwrap();
    handle.finished().await.unwrap();

    let snap = transport.session().snapshot();
    assert_eq!(snap.status, UploadStatus::Completed);
    assert_eq!(snap.message, "Event-driven completed successfully! Status: 200");
    assert_eq!(snap.progress_percent, 100.0);

    let events = log.events();
    assert_well_ordered(&events);
    assert_eq!(events.last(), Some(&UploadEvent::Load { status: 200 }));

    let total = payload_len(0.25) as u64;
    assert_eq!(events[0], UploadEvent::LoadStart { total: Some(total) });
    assert_eq!(log.percentages().len(), 16);

    // Progress counts payload bytes only, never the multipart framing
    let last_progress = events.iter().rev().find_map(|event| match event {
        UploadEvent::Progress { loaded, total } => Some((*loaded, *total)),
        _ => None,
    });
    assert_eq!(last_progress, Some((total, Some(total))));
}

#[tokio::test]
async fn test_server_error_fails_with_status() {
    let addr = spawn_echo_server().await;
    let transport = EventTransport::new(Client::new(), small_config());

    let handle = transport.upload(url(addr, "/status/500")).unwrap();
    handle.finished().await.unwrap();

    let snap = transport.session().snapshot();
    assert_eq!(snap.status, UploadStatus::Failed);
    assert_eq!(snap.message, "Event-driven failed with status: 500");
    assert!(snap.message.contains("500"));
}

#[tokio::test]
async fn test_dropped_connection_reports_generic_error() {
    let addr = spawn_dropping_server().await;
    let log = EventLog::new();
    let transport = EventTransport::new(Client::new(), small_config()).with_observer(log.clone());

    let handle = transport.upload(url(addr, "/post")).unwrap();
    handle.finished().await.unwrap();

    let snap = transport.session().snapshot();
    assert_eq!(snap.status, UploadStatus::Failed);
    assert_eq!(snap.message, "Event-driven error occurred");

    let events = log.events();
    assert_well_ordered(&events);
    assert!(matches!(events.last(), Some(UploadEvent::Error { .. })));
}

#[tokio::test]
async fn test_refused_connection_reports_generic_error() {
    let addr = refused_addr().await;
    let transport = EventTransport::new(Client::new(), small_config());

    let handle = transport.upload(url(addr, "/post")).unwrap();
    handle.finished().await.unwrap();

    let snap = transport.session().snapshot();
    assert_eq!(snap.status, UploadStatus::Failed);
    assert_eq!(snap.message, "Event-driven error occurred");
    assert_eq!(snap.progress_percent, 0.0);
}

#[tokio::test]
async fn test_refused_connection_never_reports_uploading() {
    let addr = refused_addr().await;
    let transport = EventTransport::new(Client::new(), small_config());
    let session = transport.session().clone();

    // Status right after every event, once the session sinks have run
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    let transport = transport.with_observer(Arc::new(move |_: &UploadEvent| {
        sink.lock().unwrap().push(session.snapshot().status);
    }));

    let mut rx = transport.session().subscribe();
    let handle = transport.upload(url(addr, "/post")).unwrap();

    let mut seen = Vec::new();
    loop {
        let status = rx.borrow_and_update().status;
        seen.push(status);
        if status.is_terminal() {
            break;
        }
        rx.changed().await.unwrap();
    }
    handle.finished().await.unwrap();

    let statuses = statuses.lock().unwrap();
    assert_eq!(
        *statuses,
        vec![UploadStatus::Starting, UploadStatus::Failed],
        "no data was sent, so the attempt must go straight from Starting to Failed"
    );
    assert!(!seen.contains(&UploadStatus::Uploading));
    assert_eq!(seen.last(), Some(&UploadStatus::Failed));
}

#[tokio::test]
async fn test_abort_midway_keeps_last_progress() {
    let addr = spawn_echo_server().await;
    let log = EventLog::new();
    let abort = AbortHandle::new();

    let trigger = abort.clone();
    let transport = EventTransport::new(Client::new(), small_config())
        .with_observer(log.clone())
        .with_observer(Arc::new(move |event: &UploadEvent| {
            if let UploadEvent::Progress {
                loaded,
                total: Some(total),
            } = event
            {
                if *loaded as f64 / *total as f64 >= 0.4 {
                    trigger.abort();
                }
            }
        }));

    let handle = transport
        .upload_with_abort(url(addr, "/post"), abort)
        .unwrap();
    handle.finished().await.unwrap();

    let snap = transport.session().snapshot();
    assert_eq!(snap.status, UploadStatus::Aborted);
    assert_eq!(snap.message, "Event-driven aborted");

    let percentages = log.percentages();
    let last = *percentages.last().unwrap();
    assert!(last >= 40.0 && last < 100.0);
    assert_eq!(snap.progress_percent, last);

    let events = log.events();
    assert_well_ordered(&events);
    assert_eq!(events.last(), Some(&UploadEvent::Abort));
}

#[tokio::test]
async fn test_progress_never_decreases() {
    let addr = spawn_echo_server().await;
    let transport = EventTransport::new(Client::new(), small_config());
    let mut rx = transport.session().subscribe();

    let handle = transport.upload(url(addr, "/post")).unwrap();

    let mut seen = Vec::new();
    loop {
        let snap = rx.borrow_and_update().clone();
        seen.push(snap.progress_percent);
        if snap.status.is_terminal() {
            break;
        }
        rx.changed().await.unwrap();
    }
    handle.finished().await.unwrap();

    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert!(seen.iter().all(|p| (0.0..=100.0).contains(p)));
}

#[tokio::test]
async fn test_second_upload_rejected_while_in_flight() {
    let addr = spawn_echo_server().await;
    let transport = EventTransport::new(Client::new(), small_config());
    let endpoint = url(addr, "/post");

    let first = transport.upload(endpoint.clone()).unwrap();
    assert!(matches!(
        transport.upload(endpoint.clone()),
        Err(UploadError::AttemptInFlight(_))
    ));
    first.finished().await.unwrap();
    assert_eq!(transport.session().snapshot().status, UploadStatus::Completed);

    // A settled session accepts a fresh attempt
    let second = transport.upload(endpoint).unwrap();
    let snap = transport.session().snapshot();
    assert_eq!(snap.status, UploadStatus::Starting);
    assert_eq!(snap.progress_percent, 0.0);
    second.finished().await.unwrap();
    assert_eq!(transport.session().snapshot().status, UploadStatus::Completed);
}
