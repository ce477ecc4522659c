//! High-level upload client
//!
//! This module wires both transports to one HTTP client and the loaded
//! configuration, exposing the two triggers the display layer calls.

use crate::config::{AppConfig, UploadConfig};
use crate::error::Result;
use crate::event_transport::EventTransport;
use crate::promise_transport::{PromiseTransport, UploadResponse};
use crate::request::UploadHandle;
use crate::session::UploadSession;
use reqwest::Client;
use std::time::Duration;
use url::Url;

/// Upload client owning one session per transport
pub struct UploadClient {
    config: AppConfig,
    endpoint: Url,
    event: EventTransport,
    promise: PromiseTransport,
}

impl UploadClient {
    /// Create a new client with the configuration from disk
    pub fn new() -> Result<Self> {
        let config = AppConfig::load()?;
        Self::with_config(config)
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: AppConfig) -> Result<Self> {
        config.validate()?;
        let endpoint = config.endpoint_url()?;

        // No overall request timeout; an upload runs until it settles or is aborted
        let http = Client::builder()
            .tcp_nodelay(true)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent(concat!("upprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            event: EventTransport::new(http.clone(), config.upload.clone()),
            promise: PromiseTransport::new(http, config.upload.clone()),
            endpoint,
            config,
        })
    }

    /// Start an upload through the event-driven transport.
    ///
    /// Returns once the request is in flight; follow [`event_session`](Self::event_session)
    /// for the outcome.
    pub fn run_event_driven_test(&self) -> Result<UploadHandle> {
        self.event.upload(self.endpoint.clone())
    }

    /// Upload through the awaitable transport and wait for the outcome
    pub async fn run_promise_test(&self) -> Result<UploadResponse> {
        self.promise.upload(self.endpoint.clone()).await
    }

    pub fn event_session(&self) -> &UploadSession {
        self.event.session()
    }

    pub fn promise_session(&self) -> &UploadSession {
        self.promise.session()
    }

    /// Get the application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Get the upload configuration
    pub fn upload_config(&self) -> &UploadConfig {
        &self.config.upload
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}
