//! Kubernetes event watch.
//!
//! Opens `GET /api/v1/events?watch=true` across all namespaces and decodes
//! the newline-delimited watch stream into [`Received`] items. The session
//! is built once from [`KubeSettings`]; a dropped stream is never reopened.

use std::collections::VecDeque;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use claw_events::{ChangeKind, Event};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::KubeSettings;
use crate::error::{Result, WatchError};
use crate::source::{EventSource, Received};

/// Path of the cluster-wide event watch.
pub const EVENTS_WATCH_PATH: &str = "/api/v1/events?watch=true";

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest watch line accepted before the stream is abandoned.
const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A resolved cluster API session.
#[derive(Clone)]
pub struct KubeConfig {
    api_server: String,
    token: Option<String>,
    ca_pem: Option<Vec<u8>>,
}

impl KubeConfig {
    /// Creates a session for the given API server with no credentials.
    #[must_use]
    pub fn new(api_server: impl Into<String>) -> Self {
        Self {
            api_server: api_server.into().trim_end_matches('/').to_string(),
            token: None,
            ca_pem: None,
        }
    }

    /// Sets the bearer token.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Sets the PEM encoded CA bundle.
    #[must_use]
    pub fn with_ca_pem(mut self, pem: Vec<u8>) -> Self {
        self.ca_pem = Some(pem);
        self
    }

    /// Returns the API server URL.
    #[must_use]
    pub fn api_server(&self) -> &str {
        &self.api_server
    }

    /// Resolves the session from settings.
    ///
    /// An explicit API server wins; otherwise the in-cluster service host is
    /// used and the service account token becomes mandatory.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::ClusterSession` if no API server can be found or
    /// the in-cluster credentials cannot be read.
    pub fn load(settings: &KubeSettings) -> Result<Self> {
        let (api_server, in_cluster) = match (&settings.api_server, &settings.service_host) {
            (Some(url), _) => (url.clone(), false),
            (None, Some(host)) => (
                format!("https://{}", host_port(host, settings.service_port)),
                true,
            ),
            (None, None) => {
                return Err(WatchError::ClusterSession(
                    "not running inside a cluster: KUBERNETES_SERVICE_HOST is not set and no API server was given"
                        .to_string(),
                ));
            }
        };

        let mut config = Self::new(api_server);

        match read_optional(&settings.token_file)? {
            Some(token) => {
                config.token = Some(String::from_utf8_lossy(&token).trim().to_string());
            }
            None if in_cluster => {
                return Err(WatchError::ClusterSession(format!(
                    "service account token not found at {}",
                    settings.token_file.display()
                )));
            }
            None => {}
        }

        config.ca_pem = read_optional(&settings.ca_file)?;

        info!(
            api_server = %config.api_server,
            in_cluster,
            has_token = config.token.is_some(),
            has_ca = config.ca_pem.is_some(),
            "resolved cluster session"
        );
        Ok(config)
    }

    /// Builds an HTTP client trusting the configured CA.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::ClusterSession` if the CA bundle is invalid or the
    /// client cannot be built.
    pub fn client(&self) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().connect_timeout(CONNECT_TIMEOUT);
        if let Some(pem) = &self.ca_pem {
            let cert = reqwest::Certificate::from_pem(pem)
                .map_err(|e| WatchError::ClusterSession(format!("invalid cluster CA: {e}")))?;
            builder = builder.add_root_certificate(cert);
        }
        builder
            .build()
            .map_err(|e| WatchError::ClusterSession(format!("failed to build client: {e}")))
    }
}

impl fmt::Debug for KubeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeConfig")
            .field("api_server", &self.api_server)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("ca_pem_len", &self.ca_pem.as_ref().map(Vec::len))
            .finish()
    }
}

fn host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(WatchError::ClusterSession(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Vec<u8>>> + Send>>;

/// A cluster-wide event watch.
pub struct KubeEventSource {
    body: ByteStream,
    lines: LineBuffer,
    ended: bool,
}

impl KubeEventSource {
    /// Opens the watch subscription.
    ///
    /// # Errors
    ///
    /// Returns `WatchError::WatchSetup` if the request fails or the API server
    /// rejects it.
    pub async fn connect(config: &KubeConfig) -> Result<Self> {
        let client = config.client()?;
        let url = format!("{}{EVENTS_WATCH_PATH}", config.api_server);

        let mut request = client.get(&url);
        if let Some(token) = &config.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| WatchError::WatchSetup(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::WatchSetup(format!(
                "api server returned {status}: {}",
                body.trim()
            )));
        }

        info!(url = %url, "watching events in all namespaces");

        let body = response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec()));
        Ok(Self::from_stream(Box::pin(body)))
    }

    fn from_stream(body: ByteStream) -> Self {
        Self {
            body,
            lines: LineBuffer::default(),
            ended: false,
        }
    }
}

impl fmt::Debug for KubeEventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventSource")
            .field("buffered_lines", &self.lines.complete.len())
            .field("ended", &self.ended)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl EventSource for KubeEventSource {
    async fn recv(&mut self) -> Result<Received> {
        loop {
            if let Some(line) = self.lines.next_line() {
                if let Some((kind, event)) = decode_watch_line(&line)? {
                    return Ok(Received::Event(kind, event));
                }
                continue;
            }

            if self.ended {
                return Ok(Received::Closed);
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.lines.push(&chunk)?,
                Some(Err(e)) => return Err(WatchError::Stream(e.to_string())),
                None => {
                    self.lines.finish();
                    self.ended = true;
                }
            }
        }
    }
}

/// Splits a byte stream into newline-terminated lines.
#[derive(Debug)]
struct LineBuffer {
    partial: Vec<u8>,
    complete: VecDeque<Vec<u8>>,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    fn with_max_line(max_line: usize) -> Self {
        Self {
            partial: Vec::new(),
            complete: VecDeque::new(),
            max_line,
        }
    }

    fn push(&mut self, chunk: &[u8]) -> Result<()> {
        for &byte in chunk {
            if byte == b'\n' {
                self.complete.push_back(std::mem::take(&mut self.partial));
            } else {
                if self.partial.len() >= self.max_line {
                    return Err(WatchError::Decode(format!(
                        "watch line exceeds {} bytes",
                        self.max_line
                    )));
                }
                self.partial.push(byte);
            }
        }
        Ok(())
    }

    /// Flushes an unterminated trailing line.
    fn finish(&mut self) {
        if !self.partial.is_empty() {
            self.complete.push_back(std::mem::take(&mut self.partial));
        }
    }

    fn next_line(&mut self) -> Option<Vec<u8>> {
        self.complete.pop_front()
    }
}

#[derive(Debug, Deserialize)]
struct WatchLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    object: serde_json::Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WatchStatus {
    message: String,
    code: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectMeta {
    namespace: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ObjectReference {
    kind: String,
    namespace: String,
    name: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventSourceRef {
    component: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EventSeries {
    count: u32,
}

/// A core `v1` event. Events recorded through `events.k8s.io/v1` surface
/// here with an empty `source` and a `reportingComponent` instead, and carry
/// recurrences in `series`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct KubeEvent {
    metadata: ObjectMeta,
    involved_object: ObjectReference,
    reason: String,
    message: String,
    source: EventSourceRef,
    reporting_component: String,
    count: Option<u32>,
    series: Option<EventSeries>,
    first_timestamp: Option<DateTime<Utc>>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl From<KubeEvent> for Event {
    fn from(e: KubeEvent) -> Self {
        let namespace = if e.metadata.namespace.is_empty() {
            e.involved_object.namespace
        } else {
            e.metadata.namespace
        };
        let name = if e.metadata.name.is_empty() {
            e.involved_object.name
        } else {
            e.metadata.name
        };

        let source_component = if e.source.component.is_empty() {
            e.reporting_component
        } else {
            e.source.component
        };
        let count = e
            .count
            .filter(|c| *c > 0)
            .or_else(|| e.series.map(|s| s.count))
            .unwrap_or_default();

        Self {
            reason: e.reason,
            message: e.message,
            involved_object_kind: e.involved_object.kind,
            source_component,
            count,
            namespace,
            name,
            first_timestamp: e.first_timestamp,
            last_timestamp: e.last_timestamp,
        }
    }
}

/// Decodes one watch line.
///
/// Blank lines and bookmarks yield `None`. A watch `ERROR` object ends the
/// stream with `WatchError::Stream`.
fn decode_watch_line(line: &[u8]) -> Result<Option<(ChangeKind, Event)>> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }

    let watch: WatchLine = serde_json::from_slice(line)?;
    match watch.kind.as_str() {
        "BOOKMARK" => {
            debug!("skipping watch bookmark");
            Ok(None)
        }
        "ERROR" => {
            let status: WatchStatus = serde_json::from_value(watch.object).unwrap_or_default();
            Err(WatchError::Stream(match status.code {
                Some(code) => format!("watch error {code}: {}", status.message),
                None => format!("watch error: {}", status.message),
            }))
        }
        kind => {
            let kind: ChangeKind = kind.parse()?;
            let event: KubeEvent = serde_json::from_value(watch.object)?;
            Ok(Some((kind, event.into())))
        }
    }
}
