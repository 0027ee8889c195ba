//! Liveness probes. The scheduler only sees the [`Probe`] trait; the concrete
//! checkers here are wired in by the binary.
use async_trait::async_trait;
use reqwest::Url;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::monitor::models::ProbeStatus;

pub mod http;
pub mod minecraft;
pub mod tcp;

pub use http::HttpProbe;
pub use minecraft::MinecraftProbe;
pub use tcp::TcpProbe;

#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// What a single check reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub status: ProbeStatus,
    pub metadata: BTreeMap<String, String>,
    pub latency: Option<Duration>,
}

impl ProbeReport {
    pub fn up() -> Self {
        Self {
            status: ProbeStatus::Up,
            metadata: BTreeMap::new(),
            latency: None,
        }
    }

    pub fn down() -> Self {
        Self {
            status: ProbeStatus::Down,
            ..Self::up()
        }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// One-shot liveness check against an address.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, address: &str) -> Result<ProbeReport, ProbeError>;

    /// Whether this probe understands the address at all. Consulted when a
    /// target is added so unusable addresses are rejected up front.
    fn supports(&self, _url: &Url) -> bool {
        true
    }
}

pub(crate) fn parse_address(address: &str) -> Result<Url, ProbeError> {
    Url::parse(address).map_err(|e| ProbeError::InvalidAddress(format!("{address}: {e}")))
}

/// `host:port` of a URL, falling back to `default_port` when none is given.
pub(crate) fn host_and_port(
    url: &Url,
    default_port: Option<u16>,
) -> Result<(String, u16), ProbeError> {
    let host = url
        .host_str()
        .ok_or_else(|| ProbeError::InvalidAddress(format!("{url}: missing host")))?;
    let port = url
        .port()
        .or(default_port)
        .ok_or_else(|| ProbeError::InvalidAddress(format!("{url}: missing port")))?;
    Ok((host.to_string(), port))
}

/// Dispatches to a probe by URL scheme.
#[derive(Default, Clone)]
pub struct ProbeRouter {
    routes: HashMap<String, Arc<dyn Probe>>,
}

impl ProbeRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, scheme: &str, probe: Arc<dyn Probe>) -> Self {
        self.routes.insert(scheme.to_ascii_lowercase(), probe);
        self
    }

    /// HTTP(S), TCP and Minecraft probes sharing one timeout.
    pub fn with_defaults(timeout: Duration) -> Result<Self, ProbeError> {
        let http: Arc<dyn Probe> = Arc::new(HttpProbe::new(timeout)?);
        Ok(Self::new()
            .route("http", http.clone())
            .route("https", http)
            .route("tcp", Arc::new(TcpProbe::new()))
            .route("minecraft", Arc::new(MinecraftProbe::new())))
    }

    pub fn schemes(&self) -> Vec<&str> {
        let mut schemes: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        schemes
    }
}

#[async_trait]
impl Probe for ProbeRouter {
    async fn probe(&self, address: &str) -> Result<ProbeReport, ProbeError> {
        let url = parse_address(address)?;
        let probe = self
            .routes
            .get(url.scheme())
            .ok_or_else(|| ProbeError::UnsupportedScheme(url.scheme().to_string()))?;
        probe.probe(address).await
    }

    fn supports(&self, url: &Url) -> bool {
        self.routes
            .get(url.scheme())
            .is_some_and(|probe| probe.supports(url))
    }
}
