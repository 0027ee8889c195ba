use async_trait::async_trait;
use reqwest::Url;
use std::time::Instant;
use tokio::net::TcpStream;

use super::{Probe, ProbeError, ProbeReport, host_and_port, parse_address};

/// Opens a TCP connection to `tcp://host:port` and closes it again.
#[derive(Debug, Default, Clone)]
pub struct TcpProbe;

impl TcpProbe {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Probe for TcpProbe {
    async fn probe(&self, address: &str) -> Result<ProbeReport, ProbeError> {
        let url = parse_address(address)?;
        let (host, port) = host_and_port(&url, None)?;

        let start_time = Instant::now();
        let _stream = TcpStream::connect((host.as_str(), port)).await?;
        Ok(ProbeReport::up().with_latency(start_time.elapsed()))
    }

    fn supports(&self, url: &Url) -> bool {
        url.host_str().is_some() && url.port().is_some()
    }
}
