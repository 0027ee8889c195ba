use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::{Duration, Instant};

use super::{Probe, ProbeError, ProbeReport};

/// GETs the address; a 2xx final response counts as up.
pub struct HttpProbe {
    client: Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, address: &str) -> Result<ProbeReport, ProbeError> {
        let start_time = Instant::now();
        let response = self.client.get(address).send().await?;
        let latency = start_time.elapsed();

        let status = response.status();
        let report = if status.is_success() {
            ProbeReport::up()
        } else {
            ProbeReport::down()
        };
        Ok(report
            .with_meta("http_status", status.as_u16())
            .with_latency(latency))
    }

    fn supports(&self, url: &Url) -> bool {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some()
    }
}
