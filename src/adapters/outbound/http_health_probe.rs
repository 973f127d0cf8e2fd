//! HTTP Health Probe
//!
//! Implements HealthProbe with a single GET against a node's health
//! endpoint. Only a 200 response counts as healthy.

use crate::domain::ports::HealthProbe;
use crate::error::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

pub struct HttpHealthProbe {
    client: reqwest::Client,
    port: u16,
    path: String,
}

impl HttpHealthProbe {
    /// `timeout` bounds both connecting and waiting for the response.
    pub fn new(port: u16, path: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout * 2)
            .build()?;

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        Ok(Self { client, port, path })
    }

    pub fn url_for(&self, address: IpAddr) -> String {
        format!("http://{}{}", SocketAddr::new(address, self.port), self.path)
    }
}

#[async_trait]
impl HealthProbe for HttpHealthProbe {
    async fn probe(&self, address: IpAddr) -> bool {
        let url = self.url_for(address);
        match self.client.get(&url).send().await {
            Ok(response) if response.status() == StatusCode::OK => true,
            Ok(response) => {
                tracing::debug!("health probe {} returned {}", url, response.status());
                false
            }
            Err(e) => {
                tracing::debug!("health probe {} failed: {}", url, e);
                false
            }
        }
    }
}
