//! HTTP health probe run after a deployment.
//!
//! Every endpoint gets exactly one result; a slow or broken endpoint never
//! aborts the batch.

use std::time::{Duration, Instant};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use url::Url;

use crate::error::ShipyardResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum EndpointStatus {
    /// 2xx response
    Healthy { http_status: u16 },
    /// Any other response code
    Unhealthy { http_status: u16 },
    Timeout,
    /// Connection refused, DNS failure, TLS error, ...
    Error { message: String },
}

impl EndpointStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::Healthy { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointResult {
    pub endpoint: Url,
    #[serde(flatten)]
    pub status: EndpointStatus,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeReport {
    pub checked_at: DateTime<Utc>,
    /// One entry per requested endpoint, in request order
    pub results: Vec<EndpointResult>,
}

impl ProbeReport {
    pub fn all_healthy(&self) -> bool {
        self.results.iter().all(|r| r.status.is_healthy())
    }

    pub fn failed_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !r.status.is_healthy())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct VerificationProbe {
    client: reqwest::Client,
    timeout: Duration,
}

impl VerificationProbe {
    pub fn new(timeout: Duration, use_proxy: bool) -> ShipyardResult<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("shipyard/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout);
        if !use_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().context("Failed to build HTTP client")?;
        Ok(Self { client, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// GET every endpoint concurrently, each bounded by the probe timeout.
    pub async fn check(&self, endpoints: &[Url]) -> ProbeReport {
        let mut set = JoinSet::new();
        for (idx, endpoint) in endpoints.iter().enumerate() {
            let client = self.client.clone();
            let endpoint = endpoint.clone();
            let timeout = self.timeout;
            set.spawn(async move { (idx, check_one(client, endpoint, timeout).await) });
        }

        let mut slots: Vec<Option<EndpointResult>> = vec![None; endpoints.len()];
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, result)) => slots[idx] = Some(result),
                Err(err) => tracing::warn!(error = %err, "probe task aborted"),
            }
        }

        let results = slots
            .into_iter()
            .zip(endpoints)
            .map(|(slot, endpoint)| {
                slot.unwrap_or_else(|| EndpointResult {
                    endpoint: endpoint.clone(),
                    status: EndpointStatus::Error {
                        message: "probe task aborted".to_string(),
                    },
                    latency_ms: 0,
                })
            })
            .collect();

        ProbeReport {
            checked_at: Utc::now(),
            results,
        }
    }
}

async fn check_one(client: reqwest::Client, endpoint: Url, timeout: Duration) -> EndpointResult {
    let started = Instant::now();
    let status = match tokio::time::timeout(timeout, client.get(endpoint.clone()).send()).await {
        Err(_) => EndpointStatus::Timeout,
        Ok(Err(err)) if err.is_timeout() => EndpointStatus::Timeout,
        Ok(Err(err)) => EndpointStatus::Error {
            message: error_chain(&err),
        },
        Ok(Ok(response)) => {
            let code = response.status();
            if code.is_success() {
                EndpointStatus::Healthy {
                    http_status: code.as_u16(),
                }
            } else {
                EndpointStatus::Unhealthy {
                    http_status: code.as_u16(),
                }
            }
        }
    };
    let latency_ms = started.elapsed().as_millis() as u64;

    if status.is_healthy() {
        tracing::debug!(endpoint = %endpoint, latency_ms, "endpoint healthy");
    } else {
        tracing::warn!(endpoint = %endpoint, ?status, latency_ms, "endpoint check failed");
    }

    EndpointResult {
        endpoint,
        status,
        latency_ms,
    }
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(raw: &str) -> Url {
        Url::parse(raw).unwrap()
    }

    #[test]
    fn report_counts_failures() {
        let report = ProbeReport {
            checked_at: Utc::now(),
            results: vec![
                EndpointResult {
                    endpoint: url("http://a.test/"),
                    status: EndpointStatus::Healthy { http_status: 200 },
                    latency_ms: 3,
                },
                EndpointResult {
                    endpoint: url("http://b.test/"),
                    status: EndpointStatus::Timeout,
                    latency_ms: 5000,
                },
            ],
        };
        assert!(!report.all_healthy());
        assert_eq!(report.failed_count(), 1);
    }

    #[test]
    fn empty_report_is_healthy() {
        let report = ProbeReport {
            checked_at: Utc::now(),
            results: Vec::new(),
        };
        assert!(report.all_healthy());
    }

    #[tokio::test]
    async fn connection_refused_is_reported_not_raised() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let probe = VerificationProbe::new(Duration::from_secs(2), false).unwrap();
        let report = probe
            .check(&[url(&format!("http://127.0.0.1:{}/health", port))])
            .await;

        assert_eq!(report.results.len(), 1);
        assert!(matches!(
            report.results[0].status,
            EndpointStatus::Error { .. }
        ));
    }
}
