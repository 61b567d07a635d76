//! Mail exchanger resolution.
//!
//! [`DohResolver`] queries the JSON flavour of DNS-over-HTTPS, alternating
//! between providers on every lookup. [`StaticResolver`] returns a fixed
//! list and is used when exchangers are given explicitly.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Public DNS-over-HTTPS JSON endpoints.
pub const DEFAULT_ENDPOINTS: &[&str] = &[
    "https://cloudflare-dns.com/dns-query",
    "https://dns.google/resolve",
];

/// DNS record type number for MX.
const MX_TYPE: u16 = 15;

/// A mail exchanger for a domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MxRecord {
    /// Exchanger hostname, without trailing dot.
    pub exchange: String,
    /// Preference; lower is tried first.
    pub priority: u16,
}

/// Resolves the mail exchangers of a domain.
pub trait MxResolver: Send + Sync {
    /// Returns the exchangers of `domain`, lowest priority value first.
    fn resolve_mx(&self, domain: &str) -> impl Future<Output = Result<Vec<MxRecord>>> + Send;
}

/// Returns the part after the last `@`, if any.
#[must_use]
pub fn domain_from(email: &str) -> Option<&str> {
    email
        .rsplit_once('@')
        .map(|(_, domain)| domain)
        .filter(|domain| !domain.is_empty())
}

/// Parses the `data` field of an MX answer, e.g. `"10 mx.example.com."`.
#[must_use]
pub fn parse_mx_data(data: &str) -> Option<MxRecord> {
    let (priority, exchange) = data.trim().split_once(char::is_whitespace)?;
    let exchange = exchange.trim().trim_end_matches('.');
    if exchange.is_empty() {
        return None;
    }
    Some(MxRecord {
        exchange: exchange.to_string(),
        priority: priority.parse().ok()?,
    })
}

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

/// DNS-over-HTTPS resolver using the JSON API.
#[derive(Debug)]
pub struct DohResolver {
    client: reqwest::Client,
    endpoints: Vec<String>,
    next: AtomicUsize,
}

impl DohResolver {
    /// Creates a resolver for the given endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no endpoint is given.
    pub fn new(endpoints: Vec<String>) -> Result<Self> {
        if endpoints.is_empty() {
            return Err(Error::Config("no DNS-over-HTTPS endpoint configured".into()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            endpoints,
            next: AtomicUsize::new(0),
        })
    }

    fn endpoint(&self) -> &str {
        let index = self.next.fetch_add(1, Ordering::Relaxed) % self.endpoints.len();
        &self.endpoints[index]
    }
}

impl Default for DohResolver {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoints: DEFAULT_ENDPOINTS.iter().map(ToString::to_string).collect(),
            next: AtomicUsize::new(0),
        }
    }
}

impl MxResolver for DohResolver {
    async fn resolve_mx(&self, domain: &str) -> Result<Vec<MxRecord>> {
        let endpoint = self.endpoint();
        debug!(domain, endpoint, "resolving MX");

        let response: DohResponse = self
            .client
            .get(endpoint)
            .query(&[("name", domain), ("type", "MX")])
            .header(reqwest::header::ACCEPT, "application/dns-json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if response.status != 0 {
            return Err(Error::Dns(format!(
                "lookup of {domain} failed with status {}",
                response.status
            )));
        }

        let mut records: Vec<MxRecord> = response
            .answer
            .iter()
            .filter(|answer| answer.record_type == MX_TYPE)
            .filter_map(|answer| parse_mx_data(&answer.data))
            .collect();
        records.sort_by_key(|record| record.priority);

        debug!(domain, count = records.len(), "MX resolved");
        Ok(records)
    }
}

/// Resolver returning the same exchangers for every domain.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    records: Vec<MxRecord>,
}

impl StaticResolver {
    /// Uses `hosts` in the given order.
    #[must_use]
    pub fn new<I, H>(hosts: I) -> Self
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        let records = hosts
            .into_iter()
            .zip((0u16..).step_by(10))
            .map(|(host, priority)| MxRecord {
                exchange: host.into(),
                priority,
            })
            .collect();
        Self { records }
    }
}

impl MxResolver for StaticResolver {
    async fn resolve_mx(&self, _domain: &str) -> Result<Vec<MxRecord>> {
        Ok(self.records.clone())
    }
}
