//! Company enrichment by root domain (bulk endpoint).

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::cache::{EnrichmentCache, COMPANY_NAMESPACE};
use crate::retry::{retry_after, Backoff, FailureClass, MAX_ATTEMPTS};

static DOMAIN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9-]+\.[a-zA-Z]{2,}$").unwrap());

/// The bulk endpoint expects bare root domains: no scheme, no `www.`, no
/// mailbox syntax.
pub fn is_valid_domain(domain: &str) -> bool {
    let domain = domain.trim();
    if domain.is_empty() || domain.contains("www.") || domain.contains('@') {
        return false;
    }
    if domain.starts_with("http://") || domain.starts_with("https://") {
        return false;
    }
    DOMAIN_RE.is_match(domain)
}

/// One flat output row per enriched company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompanyRecord {
    pub name: String,
    pub organization_name: String,
    pub domain: String,
    pub website: String,
    pub industry: String,
    pub employees: String,
    pub founded_year: String,
    pub description: String,
    pub city: String,
    pub state: String,
    pub country: String,
    pub phone: String,
}

impl CompanyRecord {
    fn from_organization(org: &JsonValue, domain: &str) -> Self {
        let text = |key: &str| -> String {
            match org.get(key) {
                Some(JsonValue::String(s)) => s.clone(),
                Some(JsonValue::Null) | None => String::new(),
                Some(other) => other.to_string(),
            }
        };
        Self {
            name: domain.to_string(),
            organization_name: text("name"),
            domain: text("primary_domain"),
            website: text("website_url"),
            industry: text("industry"),
            employees: text("estimated_num_employees"),
            founded_year: text("founded_year"),
            description: text("short_description"),
            city: text("city"),
            state: text("state"),
            country: text("country"),
            phone: text("phone"),
        }
    }
}

/// Client for a bulk company-enrichment endpoint.
pub struct CompanyEnrichClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    backoff: Backoff,
    request_timeout: Duration,
}

impl CompanyEnrichClient {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            backoff: Backoff::standard(),
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Enrich a batch of domains, consulting the cache first.
    ///
    /// Invalid domains are filtered out without consuming a network call.
    /// Only positive responses are cached; a domain the endpoint knows nothing
    /// about may be transient and is re-attempted on the next run.
    pub async fn enrich_domains(
        &self,
        domains: &[String],
        cache: Option<&dyn EnrichmentCache>,
    ) -> Vec<CompanyRecord> {
        let valid: Vec<&String> = domains.iter().filter(|d| is_valid_domain(d)).collect();
        if valid.is_empty() {
            return Vec::new();
        }

        let mut records = Vec::new();
        let mut uncached: Vec<String> = Vec::new();

        for domain in valid {
            match cache {
                Some(cache) => match cache.get(COMPANY_NAMESPACE, domain).await {
                    Some(org) => records.push(CompanyRecord::from_organization(&org, domain)),
                    None => uncached.push(domain.clone()),
                },
                None => uncached.push(domain.clone()),
            }
        }

        info!(
            cached = records.len(),
            uncached = uncached.len(),
            "company enrichment batch"
        );

        if !uncached.is_empty() {
            let organizations = self.call_bulk(&uncached).await;
            for org in organizations {
                let domain = org
                    .get("primary_domain")
                    .and_then(JsonValue::as_str)
                    .unwrap_or_default()
                    .to_string();
                if !domain.is_empty() {
                    if let Some(cache) = cache {
                        cache.set(COMPANY_NAMESPACE, &domain, org.clone()).await;
                    }
                }
                records.push(CompanyRecord::from_organization(&org, &domain));
            }
        }

        records
    }

    /// One bulk call with bounded retries; degrades to an empty list.
    async fn call_bulk(&self, domains: &[String]) -> Vec<JsonValue> {
        let params: Vec<(&str, &str)> = domains
            .iter()
            .map(|d| ("domains[]", d.as_str()))
            .collect();

        for attempt in 0..MAX_ATTEMPTS {
            let response = self
                .http
                .post(&self.endpoint)
                .timeout(self.request_timeout)
                .query(&params)
                .header("x-api-key", &self.api_key)
                .header("Cache-Control", "no-cache")
                .json(&serde_json::json!({}))
                .send()
                .await;

            let class = match response {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 404 {
                        // Definitive: nothing known for these domains.
                        return Vec::new();
                    }
                    if status.as_u16() == 429 {
                        FailureClass::RateLimited(retry_after(response.headers()))
                    } else if status.is_server_error() {
                        FailureClass::Server
                    } else if !status.is_success() {
                        warn!(%status, "company enrichment request rejected");
                        return Vec::new();
                    } else {
                        match response.json::<JsonValue>().await {
                            Ok(body) => {
                                let organizations = body
                                    .get("organizations")
                                    .and_then(JsonValue::as_array)
                                    .cloned()
                                    .unwrap_or_default();
                                info!(count = organizations.len(), "company enrichment returned");
                                return organizations;
                            }
                            Err(e) => {
                                warn!("failed to parse company enrichment response: {e}");
                                return Vec::new();
                            }
                        }
                    }
                }
                Err(e) if e.is_timeout() => FailureClass::Timeout,
                Err(e) => {
                    warn!("company enrichment transport error: {e}");
                    FailureClass::Transport
                }
            };

            if attempt + 1 < MAX_ATTEMPTS {
                let delay = self.backoff.delay(&class, attempt);
                warn!(?class, attempt, ?delay, "retrying company enrichment");
                tokio::time::sleep(delay).await;
            }
        }

        Vec::new()
    }
}
