//! Contact enrichment by professional-profile URL.
//!
//! A single profile may fan out into multiple output rows (one per known
//! email address). A profile the endpoint definitively does not know is still
//! emitted as a single "Not Found" row, and that negative answer is cached as
//! a terminal record so repeat runs stop paying for it.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use tracing::{info, warn};

use crate::cache::{EnrichmentCache, CONTACT_NAMESPACE};
use crate::retry::{retry_after, Backoff, FailureClass, MAX_ATTEMPTS};

static PROFILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(https?://)?(www\.)?linkedin\.com/in/[a-zA-Z0-9_-]+/?$").unwrap()
});

pub fn is_valid_profile_url(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && PROFILE_RE.is_match(url)
}

/// Normalize a profile URL to `http(s)://www.linkedin.com/in/<slug>` form so
/// cache keys and API calls agree on one spelling.
pub fn normalize_profile_url(url: &str) -> String {
    let mut url = url.trim().trim_end_matches('/').to_string();
    if url.is_empty() {
        return url;
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        url = format!("http://{url}");
    }
    if !url.contains("www.") {
        url = url.replace("linkedin.com", "www.linkedin.com");
    }
    url
}

/// One flat output row per (profile, email) pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContactRecord {
    pub profile_url: String,
    pub full_name: String,
    pub first_name: String,
    pub last_name: String,
    pub title: String,
    pub headline: String,
    pub email: String,
    pub email_type: String,
    pub email_status: String,
    pub organization_name: String,
    pub organization_domain: String,
    pub location: String,
}

fn text(value: Option<&JsonValue>, key: &str) -> String {
    value
        .and_then(|v| v.get(key))
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Flatten a person payload into output rows, one per email address.
/// `None` (or a person without emails) yields a single placeholder row.
pub fn extract_contact_rows(person: Option<&JsonValue>, original_url: &str) -> Vec<ContactRecord> {
    let organization = person.and_then(|p| p.get("organization"));
    let base = ContactRecord {
        profile_url: original_url.to_string(),
        full_name: text(person, "full_name"),
        first_name: text(person, "first_name"),
        last_name: text(person, "last_name"),
        title: text(person, "title"),
        headline: text(person, "headline"),
        email: String::new(),
        email_type: String::new(),
        email_status: "Not Found".to_string(),
        organization_name: text(organization, "name"),
        organization_domain: text(organization, "website_domain"),
        location: text(person, "location"),
    };

    let emails = person
        .and_then(|p| p.get("emails"))
        .and_then(JsonValue::as_array)
        .filter(|emails| !emails.is_empty());

    match emails {
        Some(emails) => emails
            .iter()
            .map(|entry| ContactRecord {
                email: text(Some(entry), "email"),
                email_type: text(Some(entry), "type"),
                email_status: text(Some(entry), "status"),
                ..base.clone()
            })
            .collect(),
        None => vec![base],
    }
}

/// Client for a per-profile contact-enrichment endpoint.
pub struct ContactEnrichClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    backoff: Backoff,
    request_timeout: Duration,
}

/// Marker stored for profiles the endpoint definitively does not know.
fn negative_record() -> JsonValue {
    json!({ "status": "unknown" })
}

fn is_negative(record: &JsonValue) -> bool {
    record.get("status").and_then(JsonValue::as_str) == Some("unknown")
}

fn has_emails(record: &JsonValue) -> bool {
    record
        .get("emails")
        .and_then(JsonValue::as_array)
        .is_some_and(|emails| !emails.is_empty())
}

impl ContactEnrichClient {
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

    /// Enrich one profile URL into zero or more rows.
    pub async fn enrich_profile(
        &self,
        profile_url: &str,
        cache: Option<&dyn EnrichmentCache>,
    ) -> Vec<ContactRecord> {
        if !is_valid_profile_url(profile_url) {
            return Vec::new();
        }
        let normalized = normalize_profile_url(profile_url);

        if let Some(cache) = cache {
            if let Some(cached) = cache.get(CONTACT_NAMESPACE, &normalized).await {
                if has_emails(&cached) {
                    return extract_contact_rows(Some(&cached), profile_url);
                }
                if is_negative(&cached) {
                    return extract_contact_rows(None, profile_url);
                }
            }
        }

        let person = self.call_enrich(&normalized).await;

        if let Some(cache) = cache {
            match &person {
                Some(person) if has_emails(person) => {
                    cache.set(CONTACT_NAMESPACE, &normalized, person.clone()).await;
                }
                Some(_) | None => {
                    cache
                        .set(CONTACT_NAMESPACE, &normalized, negative_record())
                        .await;
                }
            }
        }

        extract_contact_rows(person.as_ref(), profile_url)
    }

    /// One lookup with bounded retries. `404` is a definitive negative, not an
    /// error; exhausted retries degrade to `None`.
    async fn call_enrich(&self, profile_url: &str) -> Option<JsonValue> {
        for attempt in 0..MAX_ATTEMPTS {
            info!(profile_url, attempt = attempt + 1, "contact enrichment lookup");

            let response = self
                .http
                .get(&self.endpoint)
                .timeout(self.request_timeout)
                .query(&[("profile_url", profile_url), ("api_key", &self.api_key)])
                .send()
                .await;

            let class = match response {
                Ok(response) => {
                    let status = response.status();
                    if status.as_u16() == 404 {
                        info!(profile_url, "no contact found");
                        return None;
                    }
                    if status.as_u16() == 429 {
                        FailureClass::RateLimited(retry_after(response.headers()))
                    } else if status.is_server_error() {
                        FailureClass::Server
                    } else if !status.is_success() {
                        warn!(%status, "contact enrichment request rejected");
                        return None;
                    } else {
                        match response.json::<JsonValue>().await {
                            Ok(person) => {
                                info!(
                                    emails = person
                                        .get("emails")
                                        .and_then(JsonValue::as_array)
                                        .map_or(0, Vec::len),
                                    "contact enrichment returned"
                                );
                                return Some(person);
                            }
                            Err(e) => {
                                warn!("failed to parse contact response: {e}");
                                return None;
                            }
                        }
                    }
                }
                Err(e) if e.is_timeout() => FailureClass::Timeout,
                Err(e) => {
                    warn!("contact enrichment transport error: {e}");
                    FailureClass::Transport
                }
            };

            if attempt + 1 < MAX_ATTEMPTS {
                let delay = self.backoff.delay(&class, attempt);
                warn!(?class, attempt, ?delay, "retrying contact enrichment");
                tokio::time::sleep(delay).await;
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn profile_url_validation() {
        assert!(is_valid_profile_url("https://www.linkedin.com/in/someone"));
        assert!(is_valid_profile_url("linkedin.com/in/some_one-2/"));
        assert!(!is_valid_profile_url("https://example.com/in/someone"));
        assert!(!is_valid_profile_url("linkedin.com/company/acme"));
        assert!(!is_valid_profile_url(""));
    }

    #[test]
    fn normalization_adds_scheme_and_www() {
        assert_eq!(
            normalize_profile_url("linkedin.com/in/someone/"),
            "http://www.linkedin.com/in/someone"
        );
        assert_eq!(
            normalize_profile_url("https://www.linkedin.com/in/someone"),
            "https://www.linkedin.com/in/someone"
        );
    }

    #[test]
    fn fan_out_one_row_per_email() {
        let person = json!({
            "full_name": "Ada Lovelace",
            "emails": [
                {"email": "ada@example.com", "type": "work", "status": "verified"},
                {"email": "ada@personal.example", "type": "personal", "status": "guessed"},
            ],
            "organization": {"name": "Analytical Engines", "website_domain": "example.com"},
        });
        let rows = extract_contact_rows(Some(&person), "linkedin.com/in/ada");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].full_name, "Ada Lovelace");
        assert_eq!(rows[0].email, "ada@example.com");
        assert_eq!(rows[1].email_status, "guessed");
        assert_eq!(rows[1].organization_name, "Analytical Engines");
    }

    #[test]
    fn missing_person_yields_placeholder_row() {
        let rows = extract_contact_rows(None, "linkedin.com/in/ghost");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email_status, "Not Found");
        assert!(rows[0].full_name.is_empty());
    }

    #[tokio::test]
    async fn not_found_terminates_without_retry() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/enrich");
            then.status(404);
        });

        let client = ContactEnrichClient::new(server.url("/enrich"), "key")
            .with_backoff(Backoff::none());
        let rows = client
            .enrich_profile("linkedin.com/in/ghost", None)
            .await;

        mock.assert_hits(1);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email_status, "Not Found");
    }

    #[tokio::test]
    async fn server_errors_are_retried_then_degrade() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/enrich");
            then.status(503);
        });

        let client = ContactEnrichClient::new(server.url("/enrich"), "key")
            .with_backoff(Backoff::none());
        let rows = client
            .enrich_profile("linkedin.com/in/someone", None)
            .await;

        mock.assert_hits(3);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].email_status, "Not Found");
    }
}
