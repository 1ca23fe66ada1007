//! Email deliverability checks via DNS MX lookups.
//!
//! Outcome policy: a definitive answer (records found, NXDOMAIN, empty
//! answer) is cached; an ambiguous failure (timeout, no reachable
//! nameservers) reports the domain as deliverable *without* caching, so the
//! next run re-attempts the lookup. Over-rejecting valid domains is worse
//! than under-rejecting invalid ones.

use std::collections::HashMap;
use std::sync::{LazyLock, Mutex};
use std::time::{Duration, Instant};

use futures::future::join_all;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::error::{ResolveError, ResolveErrorKind};
use hickory_resolver::TokioAsyncResolver;
use regex::Regex;
use tracing::{info, warn};

/// Domains per concurrently-dispatched batch.
pub const MX_BATCH_SIZE: usize = 50;

/// In-process result cache bounds.
const CACHE_TTL: Duration = Duration::from_secs(3600);
const CACHE_CAPACITY: usize = 50_000;

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

/// Syntactic email check; the cheap filter before any DNS work.
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// The normalized domain part of an email address.
pub fn email_domain(email: &str) -> Option<String> {
    let (_, domain) = email.split_once('@')?;
    if domain.is_empty() {
        return None;
    }
    Some(domain.trim().to_lowercase())
}

/// How an MX lookup result should be interpreted.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum MxOutcome {
    /// Cacheable answer.
    Definitive(bool),
    /// Ambiguous failure; report but never cache.
    Assume(bool),
}

fn classify(result: Result<bool, &ResolveError>) -> MxOutcome {
    match result {
        Ok(has_records) => MxOutcome::Definitive(has_records),
        Err(e) => match e.kind() {
            // NXDOMAIN and empty answers both land here.
            ResolveErrorKind::NoRecordsFound { .. } => MxOutcome::Definitive(false),
            ResolveErrorKind::Timeout => MxOutcome::Assume(true),
            _ => MxOutcome::Assume(true),
        },
    }
}

struct CachedMx {
    has_mx: bool,
    inserted_at: Instant,
}

/// MX-record validator with a short-TTL in-process cache.
///
/// The cache takes an explicit lock: lookups run from many spawned tasks
/// concurrently, so scheduler-level exclusivity is not enough here.
pub struct MxValidator {
    resolver: TokioAsyncResolver,
    cache: Mutex<HashMap<String, CachedMx>>,
}

impl MxValidator {
    /// Build a validator on the system resolver configuration, falling back
    /// to a public default when none can be read.
    pub fn new() -> Self {
        let resolver = TokioAsyncResolver::tokio_from_system_conf().unwrap_or_else(|e| {
            warn!("failed to read system resolver config, using defaults: {e}");
            let mut opts = ResolverOpts::default();
            opts.timeout = Duration::from_secs(2);
            opts.attempts = 2;
            TokioAsyncResolver::tokio(ResolverConfig::default(), opts)
        });
        Self {
            resolver,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether `domain` can receive mail.
    pub async fn check_domain(&self, domain: &str) -> bool {
        let key = domain.trim().to_lowercase();
        if key.is_empty() {
            return false;
        }

        if let Some(hit) = self.cache_get(&key) {
            return hit;
        }

        let lookup = self.resolver.mx_lookup(key.as_str()).await;
        let result = lookup.as_ref().map(|mx| mx.iter().next().is_some());
        match classify(result) {
            MxOutcome::Definitive(has_mx) => {
                self.cache_put(key, has_mx);
                has_mx
            }
            MxOutcome::Assume(assumed) => assumed,
        }
    }

    /// Validate a set of domains: deduplicated, normalized, dispatched in
    /// batches of [`MX_BATCH_SIZE`] awaited together, batches sequential.
    pub async fn validate_domains(&self, domains: &[String]) -> HashMap<String, bool> {
        let mut unique: Vec<String> = domains
            .iter()
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        unique.sort();
        unique.dedup();

        info!(count = unique.len(), "validating MX records");

        let mut results = HashMap::with_capacity(unique.len());
        for batch in unique.chunks(MX_BATCH_SIZE) {
            let lookups = batch.iter().map(|domain| self.check_domain(domain));
            for (domain, has_mx) in batch.iter().zip(join_all(lookups).await) {
                results.insert(domain.clone(), has_mx);
            }
        }

        let valid = results.values().filter(|v| **v).count();
        info!(valid, total = results.len(), "MX validation complete");
        results
    }

    fn cache_get(&self, key: &str) -> Option<bool> {
        let mut cache = self.cache.lock().unwrap();
        match cache.get(key) {
            Some(entry) if entry.inserted_at.elapsed() < CACHE_TTL => Some(entry.has_mx),
            Some(_) => {
                cache.remove(key);
                None
            }
            None => None,
        }
    }

    fn cache_put(&self, key: String, has_mx: bool) {
        self.cache_put_at(key, has_mx, Instant::now());
    }

    fn cache_put_at(&self, key: String, has_mx: bool, inserted_at: Instant) {
        let mut cache = self.cache.lock().unwrap();
        if cache.len() >= CACHE_CAPACITY {
            cache.retain(|_, entry| entry.inserted_at.elapsed() < CACHE_TTL);
            if cache.len() >= CACHE_CAPACITY {
                return;
            }
        }
        cache.insert(key, CachedMx { has_mx, inserted_at });
    }

    #[cfg(test)]
    fn cache_contains(&self, key: &str) -> bool {
        self.cache.lock().unwrap().contains_key(key)
    }
}

impl Default for MxValidator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hickory_resolver::proto::op::{Query, ResponseCode};
    use hickory_resolver::proto::rr::{Name, RecordType};

    #[test]
    fn email_format_validation() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("a.b+c@sub.example.io"));
        assert!(!is_valid_email("no-at-sign.example.com"));
        assert!(!is_valid_email("spaces in@example.com"));
        assert!(!is_valid_email("user@nodot"));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn email_domain_extraction() {
        assert_eq!(email_domain("User@Example.COM"), Some("example.com".to_string()));
        assert_eq!(email_domain("nodomain"), None);
        assert_eq!(email_domain("user@"), None);
    }

    #[test]
    fn definitive_answers_are_definitive() {
        assert_eq!(classify(Ok(true)), MxOutcome::Definitive(true));
        assert_eq!(classify(Ok(false)), MxOutcome::Definitive(false));
    }

    #[test]
    fn nxdomain_is_a_definitive_negative() {
        let err = ResolveError::from(ResolveErrorKind::NoRecordsFound {
            query: Box::new(Query::query(Name::root(), RecordType::MX)),
            soa: None,
            negative_ttl: None,
            response_code: ResponseCode::NXDomain,
            trusted: false,
        });
        assert_eq!(classify(Err(&err)), MxOutcome::Definitive(false));
    }

    #[test]
    fn timeout_gets_the_benefit_of_the_doubt() {
        let err = ResolveError::from(ResolveErrorKind::Timeout);
        assert_eq!(classify(Err(&err)), MxOutcome::Assume(true));
    }

    #[tokio::test]
    async fn definitive_results_are_cached_and_expire() {
        let validator = MxValidator::new();

        validator.cache_put("fresh.example".to_string(), true);
        assert_eq!(validator.cache_get("fresh.example"), Some(true));

        // Backdate an entry beyond the TTL: it must read as absent.
        let old = Instant::now()
            .checked_sub(CACHE_TTL + Duration::from_secs(1))
            .unwrap();
        validator.cache_put_at("stale.example".to_string(), true, old);
        assert_eq!(validator.cache_get("stale.example"), None);
        assert!(!validator.cache_contains("stale.example"));
    }
}
