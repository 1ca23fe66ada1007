//! `tabops-enrich` — clients for external lookup services.
//!
//! Every client follows the same shape: validate the identifier before
//! spending a network call, consult the cache, call the endpoint with a
//! bounded number of retries and class-dependent backoff, normalize the
//! response into flat rows, and degrade to an empty/placeholder result when
//! retries are exhausted. Batch loops treat "no data" as a valid outcome, not
//! a fatal error.
//!
//! The crate stays infrastructure-free: callers supply the cache through the
//! [`EnrichmentCache`] trait.

pub mod cache;
pub mod company;
pub mod contact;
pub mod mx;
pub mod research;
pub mod retry;

pub use cache::EnrichmentCache;
pub use company::CompanyEnrichClient;
pub use contact::ContactEnrichClient;
pub use mx::MxValidator;
pub use research::{ResearchClient, ResearchField};
pub use retry::{Backoff, FailureClass, MAX_ATTEMPTS};
