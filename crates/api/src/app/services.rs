//! Infrastructure wiring shared by all handlers and workers.

use std::sync::Arc;

use tracing::{error, info};

use tabops_enrich::{CompanyEnrichClient, ContactEnrichClient, MxValidator, ResearchClient};
use tabops_infra::{FileStore, JobManager, ObjectStore, RunHistory, S3ObjectStore, TieredCache};

use crate::app::sessions::SessionStore;
use crate::config::Settings;

/// Everything a handler or worker can reach, behind one `Arc`.
pub struct AppServices {
    pub settings: Settings,
    pub jobs: Arc<JobManager>,
    pub cache: Arc<TieredCache>,
    pub files: FileStore,
    pub object_store: Option<Arc<dyn ObjectStore>>,
    pub mx: Arc<MxValidator>,
    pub research: Option<Arc<ResearchClient>>,
    pub company: Option<Arc<CompanyEnrichClient>>,
    pub contact: Option<Arc<ContactEnrichClient>>,
    pub sessions: SessionStore,
    pub history: RunHistory,
}

/// Wire the service graph from settings: storage directories (created and
/// swept of stale files), the shared job store, the tiered cache (mirrored to
/// the object store when configured), and the enrichment clients that have
/// credentials.
pub async fn build_services(settings: Settings) -> AppServices {
    let files = FileStore::new(&settings.upload_dir, &settings.results_dir);
    if let Err(e) = files.ensure_dirs().await {
        error!("failed to initialize storage directories: {e}");
    }
    FileStore::cleanup_old_files(&settings.upload_dir, settings.file_cleanup_hours).await;
    FileStore::cleanup_old_files(&settings.results_dir, settings.file_cleanup_hours).await;

    let object_store: Option<Arc<dyn ObjectStore>> = S3ObjectStore::from_settings(&settings.s3)
        .map(|store| Arc::new(store) as Arc<dyn ObjectStore>);

    let mut cache = TieredCache::new(&settings.cache_dir, settings.cache_expiry_days);
    if let Some(store) = &object_store {
        cache = cache.with_mirror(store.clone());
    }
    let cache = Arc::new(cache);

    let research = (!settings.research_api_key.is_empty()).then(|| {
        Arc::new(
            ResearchClient::new(&settings.research_api_url, &settings.research_api_key)
                .with_model(&settings.research_model),
        )
    });
    let company = (!settings.company_api_key.is_empty()).then(|| {
        Arc::new(CompanyEnrichClient::new(
            &settings.company_api_url,
            &settings.company_api_key,
        ))
    });
    let contact = (!settings.contact_api_key.is_empty()).then(|| {
        Arc::new(ContactEnrichClient::new(
            &settings.contact_api_url,
            &settings.contact_api_key,
        ))
    });

    info!(
        object_store = object_store.is_some(),
        research = research.is_some(),
        company = company.is_some(),
        contact = contact.is_some(),
        "services wired"
    );

    AppServices {
        jobs: Arc::new(JobManager::new(&settings.jobs_dir)),
        history: RunHistory::new(cache.clone()),
        cache,
        files,
        object_store,
        mx: Arc::new(MxValidator::new()),
        research,
        company,
        contact,
        sessions: SessionStore::new(),
        settings,
    }
}
