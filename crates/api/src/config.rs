//! Application settings loaded from environment variables.

use std::path::PathBuf;

use tabops_infra::S3Settings;
use tracing::warn;

/// Runtime configuration with development defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub port: u16,
    pub cors_origins: Vec<String>,

    pub upload_dir: PathBuf,
    pub results_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub jobs_dir: PathBuf,
    pub max_upload_size_mb: usize,
    pub file_cleanup_hours: u64,
    pub cache_expiry_days: i64,

    pub research_api_url: String,
    pub research_api_key: String,
    pub research_model: String,
    pub company_api_url: String,
    pub company_api_key: String,
    pub contact_api_url: String,
    pub contact_api_key: String,

    pub s3: S3Settings,
}

fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Settings {
    /// Load settings from the environment, warning about absent secrets.
    pub fn from_env() -> Self {
        let settings = Self {
            port: env_parse("PORT", 8080),
            cors_origins: env_string("CORS_ORIGINS", "http://localhost:4321")
                .split(',')
                .map(|origin| origin.trim().to_string())
                .filter(|origin| !origin.is_empty())
                .collect(),
            upload_dir: env_string("UPLOAD_DIR", "storage/uploads").into(),
            results_dir: env_string("RESULTS_DIR", "storage/results").into(),
            cache_dir: env_string("CACHE_DIR", "storage/cache").into(),
            jobs_dir: env_string("JOBS_DIR", "storage/jobs").into(),
            max_upload_size_mb: env_parse("MAX_UPLOAD_SIZE_MB", 500),
            file_cleanup_hours: env_parse("FILE_CLEANUP_HOURS", 1),
            cache_expiry_days: env_parse("CACHE_EXPIRY_DAYS", 30),
            research_api_url: env_string(
                "RESEARCH_API_URL",
                "https://api.perplexity.ai/chat/completions",
            ),
            research_api_key: env_string("RESEARCH_API_KEY", ""),
            research_model: env_string("RESEARCH_MODEL", "sonar-pro"),
            company_api_url: env_string(
                "COMPANY_API_URL",
                "https://api.apollo.io/api/v1/organizations/bulk_enrich",
            ),
            company_api_key: env_string("COMPANY_API_KEY", ""),
            contact_api_url: env_string(
                "CONTACT_API_URL",
                "https://api-public.salesql.com/v1/persons/enrich/",
            ),
            contact_api_key: env_string("CONTACT_API_KEY", ""),
            s3: S3Settings {
                endpoint: std::env::var("S3_ENDPOINT").ok(),
                bucket: env_string("S3_BUCKET", "data-merge-uploads"),
                access_key_id: env_string("S3_ACCESS_KEY_ID", ""),
                secret_access_key: env_string("S3_SECRET_ACCESS_KEY", ""),
                region: env_string("S3_REGION", "auto"),
            },
        };

        for (name, value) in [
            ("RESEARCH_API_KEY", &settings.research_api_key),
            ("COMPANY_API_KEY", &settings.company_api_key),
            ("CONTACT_API_KEY", &settings.contact_api_key),
        ] {
            if value.is_empty() {
                warn!("{name} not set; the corresponding surface will answer 503");
            }
        }
        if !settings.s3.is_configured() {
            warn!("object storage credentials not set; cloud-storage workflows disabled");
        }

        settings
    }

    pub fn max_upload_size_bytes(&self) -> usize {
        self.max_upload_size_mb * 1024 * 1024
    }
}

impl Default for Settings {
    fn default() -> Self {
        // Keep defaults aligned with from_env so tests and dev behave alike.
        Self {
            port: 8080,
            cors_origins: vec!["http://localhost:4321".to_string()],
            upload_dir: "storage/uploads".into(),
            results_dir: "storage/results".into(),
            cache_dir: "storage/cache".into(),
            jobs_dir: "storage/jobs".into(),
            max_upload_size_mb: 500,
            file_cleanup_hours: 1,
            cache_expiry_days: 30,
            research_api_url: "https://api.perplexity.ai/chat/completions".to_string(),
            research_api_key: String::new(),
            research_model: "sonar-pro".to_string(),
            company_api_url: "https://api.apollo.io/api/v1/organizations/bulk_enrich".to_string(),
            company_api_key: String::new(),
            contact_api_url: "https://api-public.salesql.com/v1/persons/enrich/".to_string(),
            contact_api_key: String::new(),
            s3: S3Settings {
                endpoint: None,
                bucket: "data-merge-uploads".to_string(),
                access_key_id: String::new(),
                secret_access_key: String::new(),
                region: "auto".to_string(),
            },
        }
    }
}
