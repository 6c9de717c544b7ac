use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::env::{self, EnvKey};

const DEFAULT_DATABASE_URL: &str = "postgres://voduser:vodpass@db:5432/voddb";
const DEFAULT_MINIO_ENDPOINT: &str = "minio:9000";
const DEFAULT_CDN_PORT: u16 = 8081;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not a valid URL: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    pub enabled: bool,
    pub poll_interval: Duration,
    pub visibility_timeout: Duration,
    pub max_attempts: u32,
    pub ffmpeg_bin: String,
    pub hls_segment_seconds: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval: Duration::from_secs(5),
            visibility_timeout: Duration::from_secs(900),
            max_attempts: 3,
            ffmpeg_bin: "ffmpeg".to_string(),
            hls_segment_seconds: 6,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_port: u16,
    pub database_url: String,
    pub minio_endpoint: String,
    pub minio_bucket: String,
    pub minio_access_key: String,
    pub minio_secret_key: String,
    pub minio_region: String,
    /// Public origin the CDN serves `/hls/...` from. No trailing slash.
    pub cdn_base_url: String,
    pub max_upload_bytes: usize,
    pub backend_timeout: Duration,
    pub list_probe_concurrency: usize,
    pub worker: WorkerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server_port: 8000,
            database_url: DEFAULT_DATABASE_URL.to_string(),
            minio_endpoint: endpoint_url(DEFAULT_MINIO_ENDPOINT),
            minio_bucket: "vod".to_string(),
            minio_access_key: "admin".to_string(),
            minio_secret_key: "admin12345".to_string(),
            minio_region: "us-east-1".to_string(),
            cdn_base_url: format!("http://localhost:{}", DEFAULT_CDN_PORT),
            max_upload_bytes: 512 * 1024 * 1024,
            backend_timeout: Duration::from_secs(30),
            list_probe_concurrency: 8,
            worker: WorkerConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn new() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let worker_defaults = WorkerConfig::default();

        let cdn_port = env::get_parsed(EnvKey::CdnPort, DEFAULT_CDN_PORT);
        let cdn_base_url = env::get_or(EnvKey::CdnBaseUrl, &format!("http://localhost:{}", cdn_port));

        let config = Self {
            server_port: env::get_parsed(EnvKey::ServerPort, defaults.server_port),
            database_url: env::get_or(EnvKey::DatabaseUrl, &defaults.database_url),
            minio_endpoint: endpoint_url(&env::get_or(EnvKey::MinioEndpoint, DEFAULT_MINIO_ENDPOINT)),
            minio_bucket: env::get_or(EnvKey::MinioBucket, &defaults.minio_bucket),
            minio_access_key: env::get_or(EnvKey::MinioAccessKey, &defaults.minio_access_key),
            minio_secret_key: env::get_or(EnvKey::MinioSecretKey, &defaults.minio_secret_key),
            minio_region: env::get_or(EnvKey::MinioRegion, &defaults.minio_region),
            cdn_base_url: normalize_base_url(EnvKey::CdnBaseUrl.as_str(), &cdn_base_url)?,
            max_upload_bytes: env::get_parsed(EnvKey::MaxUploadBytes, defaults.max_upload_bytes),
            backend_timeout: Duration::from_secs(env::get_parsed(
                EnvKey::BackendTimeoutSecs,
                defaults.backend_timeout.as_secs(),
            )),
            list_probe_concurrency: env::get_parsed(
                EnvKey::ListProbeConcurrency,
                defaults.list_probe_concurrency,
            ),
            worker: WorkerConfig {
                enabled: env::get_parsed(EnvKey::WorkerEnabled, worker_defaults.enabled),
                poll_interval: Duration::from_secs(env::get_parsed(
                    EnvKey::WorkerPollIntervalSecs,
                    worker_defaults.poll_interval.as_secs(),
                )),
                visibility_timeout: Duration::from_secs(env::get_parsed(
                    EnvKey::JobVisibilityTimeoutSecs,
                    worker_defaults.visibility_timeout.as_secs(),
                )),
                max_attempts: env::get_parsed(EnvKey::JobMaxAttempts, worker_defaults.max_attempts),
                ffmpeg_bin: env::get_or(EnvKey::FfmpegBin, &worker_defaults.ffmpeg_bin),
                hls_segment_seconds: env::get_parsed(
                    EnvKey::HlsSegmentSeconds,
                    worker_defaults.hls_segment_seconds,
                ),
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Zero(EnvKey::MaxUploadBytes.as_str()));
        }
        if self.backend_timeout.is_zero() {
            return Err(ConfigError::Zero(EnvKey::BackendTimeoutSecs.as_str()));
        }
        if self.list_probe_concurrency == 0 {
            return Err(ConfigError::Zero(EnvKey::ListProbeConcurrency.as_str()));
        }
        if self.worker.max_attempts == 0 {
            return Err(ConfigError::Zero(EnvKey::JobMaxAttempts.as_str()));
        }
        Ok(())
    }
}

/// MinIO endpoints are usually given as bare `host:port`.
fn endpoint_url(raw: &str) -> String {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    }
}

fn normalize_base_url(key: &'static str, raw: &str) -> Result<String, ConfigError> {
    let parsed = Url::parse(raw).map_err(|source| ConfigError::InvalidUrl { key, source })?;
    Ok(parsed.as_str().trim_end_matches('/').to_string())
}
