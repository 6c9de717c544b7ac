use std::env;
use std::str::FromStr;

pub enum EnvKey {
    ServerPort,
    DatabaseUrl,
    MinioEndpoint,
    MinioBucket,
    MinioAccessKey,
    MinioSecretKey,
    MinioRegion,
    CdnPort,
    CdnBaseUrl,
    MaxUploadBytes,
    BackendTimeoutSecs,
    ListProbeConcurrency,
    WorkerEnabled,
    WorkerPollIntervalSecs,
    JobVisibilityTimeoutSecs,
    JobMaxAttempts,
    FfmpegBin,
    HlsSegmentSeconds,
}

impl EnvKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            EnvKey::ServerPort => "APP_PORT",
            EnvKey::DatabaseUrl => "DATABASE_URL",
            EnvKey::MinioEndpoint => "MINIO_ENDPOINT",
            EnvKey::MinioBucket => "MINIO_BUCKET",
            EnvKey::MinioAccessKey => "MINIO_ACCESS_KEY",
            EnvKey::MinioSecretKey => "MINIO_SECRET_KEY",
            EnvKey::MinioRegion => "MINIO_REGION",
            EnvKey::CdnPort => "CDN_PORT",
            EnvKey::CdnBaseUrl => "CDN_BASE_URL",
            EnvKey::MaxUploadBytes => "MAX_UPLOAD_BYTES",
            EnvKey::BackendTimeoutSecs => "BACKEND_TIMEOUT_SECS",
            EnvKey::ListProbeConcurrency => "LIST_PROBE_CONCURRENCY",
            EnvKey::WorkerEnabled => "WORKER_ENABLED",
            EnvKey::WorkerPollIntervalSecs => "WORKER_POLL_INTERVAL_SECS",
            EnvKey::JobVisibilityTimeoutSecs => "JOB_VISIBILITY_TIMEOUT_SECS",
            EnvKey::JobMaxAttempts => "JOB_MAX_ATTEMPTS",
            EnvKey::FfmpegBin => "FFMPEG_BIN",
            EnvKey::HlsSegmentSeconds => "HLS_SEGMENT_SECONDS",
        }
    }
}

pub fn get(key: EnvKey) -> Result<String, env::VarError> {
    env::var(key.as_str())
}

pub fn get_or(key: EnvKey, default: &str) -> String {
    env::var(key.as_str()).unwrap_or_else(|_| default.to_string())
}

pub fn get_parsed<T: FromStr>(key: EnvKey, default: T) -> T {
    match get(key) {
        Ok(val) => parse_or(&val, default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr>(raw: &str, default: T) -> T {
    raw.trim().parse::<T>().unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_or_falls_back_on_garbage() {
        assert_eq!(parse_or::<u64>("12", 3), 12);
        assert_eq!(parse_or::<u64>(" 12 ", 3), 12);
        assert_eq!(parse_or::<u64>("twelve", 3), 3);
        assert!(parse_or::<bool>("true", false));
        assert!(!parse_or::<bool>("yes", false));
    }
}
