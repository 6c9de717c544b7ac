use std::sync::Arc;

use crate::config::settings::AppConfig;
use crate::infrastructure::queue::JobQueue;
use crate::infrastructure::storage::ObjectStore;
use crate::modules::video::repository::VideoRepository;

/// Backend handles built once at startup and shared by every request.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub storage: Arc<dyn ObjectStore>,
    pub videos: Arc<dyn VideoRepository>,
    pub jobs: Arc<dyn JobQueue>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn ObjectStore>,
        videos: Arc<dyn VideoRepository>,
        jobs: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            config,
            storage,
            videos,
            jobs,
        }
    }
}
