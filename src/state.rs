use std::sync::Arc;

use sqlx::PgPool;

use crate::config::Config;
use crate::services::devices::DeviceRegistry;
use crate::services::duplicate::DuplicateScanDetector;
use crate::services::offline_cache::OfflineCacheBuilder;
use crate::services::scan::ScanPipeline;
use crate::services::token::TokenValidator;

/// Explicitly constructed service graph handed to every handler. No
/// process-wide singletons: everything a request touches hangs off this.
#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<Config>,
    pub pipeline: Arc<ScanPipeline>,
    pub registry: Arc<DeviceRegistry>,
    pub cache_builder: Arc<OfflineCacheBuilder>,
}

impl AppState {
    pub fn new(pool: PgPool, redis: Arc<redis::Client>, config: Config) -> Self {
        let config = Arc::new(config);

        let token_validator = TokenValidator::new(
            config.qr_secret.clone(),
            config.qr_freshness_secs,
            Arc::clone(&redis),
        );
        let duplicates = DuplicateScanDetector::new(Arc::clone(&redis), pool.clone());
        let pipeline = Arc::new(ScanPipeline::new(
            pool.clone(),
            Arc::clone(&config),
            token_validator,
            duplicates,
        ));
        let registry = Arc::new(DeviceRegistry::new(pool.clone()));
        let cache_builder = Arc::new(OfflineCacheBuilder::new(
            pool.clone(),
            config.cache_duration_minutes,
        ));

        Self {
            pool,
            config,
            pipeline,
            registry,
            cache_builder,
        }
    }
}
