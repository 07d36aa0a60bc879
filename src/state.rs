//! Shared application state
//!
//! Este módulo define el estado compartido de la aplicación que se pasa
//! a través del router de Axum.

use sqlx::PgPool;
use std::sync::Arc;

use crate::cache::redis_client::RedisClient;
use crate::config::environment::EnvironmentConfig;
use crate::services::dispatch_workflow::DispatchWorkflow;

#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<DispatchWorkflow>,
    pub config: EnvironmentConfig,
    pub pool: Option<PgPool>,
    pub redis: Option<RedisClient>,
}

impl AppState {
    pub fn new(workflow: DispatchWorkflow, config: EnvironmentConfig) -> Self {
        Self {
            workflow: Arc::new(workflow),
            config,
            pool: None,
            redis: None,
        }
    }

    pub fn with_pool(mut self, pool: PgPool) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_redis(mut self, redis: RedisClient) -> Self {
        self.redis = Some(redis);
        self
    }

    /// Tipo de almacén en uso, para el health check
    pub fn store_kind(&self) -> &'static str {
        if self.pool.is_some() {
            "postgres"
        } else {
            "memory"
        }
    }
}
