//! Registro de despachos de una estación de autobuses
//!
//! Cada visita de un vehículo recorre entrada, descenso de pasajeros, permiso
//! de embarque, pago, orden de salida y salida. Este crate expone el núcleo
//! del flujo como biblioteca y una API HTTP construida con axum.

pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod dto;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod routes;
pub mod services;
pub mod state;
pub mod utils;

use anyhow::Result;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::RedisClient;
use crate::config::{DatabaseConfig, EnvironmentConfig};
use crate::database::connection::mask_database_url;
use crate::database::DatabaseConnection;
use crate::repositories::{InMemoryDispatchRepository, PgDispatchRepository};
use crate::services::{
    DispatchWorkflow, InvoiceWebhookNotifier, PgFleetLookup, RedisEventPublisher,
    TimeOfDayShiftResolver,
};

pub use routes::create_app;
pub use state::AppState;

/// Montar el estado de la aplicación a partir de la configuración
pub async fn build_state(config: EnvironmentConfig) -> Result<AppState> {
    let shifts = TimeOfDayShiftResolver::from_schedule(
        &config.shift_schedule,
        config.station_utc_offset_minutes,
    )?;
    info!(
        "🕐 {} turnos configurados (UTC{:+} min)",
        shifts.windows().len(),
        config.station_utc_offset_minutes
    );

    let (mut workflow, pool) = match DatabaseConfig::from_environment(&config) {
        Some(db_config) => {
            let connection = DatabaseConnection::new(&db_config).await?;
            connection.run_migrations().await?;
            let pool = connection.pool().clone();

            let workflow = DispatchWorkflow::new(Arc::new(PgDispatchRepository::new(pool.clone())))
                .with_fleet(Arc::new(PgFleetLookup::new(pool.clone())));
            (workflow, Some(pool))
        }
        None => {
            warn!("⚠️ DATABASE_URL no definida: usando almacenamiento en memoria");
            (
                DispatchWorkflow::new(Arc::new(InMemoryDispatchRepository::new())),
                None,
            )
        }
    };
    workflow = workflow.with_shift_resolver(Arc::new(shifts));

    let mut redis = None;
    if let Some(redis_url) = &config.redis_url {
        match RedisClient::new(redis_url).await {
            Ok(client) => {
                workflow = workflow.with_notifier(Arc::new(RedisEventPublisher::new(
                    client.clone(),
                    config.dispatch_events_channel.clone(),
                )));
                redis = Some(client);
            }
            Err(e) => warn!("⚠️ Redis no disponible, eventos solo en proceso: {}", e),
        }
    }

    if let Some(webhook_url) = &config.invoice_webhook_url {
        info!("🧾 Webhook de facturación: {}", mask_database_url(webhook_url));
        workflow = workflow.with_notifier(Arc::new(InvoiceWebhookNotifier::new(webhook_url.clone())?));
    }

    let mut state = AppState::new(workflow, config);
    if let Some(pool) = pool {
        state = state.with_pool(pool);
    }
    if let Some(redis) = redis {
        state = state.with_redis(redis);
    }
    Ok(state)
}
