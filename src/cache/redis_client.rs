use anyhow::Result;
use redis::{aio::ConnectionManager, AsyncCommands, RedisResult};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::database::connection::mask_database_url;

/// Cliente Redis con reconexión automática, usado para publicar eventos
#[derive(Clone)]
pub struct RedisClient {
    manager: ConnectionManager,
}

impl RedisClient {
    /// Crear nuevo cliente Redis
    pub async fn new(redis_url: &str) -> Result<Self> {
        info!("🔗 Conectando a Redis: {}", mask_database_url(redis_url));

        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        // Test de conexión usando un comando simple
        let mut conn = manager.clone();
        let _: () = redis::cmd("PING").query_async(&mut conn).await?;

        info!("✅ Redis conectado exitosamente");

        Ok(Self { manager })
    }

    /// Publicar un valor serializado como JSON; devuelve el número de suscriptores
    pub async fn publish_json<T: Serialize + Sync>(&self, channel: &str, value: &T) -> Result<i64> {
        let mut conn = self.manager.clone();
        let payload = serde_json::to_string(value)?;

        let result: RedisResult<i64> = conn.publish(channel, payload).await;
        match result {
            Ok(receivers) => {
                debug!("📣 Evento publicado en {} ({} suscriptores)", channel, receivers);
                Ok(receivers)
            }
            Err(e) => {
                warn!("⚠️ Error publicando en canal {}: {}", channel, e);
                Err(anyhow::anyhow!("Error de Redis: {}", e))
            }
        }
    }

    /// Verificar si Redis está conectado
    pub async fn is_connected(&self) -> bool {
        let mut conn = self.manager.clone();
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(response) => response == "PONG",
            Err(_) => false,
        }
    }
}
