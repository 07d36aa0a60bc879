use anyhow::Result;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::filter::LevelFilter;

use bus_station_dispatch::{build_state, config::EnvironmentConfig, create_app};

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();

    let config = EnvironmentConfig::from_env()?;

    // Configurar logging
    let level: LevelFilter = config.log_level.parse().unwrap_or(LevelFilter::INFO);
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("🚌 Bus Station Dispatch - API de despacho");
    info!("================================================");
    info!("🌍 Entorno: {}", config.environment);

    let addr: SocketAddr = config.server_url().parse()?;
    let state = build_state(config).await?;
    let app = create_app(state);

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("   GET  /metrics - Métricas Prometheus");
    info!("🚏 Endpoints de despacho:");
    info!("   POST /api/dispatch - Registrar entrada");
    info!("   GET  /api/dispatch - Listar despachos");
    info!("   GET  /api/dispatch/events - Eventos SSE");
    info!("   GET  /api/dispatch/:id - Obtener despacho");
    info!("   GET  /api/dispatch/:id/history - Historial de estados");
    info!("   POST /api/dispatch/:id/drop-passengers - Descenso de pasajeros");
    info!("   POST /api/dispatch/:id/permit - Permiso de embarque");
    info!("   POST /api/dispatch/:id/retry - Reintentar tras rechazo");
    info!("   POST /api/dispatch/:id/payment - Registrar pago");
    info!("   POST /api/dispatch/:id/departure-order - Orden de salida");
    info!("   POST /api/dispatch/:id/depart - Salida del andén");
    info!("   POST /api/dispatch/:id/exit - Salida de la estación");
    info!("   POST /api/dispatch/:id/cancel - Cancelar despacho");
    info!("   DELETE /api/dispatch/:id - Eliminar despacho");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("❌ Error del servidor: {}", e);
        return Err(e.into());
    }

    info!("👋 Servidor terminado");
    Ok(())
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo escuchar Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el manejador de señales: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
