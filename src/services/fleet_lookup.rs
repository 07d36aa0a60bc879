//! Consulta de datos de flota para la foto de presentación
//!
//! Al registrar la entrada se copian matrícula, conductor, ruta y operador.
//! La copia nunca se resincroniza con la flota.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use tracing::debug;

use crate::models::dispatch::DisplaySnapshot;
use crate::utils::errors::CollaboratorError;

#[async_trait]
pub trait FleetLookup: Send + Sync {
    async fn snapshot(
        &self,
        vehicle_id: &str,
        driver_id: &str,
        route_id: Option<&str>,
    ) -> Result<DisplaySnapshot, CollaboratorError>;
}

/// Lee las tablas `vehicles`, `drivers`, `routes` y `operators`
pub struct PgFleetLookup {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct VehicleOperatorRow {
    plate_number: Option<String>,
    operator_id: Option<String>,
    operator_name: Option<String>,
    operator_code: Option<String>,
}

impl PgFleetLookup {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FleetLookup for PgFleetLookup {
    async fn snapshot(
        &self,
        vehicle_id: &str,
        driver_id: &str,
        route_id: Option<&str>,
    ) -> Result<DisplaySnapshot, CollaboratorError> {
        let vehicle = sqlx::query_as::<_, VehicleOperatorRow>(
            r#"
            SELECT v.plate_number,
                   o.id::text AS operator_id,
                   o.name AS operator_name,
                   o.code AS operator_code
            FROM vehicles v
            LEFT JOIN operators o ON o.id = v.operator_id
            WHERE v.id::text = $1
            "#,
        )
        .bind(vehicle_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| CollaboratorError::FleetLookup(format!("vehicle {}: {}", vehicle_id, e)))?;

        let driver_name: Option<(Option<String>,)> =
            sqlx::query_as("SELECT full_name FROM drivers WHERE id::text = $1")
                .bind(driver_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CollaboratorError::FleetLookup(format!("driver {}: {}", driver_id, e)))?;

        let route_name: Option<(Option<String>,)> = match route_id {
            Some(route_id) => sqlx::query_as("SELECT name FROM routes WHERE id::text = $1")
                .bind(route_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| CollaboratorError::FleetLookup(format!("route {}: {}", route_id, e)))?,
            None => None,
        };

        debug!("🚌 Foto de flota obtenida para vehículo {}", vehicle_id);

        let mut snapshot = DisplaySnapshot {
            driver_name: driver_name.and_then(|row| row.0),
            route_name: route_name.and_then(|row| row.0),
            ..DisplaySnapshot::default()
        };
        if let Some(vehicle) = vehicle {
            snapshot.plate_number = vehicle.plate_number;
            snapshot.operator_id = vehicle.operator_id;
            snapshot.operator_name = vehicle.operator_name;
            snapshot.operator_code = vehicle.operator_code;
        }

        Ok(snapshot)
    }
}

/// Flota fija en memoria, indexada por id de vehículo
#[derive(Debug, Clone, Default)]
pub struct StaticFleetLookup {
    vehicles: HashMap<String, DisplaySnapshot>,
    drivers: HashMap<String, String>,
    routes: HashMap<String, String>,
}

impl StaticFleetLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vehicle(mut self, vehicle_id: &str, snapshot: DisplaySnapshot) -> Self {
        self.vehicles.insert(vehicle_id.to_string(), snapshot);
        self
    }

    pub fn with_driver(mut self, driver_id: &str, name: &str) -> Self {
        self.drivers.insert(driver_id.to_string(), name.to_string());
        self
    }

    pub fn with_route(mut self, route_id: &str, name: &str) -> Self {
        self.routes.insert(route_id.to_string(), name.to_string());
        self
    }
}

#[async_trait]
impl FleetLookup for StaticFleetLookup {
    async fn snapshot(
        &self,
        vehicle_id: &str,
        driver_id: &str,
        route_id: Option<&str>,
    ) -> Result<DisplaySnapshot, CollaboratorError> {
        let mut snapshot = self.vehicles.get(vehicle_id).cloned().unwrap_or_default();
        if let Some(name) = self.drivers.get(driver_id) {
            snapshot.driver_name = Some(name.clone());
        }
        if let Some(name) = route_id.and_then(|id| self.routes.get(id)) {
            snapshot.route_name = Some(name.clone());
        }
        Ok(snapshot)
    }
}
