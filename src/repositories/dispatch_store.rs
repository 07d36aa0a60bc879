//! Contrato del almacén de registros de despacho
//!
//! El almacén es el único punto donde se serializan las transiciones de un
//! mismo registro. Registros distintos nunca compiten entre sí.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::models::dispatch::{DispatchRecord, NewDispatch, TransitionOutcome};
use crate::models::dispatch_action::DispatchAction;
use crate::models::dispatch_event::StatusChange;
use crate::models::dispatch_status::DispatchStatus;
use crate::utils::errors::DispatchError;

pub const DEFAULT_LIST_LIMIT: i64 = 100;

/// Filtros para listar despachos; todos los criterios presentes deben cumplirse
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DispatchFilters {
    pub status: Option<DispatchStatus>,
    pub entered_from: Option<DateTime<Utc>>,
    pub entered_to: Option<DateTime<Utc>>,
    pub vehicle_id: Option<String>,
    pub operator_id: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl DispatchFilters {
    pub fn matches(&self, record: &DispatchRecord) -> bool {
        self.status.map_or(true, |status| record.current_status == status)
            && self.entered_from.map_or(true, |from| record.entry.at >= from)
            && self.entered_to.map_or(true, |to| record.entry.at <= to)
            && self
                .vehicle_id
                .as_ref()
                .map_or(true, |vehicle| &record.vehicle_id == vehicle)
            && self
                .operator_id
                .as_ref()
                .map_or(true, |operator| record.snapshot.operator_id.as_ref() == Some(operator))
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 1000)
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }
}

#[async_trait]
pub trait DispatchStore: Send + Sync {
    /// Registrar la entrada de un vehículo (estado `entered`)
    async fn create(&self, new: NewDispatch) -> Result<DispatchRecord, DispatchError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DispatchRecord>, DispatchError>;

    /// Ordenados por hora de entrada, los más recientes primero
    async fn find_all(&self, filters: &DispatchFilters) -> Result<Vec<DispatchRecord>, DispatchError>;

    /// Aplicar una acción de forma atómica: o se persiste todo o nada
    async fn transition(
        &self,
        id: Uuid,
        action: DispatchAction,
    ) -> Result<TransitionOutcome, DispatchError>;

    /// Historial de cambios de estado, del más antiguo al más reciente
    async fn history(&self, id: Uuid) -> Result<Vec<StatusChange>, DispatchError>;

    /// Borrado físico administrativo, fuera del contrato de la máquina de estados
    async fn delete(&self, id: Uuid) -> Result<(), DispatchError>;
}

/// Comprobaciones mínimas que todo almacén aplica antes de crear
pub fn ensure_creatable(new: &NewDispatch) -> Result<(), DispatchError> {
    if new.vehicle_id.trim().is_empty() {
        return Err(crate::utils::errors::validation_error(
            "vehicle_id",
            "vehicle_id is required",
        ));
    }
    if new.driver_id.trim().is_empty() {
        return Err(crate::utils::errors::validation_error(
            "driver_id",
            "driver_id is required",
        ));
    }
    Ok(())
}
