//! Eventos de cambio de estado
//!
//! Cada transición aplicada produce un `StatusChange`. Se guarda en el historial
//! de auditoría y se publica a los colaboradores (proyecciones, dashboards).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dispatch_status::DispatchStatus;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub dispatch_id: Uuid,
    pub from_status: DispatchStatus,
    pub to_status: DispatchStatus,
    pub at: DateTime<Utc>,
    pub by: Option<String>,
    /// Motivo de rechazo o de cancelación, cuando aplica
    pub reason: Option<String>,
}
