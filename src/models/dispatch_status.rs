//! Tabla de estados del despacho
//!
//! Conjunto cerrado de estados por los que pasa un bus dentro de la estación
//! y el grafo dirigido de transiciones legales. Datos puros, sin efectos.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Estado de un registro de despacho - se persiste como TEXT en snake_case
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Entered,
    PassengersDropped,
    PermitIssued,
    PermitRejected,
    Paid,
    DepartureOrdered,
    Departed,
    Exited,
    /// Marcador terminal administrativo, fuera del grafo normal
    Cancelled,
}

/// Error al interpretar un estado desconocido
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown dispatch status '{0}'")]
pub struct UnknownStatus(pub String);

impl DispatchStatus {
    /// Todos los estados, incluido el marcador de cancelación
    pub const ALL: [DispatchStatus; 9] = [
        DispatchStatus::Entered,
        DispatchStatus::PassengersDropped,
        DispatchStatus::PermitIssued,
        DispatchStatus::PermitRejected,
        DispatchStatus::Paid,
        DispatchStatus::DepartureOrdered,
        DispatchStatus::Departed,
        DispatchStatus::Exited,
        DispatchStatus::Cancelled,
    ];

    /// Estados del flujo normal (sin cancelación)
    pub const WORKFLOW: [DispatchStatus; 8] = [
        DispatchStatus::Entered,
        DispatchStatus::PassengersDropped,
        DispatchStatus::PermitIssued,
        DispatchStatus::PermitRejected,
        DispatchStatus::Paid,
        DispatchStatus::DepartureOrdered,
        DispatchStatus::Departed,
        DispatchStatus::Exited,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Entered => "entered",
            DispatchStatus::PassengersDropped => "passengers_dropped",
            DispatchStatus::PermitIssued => "permit_issued",
            DispatchStatus::PermitRejected => "permit_rejected",
            DispatchStatus::Paid => "paid",
            DispatchStatus::DepartureOrdered => "departure_ordered",
            DispatchStatus::Departed => "departed",
            DispatchStatus::Exited => "exited",
            DispatchStatus::Cancelled => "cancelled",
        }
    }

    /// Siguientes estados legales a un solo salto
    pub fn allowed_next(&self) -> &'static [DispatchStatus] {
        use DispatchStatus::*;

        match self {
            Entered => &[PassengersDropped],
            PassengersDropped => &[PermitIssued, PermitRejected],
            PermitIssued => &[Paid],
            // Reintento tras un permiso rechazado
            PermitRejected => &[PassengersDropped],
            Paid => &[DepartureOrdered],
            DepartureOrdered => &[Departed],
            Departed => &[Exited],
            Exited => &[],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, target: DispatchStatus) -> bool {
        self.allowed_next().contains(&target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DispatchStatus::Exited | DispatchStatus::Cancelled)
    }

    /// Avance dentro del flujo, usado para saber qué fases deben estar pobladas.
    /// `Cancelled` no tiene avance propio: se mide con el estado previo a la cancelación.
    pub fn progress(&self) -> Option<u8> {
        match self {
            DispatchStatus::Entered => Some(0),
            DispatchStatus::PassengersDropped => Some(1),
            DispatchStatus::PermitIssued | DispatchStatus::PermitRejected => Some(2),
            DispatchStatus::Paid => Some(3),
            DispatchStatus::DepartureOrdered => Some(4),
            DispatchStatus::Departed => Some(5),
            DispatchStatus::Exited => Some(6),
            DispatchStatus::Cancelled => None,
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DispatchStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        DispatchStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}
