//! Acciones del flujo de despacho
//!
//! Cada operación de negocio lleva su propio payload tipado, de modo que el
//! compilador decide qué campos son legales en cada transición.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::dispatch_status::DispatchStatus;

/// Sello común de cada fase: cuándo, quién y en qué turno
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStamp {
    pub at: DateTime<Utc>,
    pub by: Option<String>,
    pub shift: Option<String>,
}

impl PhaseStamp {
    pub fn new(at: DateTime<Utc>, by: Option<String>, shift: Option<String>) -> Self {
        Self { at, by, shift }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassengerDrop {
    #[serde(flatten)]
    pub stamp: PhaseStamp,
    pub passengers_arrived: Option<i32>,
}

/// Decisión sobre el permiso de embarque
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "permit_status", rename_all = "snake_case")]
pub enum PermitDecision {
    Approved {
        transport_order_code: String,
        planned_departure_time: Option<DateTime<Utc>>,
        seat_count: Option<i32>,
    },
    Rejected {
        rejection_reason: Option<String>,
    },
}

impl PermitDecision {
    pub fn permit_status(&self) -> &'static str {
        match self {
            PermitDecision::Approved { .. } => "approved",
            PermitDecision::Rejected { .. } => "rejected",
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, PermitDecision::Rejected { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardingPermit {
    #[serde(flatten)]
    pub stamp: PhaseStamp,
    #[serde(flatten)]
    pub decision: PermitDecision,
}

/// Último rechazo registrado; sobrevive al reintento para auditoría
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionAudit {
    pub at: DateTime<Utc>,
    pub reason: Option<String>,
    pub by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    #[serde(flatten)]
    pub stamp: PhaseStamp,
    pub amount: Decimal,
    pub method: Option<String>,
    pub invoice_number: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartureOrder {
    #[serde(flatten)]
    pub stamp: PhaseStamp,
    pub passengers_departing: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub at: DateTime<Utc>,
    pub by: Option<String>,
    pub reason: Option<String>,
    pub previous_status: DispatchStatus,
}

/// Acción solicitada sobre un registro existente
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchAction {
    DropPassengers(PassengerDrop),
    IssuePermit(BoardingPermit),
    RetryAfterRejection { by: Option<String> },
    Pay(Payment),
    OrderDeparture(DepartureOrder),
    Depart(PhaseStamp),
    Exit(PhaseStamp),
    Cancel {
        at: DateTime<Utc>,
        by: Option<String>,
        reason: Option<String>,
    },
}

impl DispatchAction {
    pub fn name(&self) -> &'static str {
        match self {
            DispatchAction::DropPassengers(_) => "drop_passengers",
            DispatchAction::IssuePermit(permit) if permit.decision.is_rejected() => "reject_permit",
            DispatchAction::IssuePermit(_) => "issue_permit",
            DispatchAction::RetryAfterRejection { .. } => "retry_after_rejection",
            DispatchAction::Pay(_) => "pay",
            DispatchAction::OrderDeparture(_) => "order_departure",
            DispatchAction::Depart(_) => "depart",
            DispatchAction::Exit(_) => "exit",
            DispatchAction::Cancel { .. } => "cancel",
        }
    }

    /// Estado final que alcanza el registro si la acción se aplica
    pub fn target_status(&self) -> DispatchStatus {
        match self {
            DispatchAction::DropPassengers(_) => DispatchStatus::PassengersDropped,
            DispatchAction::IssuePermit(permit) => match permit.decision {
                PermitDecision::Approved { .. } => DispatchStatus::PermitIssued,
                PermitDecision::Rejected { .. } => DispatchStatus::PermitRejected,
            },
            DispatchAction::RetryAfterRejection { .. } => DispatchStatus::PassengersDropped,
            DispatchAction::Pay(_) => DispatchStatus::Paid,
            DispatchAction::OrderDeparture(_) => DispatchStatus::DepartureOrdered,
            DispatchAction::Depart(_) => DispatchStatus::Departed,
            DispatchAction::Exit(_) => DispatchStatus::Exited,
            DispatchAction::Cancel { .. } => DispatchStatus::Cancelled,
        }
    }
}
