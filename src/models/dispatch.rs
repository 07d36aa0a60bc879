//! Modelo de registro de despacho
//!
//! Un `DispatchRecord` representa una visita de un vehículo a la estación.
//! Las fases del flujo son `Option`: solo existen una vez alcanzadas.
//! `apply` calcula el siguiente registro sin tocar el actual, lo que permite
//! a los repositorios persistir todo o nada.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::dispatch_action::{
    BoardingPermit, Cancellation, DepartureOrder, DispatchAction, PassengerDrop, Payment,
    PermitDecision, PhaseStamp, RejectionAudit,
};
use super::dispatch_event::StatusChange;
use super::dispatch_status::DispatchStatus;
use super::transition_validator::{self, TransitionError};

/// Copia de datos de presentación tomada del colaborador de flota al crear
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DisplaySnapshot {
    pub plate_number: Option<String>,
    pub driver_name: Option<String>,
    pub route_name: Option<String>,
    pub operator_id: Option<String>,
    pub operator_name: Option<String>,
    pub operator_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRecord {
    pub id: Uuid,
    pub vehicle_id: String,
    pub driver_id: String,
    pub route_id: Option<String>,
    pub schedule_id: Option<String>,
    pub snapshot: DisplaySnapshot,
    pub current_status: DispatchStatus,

    pub entry: PhaseStamp,
    pub passenger_drop: Option<PassengerDrop>,
    pub boarding_permit: Option<BoardingPermit>,
    pub payment: Option<Payment>,
    pub departure_order: Option<DepartureOrder>,
    pub departure: Option<PhaseStamp>,
    pub exit: Option<PhaseStamp>,

    // Auditoría
    pub last_rejection: Option<RejectionAudit>,
    pub cancellation: Option<Cancellation>,

    pub notes: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Datos validados para registrar la entrada de un vehículo
#[derive(Debug, Clone, PartialEq)]
pub struct NewDispatch {
    pub vehicle_id: String,
    pub driver_id: String,
    pub route_id: Option<String>,
    pub schedule_id: Option<String>,
    pub entry: PhaseStamp,
    pub snapshot: DisplaySnapshot,
    pub notes: Option<String>,
    pub metadata: serde_json::Value,
}

/// Resultado de aplicar una acción: el nuevo registro y los saltos recorridos
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub record: DispatchRecord,
    pub changes: Vec<StatusChange>,
}

impl DispatchRecord {
    /// Construir el registro inicial en estado `entered`
    pub fn from_new(new: NewDispatch, now: DateTime<Utc>) -> Self {
        let metadata = if new.metadata.is_null() {
            serde_json::json!({})
        } else {
            new.metadata
        };

        Self {
            id: Uuid::new_v4(),
            vehicle_id: new.vehicle_id,
            driver_id: new.driver_id,
            route_id: new.route_id,
            schedule_id: new.schedule_id,
            snapshot: new.snapshot,
            current_status: DispatchStatus::Entered,
            entry: new.entry,
            passenger_drop: None,
            boarding_permit: None,
            payment: None,
            departure_order: None,
            departure: None,
            exit: None,
            last_rejection: None,
            cancellation: None,
            notes: new.notes,
            metadata,
            created_at: now,
            updated_at: now,
        }
    }

    /// Calcular el registro resultante de aplicar `action`.
    ///
    /// No modifica `self`: si la transición es ilegal el llamador conserva el
    /// registro original intacto.
    pub fn apply(
        &self,
        action: DispatchAction,
        now: DateTime<Utc>,
    ) -> Result<TransitionOutcome, TransitionError> {
        let mut next = self.clone();
        let mut changes = Vec::with_capacity(2);
        let from = self.current_status;

        match action {
            DispatchAction::DropPassengers(drop) => {
                transition_validator::validate(from, DispatchStatus::PassengersDropped)?;
                // Reintento: el permiso rechazado deja de ser la fase vigente
                next.boarding_permit = None;
                changes.push(self.change(from, DispatchStatus::PassengersDropped, drop.stamp.at, drop.stamp.by.clone(), None));
                next.passenger_drop = Some(drop);
                next.current_status = DispatchStatus::PassengersDropped;
            }
            DispatchAction::IssuePermit(permit) => {
                let target = match permit.decision {
                    PermitDecision::Approved { .. } => DispatchStatus::PermitIssued,
                    PermitDecision::Rejected { .. } => DispatchStatus::PermitRejected,
                };
                transition_validator::validate(from, target)?;

                let mut reason = None;
                if let PermitDecision::Rejected { rejection_reason } = &permit.decision {
                    reason = rejection_reason.clone();
                    next.last_rejection = Some(RejectionAudit {
                        at: permit.stamp.at,
                        reason: rejection_reason.clone(),
                        by: permit.stamp.by.clone(),
                    });
                }
                changes.push(self.change(from, target, permit.stamp.at, permit.stamp.by.clone(), reason));
                next.boarding_permit = Some(permit);
                next.current_status = target;
            }
            DispatchAction::RetryAfterRejection { by } => {
                if from != DispatchStatus::PermitRejected {
                    return Err(TransitionError::IllegalTransition {
                        current: from,
                        target: DispatchStatus::PassengersDropped,
                        allowed_next: from.allowed_next().to_vec(),
                    });
                }
                transition_validator::validate(from, DispatchStatus::PassengersDropped)?;
                next.boarding_permit = None;
                changes.push(self.change(from, DispatchStatus::PassengersDropped, now, by, None));
                next.current_status = DispatchStatus::PassengersDropped;
            }
            DispatchAction::Pay(payment) => {
                transition_validator::validate(from, DispatchStatus::Paid)?;
                changes.push(self.change(from, DispatchStatus::Paid, payment.stamp.at, payment.stamp.by.clone(), None));
                next.payment = Some(payment);
                next.current_status = DispatchStatus::Paid;
            }
            DispatchAction::OrderDeparture(order) => {
                transition_validator::validate(from, DispatchStatus::DepartureOrdered)?;
                changes.push(self.change(from, DispatchStatus::DepartureOrdered, order.stamp.at, order.stamp.by.clone(), None));
                next.departure_order = Some(order);
                next.current_status = DispatchStatus::DepartureOrdered;
            }
            DispatchAction::Depart(stamp) => {
                transition_validator::validate(from, DispatchStatus::Departed)?;
                changes.push(self.change(from, DispatchStatus::Departed, stamp.at, stamp.by.clone(), None));
                next.departure = Some(stamp);
                next.current_status = DispatchStatus::Departed;
            }
            DispatchAction::Exit(stamp) => {
                let mut current = from;
                if current == DispatchStatus::DepartureOrdered {
                    // Salida directa: se recorren ambos saltos en una sola mutación
                    transition_validator::validate(current, DispatchStatus::Departed)?;
                    changes.push(self.change(current, DispatchStatus::Departed, stamp.at, stamp.by.clone(), None));
                    next.departure = Some(stamp.clone());
                    current = DispatchStatus::Departed;
                }
                transition_validator::validate(current, DispatchStatus::Exited)?;
                changes.push(self.change(current, DispatchStatus::Exited, stamp.at, stamp.by.clone(), None));
                next.exit = Some(stamp);
                next.current_status = DispatchStatus::Exited;
            }
            DispatchAction::Cancel { at, by, reason } => {
                transition_validator::validate_cancellation(from)?;
                changes.push(self.change(from, DispatchStatus::Cancelled, at, by.clone(), reason.clone()));
                next.cancellation = Some(Cancellation {
                    at,
                    by,
                    reason,
                    previous_status: from,
                });
                next.current_status = DispatchStatus::Cancelled;
            }
        }

        next.updated_at = now;
        debug_assert!(next.check_phase_consistency().is_ok());

        Ok(TransitionOutcome {
            record: next,
            changes,
        })
    }

    fn change(
        &self,
        from: DispatchStatus,
        to: DispatchStatus,
        at: DateTime<Utc>,
        by: Option<String>,
        reason: Option<String>,
    ) -> StatusChange {
        StatusChange {
            dispatch_id: self.id,
            from_status: from,
            to_status: to,
            at,
            by,
            reason,
        }
    }

    /// Estado usado para comprobar las fases; un registro cancelado queda
    /// congelado en el estado que tenía al cancelarse
    pub fn effective_status(&self) -> DispatchStatus {
        match (&self.current_status, &self.cancellation) {
            (DispatchStatus::Cancelled, Some(cancellation)) => cancellation.previous_status,
            (status, _) => *status,
        }
    }

    /// Verificar que las fases pobladas corresponden al estado actual
    pub fn check_phase_consistency(&self) -> Result<(), String> {
        if (self.current_status == DispatchStatus::Cancelled) != self.cancellation.is_some() {
            return Err("cancellation must be present exactly when status is cancelled".to_string());
        }

        let status = self.effective_status();
        let progress = status
            .progress()
            .ok_or_else(|| format!("status '{}' has no workflow progress", status))?;

        let phases: [(&str, bool, u8); 6] = [
            ("passenger_drop", self.passenger_drop.is_some(), 1),
            ("boarding_permit", self.boarding_permit.is_some(), 2),
            ("payment", self.payment.is_some(), 3),
            ("departure_order", self.departure_order.is_some(), 4),
            ("departure", self.departure.is_some(), 5),
            ("exit", self.exit.is_some(), 6),
        ];

        for (name, present, rank) in phases {
            let expected = progress >= rank;
            if present != expected {
                return Err(format!(
                    "phase '{}' is {} but status is '{}'",
                    name,
                    if present { "set" } else { "unset" },
                    status
                ));
            }
        }

        if let Some(permit) = &self.boarding_permit {
            let rejected = status == DispatchStatus::PermitRejected;
            if permit.decision.is_rejected() != rejected {
                return Err(format!(
                    "permit_status '{}' does not match status '{}'",
                    permit.decision.permit_status(),
                    status
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 18, hour, minute, 0).unwrap()
    }

    fn stamp(hour: u32, minute: u32) -> PhaseStamp {
        PhaseStamp::new(at(hour, minute), Some("clerk-1".to_string()), Some("S1".to_string()))
    }

    fn entered() -> DispatchRecord {
        DispatchRecord::from_new(
            NewDispatch {
                vehicle_id: "v1".to_string(),
                driver_id: "d1".to_string(),
                route_id: None,
                schedule_id: None,
                entry: stamp(8, 0),
                snapshot: DisplaySnapshot::default(),
                notes: None,
                metadata: serde_json::Value::Null,
            },
            at(8, 0),
        )
    }

    fn drop_action(passengers: i32) -> DispatchAction {
        DispatchAction::DropPassengers(PassengerDrop {
            stamp: stamp(8, 10),
            passengers_arrived: Some(passengers),
        })
    }

    fn reject_action(reason: &str, hour: u32) -> DispatchAction {
        DispatchAction::IssuePermit(BoardingPermit {
            stamp: stamp(hour, 0),
            decision: PermitDecision::Rejected {
                rejection_reason: Some(reason.to_string()),
            },
        })
    }

    fn approve_action() -> DispatchAction {
        DispatchAction::IssuePermit(BoardingPermit {
            stamp: stamp(9, 30),
            decision: PermitDecision::Approved {
                transport_order_code: "TO-1".to_string(),
                planned_departure_time: Some(at(10, 0)),
                seat_count: Some(45),
            },
        })
    }

    fn pay_action() -> DispatchAction {
        DispatchAction::Pay(Payment {
            stamp: stamp(9, 40),
            amount: Decimal::new(150000, 0),
            method: Some("cash".to_string()),
            invoice_number: None,
        })
    }

    fn step(record: &DispatchRecord, action: DispatchAction) -> DispatchRecord {
        record.apply(action, at(12, 0)).unwrap().record
    }

    #[test]
    fn test_new_record_is_entered_with_only_entry_phase() {
        let record = entered();
        assert_eq!(record.current_status, DispatchStatus::Entered);
        assert!(record.passenger_drop.is_none());
        assert!(record.boarding_permit.is_none());
        assert!(record.payment.is_none());
        assert!(record.exit.is_none());
        assert_eq!(record.metadata, serde_json::json!({}));
        assert!(record.check_phase_consistency().is_ok());
    }

    #[test]
    fn test_illegal_action_leaves_record_untouched() {
        let record = step(&entered(), drop_action(30));
        let before = record.clone();

        let err = record.apply(pay_action(), at(12, 0)).unwrap_err();
        assert!(matches!(err, TransitionError::IllegalTransition { .. }));
        assert_eq!(record, before);
    }

    #[test]
    fn test_rejection_retry_keeps_audit_and_clears_permit() {
        let dropped = step(&entered(), drop_action(30));
        let rejected = step(&dropped, reject_action("expired insurance", 9));
        assert_eq!(rejected.current_status, DispatchStatus::PermitRejected);
        assert!(rejected.check_phase_consistency().is_ok());

        let retried = step(&rejected, DispatchAction::RetryAfterRejection { by: None });
        assert_eq!(retried.current_status, DispatchStatus::PassengersDropped);
        assert!(retried.boarding_permit.is_none());
        assert_eq!(retried.passenger_drop, dropped.passenger_drop);
        let audit = retried.last_rejection.clone().unwrap();
        assert_eq!(audit.reason.as_deref(), Some("expired insurance"));
        assert_eq!(audit.at, at(9, 0));
        assert!(retried.check_phase_consistency().is_ok());

        let second = step(&retried, reject_action("missing fire extinguisher", 10));
        assert_eq!(
            second.last_rejection.unwrap().reason.as_deref(),
            Some("missing fire extinguisher")
        );
    }

    #[test]
    fn test_drop_passengers_after_rejection_replaces_drop_phase() {
        let rejected = step(&step(&entered(), drop_action(30)), reject_action("late", 9));
        let outcome = rejected.apply(drop_action(25), at(12, 0)).unwrap();

        assert_eq!(outcome.record.current_status, DispatchStatus::PassengersDropped);
        assert_eq!(outcome.record.passenger_drop.unwrap().passengers_arrived, Some(25));
        assert!(outcome.record.boarding_permit.is_none());
        assert!(outcome.record.last_rejection.is_some());
    }

    #[test]
    fn test_retry_requires_rejected_permit() {
        let err = entered()
            .apply(DispatchAction::RetryAfterRejection { by: None }, at(12, 0))
            .unwrap_err();
        assert!(matches!(
            err,
            TransitionError::IllegalTransition {
                current: DispatchStatus::Entered,
                target: DispatchStatus::PassengersDropped,
                ..
            }
        ));
    }

    #[test]
    fn test_exit_from_departure_ordered_records_both_hops() {
        let mut record = step(&entered(), drop_action(30));
        record = step(&record, approve_action());
        record = step(&record, pay_action());
        record = step(
            &record,
            DispatchAction::OrderDeparture(DepartureOrder {
                stamp: stamp(10, 0),
                passengers_departing: Some(28),
            }),
        );

        let outcome = record.apply(DispatchAction::Exit(stamp(10, 30)), at(12, 0)).unwrap();
        let hops: Vec<_> = outcome
            .changes
            .iter()
            .map(|c| (c.from_status, c.to_status))
            .collect();
        assert_eq!(
            hops,
            vec![
                (DispatchStatus::DepartureOrdered, DispatchStatus::Departed),
                (DispatchStatus::Departed, DispatchStatus::Exited),
            ]
        );
        assert_eq!(outcome.record.current_status, DispatchStatus::Exited);
        assert!(outcome.record.current_status.is_terminal());
        assert!(outcome.record.check_phase_consistency().is_ok());
    }

    #[test]
    fn test_cancel_freezes_phases_and_blocks_further_actions() {
        let dropped = step(&entered(), drop_action(30));
        let cancelled = step(
            &dropped,
            DispatchAction::Cancel {
                at: at(9, 0),
                by: Some("supervisor".to_string()),
                reason: Some("breakdown".to_string()),
            },
        );

        assert_eq!(cancelled.current_status, DispatchStatus::Cancelled);
        assert_eq!(cancelled.effective_status(), DispatchStatus::PassengersDropped);
        assert_eq!(cancelled.passenger_drop, dropped.passenger_drop);
        assert!(cancelled.check_phase_consistency().is_ok());

        assert!(cancelled.apply(approve_action(), at(12, 0)).is_err());
        assert!(cancelled
            .apply(
                DispatchAction::Cancel { at: at(9, 5), by: None, reason: None },
                at(12, 0)
            )
            .is_err());
    }

    #[test]
    fn test_consistency_detects_premature_phase() {
        let mut record = entered();
        record.payment = Some(Payment {
            stamp: stamp(9, 0),
            amount: Decimal::ZERO,
            method: None,
            invoice_number: None,
        });
        assert!(record.check_phase_consistency().is_err());
    }

    #[test]
    fn test_updated_at_bumped_created_at_kept() {
        let record = entered();
        let next = record.apply(drop_action(10), at(13, 0)).unwrap().record;
        assert_eq!(next.created_at, record.created_at);
        assert_eq!(next.updated_at, at(13, 0));
    }
}
