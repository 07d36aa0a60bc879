//! Orquestador del flujo de despacho
//!
//! Cada operación valida su payload, construye la acción tipada, la aplica a
//! través del almacén y, solo después de confirmar, emite eventos y avisa a
//! los notificadores. Los fallos posteriores se registran sin revertir nada.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::dto::dispatch_dto::{
    CancelRequest, CreateDispatchRequest, DepartRequest, DepartureOrderRequest,
    DropPassengersRequest, ExitRequest, IssuePermitRequest, PaymentRequest,
};
use crate::models::dispatch::{DispatchRecord, NewDispatch, TransitionOutcome};
use crate::models::dispatch_action::{
    BoardingPermit, DepartureOrder, DispatchAction, PassengerDrop, Payment, PermitDecision,
    PhaseStamp,
};
use crate::models::dispatch_event::StatusChange;
use crate::repositories::dispatch_store::{DispatchFilters, DispatchStore};
use crate::services::dispatch_notifier::DispatchNotifier;
use crate::services::event_bus::DispatchEventBus;
use crate::services::fleet_lookup::{FleetLookup, StaticFleetLookup};
use crate::services::shift_resolver::{NoShiftResolver, ShiftResolver};
use crate::utils::errors::{validation_error, DispatchError};
use crate::utils::metrics;
use crate::utils::validation::validate_datetime;

pub struct DispatchWorkflow {
    store: Arc<dyn DispatchStore>,
    fleet: Arc<dyn FleetLookup>,
    shifts: Arc<dyn ShiftResolver>,
    notifiers: Vec<Arc<dyn DispatchNotifier>>,
    events: DispatchEventBus,
}

impl DispatchWorkflow {
    /// Flujo sin colaboradores externos: flota vacía y sin turnos
    pub fn new(store: Arc<dyn DispatchStore>) -> Self {
        Self {
            store,
            fleet: Arc::new(StaticFleetLookup::new()),
            shifts: Arc::new(NoShiftResolver),
            notifiers: Vec::new(),
            events: DispatchEventBus::default(),
        }
    }

    pub fn with_fleet(mut self, fleet: Arc<dyn FleetLookup>) -> Self {
        self.fleet = fleet;
        self
    }

    pub fn with_shift_resolver(mut self, shifts: Arc<dyn ShiftResolver>) -> Self {
        self.shifts = shifts;
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn DispatchNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn events(&self) -> &DispatchEventBus {
        &self.events
    }

    /// Registrar la entrada de un vehículo en la estación
    pub async fn enter(
        &self,
        request: CreateDispatchRequest,
        actor: Option<String>,
    ) -> Result<DispatchRecord, DispatchError> {
        validate(&request)?;

        let entry_time = required_time("entry_time", request.entry_time.as_deref())?;
        let entry = self.stamp(entry_time, request.shift_id, actor);

        let snapshot = match self
            .fleet
            .snapshot(&request.vehicle_id, &request.driver_id, request.route_id.as_deref())
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("⚠️ Sin datos de flota para vehículo {}: {}", request.vehicle_id, e);
                metrics::record_collaborator_failure(e.collaborator());
                Default::default()
            }
        };

        let record = self
            .store
            .create(NewDispatch {
                vehicle_id: request.vehicle_id,
                driver_id: request.driver_id,
                route_id: request.route_id,
                schedule_id: request.schedule_id,
                entry,
                snapshot,
                notes: request.notes,
                metadata: request.metadata.unwrap_or_else(|| serde_json::json!({})),
            })
            .await?;

        info!(
            "🚌 Vehículo {} registrado en la estación (despacho {})",
            record.vehicle_id, record.id
        );
        Ok(record)
    }

    pub async fn drop_passengers(
        &self,
        id: Uuid,
        request: DropPassengersRequest,
        actor: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        validate(&request)?;
        let at = optional_time("passenger_drop_time", request.passenger_drop_time.as_deref())?;

        let action = DispatchAction::DropPassengers(PassengerDrop {
            stamp: self.stamp(at, request.shift_id, actor),
            passengers_arrived: request.passengers_arrived,
        });
        self.commit(id, action).await
    }

    /// Aprobar o rechazar el permiso de embarque
    pub async fn issue_permit(
        &self,
        id: Uuid,
        request: IssuePermitRequest,
        actor: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        validate(&request)?;
        let at = optional_time("boarding_permit_time", request.boarding_permit_time.as_deref())?;

        let decision = if request.is_rejection() {
            if request.rejection_reason.is_none() {
                warn!("⚠️ Permiso rechazado sin motivo para despacho {}", id);
            }
            PermitDecision::Rejected {
                rejection_reason: request.rejection_reason,
            }
        } else {
            let planned = request
                .planned_departure_time
                .as_deref()
                .map(|value| parse_time("planned_departure_time", value))
                .transpose()?;
            PermitDecision::Approved {
                transport_order_code: request.transport_order_code.unwrap_or_default(),
                planned_departure_time: planned,
                seat_count: request.seat_count,
            }
        };

        let action = DispatchAction::IssuePermit(BoardingPermit {
            stamp: self.stamp(at, request.shift_id, actor),
            decision,
        });
        self.commit(id, action).await
    }

    /// Volver a `passengers_dropped` tras un rechazo, conservando la auditoría
    pub async fn retry_after_rejection(
        &self,
        id: Uuid,
        actor: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        self.commit(id, DispatchAction::RetryAfterRejection { by: actor }).await
    }

    pub async fn pay(
        &self,
        id: Uuid,
        request: PaymentRequest,
        actor: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        validate(&request)?;
        let at = optional_time("payment_time", request.payment_time.as_deref())?;
        let amount = request
            .payment_amount
            .ok_or_else(|| validation_error("payment_amount", "payment_amount is required"))?;

        let action = DispatchAction::Pay(Payment {
            stamp: self.stamp(at, request.shift_id, actor),
            amount,
            method: request.payment_method,
            invoice_number: request.invoice_number,
        });
        self.commit(id, action).await
    }

    pub async fn order_departure(
        &self,
        id: Uuid,
        request: DepartureOrderRequest,
        actor: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        validate(&request)?;
        let at = optional_time("departure_order_time", request.departure_order_time.as_deref())?;

        let action = DispatchAction::OrderDeparture(DepartureOrder {
            stamp: self.stamp(at, request.shift_id, actor),
            passengers_departing: request.passengers_departing,
        });
        self.commit(id, action).await
    }

    pub async fn depart(
        &self,
        id: Uuid,
        request: DepartRequest,
        actor: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        validate(&request)?;
        let at = optional_time("departure_time", request.departure_time.as_deref())?;

        let action = DispatchAction::Depart(self.stamp(at, request.shift_id, actor));
        self.commit(id, action).await
    }

    /// Salida de la estación; desde `departure_ordered` recorre ambos saltos
    pub async fn exit(
        &self,
        id: Uuid,
        request: ExitRequest,
        actor: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        validate(&request)?;
        let at = optional_time("exit_time", request.exit_time.as_deref())?;

        let action = DispatchAction::Exit(self.stamp(at, request.shift_id, actor));
        self.commit(id, action).await
    }

    /// Cancelación irreversible de un despacho no terminal
    pub async fn cancel(
        &self,
        id: Uuid,
        request: CancelRequest,
        actor: Option<String>,
    ) -> Result<TransitionOutcome, DispatchError> {
        validate(&request)?;

        let action = DispatchAction::Cancel {
            at: Utc::now(),
            by: actor,
            reason: request.reason,
        };
        self.commit(id, action).await
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<DispatchRecord, DispatchError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(DispatchError::NotFound(id))
    }

    pub async fn find_all(&self, filters: &DispatchFilters) -> Result<Vec<DispatchRecord>, DispatchError> {
        self.store.find_all(filters).await
    }

    pub async fn history(&self, id: Uuid) -> Result<Vec<StatusChange>, DispatchError> {
        self.store.history(id).await
    }

    /// Borrado administrativo: no pasa por la máquina de estados
    pub async fn delete(&self, id: Uuid, actor: Option<String>) -> Result<(), DispatchError> {
        self.store.delete(id).await?;
        warn!(
            "🗑️ Despacho {} eliminado por {}",
            id,
            actor.as_deref().unwrap_or("anónimo")
        );
        Ok(())
    }

    fn stamp(&self, at: DateTime<Utc>, shift_id: Option<String>, by: Option<String>) -> PhaseStamp {
        let shift = shift_id.or_else(|| self.shifts.resolve(at));
        PhaseStamp::new(at, by, shift)
    }

    async fn commit(&self, id: Uuid, action: DispatchAction) -> Result<TransitionOutcome, DispatchError> {
        let name = action.name();

        let outcome = match self.store.transition(id, action).await {
            Ok(outcome) => outcome,
            Err(e) => {
                metrics::record_rejection(rejection_reason(&e));
                match &e {
                    DispatchError::UnknownStatus(value) => {
                        error!("🚨 Despacho {} con estado corrupto '{}'", id, value)
                    }
                    _ => warn!("⛔ {} rechazado para despacho {}: {}", name, id, e),
                }
                return Err(e);
            }
        };

        for change in &outcome.changes {
            metrics::record_transition(change.from_status, change.to_status);
            info!(
                "✅ Despacho {}: {} -> {}",
                id, change.from_status, change.to_status
            );
        }

        self.after_commit(&outcome).await;
        Ok(outcome)
    }

    async fn after_commit(&self, outcome: &TransitionOutcome) {
        for change in &outcome.changes {
            self.events.publish(change.clone());
        }

        let results = join_all(self.notifiers.iter().map(|notifier| async move {
            (
                notifier.name(),
                notifier.notify(&outcome.record, &outcome.changes).await,
            )
        }))
        .await;

        for (name, result) in results {
            if let Err(e) = result {
                metrics::record_collaborator_failure(e.collaborator());
                let failure = DispatchError::from(e);
                error!(
                    "❌ Notificador {} falló para despacho {}: {}",
                    name, outcome.record.id, failure
                );
            }
        }
    }
}

fn validate<T: Validate>(request: &T) -> Result<(), DispatchError> {
    request.validate().map_err(|e| {
        metrics::record_rejection("validation");
        DispatchError::Validation(e)
    })
}

fn parse_time(field: &'static str, value: &str) -> Result<DateTime<Utc>, DispatchError> {
    validate_datetime(value).map_err(|_| validation_error(field, "expected an RFC 3339 timestamp"))
}

fn required_time(field: &'static str, value: Option<&str>) -> Result<DateTime<Utc>, DispatchError> {
    match value {
        Some(value) => parse_time(field, value),
        None => Err(validation_error(field, "timestamp is required")),
    }
}

/// Sin valor explícito la fase se sella con la hora actual
fn optional_time(field: &'static str, value: Option<&str>) -> Result<DateTime<Utc>, DispatchError> {
    match value {
        Some(value) => parse_time(field, value),
        None => Ok(Utc::now()),
    }
}

fn rejection_reason(error: &DispatchError) -> &'static str {
    match error {
        DispatchError::Validation(_) => "validation",
        DispatchError::NotFound(_) => "not_found",
        DispatchError::UnknownStatus(_) => "unknown_status",
        DispatchError::IllegalTransition { .. } => "illegal_transition",
        DispatchError::CollaboratorFailure { .. } => "collaborator",
        DispatchError::Database(_) => "database",
    }
}
