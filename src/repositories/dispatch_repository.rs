//! Repositorio PostgreSQL de registros de despacho
//!
//! Cada transición se ejecuta en una transacción que bloquea la fila con
//! `SELECT ... FOR UPDATE`, aplica la acción y escribe el historial antes de
//! confirmar. Si algo falla la transacción se descarta y nada cambia.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use super::dispatch_store::{ensure_creatable, DispatchFilters, DispatchStore};
use crate::models::dispatch::{DispatchRecord, DisplaySnapshot, NewDispatch, TransitionOutcome};
use crate::models::dispatch_action::{
    BoardingPermit, Cancellation, DepartureOrder, DispatchAction, PassengerDrop, Payment,
    PermitDecision, PhaseStamp, RejectionAudit,
};
use crate::models::dispatch_event::StatusChange;
use crate::models::dispatch_status::DispatchStatus;
use crate::utils::errors::DispatchError;

/// Fila plana de `dispatch_records`
#[derive(Debug, Clone, Default, PartialEq, sqlx::FromRow)]
pub struct DispatchRow {
    pub id: Uuid,
    pub vehicle_id: String,
    pub driver_id: String,
    pub route_id: Option<String>,
    pub schedule_id: Option<String>,

    pub plate_number: Option<String>,
    pub driver_name: Option<String>,
    pub route_name: Option<String>,
    pub operator_id: Option<String>,
    pub operator_name: Option<String>,
    pub operator_code: Option<String>,

    pub current_status: String,

    pub entry_time: DateTime<Utc>,
    pub entry_by: Option<String>,
    pub entry_shift: Option<String>,

    pub passenger_drop_time: Option<DateTime<Utc>>,
    pub passengers_arrived: Option<i32>,
    pub passenger_drop_by: Option<String>,
    pub passenger_drop_shift: Option<String>,

    pub boarding_permit_time: Option<DateTime<Utc>>,
    pub planned_departure_time: Option<DateTime<Utc>>,
    pub transport_order_code: Option<String>,
    pub seat_count: Option<i32>,
    pub permit_status: Option<String>,
    pub rejection_reason: Option<String>,
    pub boarding_permit_by: Option<String>,
    pub boarding_permit_shift: Option<String>,

    pub last_rejection_time: Option<DateTime<Utc>>,
    pub last_rejection_reason: Option<String>,
    pub last_rejection_by: Option<String>,

    pub payment_time: Option<DateTime<Utc>>,
    pub payment_amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub invoice_number: Option<String>,
    pub payment_by: Option<String>,
    pub payment_shift: Option<String>,

    pub departure_order_time: Option<DateTime<Utc>>,
    pub passengers_departing: Option<i32>,
    pub departure_order_by: Option<String>,
    pub departure_order_shift: Option<String>,

    pub departure_time: Option<DateTime<Utc>>,
    pub departure_by: Option<String>,
    pub departure_shift: Option<String>,

    pub exit_time: Option<DateTime<Utc>>,
    pub exit_by: Option<String>,
    pub exit_shift: Option<String>,

    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancelled_from_status: Option<String>,

    pub notes: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    dispatch_id: Uuid,
    from_status: String,
    to_status: String,
    changed_at: DateTime<Utc>,
    changed_by: Option<String>,
    reason: Option<String>,
}

impl TryFrom<HistoryRow> for StatusChange {
    type Error = DispatchError;

    fn try_from(row: HistoryRow) -> Result<Self, Self::Error> {
        Ok(StatusChange {
            dispatch_id: row.dispatch_id,
            from_status: row.from_status.parse()?,
            to_status: row.to_status.parse()?,
            at: row.changed_at,
            by: row.changed_by,
            reason: row.reason,
        })
    }
}

type StampColumns = (Option<DateTime<Utc>>, Option<String>, Option<String>);

fn stamp_columns(stamp: Option<&PhaseStamp>) -> StampColumns {
    match stamp {
        Some(stamp) => (Some(stamp.at), stamp.by.clone(), stamp.shift.clone()),
        None => (None, None, None),
    }
}

fn stamp_from(at: Option<DateTime<Utc>>, by: Option<String>, shift: Option<String>) -> Option<PhaseStamp> {
    at.map(|at| PhaseStamp::new(at, by, shift))
}

impl TryFrom<DispatchRow> for DispatchRecord {
    type Error = DispatchError;

    fn try_from(row: DispatchRow) -> Result<Self, Self::Error> {
        let current_status: DispatchStatus = row.current_status.parse()?;

        let passenger_drop = stamp_from(
            row.passenger_drop_time,
            row.passenger_drop_by,
            row.passenger_drop_shift,
        )
        .map(|stamp| PassengerDrop {
            stamp,
            passengers_arrived: row.passengers_arrived,
        });

        let boarding_permit = match stamp_from(
            row.boarding_permit_time,
            row.boarding_permit_by,
            row.boarding_permit_shift,
        ) {
            Some(stamp) => {
                let decision = match row.permit_status.as_deref() {
                    Some("approved") => PermitDecision::Approved {
                        transport_order_code: required(row.transport_order_code, "transport_order_code")?,
                        planned_departure_time: row.planned_departure_time,
                        seat_count: row.seat_count,
                    },
                    Some("rejected") => PermitDecision::Rejected {
                        rejection_reason: row.rejection_reason,
                    },
                    other => {
                        return Err(DispatchError::UnknownStatus(format!(
                            "permit_status '{}'",
                            other.unwrap_or("")
                        )))
                    }
                };
                Some(BoardingPermit { stamp, decision })
            }
            None => None,
        };

        let last_rejection = row.last_rejection_time.map(|at| RejectionAudit {
            at,
            reason: row.last_rejection_reason,
            by: row.last_rejection_by,
        });

        let payment = match stamp_from(row.payment_time, row.payment_by, row.payment_shift) {
            Some(stamp) => Some(Payment {
                stamp,
                amount: required(row.payment_amount, "payment_amount")?,
                method: row.payment_method,
                invoice_number: row.invoice_number,
            }),
            None => None,
        };

        let departure_order = stamp_from(
            row.departure_order_time,
            row.departure_order_by,
            row.departure_order_shift,
        )
        .map(|stamp| DepartureOrder {
            stamp,
            passengers_departing: row.passengers_departing,
        });

        let cancellation = match row.cancelled_at {
            Some(at) => Some(Cancellation {
                at,
                by: row.cancelled_by,
                reason: row.cancellation_reason,
                previous_status: required(row.cancelled_from_status, "cancelled_from_status")?.parse()?,
            }),
            None => None,
        };

        let record = DispatchRecord {
            id: row.id,
            vehicle_id: row.vehicle_id,
            driver_id: row.driver_id,
            route_id: row.route_id,
            schedule_id: row.schedule_id,
            snapshot: DisplaySnapshot {
                plate_number: row.plate_number,
                driver_name: row.driver_name,
                route_name: row.route_name,
                operator_id: row.operator_id,
                operator_name: row.operator_name,
                operator_code: row.operator_code,
            },
            current_status,
            entry: PhaseStamp::new(row.entry_time, row.entry_by, row.entry_shift),
            passenger_drop,
            boarding_permit,
            payment,
            departure_order,
            departure: stamp_from(row.departure_time, row.departure_by, row.departure_shift),
            exit: stamp_from(row.exit_time, row.exit_by, row.exit_shift),
            last_rejection,
            cancellation,
            notes: row.notes,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        };

        record
            .check_phase_consistency()
            .map_err(|fault| DispatchError::UnknownStatus(format!("dispatch {}: {}", record.id, fault)))?;
        Ok(record)
    }
}

/// Columna obligatoria para la fase cargada; NULL es una falla de integridad
fn required<T>(value: Option<T>, column: &str) -> Result<T, DispatchError> {
    value.ok_or_else(|| DispatchError::UnknownStatus(format!("missing {}", column)))
}

impl From<&DispatchRecord> for DispatchRow {
    fn from(record: &DispatchRecord) -> Self {
        let (passenger_drop_time, passenger_drop_by, passenger_drop_shift) =
            stamp_columns(record.passenger_drop.as_ref().map(|p| &p.stamp));
        let (boarding_permit_time, boarding_permit_by, boarding_permit_shift) =
            stamp_columns(record.boarding_permit.as_ref().map(|p| &p.stamp));
        let (payment_time, payment_by, payment_shift) =
            stamp_columns(record.payment.as_ref().map(|p| &p.stamp));
        let (departure_order_time, departure_order_by, departure_order_shift) =
            stamp_columns(record.departure_order.as_ref().map(|o| &o.stamp));
        let (departure_time, departure_by, departure_shift) = stamp_columns(record.departure.as_ref());
        let (exit_time, exit_by, exit_shift) = stamp_columns(record.exit.as_ref());

        let mut row = DispatchRow {
            id: record.id,
            vehicle_id: record.vehicle_id.clone(),
            driver_id: record.driver_id.clone(),
            route_id: record.route_id.clone(),
            schedule_id: record.schedule_id.clone(),
            plate_number: record.snapshot.plate_number.clone(),
            driver_name: record.snapshot.driver_name.clone(),
            route_name: record.snapshot.route_name.clone(),
            operator_id: record.snapshot.operator_id.clone(),
            operator_name: record.snapshot.operator_name.clone(),
            operator_code: record.snapshot.operator_code.clone(),
            current_status: record.current_status.as_str().to_string(),
            entry_time: record.entry.at,
            entry_by: record.entry.by.clone(),
            entry_shift: record.entry.shift.clone(),
            passenger_drop_time,
            passengers_arrived: record.passenger_drop.as_ref().and_then(|p| p.passengers_arrived),
            passenger_drop_by,
            passenger_drop_shift,
            boarding_permit_time,
            boarding_permit_by,
            boarding_permit_shift,
            payment_time,
            payment_by,
            payment_shift,
            departure_order_time,
            passengers_departing: record
                .departure_order
                .as_ref()
                .and_then(|o| o.passengers_departing),
            departure_order_by,
            departure_order_shift,
            departure_time,
            departure_by,
            departure_shift,
            exit_time,
            exit_by,
            exit_shift,
            notes: record.notes.clone(),
            metadata: record.metadata.clone(),
            created_at: record.created_at,
            updated_at: record.updated_at,
            ..DispatchRow::default()
        };

        if let Some(permit) = &record.boarding_permit {
            row.permit_status = Some(permit.decision.permit_status().to_string());
            match &permit.decision {
                PermitDecision::Approved {
                    transport_order_code,
                    planned_departure_time,
                    seat_count,
                } => {
                    row.transport_order_code = Some(transport_order_code.clone());
                    row.planned_departure_time = *planned_departure_time;
                    row.seat_count = *seat_count;
                }
                PermitDecision::Rejected { rejection_reason } => {
                    row.rejection_reason = rejection_reason.clone();
                }
            }
        }

        if let Some(rejection) = &record.last_rejection {
            row.last_rejection_time = Some(rejection.at);
            row.last_rejection_reason = rejection.reason.clone();
            row.last_rejection_by = rejection.by.clone();
        }

        if let Some(payment) = &record.payment {
            row.payment_amount = Some(payment.amount);
            row.payment_method = payment.method.clone();
            row.invoice_number = payment.invoice_number.clone();
        }

        if let Some(cancellation) = &record.cancellation {
            row.cancelled_at = Some(cancellation.at);
            row.cancellation_reason = cancellation.reason.clone();
            row.cancelled_by = cancellation.by.clone();
            row.cancelled_from_status = Some(cancellation.previous_status.as_str().to_string());
        }

        row
    }
}

pub struct PgDispatchRepository {
    pool: PgPool,
}

impl PgDispatchRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DispatchStore for PgDispatchRepository {
    async fn create(&self, new: NewDispatch) -> Result<DispatchRecord, DispatchError> {
        ensure_creatable(&new)?;
        let row = DispatchRow::from(&DispatchRecord::from_new(new, Utc::now()));

        let created = sqlx::query_as::<_, DispatchRow>(
            r#"
            INSERT INTO dispatch_records (
                id, vehicle_id, driver_id, route_id, schedule_id,
                plate_number, driver_name, route_name, operator_id, operator_name, operator_code,
                current_status, entry_time, entry_by, entry_shift,
                notes, metadata, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
            RETURNING *
            "#,
        )
        .bind(row.id)
        .bind(row.vehicle_id)
        .bind(row.driver_id)
        .bind(row.route_id)
        .bind(row.schedule_id)
        .bind(row.plate_number)
        .bind(row.driver_name)
        .bind(row.route_name)
        .bind(row.operator_id)
        .bind(row.operator_name)
        .bind(row.operator_code)
        .bind(row.current_status)
        .bind(row.entry_time)
        .bind(row.entry_by)
        .bind(row.entry_shift)
        .bind(row.notes)
        .bind(row.metadata)
        .bind(row.created_at)
        .bind(row.updated_at)
        .fetch_one(&self.pool)
        .await?;

        created.try_into()
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DispatchRecord>, DispatchError> {
        let row = sqlx::query_as::<_, DispatchRow>("SELECT * FROM dispatch_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DispatchRecord::try_from).transpose()
    }

    async fn find_all(&self, filters: &DispatchFilters) -> Result<Vec<DispatchRecord>, DispatchError> {
        let mut query: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT * FROM dispatch_records WHERE 1 = 1");

        if let Some(status) = filters.status {
            query.push(" AND current_status = ").push_bind(status.as_str());
        }
        if let Some(from) = filters.entered_from {
            query.push(" AND entry_time >= ").push_bind(from);
        }
        if let Some(to) = filters.entered_to {
            query.push(" AND entry_time <= ").push_bind(to);
        }
        if let Some(vehicle_id) = &filters.vehicle_id {
            query.push(" AND vehicle_id = ").push_bind(vehicle_id.clone());
        }
        if let Some(operator_id) = &filters.operator_id {
            query.push(" AND operator_id = ").push_bind(operator_id.clone());
        }
        query
            .push(" ORDER BY entry_time DESC, created_at DESC LIMIT ")
            .push_bind(filters.limit())
            .push(" OFFSET ")
            .push_bind(filters.offset());

        let rows = query
            .build_query_as::<DispatchRow>()
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(DispatchRecord::try_from).collect()
    }

    async fn transition(
        &self,
        id: Uuid,
        action: DispatchAction,
    ) -> Result<TransitionOutcome, DispatchError> {
        let mut tx = self.pool.begin().await?;

        let current = sqlx::query_as::<_, DispatchRow>(
            "SELECT * FROM dispatch_records WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(DispatchError::NotFound(id))?;

        let record = DispatchRecord::try_from(current)?;
        // Un error aquí descarta la transacción sin escribir nada
        let outcome = record.apply(action, Utc::now())?;
        let row = DispatchRow::from(&outcome.record);

        sqlx::query(
            r#"
            UPDATE dispatch_records SET
                current_status = $2,
                passenger_drop_time = $3, passengers_arrived = $4,
                passenger_drop_by = $5, passenger_drop_shift = $6,
                boarding_permit_time = $7, planned_departure_time = $8,
                transport_order_code = $9, seat_count = $10, permit_status = $11,
                rejection_reason = $12, boarding_permit_by = $13, boarding_permit_shift = $14,
                last_rejection_time = $15, last_rejection_reason = $16, last_rejection_by = $17,
                payment_time = $18, payment_amount = $19, payment_method = $20,
                invoice_number = $21, payment_by = $22, payment_shift = $23,
                departure_order_time = $24, passengers_departing = $25,
                departure_order_by = $26, departure_order_shift = $27,
                departure_time = $28, departure_by = $29, departure_shift = $30,
                exit_time = $31, exit_by = $32, exit_shift = $33,
                cancelled_at = $34, cancellation_reason = $35,
                cancelled_by = $36, cancelled_from_status = $37,
                updated_at = $38
            WHERE id = $1
            "#,
        )
        .bind(row.id)
        .bind(row.current_status)
        .bind(row.passenger_drop_time)
        .bind(row.passengers_arrived)
        .bind(row.passenger_drop_by)
        .bind(row.passenger_drop_shift)
        .bind(row.boarding_permit_time)
        .bind(row.planned_departure_time)
        .bind(row.transport_order_code)
        .bind(row.seat_count)
        .bind(row.permit_status)
        .bind(row.rejection_reason)
        .bind(row.boarding_permit_by)
        .bind(row.boarding_permit_shift)
        .bind(row.last_rejection_time)
        .bind(row.last_rejection_reason)
        .bind(row.last_rejection_by)
        .bind(row.payment_time)
        .bind(row.payment_amount)
        .bind(row.payment_method)
        .bind(row.invoice_number)
        .bind(row.payment_by)
        .bind(row.payment_shift)
        .bind(row.departure_order_time)
        .bind(row.passengers_departing)
        .bind(row.departure_order_by)
        .bind(row.departure_order_shift)
        .bind(row.departure_time)
        .bind(row.departure_by)
        .bind(row.departure_shift)
        .bind(row.exit_time)
        .bind(row.exit_by)
        .bind(row.exit_shift)
        .bind(row.cancelled_at)
        .bind(row.cancellation_reason)
        .bind(row.cancelled_by)
        .bind(row.cancelled_from_status)
        .bind(row.updated_at)
        .execute(&mut *tx)
        .await?;

        for change in &outcome.changes {
            sqlx::query(
                r#"
                INSERT INTO dispatch_status_history
                    (dispatch_id, from_status, to_status, changed_at, changed_by, reason)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(change.dispatch_id)
            .bind(change.from_status.as_str())
            .bind(change.to_status.as_str())
            .bind(change.at)
            .bind(change.by.clone())
            .bind(change.reason.clone())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("💾 Despacho {} guardado en estado {}", id, outcome.record.current_status);

        Ok(outcome)
    }

    async fn history(&self, id: Uuid) -> Result<Vec<StatusChange>, DispatchError> {
        let exists: (bool,) =
            sqlx::query_as("SELECT EXISTS(SELECT 1 FROM dispatch_records WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        if !exists.0 {
            return Err(DispatchError::NotFound(id));
        }

        let rows = sqlx::query_as::<_, HistoryRow>(
            r#"
            SELECT dispatch_id, from_status, to_status, changed_at, changed_by, reason
            FROM dispatch_status_history
            WHERE dispatch_id = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(StatusChange::try_from).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<(), DispatchError> {
        let result = sqlx::query("DELETE FROM dispatch_records WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DispatchError::NotFound(id));
        }
        Ok(())
    }
}
