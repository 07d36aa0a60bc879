//! Almacén de despachos en memoria
//!
//! Cada registro vive detrás de su propio `Mutex`, así dos transiciones sobre
//! el mismo id se ejecutan una tras otra y las de ids distintos en paralelo.
//! Se usa en desarrollo (sin `DATABASE_URL`) y en los tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::dispatch_store::{ensure_creatable, DispatchFilters, DispatchStore};
use crate::models::dispatch::{DispatchRecord, NewDispatch, TransitionOutcome};
use crate::models::dispatch_action::DispatchAction;
use crate::models::dispatch_event::StatusChange;
use crate::utils::errors::DispatchError;

struct Entry {
    record: DispatchRecord,
    history: Vec<StatusChange>,
    deleted: bool,
}

#[derive(Default)]
pub struct InMemoryDispatchRepository {
    records: RwLock<HashMap<Uuid, Arc<Mutex<Entry>>>>,
}

impl InMemoryDispatchRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn entry(&self, id: Uuid) -> Result<Arc<Mutex<Entry>>, DispatchError> {
        self.records
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(DispatchError::NotFound(id))
    }
}

#[async_trait]
impl DispatchStore for InMemoryDispatchRepository {
    async fn create(&self, new: NewDispatch) -> Result<DispatchRecord, DispatchError> {
        ensure_creatable(&new)?;
        let record = DispatchRecord::from_new(new, Utc::now());

        let entry = Entry {
            record: record.clone(),
            history: Vec::new(),
            deleted: false,
        };
        self.records
            .write()
            .await
            .insert(record.id, Arc::new(Mutex::new(entry)));

        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<DispatchRecord>, DispatchError> {
        let entry = match self.records.read().await.get(&id) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };
        let entry = entry.lock().await;
        Ok((!entry.deleted).then(|| entry.record.clone()))
    }

    async fn find_all(&self, filters: &DispatchFilters) -> Result<Vec<DispatchRecord>, DispatchError> {
        let entries: Vec<_> = self.records.read().await.values().cloned().collect();

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.lock().await;
            if !entry.deleted && filters.matches(&entry.record) {
                records.push(entry.record.clone());
            }
        }

        records.sort_by(|a, b| b.entry.at.cmp(&a.entry.at).then(b.created_at.cmp(&a.created_at)));

        Ok(records
            .into_iter()
            .skip(filters.offset() as usize)
            .take(filters.limit() as usize)
            .collect())
    }

    async fn transition(
        &self,
        id: Uuid,
        action: DispatchAction,
    ) -> Result<TransitionOutcome, DispatchError> {
        let entry = self.entry(id).await?;
        let mut entry = entry.lock().await;
        if entry.deleted {
            return Err(DispatchError::NotFound(id));
        }

        // Si `apply` falla el registro guardado no se toca
        let outcome = entry.record.apply(action, Utc::now())?;
        entry.record = outcome.record.clone();
        entry.history.extend(outcome.changes.iter().cloned());

        Ok(outcome)
    }

    async fn history(&self, id: Uuid) -> Result<Vec<StatusChange>, DispatchError> {
        let entry = self.entry(id).await?;
        let entry = entry.lock().await;
        if entry.deleted {
            return Err(DispatchError::NotFound(id));
        }
        Ok(entry.history.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), DispatchError> {
        let entry = self
            .records
            .write()
            .await
            .remove(&id)
            .ok_or(DispatchError::NotFound(id))?;
        entry.lock().await.deleted = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::dispatch::DisplaySnapshot;
    use crate::models::dispatch_action::{
        BoardingPermit, PassengerDrop, Payment, PermitDecision, PhaseStamp,
    };
    use crate::models::dispatch_status::DispatchStatus;
    use chrono::{DateTime, TimeZone};
    use rust_decimal::Decimal;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 12, 18, hour, 0, 0).unwrap()
    }

    fn new_dispatch(vehicle_id: &str, hour: u32, operator: Option<&str>) -> NewDispatch {
        NewDispatch {
            vehicle_id: vehicle_id.to_string(),
            driver_id: "d1".to_string(),
            route_id: Some("r1".to_string()),
            schedule_id: None,
            entry: PhaseStamp::new(at(hour), None, Some("S1".to_string())),
            snapshot: DisplaySnapshot {
                operator_id: operator.map(str::to_string),
                ..DisplaySnapshot::default()
            },
            notes: None,
            metadata: serde_json::json!({}),
        }
    }

    fn drop_passengers() -> DispatchAction {
        DispatchAction::DropPassengers(PassengerDrop {
            stamp: PhaseStamp::new(at(9), None, None),
            passengers_arrived: Some(30),
        })
    }

    fn approve() -> DispatchAction {
        DispatchAction::IssuePermit(BoardingPermit {
            stamp: PhaseStamp::new(at(9), None, None),
            decision: PermitDecision::Approved {
                transport_order_code: "TO-1".to_string(),
                planned_departure_time: None,
                seat_count: None,
            },
        })
    }

    fn pay() -> DispatchAction {
        DispatchAction::Pay(Payment {
            stamp: PhaseStamp::new(at(9), None, None),
            amount: Decimal::new(150000, 0),
            method: Some("cash".to_string()),
            invoice_number: None,
        })
    }

    #[tokio::test]
    async fn test_create_then_find_returns_entered() {
        let repo = InMemoryDispatchRepository::new();
        let created = repo.create(new_dispatch("v1", 8, None)).await.unwrap();

        let found = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found, created);
        assert_eq!(found.current_status, DispatchStatus::Entered);
        assert_eq!(found.entry.at, at(8));
        assert!(found.passenger_drop.is_none());
        assert!(found.payment.is_none());
    }

    #[tokio::test]
    async fn test_create_requires_vehicle_and_driver() {
        let repo = InMemoryDispatchRepository::new();
        let mut missing_vehicle = new_dispatch("", 8, None);
        assert!(matches!(
            repo.create(missing_vehicle.clone()).await,
            Err(DispatchError::Validation(_))
        ));

        missing_vehicle.vehicle_id = "v1".to_string();
        missing_vehicle.driver_id = "  ".to_string();
        assert!(matches!(
            repo.create(missing_vehicle).await,
            Err(DispatchError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_failed_transition_leaves_record_identical() {
        let repo = InMemoryDispatchRepository::new();
        let created = repo.create(new_dispatch("v1", 8, None)).await.unwrap();
        repo.transition(created.id, drop_passengers()).await.unwrap();
        let before = repo.find_by_id(created.id).await.unwrap().unwrap();

        let err = repo.transition(created.id, pay()).await.unwrap_err();
        match err {
            DispatchError::IllegalTransition { current, target, allowed_next } => {
                assert_eq!(current, DispatchStatus::PassengersDropped);
                assert_eq!(target, DispatchStatus::Paid);
                assert_eq!(
                    allowed_next,
                    vec![DispatchStatus::PermitIssued, DispatchStatus::PermitRejected]
                );
            }
            other => panic!("unexpected error {:?}", other),
        }

        let after = repo.find_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(
            serde_json::to_vec(&before).unwrap(),
            serde_json::to_vec(&after).unwrap()
        );
        assert_eq!(repo.history(created.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transition_unknown_id_is_not_found() {
        let repo = InMemoryDispatchRepository::new();
        let id = Uuid::new_v4();
        assert!(matches!(
            repo.transition(id, drop_passengers()).await,
            Err(DispatchError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_payments_only_one_wins() {
        let repo = Arc::new(InMemoryDispatchRepository::new());
        let created = repo.create(new_dispatch("v1", 8, None)).await.unwrap();
        repo.transition(created.id, drop_passengers()).await.unwrap();
        repo.transition(created.id, approve()).await.unwrap();

        let first = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.transition(created.id, pay()).await })
        };
        let second = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.transition(created.id, pay()).await })
        };

        let results = vec![first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        let illegal = results
            .iter()
            .filter(|r| matches!(r, Err(DispatchError::IllegalTransition { .. })))
            .count();

        assert_eq!(successes, 1);
        assert_eq!(illegal, 1);
        assert_eq!(repo.history(created.id).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_filters_are_conjunctive() {
        let repo = InMemoryDispatchRepository::new();
        let a = repo.create(new_dispatch("v1", 8, Some("op-1"))).await.unwrap();
        repo.create(new_dispatch("v1", 10, Some("op-2"))).await.unwrap();
        repo.create(new_dispatch("v2", 11, Some("op-1"))).await.unwrap();
        repo.transition(a.id, drop_passengers()).await.unwrap();

        let by_vehicle = DispatchFilters {
            vehicle_id: Some("v1".to_string()),
            ..Default::default()
        };
        let listed = repo.find_all(&by_vehicle).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed[0].entry.at > listed[1].entry.at);

        let narrow = DispatchFilters {
            vehicle_id: Some("v1".to_string()),
            operator_id: Some("op-1".to_string()),
            status: Some(DispatchStatus::PassengersDropped),
            entered_from: Some(at(7)),
            entered_to: Some(at(9)),
            ..Default::default()
        };
        let listed = repo.find_all(&narrow).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, a.id);

        let none = DispatchFilters {
            vehicle_id: Some("v2".to_string()),
            operator_id: Some("op-2".to_string()),
            ..Default::default()
        };
        assert!(repo.find_all(&none).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_limit_and_offset() {
        let repo = InMemoryDispatchRepository::new();
        for hour in 6..10 {
            repo.create(new_dispatch("v1", hour, None)).await.unwrap();
        }
        let page = DispatchFilters {
            limit: Some(2),
            offset: Some(1),
            ..Default::default()
        };
        let listed = repo.find_all(&page).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].entry.at, at(8));
        assert_eq!(listed[1].entry.at, at(7));
    }

    #[tokio::test]
    async fn test_delete_removes_record() {
        let repo = InMemoryDispatchRepository::new();
        let created = repo.create(new_dispatch("v1", 8, None)).await.unwrap();

        repo.delete(created.id).await.unwrap();
        assert!(repo.find_by_id(created.id).await.unwrap().is_none());
        assert!(matches!(
            repo.delete(created.id).await,
            Err(DispatchError::NotFound(_))
        ));
    }
}
