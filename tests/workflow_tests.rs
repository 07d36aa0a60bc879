use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex};

use bus_station_dispatch::dto::dispatch_dto::{
    CreateDispatchRequest, DepartRequest, DepartureOrderRequest, DropPassengersRequest,
    ExitRequest, IssuePermitRequest, PaymentRequest,
};
use bus_station_dispatch::models::{DispatchRecord, DispatchStatus, DisplaySnapshot, StatusChange};
use bus_station_dispatch::repositories::InMemoryDispatchRepository;
use bus_station_dispatch::services::{
    DispatchNotifier, DispatchWorkflow, FleetLookup, StaticFleetLookup,
};
use bus_station_dispatch::utils::errors::{CollaboratorError, DispatchError};

fn workflow() -> DispatchWorkflow {
    DispatchWorkflow::new(Arc::new(InMemoryDispatchRepository::new()))
}

fn enter_request(vehicle_id: &str) -> CreateDispatchRequest {
    CreateDispatchRequest {
        vehicle_id: vehicle_id.to_string(),
        driver_id: "d1".to_string(),
        entry_time: Some("2024-12-18T08:00:00Z".to_string()),
        ..Default::default()
    }
}

fn approve(code: &str) -> IssuePermitRequest {
    IssuePermitRequest {
        permit_status: "approved".to_string(),
        transport_order_code: Some(code.to_string()),
        ..Default::default()
    }
}

fn reject(reason: &str) -> IssuePermitRequest {
    IssuePermitRequest {
        permit_status: "rejected".to_string(),
        rejection_reason: Some(reason.to_string()),
        ..Default::default()
    }
}

fn payment(amount: i64) -> PaymentRequest {
    PaymentRequest {
        payment_amount: Some(Decimal::new(amount, 0)),
        payment_method: Some("cash".to_string()),
        ..Default::default()
    }
}

fn drop(passengers: i32) -> DropPassengersRequest {
    DropPassengersRequest {
        passengers_arrived: Some(passengers),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_full_visit_reaches_exited() {
    let workflow = workflow();
    let record = workflow.enter(enter_request("v1"), None).await.unwrap();
    assert_eq!(record.current_status, DispatchStatus::Entered);

    let id = record.id;
    let steps = [
        workflow.drop_passengers(id, drop(30), None).await.unwrap(),
        workflow.issue_permit(id, approve("TO-1"), None).await.unwrap(),
        workflow.pay(id, payment(150000), None).await.unwrap(),
        workflow
            .order_departure(
                id,
                DepartureOrderRequest {
                    passengers_departing: Some(28),
                    ..Default::default()
                },
                None,
            )
            .await
            .unwrap(),
    ];
    let statuses: Vec<_> = steps.iter().map(|o| o.record.current_status).collect();
    assert_eq!(
        statuses,
        vec![
            DispatchStatus::PassengersDropped,
            DispatchStatus::PermitIssued,
            DispatchStatus::Paid,
            DispatchStatus::DepartureOrdered,
        ]
    );

    let exited = workflow
        .exit(
            id,
            ExitRequest {
                exit_time: Some("2024-12-18T10:30:00Z".to_string()),
                shift_id: None,
            },
            None,
        )
        .await
        .unwrap();

    assert_eq!(exited.record.current_status, DispatchStatus::Exited);
    assert!(exited.record.current_status.is_terminal());
    assert_eq!(exited.changes.len(), 2);
    assert_eq!(
        exited.record.exit.as_ref().unwrap().at.to_rfc3339(),
        "2024-12-18T10:30:00+00:00"
    );
    assert_eq!(exited.record.payment.as_ref().unwrap().amount, Decimal::new(150000, 0));
    assert!(exited.record.check_phase_consistency().is_ok());

    let history = workflow.history(id).await.unwrap();
    assert_eq!(history.len(), 6);
    assert_eq!(history.last().unwrap().to_status, DispatchStatus::Exited);

    // Terminal: ninguna acción más es aceptada
    let err = workflow
        .depart(id, DepartRequest::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::IllegalTransition { current: DispatchStatus::Exited, .. }));
}

#[tokio::test]
async fn test_depart_then_exit_records_single_hops() {
    let workflow = workflow();
    let id = workflow.enter(enter_request("v1"), None).await.unwrap().id;
    workflow.drop_passengers(id, drop(30), None).await.unwrap();
    workflow.issue_permit(id, approve("TO-1"), None).await.unwrap();
    workflow.pay(id, payment(150000), None).await.unwrap();
    workflow
        .order_departure(id, DepartureOrderRequest::default(), None)
        .await
        .unwrap();

    let departed = workflow
        .depart(
            id,
            DepartRequest {
                departure_time: Some("2024-12-18T10:15:00Z".to_string()),
                shift_id: Some("S1".to_string()),
            },
            Some("gate-2".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(departed.record.current_status, DispatchStatus::Departed);
    assert_eq!(departed.changes.len(), 1);
    assert!(departed.record.exit.is_none());

    let exited = workflow
        .exit(
            id,
            ExitRequest {
                exit_time: Some("2024-12-18T10:30:00Z".to_string()),
                shift_id: None,
            },
            Some("gate-2".to_string()),
        )
        .await
        .unwrap();
    assert_eq!(exited.record.current_status, DispatchStatus::Exited);
    assert_eq!(exited.changes.len(), 1);
    assert_eq!(exited.changes[0].from_status, DispatchStatus::Departed);

    let departure = exited.record.departure.as_ref().unwrap();
    assert_eq!(departure.at.to_rfc3339(), "2024-12-18T10:15:00+00:00");
    assert_eq!(departure.shift.as_deref(), Some("S1"));
    assert_eq!(departure.by.as_deref(), Some("gate-2"));
    assert!(exited.record.check_phase_consistency().is_ok());

    let history = workflow.history(id).await.unwrap();
    assert_eq!(history.len(), 6);
    assert_eq!(history[4].to_status, DispatchStatus::Departed);
    assert_eq!(history[5].to_status, DispatchStatus::Exited);
}

#[tokio::test]
async fn test_pay_before_permit_reports_allowed_next() {
    let workflow = workflow();
    let record = workflow.enter(enter_request("v1"), None).await.unwrap();
    workflow.drop_passengers(record.id, drop(30), None).await.unwrap();

    let err = workflow.pay(record.id, payment(1000), None).await.unwrap_err();
    match &err {
        DispatchError::IllegalTransition { current, target, allowed_next } => {
            assert_eq!(*current, DispatchStatus::PassengersDropped);
            assert_eq!(*target, DispatchStatus::Paid);
            assert_eq!(
                allowed_next,
                &vec![DispatchStatus::PermitIssued, DispatchStatus::PermitRejected]
            );
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(err.to_string().contains("boarding permit has not been issued"));
}

#[tokio::test]
async fn test_rejection_retry_path_keeps_audit() {
    let workflow = workflow();
    let id = workflow.enter(enter_request("v1"), None).await.unwrap().id;
    workflow.drop_passengers(id, drop(30), None).await.unwrap();

    let rejected = workflow
        .issue_permit(id, reject("expired insurance"), Some("inspector".to_string()))
        .await
        .unwrap();
    assert_eq!(rejected.record.current_status, DispatchStatus::PermitRejected);

    let retried = workflow.retry_after_rejection(id, None).await.unwrap();
    assert_eq!(retried.record.current_status, DispatchStatus::PassengersDropped);
    assert!(retried.record.boarding_permit.is_none());
    let audit = retried.record.last_rejection.clone().unwrap();
    assert_eq!(audit.reason.as_deref(), Some("expired insurance"));
    assert_eq!(audit.by.as_deref(), Some("inspector"));

    let second = workflow
        .issue_permit(id, reject("no fire extinguisher"), None)
        .await
        .unwrap();
    assert_eq!(
        second.record.last_rejection.unwrap().reason.as_deref(),
        Some("no fire extinguisher")
    );

    let reasons: Vec<_> = workflow
        .history(id)
        .await
        .unwrap()
        .into_iter()
        .filter(|change| change.to_status == DispatchStatus::PermitRejected)
        .map(|change| change.reason.unwrap_or_default())
        .collect();
    assert_eq!(reasons, vec!["expired insurance", "no fire extinguisher"]);
}

#[tokio::test]
async fn test_drop_passengers_after_rejection_is_a_retry() {
    let workflow = workflow();
    let id = workflow.enter(enter_request("v1"), None).await.unwrap().id;
    workflow.drop_passengers(id, drop(30), None).await.unwrap();
    workflow.issue_permit(id, reject("late"), None).await.unwrap();

    let outcome = workflow.drop_passengers(id, drop(26), None).await.unwrap();
    assert_eq!(outcome.record.current_status, DispatchStatus::PassengersDropped);
    assert_eq!(
        outcome.record.passenger_drop.unwrap().passengers_arrived,
        Some(26)
    );

    let approved = workflow.issue_permit(id, approve("TO-2"), None).await.unwrap();
    assert_eq!(approved.record.current_status, DispatchStatus::PermitIssued);
}

#[derive(Default)]
struct RecordingNotifier {
    seen: Mutex<Vec<StatusChange>>,
}

#[async_trait]
impl DispatchNotifier for RecordingNotifier {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, _record: &DispatchRecord, changes: &[StatusChange]) -> Result<(), CollaboratorError> {
        self.seen.lock().unwrap().extend_from_slice(changes);
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl DispatchNotifier for FailingNotifier {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn notify(&self, _record: &DispatchRecord, _changes: &[StatusChange]) -> Result<(), CollaboratorError> {
        Err(CollaboratorError::Invoice("billing is down".to_string()))
    }
}

#[tokio::test]
async fn test_failing_notifier_does_not_roll_back() {
    let recording = Arc::new(RecordingNotifier::default());
    let workflow = workflow()
        .with_notifier(Arc::new(FailingNotifier))
        .with_notifier(recording.clone());

    let id = workflow.enter(enter_request("v1"), None).await.unwrap().id;
    let outcome = workflow.drop_passengers(id, drop(30), None).await.unwrap();
    assert_eq!(outcome.record.current_status, DispatchStatus::PassengersDropped);

    let stored = workflow.find_by_id(id).await.unwrap();
    assert_eq!(stored.current_status, DispatchStatus::PassengersDropped);

    let seen = recording.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].from_status, DispatchStatus::Entered);
}

#[tokio::test]
async fn test_failed_transition_notifies_nobody() {
    let recording = Arc::new(RecordingNotifier::default());
    let workflow = workflow().with_notifier(recording.clone());
    let mut events = workflow.events().subscribe();

    let id = workflow.enter(enter_request("v1"), None).await.unwrap().id;
    assert!(workflow.pay(id, payment(10), None).await.is_err());

    assert!(recording.seen.lock().unwrap().is_empty());
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_event_bus_receives_every_hop() {
    let workflow = workflow();
    let mut events = workflow.events().subscribe();

    let id = workflow.enter(enter_request("v1"), None).await.unwrap().id;
    workflow.drop_passengers(id, drop(30), None).await.unwrap();
    workflow.issue_permit(id, approve("TO-1"), None).await.unwrap();
    workflow.pay(id, payment(5), None).await.unwrap();
    workflow
        .order_departure(id, DepartureOrderRequest::default(), None)
        .await
        .unwrap();
    workflow.exit(id, ExitRequest::default(), None).await.unwrap();

    let mut hops = Vec::new();
    while let Ok(change) = events.try_recv() {
        assert_eq!(change.dispatch_id, id);
        hops.push(change.to_status);
    }
    assert_eq!(
        hops,
        vec![
            DispatchStatus::PassengersDropped,
            DispatchStatus::PermitIssued,
            DispatchStatus::Paid,
            DispatchStatus::DepartureOrdered,
            DispatchStatus::Departed,
            DispatchStatus::Exited,
        ]
    );
}

struct BrokenFleet;

#[async_trait]
impl FleetLookup for BrokenFleet {
    async fn snapshot(
        &self,
        vehicle_id: &str,
        _driver_id: &str,
        _route_id: Option<&str>,
    ) -> Result<DisplaySnapshot, CollaboratorError> {
        Err(CollaboratorError::FleetLookup(format!("{} unavailable", vehicle_id)))
    }
}

#[tokio::test]
async fn test_enter_copies_fleet_snapshot() {
    let fleet = StaticFleetLookup::new()
        .with_vehicle(
            "v1",
            DisplaySnapshot {
                plate_number: Some("51B-123.45".to_string()),
                operator_id: Some("op-1".to_string()),
                operator_name: Some("Phuong Trang".to_string()),
                ..DisplaySnapshot::default()
            },
        )
        .with_driver("d1", "Tran Van B");
    let workflow = workflow().with_fleet(Arc::new(fleet));

    let record = workflow.enter(enter_request("v1"), None).await.unwrap();
    assert_eq!(record.snapshot.plate_number.as_deref(), Some("51B-123.45"));
    assert_eq!(record.snapshot.driver_name.as_deref(), Some("Tran Van B"));
    assert_eq!(record.snapshot.operator_id.as_deref(), Some("op-1"));
}

#[tokio::test]
async fn test_fleet_failure_still_registers_entry() {
    let workflow = workflow().with_fleet(Arc::new(BrokenFleet));

    let record = workflow.enter(enter_request("v1"), None).await.unwrap();
    assert_eq!(record.current_status, DispatchStatus::Entered);
    assert_eq!(record.snapshot, DisplaySnapshot::default());
}

#[tokio::test]
async fn test_enter_validation_errors() {
    let workflow = workflow();

    let missing = CreateDispatchRequest {
        vehicle_id: "v1".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        workflow.enter(missing, None).await,
        Err(DispatchError::Validation(_))
    ));

    let bad_time = CreateDispatchRequest {
        entry_time: Some("yesterday morning".to_string()),
        ..enter_request("v1")
    };
    assert!(matches!(
        workflow.enter(bad_time, None).await,
        Err(DispatchError::Validation(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_independent_dispatches_progress_concurrently() {
    let workflow = Arc::new(workflow());
    let mut ids = Vec::new();
    for n in 0..8 {
        ids.push(workflow.enter(enter_request(&format!("v{}", n)), None).await.unwrap().id);
    }

    let handles: Vec<_> = ids
        .iter()
        .map(|&id| {
            let workflow = workflow.clone();
            tokio::spawn(async move {
                workflow.drop_passengers(id, drop(10), None).await?;
                workflow.issue_permit(id, approve("TO"), None).await
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.record.current_status, DispatchStatus::PermitIssued);
    }
}
