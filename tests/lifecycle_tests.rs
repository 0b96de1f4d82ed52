mod common;

use common::{amount, drive, engine, intake, owner, staff};
use proptest::prelude::*;
use repair_orders::domain::event::{EventKind, Transition};
use repair_orders::domain::order::{Priority, Status};
use repair_orders::domain::principal::Actor;
use repair_orders::error::{EngineError, ErrorKind};
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_happy_path_records_five_events() {
    let engine = engine();
    let order = engine
        .create_order(intake().labor_cost(amount(dec!(95))), &staff())
        .await
        .unwrap();
    let id = order.order_id;
    assert_eq!(order.status, Status::Pending);

    let done = drive(
        &engine,
        id,
        &[
            (Transition::Start, &staff()),
            (Transition::RequestApproval, &staff()),
            (Transition::Approve, &owner()),
            (Transition::Complete, &staff()),
        ],
    )
    .await;
    assert_eq!(done.status, Status::Completed);
    assert!(done.approved);

    let view = engine.track_order(id, &owner()).await.unwrap();
    let steps: Vec<(Option<Status>, Status)> = view
        .events
        .iter()
        .map(|e| (e.from_status, e.to_status))
        .collect();
    assert_eq!(
        steps,
        vec![
            (None, Status::Pending),
            (Some(Status::Pending), Status::InProgress),
            (Some(Status::InProgress), Status::PendingApproval),
            (Some(Status::PendingApproval), Status::Approved),
            (Some(Status::Approved), Status::Completed),
        ]
    );
    let sequences: Vec<u64> = view.events.iter().map(|e| e.sequence).collect();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
}

#[tokio::test]
async fn test_complete_on_pending_is_invalid() {
    let engine = engine();
    let id = engine.create_order(intake(), &staff()).await.unwrap().order_id;

    let err = engine
        .apply_transition(id, Transition::Complete, &staff(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let view = engine.track_order(id, &staff()).await.unwrap();
    assert_eq!(view.order.status, Status::Pending);
    assert!(!view.order.approved);
    assert_eq!(view.events.len(), 1);
}

#[tokio::test]
async fn test_rejection_returns_to_work_and_can_be_requoted() {
    let engine = engine();
    let id = engine
        .create_order(intake().labor_cost(amount(dec!(60))), &staff())
        .await
        .unwrap()
        .order_id;

    let order = drive(
        &engine,
        id,
        &[
            (Transition::Start, &staff()),
            (Transition::RequestApproval, &staff()),
            (Transition::Reject, &owner()),
        ],
    )
    .await;
    assert_eq!(order.status, Status::InProgress);
    assert!(!order.approved);

    let again = drive(
        &engine,
        id,
        &[
            (Transition::RequestApproval, &staff()),
            (Transition::Approve, &owner()),
        ],
    )
    .await;
    assert_eq!(again.status, Status::Approved);
    assert_eq!(again.charge, order.charge);
}

#[tokio::test]
async fn test_cancelled_order_is_final() {
    let engine = engine();
    let id = engine.create_order(intake(), &staff()).await.unwrap().order_id;
    engine
        .apply_transition(id, Transition::Cancel, &owner(), Some("changed my mind".into()))
        .await
        .unwrap();

    for transition in Transition::ALL {
        let actor = match transition {
            Transition::Approve | Transition::Reject | Transition::Cancel => owner(),
            _ => staff(),
        };
        let result = engine.apply_transition(id, transition, &actor, None).await;
        assert!(matches!(result, Err(EngineError::InvalidTransition(_))), "{transition}");
    }
    let priority = engine.set_priority(id, Priority::Urgent, &staff()).await;
    assert!(matches!(priority, Err(EngineError::InvalidTransition(_))));
}

#[tokio::test]
async fn test_priority_and_prepayment_are_audited() {
    let engine = engine();
    let id = engine.create_order(intake(), &staff()).await.unwrap().order_id;

    let order = engine.set_priority(id, Priority::Urgent, &staff()).await.unwrap();
    assert_eq!(order.priority, Priority::Urgent);
    assert_eq!(order.status, Status::Pending);

    engine.record_prepayment(id, &staff()).await.unwrap();
    let twice = engine.record_prepayment(id, &staff()).await;
    assert!(matches!(twice, Err(EngineError::InvalidTransition(_))));

    let forbidden = engine.set_priority(id, Priority::Low, &owner()).await;
    assert!(matches!(forbidden, Err(EngineError::Forbidden(_))));

    let view = engine.track_order(id, &staff()).await.unwrap();
    assert_eq!(view.events.len(), 3);
    assert!(matches!(
        view.events[1].kind,
        EventKind::PriorityChanged {
            from: Priority::Normal,
            to: Priority::Urgent
        }
    ));
    assert!(view.events.iter().skip(1).all(|e| !e.changes_status()));
}

#[tokio::test]
async fn test_validation_errors() {
    let engine = engine();
    let mut blank = intake();
    blank.equipment_id = "  ".to_string();
    let result = engine.create_order(blank, &staff()).await;
    assert!(matches!(result, Err(EngineError::Validation(_))));
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Transition(Transition, bool),
    Prepay,
    Bump(Priority),
}

fn any_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (prop::sample::select(Transition::ALL.to_vec()), any::<bool>())
            .prop_map(|(t, as_client)| Step::Transition(t, as_client)),
        1 => Just(Step::Prepay),
        1 => prop::sample::select(vec![Priority::Low, Priority::High, Priority::Urgent]).prop_map(Step::Bump),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn prop_rebuild_matches_stored_order(steps in prop::collection::vec(any_step(), 0..16)) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let engine = engine();
            let id = engine
                .create_order(intake().labor_cost(amount(dec!(30))), &staff())
                .await
                .unwrap()
                .order_id;
            let mut successes = 1usize;

            for step in steps {
                let before = engine.track_order(id, &staff()).await.unwrap().order;
                let result = match step {
                    Step::Transition(transition, as_client) => {
                        let actor: Actor = if as_client { owner() } else { staff() };
                        engine.apply_transition(id, transition, &actor, None).await
                    }
                    Step::Prepay => engine.record_prepayment(id, &staff()).await,
                    Step::Bump(priority) => engine.set_priority(id, priority, &staff()).await,
                };
                let after = engine.track_order(id, &staff()).await.unwrap();
                match result {
                    Ok(order) => {
                        successes += 1;
                        prop_assert_eq!(&order, &after.order);
                    }
                    Err(_) => {
                        prop_assert_eq!(&before, &after.order);
                    }
                }
                prop_assert_eq!(after.events.len(), successes);
                prop_assert_eq!(engine.rebuild_order(id).await.unwrap(), Some(after.order));
            }
            Ok(())
        })?;
    }
}
