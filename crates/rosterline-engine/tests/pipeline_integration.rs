//! End-to-end batch processing against the in-memory gateway and a real
//! sqlite identity store.

mod support;

use std::sync::Arc;

use rstest::rstest;

use rosterline_engine::{EngineConfig, Orchestrator};
use rosterline_state::{IdentityStore, SqliteIdentityStore};
use rosterline_types::error::ErrorKind;
use rosterline_types::op::EntityKind;
use rosterline_types::request::RawRequest;

use support::{
    add_users_to_class, create_class, create_org, create_school, create_user, FakeGateway,
};

fn orchestrator_with(gateway: Arc<FakeGateway>) -> (Orchestrator, Arc<SqliteIdentityStore>) {
    let store = Arc::new(SqliteIdentityStore::in_memory().unwrap());
    (
        Orchestrator::new(store.clone(), gateway, EngineConfig::default()),
        store,
    )
}

#[tokio::test]
async fn clean_batch_onboards_the_whole_hierarchy() {
    let gateway = FakeGateway::new();
    let (orchestrator, store) = orchestrator_with(gateway.clone());

    // Submitted out of order on purpose; execution order sorts it out.
    let batch = vec![
        create_class("r5", "class-1", "school-1"),
        create_school("r3", "school-1", "org-1"),
        create_school("r4", "school-2", "org-2"),
        create_org("r1", "org-1", "District East"),
        create_org("r2", "org-2", "District West"),
        create_user("r6", "user-1", "org-1"),
    ];
    let outcome = orchestrator.process_batch(batch).await;

    assert_eq!(outcome.responses.len(), 6);
    assert_eq!(outcome.succeeded(), 6);
    // Creations ran in parent-first order.
    let order: Vec<EntityKind> = gateway.create_calls().iter().map(|(k, _)| *k).collect();
    assert_eq!(
        order,
        vec![
            EntityKind::Organization,
            EntityKind::School,
            EntityKind::Class,
            EntityKind::User
        ]
    );
    // Each kind went out in a single bulk call.
    assert_eq!(gateway.create_calls()[0].1, 2);
    // Mappings are queryable afterwards.
    assert!(store
        .lookup(EntityKind::Class, "class-1")
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn same_batch_references_resolve_through_creation_order() {
    let gateway = FakeGateway::new();
    let (orchestrator, _) = orchestrator_with(gateway);

    let batch = vec![
        add_users_to_class("r4", "class-1", &["user-1"]),
        create_user("r3", "user-1", "org-1"),
        create_class("r2", "class-1", "school-1"),
        create_school("r1b", "school-1", "org-1"),
        create_org("r1", "org-1", "District"),
    ];
    let outcome = orchestrator.process_batch(batch).await;

    assert_eq!(outcome.responses.len(), 5);
    assert_eq!(outcome.succeeded(), 5, "verdicts: {:?}", outcome.responses);
}

#[tokio::test]
async fn duplicate_link_settles_as_already_exists_with_one_retry() {
    let gateway = FakeGateway::new();
    let (orchestrator, store) = orchestrator_with(gateway.clone());

    // Onboard the hierarchy first.
    orchestrator
        .process_batch(vec![
            create_org("r1", "org-1", "District"),
            create_school("r2", "school-1", "org-1"),
            create_class("r3", "class-1", "school-1"),
            create_user("r4", "user-1", "org-1"),
            create_user("r5", "user-2", "org-1"),
        ])
        .await;
    let class_internal = store.lookup(EntityKind::Class, "class-1").unwrap().unwrap();
    let user1_internal = store.lookup(EntityKind::User, "user-1").unwrap().unwrap();
    gateway.seed_linked(&class_internal, &user1_internal);

    let link_calls_before = gateway.link_calls().len();
    let outcome = orchestrator
        .process_batch(vec![add_users_to_class("r6", "class-1", &["user-1", "user-2"])])
        .await;

    assert_eq!(outcome.responses.len(), 2);
    let conflict = outcome.responses.iter().find(|r| !r.success).unwrap();
    assert_eq!(conflict.error_kind(), Some(ErrorKind::AlreadyExists));
    assert_eq!(conflict.entity_id, "user-1");
    let success = outcome.responses.iter().find(|r| r.success).unwrap();
    assert_eq!(success.correlation.id, "r6");
    // One write plus exactly one clean-subset retry.
    assert_eq!(gateway.link_calls().len() - link_calls_before, 2);
}

#[tokio::test]
async fn every_submitted_item_gets_exactly_one_verdict() {
    let gateway = FakeGateway::new();
    let (orchestrator, _) = orchestrator_with(gateway);

    let empty = RawRequest {
        request_id: "r9".into(),
        ..RawRequest::default()
    };
    let batch = vec![
        create_org("r1", "org-1", "District"),
        create_school("r2", "school-1", "org-ghost"),
        add_users_to_class("r3", "class-ghost", &["u-a", "u-b", "u-c"]),
        empty,
    ];
    let outcome = orchestrator.process_batch(batch).await;

    // r1 succeeds, r2 fails (parent not found), r3 fans out to three
    // child verdicts, r9 is unclassifiable.
    assert_eq!(outcome.responses.len(), 6);
    assert_eq!(outcome.succeeded(), 1);
    let r3_count = outcome
        .responses
        .iter()
        .filter(|r| r.correlation.id == "r3")
        .count();
    assert_eq!(r3_count, 3);
}

#[tokio::test]
async fn resubmitting_a_create_reports_already_exists() {
    let gateway = FakeGateway::new();
    let (orchestrator, _) = orchestrator_with(gateway.clone());

    orchestrator
        .process_batch(vec![create_org("r1", "org-1", "District")])
        .await;
    let outcome = orchestrator
        .process_batch(vec![create_org("r2", "org-1", "District")])
        .await;

    assert_eq!(outcome.responses.len(), 1);
    assert_eq!(
        outcome.responses[0].error_kind(),
        Some(ErrorKind::AlreadyExists)
    );
    // The duplicate was settled locally, no second remote call.
    assert_eq!(gateway.create_calls().len(), 1);
}

#[tokio::test]
async fn remotely_known_entity_recovers_the_local_mapping() {
    let gateway = FakeGateway::new();
    gateway.seed_existing(EntityKind::Organization, "org-1", "organization_77");
    let (orchestrator, store) = orchestrator_with(gateway);

    let outcome = orchestrator
        .process_batch(vec![create_org("r1", "org-1", "District")])
        .await;

    // The caller is told the entity already exists, but the mapping is
    // now queryable locally for later references.
    assert_eq!(
        outcome.responses[0].error_kind(),
        Some(ErrorKind::AlreadyExists)
    );
    assert_eq!(
        store.lookup(EntityKind::Organization, "org-1").unwrap(),
        Some("organization_77".into())
    );
}

#[rstest]
#[case::empty_name(create_org("r1", "org-1", ""), ErrorKind::Validation)]
#[case::blank_name(create_org("r1", "org-1", "   "), ErrorKind::Validation)]
#[case::dangling_parent(create_school("r1", "school-1", "org-ghost"), ErrorKind::NotFound)]
#[tokio::test]
async fn invalid_items_settle_with_the_expected_kind(
    #[case] request: RawRequest,
    #[case] expected: ErrorKind,
) {
    let gateway = FakeGateway::new();
    let (orchestrator, _) = orchestrator_with(gateway);

    let outcome = orchestrator.process_batch(vec![request]).await;
    assert_eq!(outcome.responses.len(), 1);
    assert_eq!(outcome.responses[0].error_kind(), Some(expected));
}

#[tokio::test]
async fn mappings_survive_reopening_the_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("identity.db");

    let gateway = FakeGateway::new();
    {
        let store = Arc::new(SqliteIdentityStore::open(&path).unwrap());
        let orchestrator = Orchestrator::new(store, gateway.clone(), EngineConfig::default());
        let outcome = orchestrator
            .process_batch(vec![create_org("r1", "org-1", "District")])
            .await;
        assert_eq!(outcome.succeeded(), 1);
    }

    // A later run against the same database sees the earlier onboarding.
    let store = Arc::new(SqliteIdentityStore::open(&path).unwrap());
    let orchestrator = Orchestrator::new(store, gateway, EngineConfig::default());
    let outcome = orchestrator
        .process_batch(vec![create_school("r2", "school-1", "org-1")])
        .await;
    assert_eq!(outcome.succeeded(), 1);
}
