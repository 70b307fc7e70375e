//! Integration tests: dependency mutations and trigger queries against the
//! `web_store.jsonl` snapshot in tests/fixtures/.
//!
//! The snapshot holds one template (100) with P=50 depending on Q=51, the
//! host web01 inheriting both (P'=60, Q'=61) plus five plain triggers of
//! severities 1..=5, and db01 with one disaster trigger.

use std::collections::BTreeSet;
use std::path::PathBuf;
use trigmap_kernel::{
    ApiError, DependencyError, FrontendConfig, Principal, RenderContext, Severity, UserType,
};
use trigmap_store::MemoryStore;
use trigmap_triggers::{
    DependencyRequest, SortField, SortOrder, TriggerQuery, add_dependencies, delete_dependencies,
    filter_by_skip_dependent, get_triggers, sync_template_dependencies,
};

const NOW: i64 = 1_700_000_000;

fn fixture_store() -> MemoryStore {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/web_store.jsonl");
    MemoryStore::load_jsonl(&path)
        .unwrap_or_else(|e| panic!("failed to load {}: {e}", path.display()))
}

fn ctx() -> RenderContext {
    RenderContext::new(FrontendConfig::default(), NOW)
}

#[test]
fn sync_propagates_template_dependency_to_host() {
    let mut store = fixture_store();
    assert!(!store.has_dependency(60, 61));

    let change = sync_template_dependencies(&mut store, &BTreeSet::from([100]), None)
        .expect("sync should succeed");

    assert!(store.has_dependency(60, 61));
    assert!(store.has_dependency(50, 51));
    assert_eq!(change.triggerids, vec![60, 61]);

    let again = sync_template_dependencies(&mut store, &BTreeSet::from([100]), None)
        .expect("second sync should succeed");
    assert_eq!(again.deleted, 1);
    assert_eq!(again.inserted.len(), 1);
    assert!(store.has_dependency(60, 61));
}

#[test]
fn sync_restricted_to_other_hosts_touches_nothing() {
    let mut store = fixture_store();
    let hosts = BTreeSet::from([20]);
    let change = sync_template_dependencies(&mut store, &BTreeSet::from([100]), Some(&hosts))
        .expect("sync should succeed");
    assert_eq!(change.deleted, 0);
    assert!(change.inserted.is_empty());
    assert!(!store.has_dependency(60, 61));
}

#[test]
fn cycle_through_persisted_and_propagated_edges_is_rejected() {
    let mut store = fixture_store();
    let admin = Principal::super_admin();

    let err = add_dependencies(&mut store, &admin, &[DependencyRequest::new(51, 50)])
        .expect_err("51 -> 50 closes a cycle with 50 -> 51");
    assert!(matches!(err, ApiError::Dependency(DependencyError::Circular)));

    add_dependencies(&mut store, &admin, &[DependencyRequest::new(1, 2)])
        .expect("plain host dependency should add");
    add_dependencies(&mut store, &admin, &[DependencyRequest::new(2, 3)])
        .expect("plain host dependency should add");
    let err = add_dependencies(&mut store, &admin, &[DependencyRequest::new(3, 1)])
        .expect_err("third edge closes a cycle");
    assert!(matches!(err, ApiError::Dependency(DependencyError::Circular)));
    assert_eq!(store.dependency_edges().count(), 3);
}

#[test]
fn transaction_keeps_store_untouched_on_rejection() {
    let mut store = fixture_store();
    let admin = Principal::super_admin();
    let before: Vec<_> = store.dependency_edges().copied().collect();

    let result = store.transaction(|staged| {
        add_dependencies(staged, &admin, &[DependencyRequest::new(4, 5)])?;
        add_dependencies(staged, &admin, &[DependencyRequest::new(4, 4)])
    });
    assert!(matches!(
        result,
        Err(ApiError::Dependency(DependencyError::SelfDependency))
    ));
    let after: Vec<_> = store.dependency_edges().copied().collect();
    assert_eq!(before, after);
}

#[test]
fn read_only_operator_cannot_mutate_dependencies() {
    let mut store = fixture_store();
    let operator = Principal::new(7, UserType::User);

    let err = add_dependencies(&mut store, &operator, &[DependencyRequest::new(1, 2)])
        .expect_err("read-only host must not be editable");
    assert!(matches!(err, ApiError::NoPermission));
    let err = delete_dependencies(&mut store, &operator, &[1])
        .expect_err("read-only host must not be editable");
    assert!(matches!(err, ApiError::NoPermission));
}

#[test]
fn severity_and_host_query_returns_three_sorted_triggers() {
    let store = fixture_store();
    let query = TriggerQuery {
        host: Some("web01".to_string()),
        min_severity: Some(Severity::Average),
        sortfield: vec![SortField::Priority],
        sortorder: SortOrder::Asc,
        ..TriggerQuery::default()
    };

    let set = get_triggers(&store, &Principal::super_admin(), &ctx(), &query)
        .expect("query should succeed");
    assert_eq!(set.ids(), vec![3, 4, 5]);
    let priorities: Vec<Severity> = set.triggers.iter().map(|v| v.trigger.priority).collect();
    assert_eq!(
        priorities,
        vec![Severity::Average, Severity::High, Severity::Disaster]
    );
}

#[test]
fn operator_query_expands_descriptions_and_expressions() {
    let store = fixture_store();
    let query = TriggerQuery {
        triggerids: Some(vec![1, 3, 6]),
        expand_description: true,
        expand_expression: true,
        select_functions: true,
        ..TriggerQuery::default()
    };

    let set = get_triggers(&store, &Principal::new(7, UserType::User), &ctx(), &query)
        .expect("query should succeed");
    assert_eq!(set.ids(), vec![1, 3]);
    let load = set.get(1).expect("trigger 1 should be visible");
    assert_eq!(load.trigger.description, "Load 0.42 on web01");
    let traffic = set.get(3).expect("trigger 3 should be visible");
    assert_eq!(traffic.trigger.expression, "{web01:net.if.in[eth0].avg(5m)}>100M");
    assert_eq!(traffic.trigger.functions.len(), 1);
}

#[test]
fn skip_dependent_is_idempotent_on_fixture() {
    let mut store = fixture_store();
    add_dependencies(
        &mut store,
        &Principal::super_admin(),
        &[DependencyRequest::new(5, 4), DependencyRequest::new(3, 5)],
    )
    .expect("dependencies should add");

    let all = store.triggers().cloned().collect();
    let once = filter_by_skip_dependent(&store, all).expect("filter should run");
    let twice = filter_by_skip_dependent(&store, once.clone()).expect("filter should run");
    assert_eq!(once, twice);

    let kept: Vec<u64> = once.iter().map(|t| t.triggerid).collect();
    assert!(!kept.contains(&5));
    assert!(!kept.contains(&3));
    assert!(kept.contains(&4));
}
