mod common;

use authledger_store::{DataProvider, DataTracker, Setup, StoreError, VersionedStore};
use chrono::Duration;
use common::{at, connections, count, event, file_pool, reject_inserts, renamed_sp};

const SP: &str = "https://sp.example.org";
const OTHER_SP: &str = "https://other-sp.example.org";
const USER: &str = "ab12cd34@example.org";

fn setup_store(dir: &tempfile::TempDir) -> VersionedStore {
    let store = VersionedStore::new(connections(dir));
    store.run_setup().expect("setup should succeed");
    store
}

#[test]
fn setup_is_needed_once() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = VersionedStore::new(connections(&dir));

    assert!(store.needs_setup().expect("should check setup"));
    store.run_setup().expect("setup should succeed");
    assert!(!store.needs_setup().expect("should check setup"));

    // Running again only warns.
    store.run_setup().expect("repeated setup should succeed");
    assert!(!store.needs_setup().expect("should check setup"));
}

#[test]
fn identical_events_share_versions_but_not_facts() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = setup_store(&dir);
    let conns = connections(&dir);

    store.persist(&event(SP, USER, at(0))).expect("persist should succeed");

    assert_eq!(count(&conns, "vds_idp_version"), 1);
    assert_eq!(count(&conns, "vds_sp_version"), 1);
    assert_eq!(count(&conns, "vds_user_version"), 1);
    assert_eq!(count(&conns, "vds_authentication_event"), 1);

    store.persist(&event(SP, USER, at(0))).expect("persist should succeed");

    assert_eq!(count(&conns, "vds_idp_version"), 1);
    assert_eq!(count(&conns, "vds_sp_version"), 1);
    assert_eq!(count(&conns, "vds_user_version"), 1);
    assert_eq!(count(&conns, "vds_idp_sp_user_version"), 1);
    assert_eq!(count(&conns, "vds_authentication_event"), 2);
}

#[test]
fn changed_metadata_adds_a_version() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = setup_store(&dir);
    let conns = connections(&dir);

    store.persist(&event(SP, USER, at(0))).expect("persist should succeed");
    store
        .persist(&renamed_sp(event(SP, USER, at(10)), "Renamed SP"))
        .expect("persist should succeed");

    assert_eq!(count(&conns, "vds_sp"), 1);
    assert_eq!(count(&conns, "vds_sp_version"), 2);
    assert_eq!(count(&conns, "vds_idp_version"), 1);
    assert_eq!(count(&conns, "vds_idp_sp_user_version"), 2);
}

#[test]
fn activity_of_unknown_user_is_empty() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = setup_store(&dir);

    let activity = store
        .get_activity(USER, 10, 0)
        .expect("empty activity is not an error");
    assert!(activity.is_empty());
}

#[test]
fn activity_is_newest_first_and_paginated() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = setup_store(&dir);

    for offset in [20, 0, 10] {
        store
            .persist(&event(SP, USER, at(offset)))
            .expect("persist should succeed");
    }
    store
        .persist(&event(SP, "someone-else", at(30)))
        .expect("persist should succeed");

    let first_page = store.get_activity(USER, 2, 0).expect("should read");
    let times: Vec<_> = first_page.all().iter().map(|a| a.happened_at).collect();
    assert_eq!(times, vec![at(20), at(10)]);

    let second_page = store.get_activity(USER, 2, 2).expect("should read");
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page.all()[0].happened_at, at(0));
    assert_eq!(
        second_page.all()[0].client_ip_address.as_deref(),
        Some("192.0.2.10")
    );
}

#[test]
fn connected_services_aggregate_per_service_provider() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = setup_store(&dir);

    store.persist(&event(SP, USER, at(0))).expect("persist should succeed");
    store
        .persist(&renamed_sp(event(SP, USER, at(50)), "Renamed SP"))
        .expect("persist should succeed");
    store.persist(&event(SP, USER, at(20))).expect("persist should succeed");
    store
        .persist(&event(OTHER_SP, USER, at(5)))
        .expect("persist should succeed");

    let services = store
        .get_connected_service_providers(USER)
        .expect("should read");
    assert_eq!(services.len(), 2);

    let sp = services.get(SP).expect("sp should be connected");
    assert_eq!(sp.number_of_authentications, 3);
    assert_eq!(sp.first_authentication_at, at(0));
    assert_eq!(sp.last_authentication_at, at(50));
    assert_eq!(sp.service_provider.name("en"), "Renamed SP");
    assert_eq!(sp.user.identifier, USER);

    let other = services.get(OTHER_SP).expect("other sp should be connected");
    assert_eq!(other.number_of_authentications, 1);
}

#[test]
fn retention_deletes_strictly_older_facts_only() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = setup_store(&dir);
    let conns = connections(&dir);

    for offset in [0, 10, 20] {
        store
            .persist(&event(SP, USER, at(offset)))
            .expect("persist should succeed");
    }

    let deleted = store
        .delete_data_older_than(at(10))
        .expect("delete should succeed");

    assert_eq!(deleted, 1);
    assert_eq!(count(&conns, "vds_authentication_event"), 2);
    assert_eq!(count(&conns, "vds_sp_version"), 1);

    let remaining: Vec<_> = store
        .get_activity(USER, 10, 0)
        .expect("should read")
        .into_iter()
        .map(|a| a.happened_at)
        .collect();
    assert_eq!(remaining, vec![at(20), at(10)]);
}

#[test]
fn failed_fact_insert_rolls_back_dimension_rows() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = setup_store(&dir);
    let conns = connections(&dir);
    reject_inserts(&conns, "vds_authentication_event");

    let result = store.persist(&event(SP, USER, at(0)));
    assert!(matches!(result, Err(StoreError::Database(_))));

    for table in [
        "vds_idp",
        "vds_idp_version",
        "vds_sp",
        "vds_sp_version",
        "vds_user",
        "vds_user_version",
        "vds_idp_sp_user_version",
        "vds_authentication_event",
    ] {
        assert_eq!(count(&conns, table), 0, "{table} should be empty");
    }
}

#[test]
fn oversized_retention_period_is_an_error() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = setup_store(&dir);

    let result = store.enforce_data_retention_policy(Duration::days(100_000_000));
    assert!(matches!(result, Err(StoreError::RetentionOutOfRange { .. })));
}

#[test]
fn missing_schema_surfaces_as_store_error() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = VersionedStore::new(connections(&dir));

    let err = store
        .persist(&event(SP, USER, at(0)))
        .expect_err("persist without setup should fail");
    assert!(matches!(err, StoreError::Database(_)));
}

#[test]
fn reads_use_the_slave_pool() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let master = file_pool(&dir, "master.db");
    let slave = file_pool(&dir, "slave.db");

    // The replica has the schema but has not caught up yet.
    VersionedStore::new(authledger_db::Connections::new(slave.clone()))
        .run_setup()
        .expect("slave setup should succeed");

    let store = VersionedStore::new(authledger_db::Connections::with_slave(master, slave));
    store.run_setup().expect("master setup should succeed");
    store.persist(&event(SP, USER, at(0))).expect("persist should succeed");

    assert!(store.get_activity(USER, 10, 0).expect("should read").is_empty());
    assert!(store
        .get_connected_service_providers(USER)
        .expect("should read")
        .is_empty());
}

#[test]
fn works_through_trait_objects() {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let store = std::sync::Arc::new(setup_store(&dir));
    let tracker: std::sync::Arc<dyn DataTracker> = store.clone();
    let provider: std::sync::Arc<dyn DataProvider> = store;

    tracker
        .process(&event(SP, USER, chrono::Utc::now()))
        .expect("process should succeed");
    assert_eq!(provider.get_activity(USER, 10, 0).expect("should read").len(), 1);

    let deleted = tracker
        .enforce_data_retention_policy(chrono::Duration::days(1))
        .expect("retention should succeed");
    assert_eq!(deleted, 0);
}
