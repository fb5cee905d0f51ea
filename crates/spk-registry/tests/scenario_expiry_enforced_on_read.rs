use std::sync::Arc;

use spk_db::{MemStore, SpaceStore};
use spk_engine::{EngineConfig, EngineError};
use spk_registry::{RegistryError, SpaceRegistry};
use spk_schemas::{FinalStatus, SensorStatus};

fn registry() -> (SpaceRegistry, Arc<MemStore>) {
    let store = Arc::new(MemStore::new());
    (
        SpaceRegistry::in_memory(store.clone(), EngineConfig::default()),
        store,
    )
}

#[tokio::test]
async fn scenario_stale_token_after_expiry_is_not_found() {
    let (reg, _store) = registry();
    reg.get_or_create("A1", 1_000).await.unwrap();
    let token = reg.reserve("A1", true, 1_000).await.unwrap().qr_token.unwrap();

    let err = reg.check_in("A1", &token, 1_030).await.unwrap_err();
    assert!(
        matches!(err, RegistryError::Engine(EngineError::NotFound)),
        "got {err}"
    );
}

#[tokio::test]
async fn scenario_snapshot_persists_expiry() {
    let (reg, store) = registry();
    reg.get_or_create("A1", 1_000).await.unwrap();
    reg.get_or_create("A2", 1_000).await.unwrap();
    reg.reserve("A1", true, 1_000).await.unwrap();
    reg.update_sensor("A1", SensorStatus::Occupied, 12.0, 1_005)
        .await
        .unwrap();

    let before = reg.status_snapshot(1_010).await.unwrap();
    assert_eq!(before["A1"].final_status, FinalStatus::Violation);
    assert!(before["A1"].violation);
    assert_eq!(before["A2"].final_status, FinalStatus::Free);

    let after = reg.status_snapshot(1_030).await.unwrap();
    assert_eq!(after["A1"].final_status, FinalStatus::Occupied);
    assert!(!after["A1"].violation);
    assert_eq!(after["A1"].qr_token, None);

    let stored = store.get("A1").await.unwrap().unwrap();
    assert!(!stored.reserved);
    assert_eq!(stored.reservation_expiry, None);
    assert_eq!(stored.version, after["A1"].version);
    assert_eq!(stored.last_update, 1_030);

    // A second read finds nothing left to expire.
    let again = reg.status_snapshot(1_031).await.unwrap();
    assert_eq!(again["A1"].version, after["A1"].version);
}

#[tokio::test]
async fn scenario_unknown_node_is_rejected_outside_sensor_path() {
    let (reg, _store) = registry();

    for err in [
        reg.reserve("Z9", true, 0).await.unwrap_err(),
        reg.check_in("Z9", "tok", 0).await.unwrap_err(),
        reg.set_maintenance("Z9", 0).await.unwrap_err(),
        reg.resume("Z9", 0).await.unwrap_err(),
    ] {
        assert!(matches!(err, RegistryError::UnknownNode(ref id) if id == "Z9"));
    }
    assert!(matches!(
        reg.space("Z9", 0).await.unwrap_err(),
        RegistryError::UnknownNode(_)
    ));

    // The sensor path creates the record.
    let ack = reg
        .update_sensor("Z9", SensorStatus::Occupied, 5.0, 0)
        .await
        .unwrap();
    assert_eq!(ack.view.version, 1);
    assert_eq!(ack.view.final_status, FinalStatus::Occupied);
}

#[tokio::test]
async fn scenario_maintenance_blocks_reservation_until_resume() {
    let (reg, _store) = registry();
    reg.get_or_create("M1", 0).await.unwrap();
    reg.reserve("M1", true, 1).await.unwrap();

    let ack = reg.set_maintenance("M1", 2).await.unwrap();
    assert_eq!(ack.view.final_status, FinalStatus::Maintenance);
    assert!(!ack.view.reserved);

    let err = reg.reserve("M1", true, 3).await.unwrap_err();
    assert!(matches!(
        err,
        RegistryError::Engine(EngineError::PreconditionFailed)
    ));

    let ack = reg.resume("M1", 4).await.unwrap();
    assert_eq!(ack.view.final_status, FinalStatus::Free);
    reg.reserve("M1", true, 5).await.unwrap();
}

#[tokio::test]
async fn scenario_seed_leaves_existing_records_alone() {
    let (reg, store) = registry();
    reg.update_sensor("A1", SensorStatus::Occupied, 9.0, 10)
        .await
        .unwrap();

    let ids = vec!["A1".to_string(), "A2".to_string(), "A3".to_string()];
    assert_eq!(reg.seed(&ids, 20).await.unwrap(), 2);
    assert_eq!(reg.seed(&ids, 30).await.unwrap(), 0);

    let a1 = store.get("A1").await.unwrap().unwrap();
    assert_eq!(a1.sensor_status, SensorStatus::Occupied);
    assert_eq!(a1.last_update, 10);
    assert_eq!(store.scan().await.unwrap().len(), 3);
}
