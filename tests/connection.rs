mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{FakeDatabase, FakeDriver};
use replica_link::config::Settings;
use replica_link::{Connection, DbError, OperationKind, ReadTarget};

async fn connect(driver: &FakeDriver, uri: &str) -> Connection<FakeDriver> {
    Connection::connect(driver.clone(), &Settings::default().with_uri(uri))
        .await
        .expect("connection should come up")
}

#[tokio::test]
async fn test_standalone_survives_missing_secondary() {
    let driver = FakeDriver::new();
    driver.set_secondary_down(true);

    let conn = connect(&driver, "mongodb://localhost:27017/testdb").await;

    assert_eq!(conn.db_name(), "testdb");
    assert!(!conn.replica_set());
    assert!(conn.is_connected());
    assert_eq!(driver.pings(), vec![ReadTarget::Primary, ReadTarget::Secondary]);

    let settings = driver.last_settings().unwrap();
    assert!(!settings.secondary_preferred);
    assert_eq!(settings.app_name, "replica-link");
}

#[tokio::test]
async fn test_replica_set_uri_sets_secondary_bias() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://h1:27017,h2:27017/orders?replicaSet=rs0").await;

    assert!(conn.replica_set());
    assert_eq!(conn.db_name(), "orders");
    assert!(driver.last_settings().unwrap().secondary_preferred);
}

#[tokio::test]
async fn test_auth_source_is_fallback_database() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://localhost:27017/?authSource=admin").await;
    assert_eq!(conn.db_name(), "admin");
}

#[tokio::test]
async fn test_rejects_uri_without_database() {
    let driver = FakeDriver::new();
    let result =
        Connection::connect(driver.clone(), &Settings::default().with_uri("mongodb://localhost:27017")).await;

    assert!(matches!(result, Err(DbError::Config(_))));
    assert_eq!(driver.connects(), 0);
}

#[tokio::test]
async fn test_survives_missing_primary() {
    let driver = FakeDriver::new();
    driver.set_primary_down(true);
    let conn = connect(&driver, "mongodb://h1,h2/app?replicaSet=rs0").await;
    assert!(conn.is_connected());
}

#[tokio::test]
async fn test_fails_when_both_roles_unreachable() {
    let driver = FakeDriver::new();
    driver.set_primary_down(true);
    driver.set_secondary_down(true);

    let result = Connection::connect(driver.clone(), &Settings::default()).await;

    match result {
        Err(DbError::Connectivity { primary, secondary }) => {
            assert_eq!(primary, "no primary available");
            assert_eq!(secondary, "no secondary available");
        }
        Err(other) => panic!("expected connectivity error, got {other}"),
        Ok(_) => panic!("expected connectivity error, got a connection"),
    }
    assert_eq!(driver.disconnects(), 1);
}

#[tokio::test]
async fn test_connect_error_is_surfaced() {
    let driver = FakeDriver::new();
    driver.set_refuse_connect(true);
    let result = Connection::connect(driver, &Settings::default()).await;
    assert!(matches!(result, Err(DbError::Operation(_))));
}

#[tokio::test]
async fn test_read_served_by_secondary() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://h1,h2/app?replicaSet=rs0").await;

    let db = conn.read(|db| async move { Ok(db) }).await.unwrap();
    assert_eq!(
        db,
        FakeDatabase {
            name: "app".to_string(),
            target: None,
            session_id: 1,
        }
    );

    let metrics = conn.metrics();
    let secondary = metrics.operation(OperationKind::ReadSecondary).unwrap();
    assert_eq!((secondary.read_count, secondary.read_failed), (1, 0));
    assert_eq!(metrics.operation(OperationKind::ReadPrimary), None);
}

#[tokio::test]
async fn test_read_falls_back_when_secondary_ping_fails() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://h1,h2/app?replicaSet=rs0").await;
    driver.set_secondary_down(true);

    let calls = AtomicUsize::new(0);
    let db = conn
        .read(|db| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(db) }
        })
        .await
        .unwrap();

    assert_eq!(db.target, Some(ReadTarget::Primary));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let metrics = conn.metrics();
    let secondary = metrics.operation(OperationKind::ReadSecondary).unwrap();
    assert_eq!((secondary.read_count, secondary.read_failed), (1, 1));
    assert_eq!(secondary.last_issue.as_deref(), Some("no secondary available"));
    let primary = metrics.operation(OperationKind::ReadPrimary).unwrap();
    assert_eq!((primary.read_count, primary.read_failed), (1, 0));
}

#[tokio::test]
async fn test_read_falls_back_when_operation_fails_on_secondary() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://h1,h2/app?replicaSet=rs0").await;

    let value = conn
        .read(|db| async move {
            match db.target {
                Some(ReadTarget::Primary) => Ok("fresh"),
                _ => Err(DbError::operation("stale read")),
            }
        })
        .await
        .unwrap();
    assert_eq!(value, "fresh");
}

#[tokio::test]
async fn test_read_returns_primary_error_after_fallback() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://localhost/app").await;

    let err = conn
        .read(|db| async move {
            match db.target {
                Some(ReadTarget::Primary) => Err::<(), _>(DbError::operation("primary said no")),
                _ => Err(DbError::operation("secondary said no")),
            }
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "primary said no");
}

#[tokio::test]
async fn test_read_secondary_skips_operation_when_ping_fails() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://localhost/app").await;
    driver.set_secondary_down(true);

    let calls = AtomicUsize::new(0);
    let err = conn
        .read_secondary(|db| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok(db) }
        })
        .await
        .unwrap_err();

    assert_eq!(err.to_string(), "no secondary available");
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_write_uses_default_preference() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://localhost/app").await;

    let db = conn.write(|db| async move { Ok(db) }).await.unwrap();
    assert_eq!(db.target, None);
    assert_eq!(db.name, "app");

    let write = conn.metrics().operation(OperationKind::Write).unwrap();
    assert_eq!((write.write_count, write.write_failed), (1, 0));
}

#[tokio::test]
async fn test_not_found_write_is_returned_but_not_counted_as_failure() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://localhost/app").await;

    let err = conn
        .write(|_db| async move { Err::<(), _>(DbError::NotFound) })
        .await
        .unwrap_err();
    assert!(err.is_not_found());

    let write = conn.metrics().operation(OperationKind::Write).unwrap();
    assert_eq!((write.write_count, write.write_failed), (1, 0));
    assert_eq!(write.last_issue, None);
}

#[tokio::test]
async fn test_plain_write_never_retries() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://localhost/app").await;

    let err = conn
        .write(|_db| async move { Err::<(), _>(DbError::operation("connection reset by peer")) })
        .await
        .unwrap_err();
    assert!(err.is_transient());
    assert_eq!(driver.connects(), 1);
}

#[tokio::test]
async fn test_database_handle_is_bound_to_primary() {
    let driver = FakeDriver::new();
    let conn = connect(&driver, "mongodb://localhost/app").await;
    let db = conn.database().unwrap();
    assert_eq!(db.target, Some(ReadTarget::Primary));
    assert_eq!(db.name, "app");
}

#[tokio::test]
async fn test_with_database_switches_target_and_resets_metrics() {
    let driver = FakeDriver::new();
    let mut conn = connect(&driver, "mongodb://localhost/app").await;
    conn.write(|_db| async move { Ok(()) }).await.unwrap();
    assert!(conn.metrics().operation(OperationKind::Write).is_some());

    conn.with_database("reports").unwrap();

    assert_eq!(conn.db_name(), "reports");
    assert!(conn.metrics().date().is_some());
    assert_eq!(conn.metrics().operation(OperationKind::Write), None);

    let db = conn.write(|db| async move { Ok(db) }).await.unwrap();
    assert_eq!(db.name, "reports");
}

#[tokio::test]
async fn test_close_releases_session_and_blocks_further_use() {
    let driver = FakeDriver::new();
    let mut conn = connect(&driver, "mongodb://localhost/app").await;

    conn.close().await.unwrap();
    assert_eq!(driver.disconnects(), 1);
    assert!(!conn.is_connected());

    let err = conn.read(|db| async move { Ok(db) }).await.unwrap_err();
    assert!(matches!(err, DbError::NotConnected));
    let err = conn.write(|db| async move { Ok(db) }).await.unwrap_err();
    assert!(matches!(err, DbError::NotConnected));
    assert!(matches!(conn.database(), Err(DbError::NotConnected)));
    assert!(matches!(conn.with_database("other"), Err(DbError::NotConnected)));
    assert!(matches!(conn.close().await, Err(DbError::NotConnected)));
    assert_eq!(driver.disconnects(), 1);
}

#[tokio::test]
async fn test_concurrent_reads_are_all_counted() {
    let driver = FakeDriver::new();
    let conn = Arc::new(connect(&driver, "mongodb://h1,h2/app?replicaSet=rs0").await);

    let tasks: Vec<_> = (0..64)
        .map(|_| {
            let conn = Arc::clone(&conn);
            tokio::spawn(async move { conn.read(|db| async move { Ok(db.session_id) }).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 1);
    }

    let secondary = conn.metrics().operation(OperationKind::ReadSecondary).unwrap();
    assert_eq!(secondary.read_count, 64);
}
