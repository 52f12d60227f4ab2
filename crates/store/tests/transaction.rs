//! Integration tests for the unit of work.

#![allow(missing_docs)]

mod common;

use std::panic::{self, AssertUnwindSafe};

use common::{database, kit, vpc};
use stratus_orm::{InsertBuilder, Query, Value};
use stratus_store::{Connection, Database, Error, IdAllocator, Kit, SqlIdAllocator, storage_error};

fn count_vpcs(db: &Database) -> i64 {
    let rows = db.query(&kit(), &Query::raw("SELECT COUNT(*) AS n FROM vpc")).unwrap();
    match rows[0].get("n") {
        Some(Value::BigInt(Some(n))) => *n,
        other => panic!("unexpected count {other:?}"),
    }
}

fn insert_vpc(txn: &dyn Connection, kit: &Kit, id: &str, name: &str) -> stratus_store::Result<usize> {
    let mut record = vpc(name, "us-east-1", 1);
    record.id = id.to_string();
    let queries = InsertBuilder::from_records(std::slice::from_ref(&record)).build()?;
    txn.exec(kit, &queries[0])
}

#[test]
fn commits_on_success() {
    let db = database();
    let kit = kit();

    let inserted = db
        .run_in_transaction(&kit, |txn| {
            let a = insert_vpc(txn, &kit, "00000001", "a")?;
            let b = insert_vpc(txn, &kit, "00000002", "b")?;
            Ok(a + b)
        })
        .unwrap();

    assert_eq!(inserted, 2);
    assert_eq!(count_vpcs(&db), 2);
}

#[test]
fn rolls_back_on_error() {
    let db = database();
    let kit = kit();

    let err = db
        .run_in_transaction(&kit, |txn| {
            insert_vpc(txn, &kit, "00000001", "a")?;
            Err::<(), _>(storage_error!("downstream failed"))
        })
        .unwrap_err();

    assert_eq!(
        err,
        Error::Storage {
            description: "downstream failed".to_string()
        }
    );
    assert_eq!(count_vpcs(&db), 0);
}

#[test]
fn driver_errors_roll_back() {
    let db = database();
    let kit = kit();

    let err = db
        .run_in_transaction(&kit, |txn| {
            insert_vpc(txn, &kit, "00000001", "a")?;
            insert_vpc(txn, &kit, "00000001", "duplicate")
        })
        .unwrap_err();

    assert!(matches!(&err, Error::Storage { description } if description.contains("UNIQUE")), "{err:?}");
    assert_eq!(count_vpcs(&db), 0);
}

#[test]
fn rolls_back_and_resumes_panics() {
    let db = database();
    let kit = kit();

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        db.run_in_transaction::<()>(&kit, |txn| {
            insert_vpc(txn, &kit, "00000001", "a")?;
            panic!("callback exploded");
        })
    }));

    let payload = outcome.unwrap_err();
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"callback exploded"));

    // the connection is usable again and nothing was kept
    assert_eq!(count_vpcs(&db), 0);
}

#[test]
fn allocation_rolls_back_with_the_transaction() {
    let db = database();
    let kit = kit();

    let _ = db.run_in_transaction(&kit, |txn| {
        SqlIdAllocator.allocate(txn, &kit, "vpc", 5)?;
        Err::<(), _>(storage_error!("abort"))
    });

    let ids = db.run_in_transaction(&kit, |txn| SqlIdAllocator.allocate(txn, &kit, "vpc", 1)).unwrap();
    assert_eq!(ids, vec!["00000001"]);
}

#[test]
fn canceled_kit_never_begins() {
    let db = database();
    let kit = kit();
    kit.cancellation().cancel();

    let mut called = false;
    let err = db
        .run_in_transaction(&kit, |_| {
            called = true;
            Ok(())
        })
        .unwrap_err();

    assert_eq!(err, Error::Canceled);
    assert!(!called);
}

#[test]
fn cancellation_stops_later_statements() {
    let db = database();
    let kit = kit();

    let err = db
        .run_in_transaction(&kit, |txn| {
            insert_vpc(txn, &kit, "00000001", "a")?;
            kit.cancellation().cancel();
            insert_vpc(txn, &kit, "00000002", "b")
        })
        .unwrap_err();

    assert_eq!(err, Error::Canceled);
    assert_eq!(count_vpcs(&db), 0);
}
