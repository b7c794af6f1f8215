// WorkHole/backend-api/src/test_support.rs
//! Database fixtures for service tests. Each test gets its own connection
//! inside a transaction that is never committed, with the schema migrated
//! into a fresh Postgres schema. Tests are skipped when `TEST_DATABASE_URL`
//! is unset.

use crate::models::{BreakType, Employee, NewBreakType};
use crate::notify::testing::RecordingSink;
use crate::notify::Notifier;
use crate::schema::{break_types, employees};
use crate::services::{AppContext, Settings};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection};
use std::sync::Arc;
use uuid::Uuid;

pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

const MIGRATION: &str =
    include_str!("../migrations/2025-06-01-000000_create_time_tracking/up.sql");

pub async fn test_connection() -> Option<AsyncPgConnection> {
    let Ok(url) = std::env::var(TEST_DATABASE_URL) else {
        eprintln!("{} is not set; skipping database test", TEST_DATABASE_URL);
        return None;
    };
    let mut conn = AsyncPgConnection::establish(&url)
        .await
        .expect("connect to the test database");
    conn.begin_test_transaction()
        .await
        .expect("begin test transaction");

    let schema = format!("workhole_test_{}", Uuid::new_v4().simple());
    conn.batch_execute(&format!(
        "CREATE SCHEMA {schema}; SET LOCAL search_path TO {schema}, public;"
    ))
    .await
    .expect("create test schema");
    conn.batch_execute(MIGRATION)
        .await
        .expect("apply migration");
    Some(conn)
}

pub fn test_context() -> (AppContext, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let notifier = Notifier::new(sink.clone(), sink.clone());
    (AppContext::new(Settings::default(), notifier), sink)
}

/// A UTC employee on the default 09:00, eight hour shift.
pub async fn insert_employee(conn: &mut AsyncPgConnection, first_name: &str) -> Employee {
    let id = Uuid::new_v4();
    diesel::insert_into(employees::table)
        .values((
            employees::id.eq(id),
            employees::first_name.eq(first_name),
            employees::last_name.eq("Tester"),
            employees::email.eq(format!("{}@example.com", id.simple())),
        ))
        .returning(Employee::as_returning())
        .get_result::<Employee>(conn)
        .await
        .expect("insert employee")
}

pub async fn insert_break_type(
    conn: &mut AsyncPgConnection,
    name: &str,
    minutes: i32,
) -> BreakType {
    diesel::insert_into(break_types::table)
        .values(&NewBreakType {
            name: name.to_string(),
            duration_minutes: minutes,
            is_active: true,
        })
        .returning(BreakType::as_returning())
        .get_result::<BreakType>(conn)
        .await
        .expect("insert break type")
}
