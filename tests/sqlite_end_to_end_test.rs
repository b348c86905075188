//! End-to-end tests against a real SQLite database: connector setup, the run
//! pipeline, transactions, and dry-run, all through the public surface.

use db_link::config::ConnectionConfig;
use db_link::connection::Connection;
use db_link::error::Error;
use db_link::factory::ConnectionFactory;
use db_link::models::Value;
use serde_json::json;

async fn sqlite_connection(path: &str) -> Connection {
    let factory = ConnectionFactory::new();
    let config = ConnectionConfig::new("sqlite").with_database(path);
    factory.make(config, "test").await.unwrap()
}

#[tokio::test]
async fn test_full_statement_cycle() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut conn = sqlite_connection(file.path().to_str().unwrap()).await;

    assert!(
        conn.statement(
            "create table users (id integer primary key, name text, active boolean)",
            &[],
        )
        .await
        .unwrap()
    );

    assert!(
        conn.insert(
            "insert into users (name, active) values (?, ?)",
            &[Value::from("alice"), Value::Bool(true)],
        )
        .await
        .unwrap()
    );
    assert!(
        conn.insert(
            "insert into users (name, active) values (?, ?)",
            &[Value::from("bob"), Value::Bool(false)],
        )
        .await
        .unwrap()
    );

    let rows = conn
        .select("select name, active from users order by id", &[])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["name"], json!("alice"));
    assert_eq!(rows[0]["active"], json!(1));
    // false was coerced to integer 0 at bind time
    assert_eq!(rows[1]["active"], json!(0));

    let affected = conn
        .update(
            "update users set name = ? where name = ?",
            &[Value::from("carol"), Value::from("bob")],
        )
        .await
        .unwrap();
    assert_eq!(affected, 1);

    let row = conn
        .select_one("select count(*) as n from users", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["n"], json!(2));

    let affected = conn.delete("delete from users", &[]).await.unwrap();
    assert_eq!(affected, 2);

    let row = conn.select_one("select * from users", &[]).await.unwrap();
    assert_eq!(row, None);
}

#[tokio::test]
async fn test_transaction_commit_and_rollback() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut conn = sqlite_connection(file.path().to_str().unwrap()).await;

    conn.statement("create table t (id integer primary key)", &[])
        .await
        .unwrap();

    conn.transaction(|conn| {
        Box::pin(async move {
            conn.insert("insert into t (id) values (1)", &[]).await?;
            conn.insert("insert into t (id) values (2)", &[]).await?;
            Ok(())
        })
    })
    .await
    .unwrap();

    let row = conn
        .select_one("select count(*) as n from t", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["n"], json!(2));

    // Duplicate key fails the work; the whole transaction rolls back
    let err = conn
        .transaction::<(), _>(|conn| {
            Box::pin(async move {
                conn.insert("insert into t (id) values (3)", &[]).await?;
                conn.insert("insert into t (id) values (1)", &[]).await?;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Query { .. }));
    assert_eq!(conn.transaction_level(), 0);

    let row = conn
        .select_one("select count(*) as n from t", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["n"], json!(2));
}

#[tokio::test]
async fn test_nested_transaction_commits_once() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut conn = sqlite_connection(file.path().to_str().unwrap()).await;

    conn.statement("create table t (id integer primary key)", &[])
        .await
        .unwrap();

    conn.begin_transaction().await.unwrap();
    conn.begin_transaction().await.unwrap();
    conn.insert("insert into t (id) values (1)", &[]).await.unwrap();
    conn.commit().await.unwrap();
    // Still inside the outer transaction; an inner commit is bookkeeping
    assert_eq!(conn.transaction_level(), 1);
    conn.commit().await.unwrap();
    assert_eq!(conn.transaction_level(), 0);

    let row = conn
        .select_one("select count(*) as n from t", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["n"], json!(1));
}

#[tokio::test]
async fn test_pretend_leaves_data_untouched() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut conn = sqlite_connection(file.path().to_str().unwrap()).await;

    conn.statement("create table t (id integer primary key)", &[])
        .await
        .unwrap();

    let captured = conn
        .pretend(|conn| {
            Box::pin(async move {
                conn.insert("insert into t (id) values (1)", &[]).await?;
                conn.delete("delete from t", &[]).await?;
                Ok(())
            })
        })
        .await
        .unwrap();

    assert_eq!(captured.len(), 2);
    assert_eq!(captured[0].query, "insert into t (id) values (1)");
    assert_eq!(captured[1].query, "delete from t");

    let row = conn
        .select_one("select count(*) as n from t", &[])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["n"], json!(0));
}

#[tokio::test]
async fn test_unprepared_statement() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let mut conn = sqlite_connection(file.path().to_str().unwrap()).await;

    conn.statement("create table t (id integer primary key)", &[])
        .await
        .unwrap();
    conn.insert("insert into t (id) values (1)", &[]).await.unwrap();

    assert!(conn.unprepared("delete from t").await.unwrap());
}

#[tokio::test]
async fn test_in_memory_database() {
    let mut conn = sqlite_connection(":memory:").await;

    conn.statement("create table t (id integer primary key, name text)", &[])
        .await
        .unwrap();
    conn.insert("insert into t (id, name) values (?, ?)", &[Value::Int(1), Value::from("x")])
        .await
        .unwrap();

    let row = conn
        .select_one("select name from t where id = ?", &[Value::Int(1)])
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row["name"], json!("x"));
}

#[tokio::test]
async fn test_missing_database_file_is_configuration_error() {
    let factory = ConnectionFactory::new();
    let config = ConnectionConfig::new("sqlite").with_database("/nonexistent/path/to/db.sqlite");

    let err = factory.make(config, "test").await.unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert!(err.to_string().contains("Database does not exist."));
}

#[tokio::test]
async fn test_driver_name_reports_dialect() {
    let mut conn = sqlite_connection(":memory:").await;
    assert_eq!(conn.driver_name().unwrap(), "sqlite");

    conn.disconnect().unwrap();
    assert!(conn.driver_name().is_err());
}
