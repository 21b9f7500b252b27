//! End-to-end tests against real SQLite databases.

use sqlscope::config::DatabaseConfig;
use sqlscope::context::{ExecutionContext, RequestInfo};
use sqlscope::crud::{Crud, CrudOptions};
use sqlscope::db::{Database, DbPool, TxOptions};
use sqlscope::error::DbError;
use sqlscope::models::Value;
use sqlscope::{impl_from_row, impl_params};

#[derive(Debug, Clone, PartialEq)]
struct Student {
    id: i64,
    name: String,
    status: i32,
    nickname: Option<String>,
}

impl_from_row!(Student {
    id => "id",
    name => "name",
    status => "status",
    nickname => "nickname",
});

#[derive(Debug, Clone, Default)]
struct StudentParam {
    id: Option<i64>,
    ids: Option<Vec<i64>>,
    name: Option<String>,
    status: Option<i32>,
    min_status: Option<i32>,
}

impl_params!(StudentParam {
    id => "id",
    ids => "id,in",
    name => "name",
    status => "status",
    min_status => "status,>=",
});

const CREATE_STUDENTS: &str = "CREATE TABLE students (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    status INTEGER NOT NULL,
    nickname TEXT
)";

fn students() -> Crud<Student, StudentParam> {
    Crud::new("students")
}

fn new_student(name: &str, status: i32) -> StudentParam {
    StudentParam {
        name: Some(name.to_string()),
        status: Some(status),
        ..Default::default()
    }
}

fn by_id(id: i64) -> StudentParam {
    StudentParam {
        id: Some(id),
        ..Default::default()
    }
}

async fn open(spec: &str) -> Database<DbPool> {
    let config = DatabaseConfig::parse(spec).unwrap();
    Database::open(&config).await.unwrap()
}

async fn memory_context() -> ExecutionContext<DbPool> {
    let db = open("sqlite::memory:").await;
    let mut ctx = ExecutionContext::with_info(db, RequestInfo::generate());
    ctx.exec(CREATE_STUDENTS, &[]).await.unwrap();
    ctx
}

#[tokio::test]
async fn test_crud_round_trip() {
    let mut ctx = memory_context().await;

    let data = vec![
        new_student("Ada", 1),
        new_student("Brian", 2),
        new_student("Cleo", 3),
    ];
    let last_id = students()
        .insert_list_with(&mut ctx, &data, &CrudOptions::new().batch_size(2))
        .await
        .unwrap();
    assert_eq!(last_id, 3);

    let all = students().query_list(&mut ctx, None).await.unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0].name, "Ada");
    assert_eq!(all[0].nickname, None);

    let found = students().query(&mut ctx, Some(&by_id(2))).await.unwrap();
    assert_eq!(
        found,
        Some(Student {
            id: 2,
            name: "Brian".to_string(),
            status: 2,
            nickname: None,
        })
    );

    let picked = StudentParam {
        ids: Some(vec![1, 3]),
        ..Default::default()
    };
    let names: Vec<String> = students()
        .query_list(&mut ctx, Some(&picked))
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect();
    assert_eq!(names, vec!["Ada", "Cleo"]);

    let promote = StudentParam {
        status: Some(9),
        ..Default::default()
    };
    let updated = students()
        .update(&mut ctx, Some(&by_id(1)), &promote)
        .await
        .unwrap();
    assert_eq!(updated, 1);

    let senior = StudentParam {
        min_status: Some(3),
        ..Default::default()
    };
    let deleted = students().delete(&mut ctx, Some(&senior)).await.unwrap();
    assert_eq!(deleted, 2);

    let left = students().query_list(&mut ctx, None).await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].name, "Brian");

    ctx.database().close().await;
}

#[tokio::test]
async fn test_selected_fields_leave_optional_columns_empty() {
    let mut ctx = memory_context().await;
    ctx.exec(
        "INSERT INTO students (name, status, nickname) VALUES (?, ?, ?)",
        &[
            Value::String("Ada".into()),
            Value::Int(1),
            Value::String("A".into()),
        ],
    )
    .await
    .unwrap();

    let found = students()
        .query_with(
            &mut ctx,
            None,
            &CrudOptions::new().fields(["id", "name", "status"]),
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.nickname, None);

    let err = students()
        .query_with(&mut ctx, None, &CrudOptions::new().fields(["id"]))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Decode { .. }));
}

#[tokio::test]
async fn test_nested_rollback_discards_inner_writes() {
    let mut ctx = memory_context().await;

    ctx.enter(&TxOptions::default()).await.unwrap();
    students()
        .insert(&mut ctx, &new_student("Ada", 1))
        .await
        .unwrap();

    ctx.enter(&TxOptions::default()).await.unwrap();
    students()
        .insert(&mut ctx, &new_student("Brian", 2))
        .await
        .unwrap();
    ctx.leave(true).await.unwrap();

    // Still inside the outer scope: both rows are visible.
    assert_eq!(students().query_list(&mut ctx, None).await.unwrap().len(), 2);

    ctx.leave(false).await.unwrap();
    assert!(!ctx.in_transaction());
    assert!(students().query_list(&mut ctx, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_transaction_helper_persists_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let spec = format!("sqlite://{}", dir.path().join("school.db").display());

    let db = open(&spec).await;
    let mut ctx = ExecutionContext::new(db.clone());
    ctx.exec(CREATE_STUDENTS, &[]).await.unwrap();

    let id = ctx
        .transaction(&TxOptions::default(), |ctx| {
            Box::pin(async move {
                let id = students().insert(ctx, &new_student("Ada", 1)).await?;
                let promote = StudentParam {
                    status: Some(2),
                    ..Default::default()
                };
                students().update(ctx, Some(&by_id(id)), &promote).await?;
                Ok(id)
            })
        })
        .await
        .unwrap();

    let failed = ctx
        .transaction(&TxOptions::default(), |ctx| {
            Box::pin(async move {
                students().insert(ctx, &new_student("Brian", 1)).await?;
                Err::<(), _>(DbError::invalid_input("abort"))
            })
        })
        .await;
    assert!(failed.is_err());
    drop(ctx);
    db.close().await;

    let db = open(&spec).await;
    let mut ctx = ExecutionContext::new(db);
    let all = students().query_list(&mut ctx, None).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].id, id);
    assert_eq!(all[0].status, 2);
}

#[tokio::test]
async fn test_statement_and_query_row() {
    let mut ctx = memory_context().await;
    let info = RequestInfo::with_log_id("stmt-test");
    let db = ctx.database().clone();

    let stmt = db
        .prepare(&info, "INSERT INTO students (name, status) VALUES (?, ?)")
        .await
        .unwrap();
    for (name, status) in [("Ada", 1), ("Brian", 2)] {
        stmt.exec(&info, &[Value::String(name.into()), Value::Int(status)])
            .await
            .unwrap();
    }
    stmt.close(&info).await.unwrap();

    let row = ctx
        .query_row("SELECT COUNT(*) AS total FROM students", &[])
        .await
        .unwrap();
    assert_eq!(row.get::<i64>("total").unwrap(), 2);

    let err = ctx
        .query_row("SELECT * FROM students WHERE id = ?", &[Value::Int(99)])
        .await
        .unwrap_err();
    assert!(err.is_no_rows());
    assert!(students().query(&mut ctx, Some(&by_id(99))).await.unwrap().is_none());
}

#[tokio::test]
async fn test_expression_columns_decode_by_value() {
    let mut ctx = memory_context().await;
    ctx.exec(
        "INSERT INTO students (name, status) VALUES (?, ?)",
        &[Value::String("Ada".into()), Value::Int(4)],
    )
    .await
    .unwrap();

    let row = ctx
        .query_row("SELECT 1 + 1 AS n, COUNT(*) AS c FROM (SELECT 1)", &[])
        .await
        .unwrap();
    assert_eq!(row.value("n"), Some(&Value::Int(2)));
    assert_eq!(row.value("c"), Some(&Value::Int(1)));

    let row = ctx
        .query_row(
            "SELECT MAX(status) AS top, MAX(name) AS last, AVG(status) AS mean, \
             MAX(nickname) AS nick FROM students",
            &[],
        )
        .await
        .unwrap();
    assert_eq!(row.value("top"), Some(&Value::Int(4)));
    assert_eq!(row.value("last"), Some(&Value::String("Ada".into())));
    assert_eq!(row.value("mean"), Some(&Value::Float(4.0)));
    assert_eq!(row.value("nick"), Some(&Value::Null));
}
