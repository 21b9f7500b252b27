//! Integration tests for the CRUD engine against the scripted driver.

use sqlscope::compiler::{CompiledStatement, InsertKind};
use sqlscope::context::ExecutionContext;
use sqlscope::crud::{Crud, CrudOptions};
use sqlscope::db::{Database, ExecResult, MockCall, MockDriver, TxOptions};
use sqlscope::error::DbError;
use sqlscope::mapper::PredicateMap;
use sqlscope::models::{Row, Value};
use sqlscope::{impl_from_row, impl_params};

#[derive(Debug, Clone, PartialEq)]
struct Student {
    id: i64,
    name: String,
    status: i32,
}

impl_from_row!(Student {
    id => "id",
    name => "name",
    status => "status",
});

#[derive(Debug, Clone, Default)]
struct StudentParam {
    id: Option<i64>,
    name: Option<String>,
    status: Option<i32>,
    min_status: Option<i32>,
}

impl_params!(StudentParam {
    id => "id",
    name => "name",
    status => "status",
    min_status => "status,>=",
});

fn students() -> Crud<Student, StudentParam> {
    Crud::new("students")
}

fn context(mock: &MockDriver) -> ExecutionContext<MockDriver> {
    ExecutionContext::new(Database::new("school", mock.clone()))
}

fn student_row(id: i64, name: &str, status: i64) -> Row {
    Row::from_pairs([
        ("id", Value::Int(id)),
        ("name", Value::String(name.to_string())),
        ("status", Value::Int(status)),
    ])
}

fn new_student(name: &str) -> StudentParam {
    StudentParam {
        name: Some(name.to_string()),
        status: Some(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_query_by_id() {
    let mock = MockDriver::new();
    mock.expect_query(
        "SELECT * FROM `students` WHERE `id`=?",
        Ok(vec![student_row(1, "N1", 2)]),
    );
    let mut ctx = context(&mock);

    let filter = StudentParam {
        id: Some(1),
        ..Default::default()
    };
    let found = students().query(&mut ctx, Some(&filter)).await.unwrap();

    assert_eq!(
        found,
        Some(Student {
            id: 1,
            name: "N1".to_string(),
            status: 2
        })
    );
    assert_eq!(mock.calls()[0].args, vec![Value::Int(1)]);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_query_driver_error_is_returned() {
    let mock = MockDriver::new();
    mock.expect_query(
        "SELECT",
        Err(DbError::connection("connection reset", "Reconnect")),
    );
    let mut ctx = context(&mock);

    let filter = StudentParam {
        id: Some(1),
        ..Default::default()
    };
    let err = students().query(&mut ctx, Some(&filter)).await.unwrap_err();
    assert!(matches!(err, DbError::Connection { .. }));
}

#[tokio::test]
async fn test_query_list_without_filter_keeps_order() {
    let mock = MockDriver::new();
    mock.expect_query(
        "SELECT * FROM `students`",
        Ok(vec![student_row(1, "N1", 2), student_row(2, "N2", 1)]),
    );
    let mut ctx = context(&mock);

    let list = students().query_list(&mut ctx, None).await.unwrap();
    assert_eq!(list.len(), 2);
    assert_eq!(list[0].name, "N1");
    assert_eq!(list[1].name, "N2");
    assert!(mock.calls()[0].args.is_empty());
}

#[tokio::test]
async fn test_query_with_operator_predicate() {
    let mock = MockDriver::new();
    mock.expect_query("WHERE `status`>=?", Ok(vec![]));
    let mut ctx = context(&mock);

    let filter = StudentParam {
        min_status: Some(2),
        ..Default::default()
    };
    let found = students().query(&mut ctx, Some(&filter)).await.unwrap();
    assert_eq!(found, None);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_insert_list_splits_into_batches() {
    let mock = MockDriver::new();
    mock.expect_exec(
        "INSERT INTO `students` (`name`,`status`) VALUES (?,?),(?,?)",
        Ok(ExecResult::new(2, 10)),
    );
    mock.expect_exec(
        "INSERT INTO `students` (`name`,`status`) VALUES (?,?)",
        Ok(ExecResult::new(1, 12)),
    );
    let mut ctx = context(&mock);

    let data = vec![new_student("a"), new_student("b"), new_student("c")];
    let id = students()
        .insert_list_with(&mut ctx, &data, &CrudOptions::new().batch_size(2))
        .await
        .unwrap();
    assert_eq!(id, 12);

    let inserts = mock.calls_of(MockCall::Exec);
    assert_eq!(inserts.len(), 2);
    assert_eq!(
        inserts[0].args,
        vec![
            Value::String("a".into()),
            Value::Int(1),
            Value::String("b".into()),
            Value::Int(1)
        ]
    );
    assert_eq!(
        inserts[1].args,
        vec![Value::String("c".into()), Value::Int(1)]
    );
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_insert_list_exact_multiple_has_no_empty_chunk() {
    let mock = MockDriver::new();
    mock.expect_exec("INSERT", Ok(ExecResult::new(2, 2)));
    mock.expect_exec("INSERT", Ok(ExecResult::new(2, 4)));
    let mut ctx = context(&mock);

    let data = vec![
        new_student("a"),
        new_student("b"),
        new_student("c"),
        new_student("d"),
    ];
    let id = students()
        .insert_list_with(&mut ctx, &data, &CrudOptions::new().batch_size(2))
        .await
        .unwrap();
    assert_eq!(id, 4);
    assert_eq!(mock.calls().len(), 2);
}

#[tokio::test]
async fn test_insert_list_stops_at_first_failing_chunk() {
    let mock = MockDriver::new();
    mock.expect_exec("INSERT", Ok(ExecResult::new(1, 1)));
    mock.expect_exec(
        "INSERT",
        Err(DbError::database("Duplicate entry", Some("23000".into()), "Check keys")),
    );
    let mut ctx = context(&mock);

    let data = vec![new_student("a"), new_student("b"), new_student("c")];
    let err = students()
        .insert_list_with(&mut ctx, &data, &CrudOptions::new().batch_size(1))
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Database { .. }));
    // The third chunk is never attempted.
    assert_eq!(mock.calls_of(MockCall::Exec).len(), 2);
}

#[tokio::test]
async fn test_insert_ignore() {
    let mock = MockDriver::new();
    mock.expect_exec("INSERT IGNORE INTO `students`", Ok(ExecResult::new(0, 0)));
    let mut ctx = context(&mock);

    let id = students()
        .insert_with(
            &mut ctx,
            &new_student("a"),
            &CrudOptions::new().insert_kind(InsertKind::Ignore),
        )
        .await
        .unwrap();
    assert_eq!(id, 0);
}

#[tokio::test]
async fn test_update_and_delete() {
    let mock = MockDriver::new();
    mock.expect_exec(
        "UPDATE `students` SET `status`=? WHERE `id`=?",
        Ok(ExecResult::new(1, 0)),
    );
    mock.expect_exec("DELETE FROM `students` WHERE `status`>=?", Ok(ExecResult::new(3, 0)));
    let mut ctx = context(&mock);

    let filter = StudentParam {
        id: Some(7),
        ..Default::default()
    };
    let data = StudentParam {
        status: Some(3),
        ..Default::default()
    };
    assert_eq!(students().update(&mut ctx, Some(&filter), &data).await.unwrap(), 1);
    assert_eq!(mock.calls()[0].args, vec![Value::Int(3), Value::Int(7)]);

    let filter = StudentParam {
        min_status: Some(2),
        ..Default::default()
    };
    assert_eq!(students().delete(&mut ctx, Some(&filter)).await.unwrap(), 3);
    mock.verify().unwrap();
}

#[tokio::test]
async fn test_custom_compiler() {
    fn soft_delete(table: &str, wheres: &PredicateMap) -> sqlscope::DbResult<CompiledStatement> {
        let args = wheres.values().cloned().collect();
        Ok(CompiledStatement::new(
            format!("UPDATE {} SET deleted=1 WHERE id=?", table),
            args,
        ))
    }

    let mock = MockDriver::new();
    mock.expect_exec("UPDATE students SET deleted=1", Ok(ExecResult::new(1, 0)));
    let mut ctx = context(&mock);

    let filter = StudentParam {
        id: Some(4),
        ..Default::default()
    };
    let rows = students()
        .delete_with(
            &mut ctx,
            Some(&filter),
            &CrudOptions::new().delete_builder(soft_delete),
        )
        .await
        .unwrap();
    assert_eq!(rows, 1);
}

#[tokio::test]
async fn test_crud_runs_inside_open_transaction() {
    let mock = MockDriver::new();
    mock.expect_begin(Ok(()));
    mock.expect_exec("INSERT", Ok(ExecResult::new(1, 5)));
    mock.expect_exec("UPDATE", Ok(ExecResult::new(1, 0)));
    mock.expect_commit(Ok(()));
    let mut ctx = context(&mock);

    ctx.enter(&TxOptions::default()).await.unwrap();
    let id = students().insert(&mut ctx, &new_student("a")).await.unwrap();
    let filter = StudentParam {
        id: Some(id),
        ..Default::default()
    };
    let data = StudentParam {
        status: Some(2),
        ..Default::default()
    };
    students().update(&mut ctx, Some(&filter), &data).await.unwrap();
    ctx.leave(true).await.unwrap();

    assert_eq!(mock.calls_of(MockCall::TxExec).len(), 2);
    assert!(mock.calls_of(MockCall::Exec).is_empty());
    mock.verify().unwrap();
}
