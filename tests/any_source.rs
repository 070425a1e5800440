//! Rows read from SQLite through the sqlx loader.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use rowset::engine::any::{self, SqlSource};
use rowset::prelude::*;

#[tokio::test]
async fn sqlite_table_through_fetch_path() {
    let source = SqlSource::connect("sqlite::memory:").await.unwrap();
    source
        .execute("CREATE TABLE items (id INTEGER, name TEXT, score REAL, data BLOB)")
        .await
        .unwrap();
    source
        .execute(
            "INSERT INTO items VALUES \
             (1, 'bolt', 2.5, x'0102'), \
             (2, NULL, -2.5, NULL), \
             (3, 'nut', 0.25, x'ff')",
        )
        .await
        .unwrap();

    let mem = MemoryEnv::new();
    let cursor = source
        .cursor(&mem, "SELECT id, name, score, data FROM items ORDER BY id")
        .await
        .unwrap();
    let tags: Vec<TypeTag> = cursor.columns().iter().map(|c| c.type_tag).collect();
    assert_eq!(tags, vec![TypeTag::INT, TypeTag::VCS, TypeTag::FLT, TypeTag::BLOB]);

    let env: Rc<dyn Environment> = Rc::new(mem.clone());
    let mut rows = RowSet::new(cursor, &env, 2).unwrap();

    let mut seen = Vec::new();
    while let Some(batch) = rows.fetch().unwrap() {
        for row in batch.iter() {
            seen.push((
                row.get_by_name::<i64>("id").unwrap(),
                row.get_opt_by_name::<String>("name").unwrap(),
                row.get_by_name::<i32>("score").unwrap(),
                row.get_opt_by_name::<Vec<u8>>("data").unwrap(),
            ));
        }
    }
    assert_eq!(
        seen,
        vec![
            (1, Some("bolt".to_string()), 3, Some(vec![1, 2])),
            (2, None, -3, None),
            (3, Some("nut".to_string()), 0, Some(vec![0xff])),
        ]
    );
}

#[test]
fn blocking_load() {
    let mem = MemoryEnv::new();
    let cursor = any::load(&mem, "sqlite::memory:", "SELECT 42 AS answer, 'x' AS letter").unwrap();
    let env: Rc<dyn Environment> = Rc::new(mem.clone());
    let mut rows = RowSet::new(cursor, &env, 10).unwrap();
    let batch = rows.fetch().unwrap().unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch.row(0).get::<i16>(0).unwrap(), 42);
    assert_eq!(batch.row(0).get::<char>(1).unwrap(), 'x');
}

#[test]
fn bad_sql_is_an_execution_error() {
    let mem = MemoryEnv::new();
    let err = any::load(&mem, "sqlite::memory:", "SELEC nothing").err().unwrap();
    assert!(matches!(err, FetchError::Execution(_)), "{err}");
}
