use std::str::FromStr;

use sqlx::sqlite::{SqliteArguments, SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column as _, Pool, Row, Sqlite, TypeInfo, ValueRef};

use crate::db::query::{Rows, Statement};
use crate::db::value::{Value, sqlite_timestamp};
use crate::error::CrmError;

pub type SqlitePool = Pool<Sqlite>;

/// Local SQLite file (or in-memory database) used when the libSQL URL is a
/// `file:` target. The pool is lazy; the file is created on first use.
#[derive(Debug, Clone)]
pub struct LocalSqlite {
    pool: SqlitePool,
}

impl LocalSqlite {
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self, CrmError> {
        let opts = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = if url.contains(":memory:") {
            // Every connection would get its own empty database otherwise.
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_lazy_with(opts)
        } else {
            SqlitePoolOptions::new()
                .max_connections(max_connections)
                .connect_lazy_with(opts)
        };
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn execute(&self, stmt: &Statement) -> Result<Rows, CrmError> {
        let mut query = sqlx::query::<Sqlite>(&stmt.sql);
        for value in stmt.values() {
            query = bind(query, value);
        }
        if stmt.returns_rows {
            let fetched = query.fetch_all(&self.pool).await?;
            let columns = match fetched.first() {
                Some(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
                None => Vec::new(),
            };
            let rows = fetched
                .iter()
                .map(row_values)
                .collect::<Result<Vec<_>, CrmError>>()?;
            Ok(Rows {
                columns,
                rows,
                rows_affected: 0,
                last_insert_id: None,
            })
        } else {
            let done = query.execute(&self.pool).await?;
            Ok(Rows {
                rows_affected: done.rows_affected(),
                last_insert_id: Some(done.last_insert_rowid()),
                ..Rows::default()
            })
        }
    }
}

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind<'q>(query: SqliteQuery<'q>, value: &Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Integer(i) => query.bind(*i),
        Value::Real(f) => query.bind(*f),
        Value::Bool(b) => query.bind(*b),
        Value::Text(s) => query.bind(s.clone()),
        Value::Blob(b) => query.bind(b.clone()),
        Value::Timestamp(t) => query.bind(sqlite_timestamp(t)),
    }
}

fn row_values(row: &SqliteRow) -> Result<Vec<Value>, CrmError> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let kind = raw.type_info().name().to_string();
            Ok(match kind.as_str() {
                "INTEGER" | "BOOLEAN" => Value::Integer(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => Value::Real(row.try_get_unchecked::<f64, _>(i)?),
                "BLOB" => Value::Blob(row.try_get_unchecked::<Vec<u8>, _>(i)?),
                _ => Value::Text(row.try_get_unchecked::<String, _>(i)?),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_database_round_trips_values() {
        let db = LocalSqlite::connect_lazy("sqlite::memory:", 4).unwrap();
        db.execute(&Statement::new("CREATE TABLE t (a INTEGER, b REAL, c TEXT, d BLOB)"))
            .await
            .unwrap();
        let done = db
            .execute(
                &Statement::new("INSERT INTO t (a, b, c, d) VALUES (?, ?, ?, ?)")
                    .bind(3)
                    .bind(0.5)
                    .bind(None::<String>)
                    .bind(vec![1u8, 2]),
            )
            .await
            .unwrap();
        assert_eq!(done.rows_affected, 1);
        assert_eq!(done.last_insert_id, Some(1));

        let rows = db.execute(&Statement::new("SELECT a, b, c, d FROM t")).await.unwrap();
        assert_eq!(rows.columns, vec!["a", "b", "c", "d"]);
        assert_eq!(
            rows.rows,
            vec![vec![
                Value::Integer(3),
                Value::Real(0.5),
                Value::Null,
                Value::Blob(vec![1, 2])
            ]]
        );
    }

    #[tokio::test]
    async fn sql_errors_propagate_from_the_driver() {
        let db = LocalSqlite::connect_lazy("sqlite::memory:", 1).unwrap();
        let err = db.execute(&Statement::new("SELECT * FROM missing")).await.unwrap_err();
        assert!(matches!(err, CrmError::DatabaseError(_)));
    }
}
