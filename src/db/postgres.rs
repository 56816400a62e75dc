use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Column as _, Pool, Postgres, Row, TypeInfo, ValueRef};

use crate::db::query::{Param, Rows, Statement};
use crate::db::schema::ColumnType;
use crate::db::value::Value;
use crate::error::CrmError;

pub type PgPool = Pool<Postgres>;

/// Hosted PostgreSQL. `connect_lazy_with` defers the first connection (and
/// its TLS handshake) to the first query.
#[derive(Debug, Clone)]
pub struct PostgresDb {
    pool: PgPool,
}

impl PostgresDb {
    pub fn connect_lazy(url: &str, max_connections: u32) -> Result<Self, CrmError> {
        let opts = PgConnectOptions::from_str(url)?;
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect_lazy_with(opts);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn execute(&self, stmt: &Statement) -> Result<Rows, CrmError> {
        let mut query = sqlx::query::<Postgres>(&stmt.sql);
        for param in &stmt.params {
            query = bind(query, param);
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
                rows_affected: rows.len() as u64,
                rows,
                last_insert_id: None,
            })
        } else {
            let done = query.execute(&self.pool).await?;
            Ok(Rows {
                rows_affected: done.rows_affected(),
                ..Rows::default()
            })
        }
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// Postgres types every parameter, so NULLs are bound with the column's
/// type when the statement came from a builder.
fn bind<'q>(query: PgQuery<'q>, param: &Param) -> PgQuery<'q> {
    match (&param.value, param.ty) {
        (Value::Null, Some(ColumnType::Integer)) => query.bind(None::<i64>),
        (Value::Null, Some(ColumnType::Real)) => query.bind(None::<f64>),
        (Value::Null, Some(ColumnType::Boolean)) => query.bind(None::<bool>),
        (Value::Null, Some(ColumnType::Timestamp)) => query.bind(None::<DateTime<Utc>>),
        (Value::Null, _) => query.bind(None::<String>),
        (Value::Integer(i), _) => query.bind(*i),
        (Value::Real(f), _) => query.bind(*f),
        (Value::Bool(b), _) => query.bind(*b),
        (Value::Text(s), _) => query.bind(s.clone()),
        (Value::Blob(b), _) => query.bind(b.clone()),
        (Value::Timestamp(t), _) => query.bind(*t),
    }
}

fn row_values(row: &PgRow) -> Result<Vec<Value>, CrmError> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(Value::Null);
            }
            let kind = raw.type_info().name().to_string();
            Ok(match kind.as_str() {
                "INT2" => Value::Integer(row.try_get::<i16, _>(i)?.into()),
                "INT4" => Value::Integer(row.try_get::<i32, _>(i)?.into()),
                "INT8" => Value::Integer(row.try_get::<i64, _>(i)?),
                "FLOAT4" => Value::Real(row.try_get::<f32, _>(i)?.into()),
                "FLOAT8" => Value::Real(row.try_get::<f64, _>(i)?),
                "BOOL" => Value::Bool(row.try_get::<bool, _>(i)?),
                "BYTEA" => Value::Blob(row.try_get::<Vec<u8>, _>(i)?),
                "TIMESTAMPTZ" => Value::Timestamp(row.try_get::<DateTime<Utc>, _>(i)?),
                "TIMESTAMP" => Value::Timestamp(row.try_get::<NaiveDateTime, _>(i)?.and_utc()),
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
                    Value::Text(row.try_get::<String, _>(i)?)
                }
                other => {
                    return Err(CrmError::InvalidQuery(format!(
                        "column {i} has unsupported type {other}"
                    )));
                }
            })
        })
        .collect()
}
