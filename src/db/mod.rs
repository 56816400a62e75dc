//! Database module: one handle per process, bound to the CRM schema.
//!
//! Layout:
//! - `settings.rs`: environment-provided connection settings and validation
//! - `schema.rs`: table definitions and the DDL generated from them
//! - `query.rs`: schema-checked builders, statements and result rows
//! - `libsql.rs` / `sqlite.rs` / `postgres.rs`: the drivers behind [`Executor`]
//! - `models.rs`: typed rows for the CRM tables

pub mod libsql;
pub mod models;
pub mod postgres;
pub mod query;
pub mod schema;
pub mod settings;
pub mod sqlite;
pub mod value;

use std::future::Future;

use tracing::{debug, info};

use crate::config::Backend;
use crate::error::CrmError;
use settings::TURSO_AUTH_TOKEN;

pub use libsql::HranaClient;
pub use models::{Activity, Company, Contact, Deal};
pub use postgres::PostgresDb;
pub use query::{
    BuildStatement, Delete, Dialect, Insert, Order, RowRef, Rows, Select, Statement, Update,
};
pub use schema::{CRM_SCHEMA, Schema};
pub use settings::{ConnectionSettings, DatabaseEnv, LibsqlTarget};
pub use sqlite::LocalSqlite;
pub use value::Value;

/// Runs fully rendered statements. Drivers differ in transport; results
/// come back in the same [`Rows`] shape from all of them.
pub trait Executor: Send + Sync {
    fn dialect(&self) -> Dialect;

    fn execute(&self, stmt: &Statement) -> impl Future<Output = Result<Rows, CrmError>> + Send;
}

impl Executor for HranaClient {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, stmt: &Statement) -> impl Future<Output = Result<Rows, CrmError>> + Send {
        HranaClient::execute(self, stmt)
    }
}

impl Executor for LocalSqlite {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn execute(&self, stmt: &Statement) -> impl Future<Output = Result<Rows, CrmError>> + Send {
        LocalSqlite::execute(self, stmt)
    }
}

impl Executor for PostgresDb {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn execute(&self, stmt: &Statement) -> impl Future<Output = Result<Rows, CrmError>> + Send {
        PostgresDb::execute(self, stmt)
    }
}

/// The driver chosen by [`ConnectionSettings`].
#[derive(Debug, Clone)]
pub enum Driver {
    Remote(HranaClient),
    Local(LocalSqlite),
    Postgres(PostgresDb),
}

impl Executor for Driver {
    fn dialect(&self) -> Dialect {
        match self {
            Driver::Remote(d) => d.dialect(),
            Driver::Local(d) => d.dialect(),
            Driver::Postgres(d) => d.dialect(),
        }
    }

    async fn execute(&self, stmt: &Statement) -> Result<Rows, CrmError> {
        match self {
            Driver::Remote(d) => d.execute(stmt).await,
            Driver::Local(d) => d.execute(stmt).await,
            Driver::Postgres(d) => d.execute(stmt).await,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DbOptions {
    pub max_connections: u32,
}

impl Default for DbOptions {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// Process-wide database handle: a driver bound to a schema.
///
/// Built once at startup and shared by reference; construction performs no
/// I/O, so a bad endpoint surfaces on the first statement.
#[derive(Debug, Clone)]
pub struct Db {
    driver: Driver,
    backend: Backend,
    schema: &'static Schema,
}

impl Db {
    pub fn connect(settings: &ConnectionSettings, opts: DbOptions) -> Result<Self, CrmError> {
        Self::connect_with_schema(settings, opts, &CRM_SCHEMA)
    }

    pub fn connect_with_schema(
        settings: &ConnectionSettings,
        opts: DbOptions,
        schema: &'static Schema,
    ) -> Result<Self, CrmError> {
        let driver = match settings {
            ConnectionSettings::Libsql {
                target: LibsqlTarget::Remote(url),
                auth_token,
            } => {
                let token = auth_token
                    .as_deref()
                    .ok_or(CrmError::MissingSetting(TURSO_AUTH_TOKEN))?;
                Driver::Remote(HranaClient::new(url, token)?)
            }
            ConnectionSettings::Libsql {
                target: LibsqlTarget::Local(path),
                ..
            } => Driver::Local(LocalSqlite::connect_lazy(path, opts.max_connections)?),
            ConnectionSettings::Postgres { url } => {
                Driver::Postgres(PostgresDb::connect_lazy(url, opts.max_connections)?)
            }
        };
        info!(
            backend = settings.backend().as_str(),
            url = %settings.redacted_url(),
            "database handle ready"
        );
        Ok(Self {
            driver,
            backend: settings.backend(),
            schema,
        })
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    pub fn schema(&self) -> &'static Schema {
        self.schema
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn select(&self, table: &str) -> Select {
        Select::new(self.schema, table)
    }

    pub fn insert(&self, table: &str) -> Insert {
        Insert::new(self.schema, table)
    }

    pub fn update(&self, table: &str) -> Update {
        Update::new(self.schema, table)
    }

    pub fn delete(&self, table: &str) -> Delete {
        Delete::new(self.schema, table)
    }

    /// Render `query` for this backend and run it. Builder results are
    /// reshaped by the table's column types so both backends agree.
    pub async fn run(&self, query: impl BuildStatement) -> Result<Rows, CrmError> {
        let stmt = query.build(self.dialect())?;
        debug!(sql = %stmt.sql, params = stmt.params.len(), "executing statement");
        let rows = self.driver.execute(&stmt).await?;
        Ok(match stmt.table {
            Some(table) => rows.normalize(table),
            None => rows,
        })
    }

    /// Run a query and decode every row into `T`.
    pub async fn fetch<T>(&self, query: impl BuildStatement) -> Result<Vec<T>, CrmError>
    where
        T: for<'r> TryFrom<RowRef<'r>, Error = CrmError>,
    {
        let rows = self.run(query).await?;
        rows.iter().map(T::try_from).collect()
    }

    pub async fn ping(&self) -> Result<(), CrmError> {
        self.run(Statement::new("SELECT 1")).await.map(|_| ())
    }

    /// Create any missing tables of the bound schema.
    pub async fn init_schema(&self) -> Result<(), CrmError> {
        for sql in self.schema.init_statements(self.dialect()) {
            self.driver.execute(&Statement::new(sql)).await?;
        }
        info!(tables = self.schema.tables.len(), "schema initialized");
        Ok(())
    }
}
