//! Schema-checked query builders and the driver-neutral statement/result
//! types every backend speaks.

use crate::db::schema::{Column, ColumnType, Schema, Table};
use crate::db::value::Value;
use crate::error::CrmError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// `?` placeholders; libSQL remote and local SQLite.
    Sqlite,
    /// `$n` placeholders.
    Postgres,
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// A bound parameter. `ty` is known when the statement came from a builder
/// and lets typed drivers bind NULLs with the right type.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub value: Value,
    pub ty: Option<ColumnType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Param>,
    pub returns_rows: bool,
    /// Table whose column types shape the result, for builder statements.
    pub(crate) table: Option<&'static Table>,
}

impl Statement {
    /// Raw SQL. Whether it yields rows is inferred from the leading keyword
    /// or a `RETURNING` clause.
    pub fn new(sql: impl Into<String>) -> Self {
        let sql = sql.into();
        let head = sql.trim_start().to_ascii_uppercase();
        let returns_rows = ["SELECT", "WITH", "VALUES", "PRAGMA", "EXPLAIN"]
            .iter()
            .any(|kw| head.starts_with(kw))
            || head.split_whitespace().any(|w| w == "RETURNING");
        Self {
            sql,
            params: Vec::new(),
            returns_rows,
            table: None,
        }
    }

    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(Param {
            value: value.into(),
            ty: None,
        });
        self
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> {
        self.params.iter().map(|p| &p.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

/// Result of executing one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Rows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

impl Rows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = RowRef<'_>> {
        self.rows.iter().map(|values| RowRef {
            columns: &self.columns,
            values,
        })
    }

    pub fn first(&self) -> Option<RowRef<'_>> {
        self.iter().next()
    }

    /// Reshape values according to the declared column types of `table`.
    pub(crate) fn normalize(mut self, table: &Table) -> Self {
        let types: Vec<Option<ColumnType>> = self
            .columns
            .iter()
            .map(|c| table.column(c).map(|col| col.ty))
            .collect();
        for row in &mut self.rows {
            for (value, ty) in row.iter_mut().zip(&types) {
                if let Some(ty) = ty {
                    *value = std::mem::replace(value, Value::Null).normalize(*ty);
                }
            }
        }
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RowRef<'a> {
    columns: &'a [String],
    values: &'a [Value],
}

impl<'a> RowRef<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.values.get(idx)
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    /// Like [`RowRef::get`] but reports the missing column as an error.
    pub fn require(&self, column: &str) -> Result<&'a Value, CrmError> {
        self.get(column)
            .ok_or_else(|| CrmError::InvalidQuery(format!("result has no column `{column}`")))
    }
}

struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Param>,
}

impl SqlWriter {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, s: &str) {
        self.sql.push_str(s);
    }

    fn ident(&mut self, name: &str) {
        self.sql.push_str(&quote_ident(name));
    }

    fn param(&mut self, value: Value, ty: ColumnType) {
        self.params.push(Param {
            value,
            ty: Some(ty),
        });
        match self.dialect {
            Dialect::Sqlite => self.sql.push('?'),
            Dialect::Postgres => self.sql.push_str(&format!("${}", self.params.len())),
        }
    }

    fn filters(&mut self, filters: &[(&'static Column, Value)]) {
        for (i, (col, value)) in filters.iter().enumerate() {
            self.push(if i == 0 { " WHERE " } else { " AND " });
            self.ident(col.name);
            if value.is_null() {
                self.push(" IS NULL");
            } else {
                self.push(" = ");
                self.param(value.clone(), col.ty);
            }
        }
    }

    fn returning(&mut self, columns: &[&'static Column]) {
        if columns.is_empty() {
            return;
        }
        self.push(" RETURNING ");
        self.column_list(columns);
    }

    fn column_list(&mut self, columns: &[&'static Column]) {
        for (i, col) in columns.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(col.name);
        }
    }

    fn finish(self, returns_rows: bool, table: &'static Table) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
            returns_rows,
            table: Some(table),
        }
    }
}

/// Table lookup plus the first validation error, reported at build time so
/// builder chains stay infallible.
#[derive(Debug)]
struct Scope {
    table: Option<&'static Table>,
    error: Option<CrmError>,
}

impl Scope {
    fn new(schema: &Schema, table: &str) -> Self {
        match schema.table(table) {
            Some(t) => Self {
                table: Some(t),
                error: None,
            },
            None => Self {
                table: None,
                error: Some(CrmError::UnknownTable(table.to_string())),
            },
        }
    }

    fn fail(&mut self, err: CrmError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn column(&mut self, name: &str) -> Option<&'static Column> {
        let table = self.table?;
        let col = table.column(name);
        if col.is_none() {
            self.fail(CrmError::UnknownColumn {
                table: table.name.to_string(),
                column: name.to_string(),
            });
        }
        col
    }

    fn value(&mut self, name: &str, value: Value) -> Option<(&'static Column, Value)> {
        let col = self.column(name)?;
        let table = self.table?.name;
        match value.coerce_for(table, col) {
            Ok(v) => Some((col, v)),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    fn finish(self) -> Result<&'static Table, CrmError> {
        match (self.error, self.table) {
            (Some(e), _) => Err(e),
            (None, Some(t)) => Ok(t),
            (None, None) => Err(CrmError::InvalidQuery("no table".to_string())),
        }
    }
}

/// Anything that renders to a [`Statement`] for a dialect.
pub trait BuildStatement {
    fn build(self, dialect: Dialect) -> Result<Statement, CrmError>;
}

impl BuildStatement for Statement {
    fn build(self, _dialect: Dialect) -> Result<Statement, CrmError> {
        Ok(self)
    }
}

#[derive(Debug)]
pub struct Select {
    scope: Scope,
    columns: Vec<&'static Column>,
    filters: Vec<(&'static Column, Value)>,
    order_by: Vec<(&'static Column, Order)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Select {
    pub fn new(schema: &Schema, table: &str) -> Self {
        Self {
            scope: Scope::new(schema, table),
            columns: Vec::new(),
            filters: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Restrict the projection; all columns are selected otherwise.
    pub fn columns(mut self, names: &[&str]) -> Self {
        for name in names {
            if let Some(col) = self.scope.column(name) {
                self.columns.push(col);
            }
        }
        self
    }

    pub fn filter(mut self, column: &str, value: impl Into<Value>) -> Self {
        if let Some(pair) = self.scope.value(column, value.into()) {
            self.filters.push(pair);
        }
        self
    }

    pub fn order_by(mut self, column: &str, order: Order) -> Self {
        if let Some(col) = self.scope.column(column) {
            self.order_by.push((col, order));
        }
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

impl BuildStatement for Select {
    fn build(self, dialect: Dialect) -> Result<Statement, CrmError> {
        let table = self.scope.finish()?;
        let columns: Vec<&'static Column> = if self.columns.is_empty() {
            table.columns.iter().collect()
        } else {
            self.columns
        };
        let mut w = SqlWriter::new(dialect);
        w.push("SELECT ");
        w.column_list(&columns);
        w.push(" FROM ");
        w.ident(table.name);
        w.filters(&self.filters);
        for (i, (col, order)) in self.order_by.iter().enumerate() {
            w.push(if i == 0 { " ORDER BY " } else { ", " });
            w.ident(col.name);
            w.push(match order {
                Order::Asc => " ASC",
                Order::Desc => " DESC",
            });
        }
        match (self.limit, self.offset) {
            (Some(limit), _) => w.push(&format!(" LIMIT {limit}")),
            // SQLite needs a LIMIT before OFFSET
            (None, Some(_)) if dialect == Dialect::Sqlite => w.push(" LIMIT -1"),
            _ => {}
        }
        if let Some(offset) = self.offset {
            w.push(&format!(" OFFSET {offset}"));
        }
        Ok(w.finish(true, table))
    }
}

#[derive(Debug)]
pub struct Insert {
    scope: Scope,
    values: Vec<(&'static Column, Value)>,
    returning: Vec<&'static Column>,
}

impl Insert {
    pub fn new(schema: &Schema, table: &str) -> Self {
        Self {
            scope: Scope::new(schema, table),
            values: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn value(mut self, column: &str, value: impl Into<Value>) -> Self {
        if let Some(pair) = self.scope.value(column, value.into()) {
            self.values.push(pair);
        }
        self
    }

    pub fn returning(mut self, names: &[&str]) -> Self {
        for name in names {
            if let Some(col) = self.scope.column(name) {
                self.returning.push(col);
            }
        }
        self
    }
}

impl BuildStatement for Insert {
    fn build(self, dialect: Dialect) -> Result<Statement, CrmError> {
        let table = self.scope.finish()?;
        for col in table.columns.iter().filter(|c| c.required_on_insert()) {
            let supplied = self
                .values
                .iter()
                .any(|(c, v)| c.name == col.name && !v.is_null());
            if !supplied {
                return Err(CrmError::InvalidQuery(format!(
                    "insert into {} requires {}",
                    table.name, col.name
                )));
            }
        }
        let mut w = SqlWriter::new(dialect);
        w.push("INSERT INTO ");
        w.ident(table.name);
        let columns: Vec<&'static Column> = self.values.iter().map(|(c, _)| *c).collect();
        w.push(" (");
        w.column_list(&columns);
        w.push(") VALUES (");
        for (i, (col, value)) in self.values.into_iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.param(value, col.ty);
        }
        w.push(")");
        w.returning(&self.returning);
        Ok(w.finish(!self.returning.is_empty(), table))
    }
}

#[derive(Debug)]
pub struct Update {
    scope: Scope,
    sets: Vec<(&'static Column, Value)>,
    filters: Vec<(&'static Column, Value)>,
    returning: Vec<&'static Column>,
}

impl Update {
    pub fn new(schema: &Schema, table: &str) -> Self {
        Self {
            scope: Scope::new(schema, table),
            sets: Vec::new(),
            filters: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn set(mut self, column: &str, value: impl Into<Value>) -> Self {
        if let Some(pair) = self.scope.value(column, value.into()) {
            self.sets.push(pair);
        }
        self
    }

    pub fn filter(mut self, column: &str, value: impl Into<Value>) -> Self {
        if let Some(pair) = self.scope.value(column, value.into()) {
            self.filters.push(pair);
        }
        self
    }

    pub fn returning(mut self, names: &[&str]) -> Self {
        for name in names {
            if let Some(col) = self.scope.column(name) {
                self.returning.push(col);
            }
        }
        self
    }
}

impl BuildStatement for Update {
    fn build(self, dialect: Dialect) -> Result<Statement, CrmError> {
        let table = self.scope.finish()?;
        if self.sets.is_empty() {
            return Err(CrmError::InvalidQuery(format!(
                "update of {} sets no columns",
                table.name
            )));
        }
        for (col, value) in &self.sets {
            if value.is_null() && !col.nullable {
                return Err(CrmError::InvalidQuery(format!(
                    "{}.{} is not nullable",
                    table.name, col.name
                )));
            }
        }
        let mut w = SqlWriter::new(dialect);
        w.push("UPDATE ");
        w.ident(table.name);
        w.push(" SET ");
        for (i, (col, value)) in self.sets.into_iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.ident(col.name);
            w.push(" = ");
            w.param(value, col.ty);
        }
        w.filters(&self.filters);
        w.returning(&self.returning);
        Ok(w.finish(!self.returning.is_empty(), table))
    }
}

#[derive(Debug)]
pub struct Delete {
    scope: Scope,
    filters: Vec<(&'static Column, Value)>,
    returning: Vec<&'static Column>,
}

impl Delete {
    pub fn new(schema: &Schema, table: &str) -> Self {
        Self {
            scope: Scope::new(schema, table),
            filters: Vec::new(),
            returning: Vec::new(),
        }
    }

    pub fn filter(mut self, column: &str, value: impl Into<Value>) -> Self {
        if let Some(pair) = self.scope.value(column, value.into()) {
            self.filters.push(pair);
        }
        self
    }

    pub fn returning(mut self, names: &[&str]) -> Self {
        for name in names {
            if let Some(col) = self.scope.column(name) {
                self.returning.push(col);
            }
        }
        self
    }
}

impl BuildStatement for Delete {
    fn build(self, dialect: Dialect) -> Result<Statement, CrmError> {
        let table = self.scope.finish()?;
        let mut w = SqlWriter::new(dialect);
        w.push("DELETE FROM ");
        w.ident(table.name);
        w.filters(&self.filters);
        w.returning(&self.returning);
        Ok(w.finish(!self.returning.is_empty(), table))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schema::CRM_SCHEMA;

    #[test]
    fn select_renders_placeholders_per_dialect() {
        let build = |d: Dialect| {
            Select::new(&CRM_SCHEMA, "contacts")
                .columns(&["id", "email"])
                .filter("company_id", 7)
                .filter("last_name", "Lovelace")
                .order_by("id", Order::Desc)
                .limit(10)
                .build(d)
                .unwrap()
        };
        let sqlite = build(Dialect::Sqlite);
        assert_eq!(
            sqlite.sql,
            "SELECT \"id\", \"email\" FROM \"contacts\" WHERE \"company_id\" = ? AND \"last_name\" = ? ORDER BY \"id\" DESC LIMIT 10"
        );
        assert!(sqlite.returns_rows);

        let pg = build(Dialect::Postgres);
        assert!(pg.sql.contains("\"company_id\" = $1 AND \"last_name\" = $2"));
        assert_eq!(
            pg.values().cloned().collect::<Vec<_>>(),
            vec![Value::Integer(7), Value::from("Lovelace")]
        );
    }

    #[test]
    fn null_filters_become_is_null() {
        let stmt = Select::new(&CRM_SCHEMA, "contacts")
            .filter("email", None::<String>)
            .build(Dialect::Postgres)
            .unwrap();
        assert!(stmt.sql.ends_with("WHERE \"email\" IS NULL"));
        assert!(stmt.params.is_empty());
    }

    #[test]
    fn offset_without_limit_on_sqlite() {
        let stmt = Select::new(&CRM_SCHEMA, "deals")
            .offset(20)
            .build(Dialect::Sqlite)
            .unwrap();
        assert!(stmt.sql.ends_with(" LIMIT -1 OFFSET 20"));
    }

    #[test]
    fn unknown_table_and_column_are_reported() {
        let err = Select::new(&CRM_SCHEMA, "leads").build(Dialect::Sqlite).unwrap_err();
        assert!(matches!(err, CrmError::UnknownTable(t) if t == "leads"));

        let err = Select::new(&CRM_SCHEMA, "deals")
            .filter("owner", 1)
            .order_by("stage", Order::Asc)
            .build(Dialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, CrmError::UnknownColumn { column, .. } if column == "owner"));
    }

    #[test]
    fn insert_checks_required_columns_and_types() {
        let stmt = Insert::new(&CRM_SCHEMA, "deals")
            .value("title", "Renewal")
            .value("stage", "proposal")
            .value("amount", 1200)
            .returning(&["id"])
            .build(Dialect::Postgres)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO \"deals\" (\"title\", \"stage\", \"amount\") VALUES ($1, $2, $3) RETURNING \"id\""
        );
        assert_eq!(stmt.params[2].value, Value::Real(1200.0));
        assert_eq!(stmt.params[2].ty, Some(ColumnType::Real));
        assert!(stmt.returns_rows);

        let err = Insert::new(&CRM_SCHEMA, "deals")
            .value("title", "No stage")
            .build(Dialect::Sqlite)
            .unwrap_err();
        assert!(err.to_string().contains("requires stage"));

        let err = Insert::new(&CRM_SCHEMA, "deals")
            .value("title", "x")
            .value("stage", 3)
            .build(Dialect::Sqlite)
            .unwrap_err();
        assert!(matches!(err, CrmError::InvalidQuery(_)));
    }

    #[test]
    fn update_and_delete_render_filters_after_body() {
        let stmt = Update::new(&CRM_SCHEMA, "deals")
            .set("closed", true)
            .set("stage", "won")
            .filter("id", 3)
            .build(Dialect::Postgres)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "UPDATE \"deals\" SET \"closed\" = $1, \"stage\" = $2 WHERE \"id\" = $3"
        );
        assert!(!stmt.returns_rows);

        let err = Update::new(&CRM_SCHEMA, "deals")
            .set("title", None::<String>)
            .build(Dialect::Sqlite)
            .unwrap_err();
        assert!(err.to_string().contains("not nullable"));

        let stmt = Delete::new(&CRM_SCHEMA, "activities")
            .filter("done", true)
            .returning(&["id"])
            .build(Dialect::Sqlite)
            .unwrap();
        assert_eq!(
            stmt.sql,
            "DELETE FROM \"activities\" WHERE \"done\" = ? RETURNING \"id\""
        );
    }

    #[test]
    fn raw_statements_infer_row_shape() {
        assert!(Statement::new("select 1").returns_rows);
        assert!(Statement::new("  WITH x AS (SELECT 1) SELECT * FROM x").returns_rows);
        assert!(!Statement::new("DELETE FROM deals").returns_rows);
        assert!(Statement::new("DELETE FROM deals RETURNING id").returns_rows);
        assert!(Statement::new("UPDATE deals SET closed = 1\nRETURNING\n  id").returns_rows);
        assert!(Statement::new("DELETE FROM deals\treturning\tid").returns_rows);
        assert!(Statement::new("INSERT INTO companies (name) VALUES ('x') RETURNING").returns_rows);
        assert!(!Statement::new("UPDATE deals SET stage = 'returning_customer'").returns_rows);
    }

    #[test]
    fn rows_are_normalized_by_table_types() {
        let table = CRM_SCHEMA.table("deals").unwrap();
        let rows = Rows {
            columns: vec!["closed".into(), "amount".into(), "title".into()],
            rows: vec![vec![Value::Integer(1), Value::Integer(10), Value::from("t")]],
            ..Rows::default()
        }
        .normalize(table);
        let row = rows.first().unwrap();
        assert_eq!(row.get("closed"), Some(&Value::Bool(true)));
        assert_eq!(row.get("amount"), Some(&Value::Real(10.0)));
        assert!(row.require("missing").is_err());
    }
}
