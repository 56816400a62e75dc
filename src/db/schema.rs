//! Table definitions for the CRM and the DDL generated from them.
//! The same definitions drive DDL for both dialects and validate queries
//! built through [`crate::db::query`].

use std::fmt::Write as _;

use crate::db::query::{Dialect, quote_ident};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
}

impl ColumnType {
    fn sql(&self, dialect: Dialect) -> &'static str {
        match (dialect, self) {
            (Dialect::Sqlite, ColumnType::Integer) => "INTEGER",
            (Dialect::Sqlite, ColumnType::Real) => "REAL",
            (Dialect::Sqlite, ColumnType::Text) => "TEXT",
            (Dialect::Sqlite, ColumnType::Boolean) => "INTEGER",
            // RFC3339 / CURRENT_TIMESTAMP text
            (Dialect::Sqlite, ColumnType::Timestamp) => "TEXT",
            (Dialect::Postgres, ColumnType::Integer) => "BIGINT",
            (Dialect::Postgres, ColumnType::Real) => "DOUBLE PRECISION",
            (Dialect::Postgres, ColumnType::Text) => "TEXT",
            (Dialect::Postgres, ColumnType::Boolean) => "BOOLEAN",
            (Dialect::Postgres, ColumnType::Timestamp) => "TIMESTAMPTZ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnDefault {
    Now,
    False,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub primary_key: bool,
    pub default: Option<ColumnDefault>,
    /// `(table, column)` this column references.
    pub references: Option<(&'static str, &'static str)>,
}

impl Column {
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: false,
            primary_key: false,
            default: None,
            references: None,
        }
    }

    pub const fn id() -> Self {
        let mut c = Self::new("id", ColumnType::Integer);
        c.primary_key = true;
        c
    }

    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub const fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub const fn references(mut self, table: &'static str, column: &'static str) -> Self {
        self.references = Some((table, column));
        self
    }

    /// Whether an INSERT must supply this column.
    pub fn required_on_insert(&self) -> bool {
        !self.nullable && !self.primary_key && self.default.is_none()
    }

    fn definition(&self, dialect: Dialect) -> String {
        let mut def = quote_ident(self.name);
        if self.primary_key {
            def.push_str(match dialect {
                Dialect::Sqlite => " INTEGER PRIMARY KEY AUTOINCREMENT",
                Dialect::Postgres => " BIGINT GENERATED BY DEFAULT AS IDENTITY PRIMARY KEY",
            });
            return def;
        }
        let _ = write!(def, " {}", self.ty.sql(dialect));
        if !self.nullable {
            def.push_str(" NOT NULL");
        }
        match (self.default, dialect) {
            (Some(ColumnDefault::Now), Dialect::Sqlite) => def.push_str(" DEFAULT CURRENT_TIMESTAMP"),
            (Some(ColumnDefault::Now), Dialect::Postgres) => def.push_str(" DEFAULT now()"),
            (Some(ColumnDefault::False), Dialect::Sqlite) => def.push_str(" DEFAULT 0"),
            (Some(ColumnDefault::False), Dialect::Postgres) => def.push_str(" DEFAULT FALSE"),
            (None, _) => {}
        }
        if let Some((table, column)) = self.references {
            let _ = write!(
                def,
                " REFERENCES {}({}) ON DELETE SET NULL",
                quote_ident(table),
                quote_ident(column)
            );
        }
        def
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&'static Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn create_sql(&self, dialect: Dialect) -> String {
        let cols: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("    {}", c.definition(dialect)))
            .collect();
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            quote_ident(self.name),
            cols.join(",\n")
        )
    }
}

#[derive(Debug)]
pub struct Schema {
    pub tables: &'static [Table],
}

impl Schema {
    pub fn table(&self, name: &str) -> Option<&'static Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// One `CREATE TABLE IF NOT EXISTS` per table, in dependency order.
    pub fn init_statements(&self, dialect: Dialect) -> Vec<String> {
        self.tables.iter().map(|t| t.create_sql(dialect)).collect()
    }
}

use ColumnDefault::{False, Now};
use ColumnType::{Boolean, Integer, Real, Text, Timestamp};

const COMPANIES: &[Column] = &[
    Column::id(),
    Column::new("name", Text),
    Column::new("domain", Text).nullable(),
    Column::new("industry", Text).nullable(),
    Column::new("created_at", Timestamp).default(Now),
];

const CONTACTS: &[Column] = &[
    Column::id(),
    Column::new("company_id", Integer)
        .nullable()
        .references("companies", "id"),
    Column::new("first_name", Text),
    Column::new("last_name", Text),
    Column::new("email", Text).nullable(),
    Column::new("phone", Text).nullable(),
    Column::new("created_at", Timestamp).default(Now),
];

const DEALS: &[Column] = &[
    Column::id(),
    Column::new("company_id", Integer)
        .nullable()
        .references("companies", "id"),
    Column::new("contact_id", Integer)
        .nullable()
        .references("contacts", "id"),
    Column::new("title", Text),
    Column::new("stage", Text),
    Column::new("amount", Real).nullable(),
    Column::new("closed", Boolean).default(False),
    Column::new("created_at", Timestamp).default(Now),
];

const ACTIVITIES: &[Column] = &[
    Column::id(),
    Column::new("contact_id", Integer)
        .nullable()
        .references("contacts", "id"),
    Column::new("deal_id", Integer)
        .nullable()
        .references("deals", "id"),
    Column::new("kind", Text),
    Column::new("notes", Text).nullable(),
    Column::new("due_at", Timestamp).nullable(),
    Column::new("done", Boolean).default(False),
    Column::new("created_at", Timestamp).default(Now),
];

pub static CRM_SCHEMA: Schema = Schema {
    tables: &[
        Table {
            name: "companies",
            columns: COMPANIES,
        },
        Table {
            name: "contacts",
            columns: CONTACTS,
        },
        Table {
            name: "deals",
            columns: DEALS,
        },
        Table {
            name: "activities",
            columns: ACTIVITIES,
        },
    ],
};
