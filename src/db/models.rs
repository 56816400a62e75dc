use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::query::RowRef;
use crate::db::value::Value;
use crate::error::CrmError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    pub id: i64,
    pub name: String,
    pub domain: Option<String>,
    pub industry: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contact {
    pub id: i64,
    pub company_id: Option<i64>,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Deal {
    pub id: i64,
    pub company_id: Option<i64>,
    pub contact_id: Option<i64>,
    pub title: String,
    pub stage: String,
    pub amount: Option<f64>,
    pub closed: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Activity {
    pub id: i64,
    pub contact_id: Option<i64>,
    pub deal_id: Option<i64>,
    pub kind: String,
    pub notes: Option<String>,
    pub due_at: Option<DateTime<Utc>>,
    pub done: bool,
    pub created_at: DateTime<Utc>,
}

/// Typed column access over a result row.
struct Fields<'a>(RowRef<'a>);

impl Fields<'_> {
    fn decode<T>(&self, col: &str, f: impl Fn(&Value) -> Option<T>) -> Result<T, CrmError> {
        let v = self.0.require(col)?;
        f(v).ok_or_else(|| CrmError::InvalidQuery(format!("column `{col}` holds {v:?}")))
    }

    fn nullable<T>(
        &self,
        col: &str,
        f: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<T>, CrmError> {
        match self.0.require(col)? {
            Value::Null => Ok(None),
            _ => self.decode(col, f).map(Some),
        }
    }

    fn id(&self, col: &str) -> Result<i64, CrmError> {
        self.decode(col, Value::as_i64)
    }

    fn text(&self, col: &str) -> Result<String, CrmError> {
        self.decode(col, |v| v.as_str().map(str::to_string))
    }

    fn opt_text(&self, col: &str) -> Result<Option<String>, CrmError> {
        self.nullable(col, |v| v.as_str().map(str::to_string))
    }

    fn timestamp(&self, col: &str) -> Result<DateTime<Utc>, CrmError> {
        self.decode(col, Value::as_timestamp)
    }
}

impl TryFrom<RowRef<'_>> for Company {
    type Error = CrmError;

    fn try_from(row: RowRef<'_>) -> Result<Self, Self::Error> {
        let f = Fields(row);
        Ok(Self {
            id: f.id("id")?,
            name: f.text("name")?,
            domain: f.opt_text("domain")?,
            industry: f.opt_text("industry")?,
            created_at: f.timestamp("created_at")?,
        })
    }
}

impl TryFrom<RowRef<'_>> for Contact {
    type Error = CrmError;

    fn try_from(row: RowRef<'_>) -> Result<Self, Self::Error> {
        let f = Fields(row);
        Ok(Self {
            id: f.id("id")?,
            company_id: f.nullable("company_id", Value::as_i64)?,
            first_name: f.text("first_name")?,
            last_name: f.text("last_name")?,
            email: f.opt_text("email")?,
            phone: f.opt_text("phone")?,
            created_at: f.timestamp("created_at")?,
        })
    }
}

impl TryFrom<RowRef<'_>> for Deal {
    type Error = CrmError;

    fn try_from(row: RowRef<'_>) -> Result<Self, Self::Error> {
        let f = Fields(row);
        Ok(Self {
            id: f.id("id")?,
            company_id: f.nullable("company_id", Value::as_i64)?,
            contact_id: f.nullable("contact_id", Value::as_i64)?,
            title: f.text("title")?,
            stage: f.text("stage")?,
            amount: f.nullable("amount", Value::as_f64)?,
            closed: f.decode("closed", Value::as_bool)?,
            created_at: f.timestamp("created_at")?,
        })
    }
}

impl TryFrom<RowRef<'_>> for Activity {
    type Error = CrmError;

    fn try_from(row: RowRef<'_>) -> Result<Self, Self::Error> {
        let f = Fields(row);
        Ok(Self {
            id: f.id("id")?,
            contact_id: f.nullable("contact_id", Value::as_i64)?,
            deal_id: f.nullable("deal_id", Value::as_i64)?,
            kind: f.text("kind")?,
            notes: f.opt_text("notes")?,
            due_at: f.nullable("due_at", Value::as_timestamp)?,
            done: f.decode("done", Value::as_bool)?,
            created_at: f.timestamp("created_at")?,
        })
    }
}
