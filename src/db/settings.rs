//! Connection settings, read once from the process environment.
//!
//! | Variable             | Backend  | Meaning                          |
//! |----------------------|----------|----------------------------------|
//! | `TURSO_DATABASE_URL` | libsql   | `libsql://your-db.turso.io`      |
//! | `TURSO_AUTH_TOKEN`   | libsql   | token from the Turso dashboard   |
//! | `DATABASE_URL`       | postgres | full URI including credentials   |

use std::fmt;

use figment::{Figment, providers::Env};
use serde::{Deserialize, Deserializer};
use url::Url;

use crate::config::Backend;
use crate::error::CrmError;

pub const TURSO_DATABASE_URL: &str = "TURSO_DATABASE_URL";
pub const TURSO_AUTH_TOKEN: &str = "TURSO_AUTH_TOKEN";
pub const DATABASE_URL: &str = "DATABASE_URL";

/// Raw, unvalidated database variables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DatabaseEnv {
    #[serde(default, deserialize_with = "string_like")]
    pub turso_database_url: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub turso_auth_token: Option<String>,
    #[serde(default, deserialize_with = "string_like")]
    pub database_url: Option<String>,
}

/// Env values are parsed by figment, so a numeric-looking token arrives as a
/// number. Take it back as text.
fn string_like<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
        UInt(u64),
        Float(f64),
        Bool(bool),
    }
    Ok(Option::<Raw>::deserialize(d)?.map(|raw| match raw {
        Raw::Str(s) => s,
        Raw::Int(i) => i.to_string(),
        Raw::UInt(u) => u.to_string(),
        Raw::Float(f) => f.to_string(),
        Raw::Bool(b) => b.to_string(),
    }))
}

impl DatabaseEnv {
    pub fn figment() -> Figment {
        Figment::from(Env::raw().only(&[TURSO_DATABASE_URL, TURSO_AUTH_TOKEN, DATABASE_URL]))
    }

    pub fn load() -> Result<Self, CrmError> {
        Ok(Self::figment().extract()?)
    }
}

/// Where a libSQL handle sends statements.
#[derive(Clone, PartialEq, Eq)]
pub enum LibsqlTarget {
    /// Hrana-over-HTTP endpoint, already mapped to `http(s)://`.
    Remote(Url),
    /// A local SQLite database, as a `sqlite:` connection string.
    Local(String),
}

/// Validated settings for exactly one backend.
#[derive(Clone, PartialEq, Eq)]
pub enum ConnectionSettings {
    Libsql {
        target: LibsqlTarget,
        auth_token: Option<String>,
    },
    Postgres {
        url: String,
    },
}

impl ConnectionSettings {
    pub fn from_env(backend: Backend) -> Result<Self, CrmError> {
        Self::resolve(backend, DatabaseEnv::load()?)
    }

    pub fn resolve(backend: Backend, env: DatabaseEnv) -> Result<Self, CrmError> {
        match backend {
            Backend::Libsql => Self::libsql(
                env.turso_database_url.as_deref().unwrap_or_default(),
                env.turso_auth_token.as_deref(),
            ),
            Backend::Postgres => Self::postgres(env.database_url.as_deref().unwrap_or_default()),
        }
    }

    /// Remote endpoints need a token; `file:` and `:memory:` targets do not.
    pub fn libsql(url: &str, auth_token: Option<&str>) -> Result<Self, CrmError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CrmError::MissingSetting(TURSO_DATABASE_URL));
        }
        let auth_token = auth_token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string);

        if let Some(target) = local_target(url) {
            return Ok(Self::Libsql {
                target: LibsqlTarget::Local(target),
                auth_token,
            });
        }

        let parsed = Url::parse(url).map_err(|e| invalid(TURSO_DATABASE_URL, e))?;
        let scheme = match parsed.scheme() {
            "libsql" | "https" | "wss" => "https",
            "http" | "ws" => "http",
            other => {
                return Err(invalid(
                    TURSO_DATABASE_URL,
                    format!("unsupported scheme `{other}`"),
                ));
            }
        };
        if parsed.host_str().is_none_or(str::is_empty) {
            return Err(invalid(TURSO_DATABASE_URL, "missing host"));
        }
        let Some(auth_token) = auth_token else {
            return Err(CrmError::MissingSetting(TURSO_AUTH_TOKEN));
        };
        let remote = with_scheme(&parsed, scheme)?;
        Ok(Self::Libsql {
            target: LibsqlTarget::Remote(remote),
            auth_token: Some(auth_token),
        })
    }

    pub fn postgres(url: &str) -> Result<Self, CrmError> {
        let url = url.trim();
        if url.is_empty() {
            return Err(CrmError::MissingSetting(DATABASE_URL));
        }
        let parsed = Url::parse(url).map_err(|e| invalid(DATABASE_URL, e))?;
        if !matches!(parsed.scheme(), "postgres" | "postgresql") {
            return Err(invalid(
                DATABASE_URL,
                format!("unsupported scheme `{}`", parsed.scheme()),
            ));
        }
        Ok(Self::Postgres {
            url: url.to_string(),
        })
    }

    pub fn backend(&self) -> Backend {
        match self {
            Self::Libsql { .. } => Backend::Libsql,
            Self::Postgres { .. } => Backend::Postgres,
        }
    }

    /// Endpoint with credentials stripped, safe to log.
    pub fn redacted_url(&self) -> String {
        match self {
            Self::Libsql {
                target: LibsqlTarget::Remote(url),
                ..
            } => redact(url),
            Self::Libsql {
                target: LibsqlTarget::Local(path),
                ..
            } => path.clone(),
            Self::Postgres { url } => Url::parse(url)
                .map(|u| redact(&u))
                .unwrap_or_else(|_| "<unparseable>".to_string()),
        }
    }
}

impl fmt::Debug for ConnectionSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Libsql { auth_token, .. } => f
                .debug_struct("Libsql")
                .field("url", &self.redacted_url())
                .field("auth_token", &auth_token.as_ref().map(|_| "<redacted>"))
                .finish(),
            Self::Postgres { .. } => f
                .debug_struct("Postgres")
                .field("url", &self.redacted_url())
                .finish(),
        }
    }
}

impl fmt::Debug for LibsqlTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote(url) => f.debug_tuple("Remote").field(&redact(url)).finish(),
            Self::Local(path) => f.debug_tuple("Local").field(path).finish(),
        }
    }
}

fn invalid(name: &'static str, reason: impl ToString) -> CrmError {
    CrmError::InvalidSetting {
        name,
        reason: reason.to_string(),
    }
}

fn local_target(url: &str) -> Option<String> {
    if url == ":memory:" {
        return Some("sqlite::memory:".to_string());
    }
    let path = url.strip_prefix("file:")?;
    let path = path.strip_prefix("//").unwrap_or(path);
    if path.is_empty() || path == ":memory:" {
        return Some("sqlite::memory:".to_string());
    }
    Some(format!("sqlite:{path}"))
}

fn with_scheme(url: &Url, scheme: &str) -> Result<Url, CrmError> {
    if url.scheme() == scheme {
        return Ok(url.clone());
    }
    // `Url::set_scheme` refuses special/non-special swaps, so rebuild.
    let rest = &url.as_str()[url.scheme().len()..];
    Url::parse(&format!("{scheme}{rest}")).map_err(|e| invalid(TURSO_DATABASE_URL, e))
}

fn redact(url: &Url) -> String {
    let mut u = url.clone();
    if !u.username().is_empty() {
        let _ = u.set_username("***");
    }
    if u.password().is_some() {
        let _ = u.set_password(Some("***"));
    }
    u.set_query(None);
    u.to_string()
}
