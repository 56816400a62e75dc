//! libSQL remote driver speaking the Hrana-over-HTTP pipeline protocol.
//!
//! Each statement is one `POST {base}/v2/pipeline` carrying an `execute`
//! request followed by `close`, so no server-side stream outlives a call.

use std::time::Duration;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::db::query::{Rows, Statement};
use crate::db::settings::TURSO_AUTH_TOKEN;
use crate::db::value::{Value, sqlite_timestamp};
use crate::error::CrmError;

const BLOB_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Serialize)]
struct PipelineRequest<'a> {
    baton: Option<String>,
    requests: Vec<StreamRequest<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamRequest<'a> {
    Execute { stmt: HranaStmt<'a> },
    Close,
}

#[derive(Debug, Serialize)]
struct HranaStmt<'a> {
    sql: &'a str,
    args: Vec<HranaValue>,
    want_rows: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub(crate) enum HranaValue {
    Null,
    /// Integers travel as decimal strings to survive JSON number precision.
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

impl TryFrom<&Value> for HranaValue {
    type Error = CrmError;

    fn try_from(v: &Value) -> Result<Self, Self::Error> {
        Ok(match v {
            Value::Null => HranaValue::Null,
            Value::Integer(i) => HranaValue::Integer {
                value: i.to_string(),
            },
            Value::Bool(b) => HranaValue::Integer {
                value: i64::from(*b).to_string(),
            },
            // JSON has no NaN or infinity.
            Value::Real(f) if !f.is_finite() => {
                return Err(CrmError::InvalidQuery(format!(
                    "non-finite real {f} cannot be sent to libSQL"
                )));
            }
            Value::Real(f) => HranaValue::Float { value: *f },
            Value::Text(s) => HranaValue::Text { value: s.clone() },
            Value::Timestamp(t) => HranaValue::Text {
                value: sqlite_timestamp(t),
            },
            Value::Blob(b) => HranaValue::Blob {
                base64: BLOB_ENGINE.encode(b),
            },
        })
    }
}

impl TryFrom<HranaValue> for Value {
    type Error = CrmError;

    fn try_from(v: HranaValue) -> Result<Self, Self::Error> {
        Ok(match v {
            HranaValue::Null => Value::Null,
            HranaValue::Integer { value } => {
                Value::Integer(value.parse().map_err(|_| protocol(format!(
                    "integer value `{value}` out of range"
                )))?)
            }
            HranaValue::Float { value } => Value::Real(value),
            HranaValue::Text { value } => Value::Text(value),
            HranaValue::Blob { base64 } => Value::Blob(
                BLOB_ENGINE
                    .decode(base64.as_bytes())
                    .map_err(|e| protocol(format!("bad blob: {e}")))?,
            ),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PipelineResponse {
    results: Vec<StreamResult>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: HranaError },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamResponse {
    Execute { result: StmtResult },
    Close {},
}

#[derive(Debug, Deserialize)]
struct HranaError {
    message: String,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StmtResult {
    cols: Vec<HranaCol>,
    rows: Vec<Vec<HranaValue>>,
    affected_row_count: u64,
    #[serde(default)]
    last_insert_rowid: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HranaCol {
    #[serde(default)]
    name: Option<String>,
}

fn protocol(message: String) -> CrmError {
    CrmError::Libsql {
        message,
        code: None,
    }
}

/// HTTP client bound to one libSQL database. Building it opens nothing;
/// the first request happens on the first statement.
#[derive(Debug, Clone)]
pub struct HranaClient {
    client: reqwest::Client,
    pipeline_url: Url,
}

impl HranaClient {
    pub fn new(base: &Url, auth_token: &str) -> Result<Self, CrmError> {
        let mut headers = HeaderMap::new();
        let mut bearer =
            HeaderValue::from_str(&format!("Bearer {auth_token}")).map_err(|e| {
                CrmError::InvalidSetting {
                    name: TURSO_AUTH_TOKEN,
                    reason: e.to_string(),
                }
            })?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .user_agent(concat!("crm-shell/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()?;

        let mut base = base.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let pipeline_url = base.join("v2/pipeline")?;
        Ok(Self {
            client,
            pipeline_url,
        })
    }

    pub fn pipeline_url(&self) -> &Url {
        &self.pipeline_url
    }

    pub async fn execute(&self, stmt: &Statement) -> Result<Rows, CrmError> {
        let args = stmt
            .values()
            .map(HranaValue::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        let body = PipelineRequest {
            baton: None,
            requests: vec![
                StreamRequest::Execute {
                    stmt: HranaStmt {
                        sql: &stmt.sql,
                        args,
                        want_rows: stmt.returns_rows,
                    },
                },
                StreamRequest::Close,
            ],
        };

        let resp = self
            .client
            .post(self.pipeline_url.clone())
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            debug!(status = %status, body = %text, "libsql pipeline rejected");
            return Err(CrmError::Libsql {
                message: format!("HTTP {status}: {text}"),
                code: None,
            });
        }
        let pipeline: PipelineResponse = resp.json().await?;
        decode_pipeline(pipeline)
    }
}

fn decode_pipeline(pipeline: PipelineResponse) -> Result<Rows, CrmError> {
    let first = pipeline
        .results
        .into_iter()
        .next()
        .ok_or_else(|| protocol("empty pipeline response".to_string()))?;
    let result = match first {
        StreamResult::Error { error } => {
            return Err(CrmError::Libsql {
                message: error.message,
                code: error.code,
            });
        }
        StreamResult::Ok {
            response: StreamResponse::Execute { result },
        } => result,
        StreamResult::Ok { .. } => {
            return Err(protocol("unexpected response to execute".to_string()));
        }
    };

    let columns = result
        .cols
        .into_iter()
        .enumerate()
        .map(|(i, c)| c.name.unwrap_or_else(|| format!("column{i}")))
        .collect();
    let rows = result
        .rows
        .into_iter()
        .map(|row| row.into_iter().map(Value::try_from).collect())
        .collect::<Result<Vec<Vec<Value>>, CrmError>>()?;
    let last_insert_id = result
        .last_insert_rowid
        .and_then(|id| id.parse().ok());

    Ok(Rows {
        columns,
        rows,
        rows_affected: result.affected_row_count,
        last_insert_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_body_matches_the_wire_format() {
        let stmt = Statement::new("SELECT * FROM contacts WHERE id = ? AND email = ?")
            .bind(7)
            .bind("a@b.test");
        let body = PipelineRequest {
            baton: None,
            requests: vec![
                StreamRequest::Execute {
                    stmt: HranaStmt {
                        sql: &stmt.sql,
                        args: stmt
                            .values()
                            .map(HranaValue::try_from)
                            .collect::<Result<_, _>>()
                            .unwrap(),
                        want_rows: stmt.returns_rows,
                    },
                },
                StreamRequest::Close,
            ],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            json!({
                "baton": null,
                "requests": [
                    {
                        "type": "execute",
                        "stmt": {
                            "sql": "SELECT * FROM contacts WHERE id = ? AND email = ?",
                            "args": [
                                {"type": "integer", "value": "7"},
                                {"type": "text", "value": "a@b.test"}
                            ],
                            "want_rows": true
                        }
                    },
                    {"type": "close"}
                ]
            })
        );
    }

    #[test]
    fn timestamps_use_the_stored_text_form() {
        let t = crate::db::value::parse_timestamp("2026-10-17T01:45:04Z").unwrap();
        assert_eq!(
            serde_json::to_value(HranaValue::try_from(&Value::Timestamp(t)).unwrap()).unwrap(),
            json!({"type": "text", "value": "2026-10-17 01:45:04"})
        );
    }

    #[test]
    fn non_finite_reals_never_reach_the_wire() {
        for f in [f64::NAN, f64::INFINITY] {
            let err = HranaValue::try_from(&Value::Real(f)).unwrap_err();
            assert!(matches!(err, CrmError::InvalidQuery(_)));
        }
        assert_eq!(
            HranaValue::try_from(&Value::Real(1.5)).unwrap(),
            HranaValue::Float { value: 1.5 }
        );
    }

    #[test]
    fn values_encode_booleans_and_blobs() {
        assert_eq!(
            serde_json::to_value(HranaValue::try_from(&Value::Bool(true)).unwrap()).unwrap(),
            json!({"type": "integer", "value": "1"})
        );
        assert_eq!(
            serde_json::to_value(HranaValue::try_from(&Value::Blob(b"hi".to_vec())).unwrap()).unwrap(),
            json!({"type": "blob", "base64": "aGk"})
        );
        let padded: HranaValue =
            serde_json::from_value(json!({"type": "blob", "base64": "aGk="})).unwrap();
        assert_eq!(Value::try_from(padded).unwrap(), Value::Blob(b"hi".to_vec()));
    }

    #[test]
    fn execute_result_decodes_rows() {
        let pipeline: PipelineResponse = serde_json::from_value(json!({
            "baton": null,
            "base_url": null,
            "results": [
                {"type": "ok", "response": {"type": "execute", "result": {
                    "cols": [{"name": "id", "decltype": "INTEGER"}, {"name": "score", "decltype": "REAL"}, {"name": "note"}],
                    "rows": [[{"type": "integer", "value": "42"}, {"type": "float", "value": 1.5}, {"type": "null"}]],
                    "affected_row_count": 0,
                    "last_insert_rowid": null,
                    "replication_index": "7"
                }}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        }))
        .unwrap();
        let rows = decode_pipeline(pipeline).unwrap();
        assert_eq!(rows.columns, vec!["id", "score", "note"]);
        assert_eq!(
            rows.rows,
            vec![vec![Value::Integer(42), Value::Real(1.5), Value::Null]]
        );
    }

    #[test]
    fn stream_errors_carry_the_sqlite_code() {
        let pipeline: PipelineResponse = serde_json::from_value(json!({
            "results": [
                {"type": "error", "error": {"message": "no such table: leads", "code": "SQLITE_ERROR"}},
                {"type": "ok", "response": {"type": "close"}}
            ]
        }))
        .unwrap();
        match decode_pipeline(pipeline) {
            Err(CrmError::Libsql { message, code }) => {
                assert_eq!(message, "no such table: leads");
                assert_eq!(code.as_deref(), Some("SQLITE_ERROR"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn pipeline_url_keeps_database_path() {
        let base = Url::parse("https://example.turso.io").unwrap();
        let c = HranaClient::new(&base, "abc123").unwrap();
        assert_eq!(c.pipeline_url().as_str(), "https://example.turso.io/v2/pipeline");

        let base = Url::parse("http://127.0.0.1:8080/db").unwrap();
        let c = HranaClient::new(&base, "t").unwrap();
        assert_eq!(c.pipeline_url().as_str(), "http://127.0.0.1:8080/db/v2/pipeline");
    }
}
