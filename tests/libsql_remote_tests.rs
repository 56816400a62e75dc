use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::post,
};
use crm_shell::db::{Contact, Order, Statement};
use crm_shell::{ConnectionSettings, CrmError, Db, DbOptions};
use serde_json::json;
use tokio::net::TcpListener;

const TOKEN: &str = "abc123";

type Seen = Arc<Mutex<Vec<serde_json::Value>>>;

async fn pipeline(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Response {
    let authorized = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == format!("Bearer {TOKEN}"));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "bad token").into_response();
    }
    seen.lock().unwrap().push(body.clone());

    let sql = body["requests"][0]["stmt"]["sql"].as_str().unwrap_or_default();
    let result = if sql.contains("no_such_table") {
        json!({
            "type": "error",
            "error": { "message": "no such table: no_such_table", "code": "SQLITE_ERROR" }
        })
    } else {
        json!({
            "type": "ok",
            "response": {
                "type": "execute",
                "result": {
                    "cols": [
                        { "name": "id", "decltype": "INTEGER" },
                        { "name": "company_id", "decltype": "INTEGER" },
                        { "name": "first_name", "decltype": "TEXT" },
                        { "name": "last_name", "decltype": "TEXT" },
                        { "name": "email", "decltype": "TEXT" },
                        { "name": "phone", "decltype": "TEXT" },
                        { "name": "created_at", "decltype": "TEXT" }
                    ],
                    "rows": [[
                        { "type": "integer", "value": "7" },
                        { "type": "null" },
                        { "type": "text", "value": "Ada" },
                        { "type": "text", "value": "Lovelace" },
                        { "type": "text", "value": "ada@example.com" },
                        { "type": "null" },
                        { "type": "text", "value": "2026-01-02 03:04:05" }
                    ]],
                    "affected_row_count": 0,
                    "last_insert_rowid": null
                }
            }
        })
    };
    Json(json!({
        "baton": null,
        "base_url": null,
        "results": [result, { "type": "ok", "response": { "type": "close" } }]
    }))
    .into_response()
}

async fn spawn_hrana() -> (String, Seen) {
    let seen: Seen = Arc::default();
    let app = Router::new()
        .route("/v2/pipeline", post(pipeline))
        .with_state(seen.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), seen)
}

fn remote(url: &str, token: &str) -> Db {
    let settings = ConnectionSettings::libsql(url, Some(token)).unwrap();
    Db::connect(&settings, DbOptions::default()).unwrap()
}

#[tokio::test]
async fn select_runs_through_the_pipeline_endpoint() {
    let (url, seen) = spawn_hrana().await;
    let db = remote(&url, TOKEN);

    let contacts: Vec<Contact> = db
        .fetch(
            db.select("contacts")
                .filter("last_name", "Lovelace")
                .order_by("id", Order::Desc)
                .limit(10),
        )
        .await
        .unwrap();
    assert_eq!(contacts.len(), 1);
    assert_eq!(contacts[0].id, 7);
    assert_eq!(contacts[0].first_name, "Ada");
    assert_eq!(contacts[0].company_id, None);
    assert_eq!(
        contacts[0].created_at.to_rfc3339(),
        "2026-01-02T03:04:05+00:00"
    );

    let seen = seen.lock().unwrap();
    let req = &seen[0];
    assert_eq!(req["requests"][0]["type"], "execute");
    assert_eq!(req["requests"][1]["type"], "close");
    assert_eq!(
        req["requests"][0]["stmt"]["args"][0],
        json!({ "type": "text", "value": "Lovelace" })
    );
    assert_eq!(req["requests"][0]["stmt"]["want_rows"], true);
}

#[tokio::test]
async fn integer_arguments_travel_as_strings() {
    let (url, seen) = spawn_hrana().await;
    let db = remote(&url, TOKEN);
    db.run(db.select("contacts").filter("id", 7)).await.unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen[0]["requests"][0]["stmt"]["args"][0],
        json!({ "type": "integer", "value": "7" })
    );
}

#[tokio::test]
async fn rejected_token_surfaces_as_libsql_error() {
    let (url, seen) = spawn_hrana().await;
    let db = remote(&url, "wrong");
    let err = db.ping().await.unwrap_err();
    match err {
        CrmError::Libsql { message, .. } => assert!(message.contains("401")),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn statement_errors_keep_the_server_code() {
    let (url, _seen) = spawn_hrana().await;
    let db = remote(&url, TOKEN);
    let err = db
        .run(Statement::new("SELECT * FROM no_such_table"))
        .await
        .unwrap_err();
    match err {
        CrmError::Libsql { message, code } => {
            assert!(message.contains("no such table"));
            assert_eq!(code.as_deref(), Some("SQLITE_ERROR"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn unreachable_endpoint_fails_on_first_use_only() {
    let db = remote("http://127.0.0.1:9", TOKEN);
    let err = db.run(db.select("deals")).await.unwrap_err();
    assert!(matches!(err, CrmError::Reqwest(_)));
}
