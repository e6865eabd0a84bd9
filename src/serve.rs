//! Purpose: Provide the HTTP/JSON server and HTML table view for gridfile.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum-based loopback server over the local table client.
//! Invariants: JSON envelopes stay in lockstep with `api::remote`.
//! Invariants: Loopback-only unless explicitly allowed.
//! Invariants: Store semantics are untouched here; handlers only decode,
//! dispatch, and render.

use axum::extract::{DefaultBodyLimit, Path as AxumPath, Query, State};
use axum::http::{HeaderValue, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use gridfile::api::{Error, ErrorKind, LocalClient, TableRef};
use gridfile::html::render_table_page;
use gridfile::row_json::{pairs_from_object, row_from_object, row_json, rows_json, table_info_json};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub table_dir: PathBuf,
    pub allow_non_loopback: bool,
    pub max_body_bytes: u64,
}

#[derive(Clone)]
struct AppState {
    client: LocalClient,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    init_tracing();

    let max_body_bytes: usize = config
        .max_body_bytes
        .try_into()
        .map_err(|_| Error::new(ErrorKind::Usage).with_message("--max-body-bytes is too large"))?;

    let state = Arc::new(AppState {
        client: LocalClient::new().with_table_dir(config.table_dir),
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v0/tables", post(create_table).get(list_tables))
        .route("/v0/tables/:table", delete(delete_table).get(table_info))
        .route("/v0/tables/:table/rows", post(insert_row).get(fetch_rows))
        .route("/v0/tables/:table/update", post(update_rows))
        .route("/v0/tables/:table/delete", post(delete_rows))
        .route("/v0/tables/:table/backup", post(backup_table))
        .route("/v0/tables/:table/restore", post(restore_table))
        .route("/tables/:table", get(view_table))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;

    tracing::info!(bind = %config.bind, "gridfile serving");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }

    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 1048576."));
    }

    Ok(())
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        let mut signal = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("install SIGTERM handler");
        signal.recv().await;
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

#[derive(Debug, Deserialize)]
struct CreateTableRequest {
    table: String,
    columns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct InsertRequest {
    row: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct UpdateRequest {
    set: Map<String, Value>,
    #[serde(default, rename = "where")]
    criteria: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct DeleteRequest {
    #[serde(default, rename = "where")]
    criteria: Map<String, Value>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn create_table(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateTableRequest>,
) -> Response {
    let result = state
        .client
        .create_table(&TableRef::name(&payload.table), &payload.columns);
    match result {
        Ok(info) => json_response(json!({ "table": table_info_json(&payload.table, &info) })),
        Err(err) => error_response(err),
    }
}

async fn list_tables(State(state): State<Arc<AppState>>) -> Response {
    match state.client.list_tables() {
        Ok(infos) => {
            let mut out = Vec::new();
            for info in infos {
                let name = info
                    .path
                    .file_stem()
                    .and_then(|name| name.to_str())
                    .unwrap_or_default()
                    .to_string();
                out.push(table_info_json(&name, &info));
            }
            json_response(json!({ "tables": out }))
        }
        Err(err) => error_response(err),
    }
}

async fn table_info(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
) -> Response {
    match state.client.table_info(&TableRef::name(&table)) {
        Ok(info) => json_response(json!({ "table": table_info_json(&table, &info) })),
        Err(err) => error_response(err),
    }
}

async fn delete_table(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
) -> Response {
    match state.client.delete_table(&TableRef::name(&table)) {
        Ok(()) => json_response(json!({ "ok": true })),
        Err(err) => error_response(err),
    }
}

async fn fetch_rows(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Query(criteria): Query<Vec<(String, String)>>,
) -> Response {
    let result = state
        .client
        .open_table(&TableRef::name(&table))
        .and_then(|store| store.fetch(&criteria));
    match result {
        Ok(rows) => json_response(json!({ "rows": rows_json(&rows), "count": rows.len() })),
        Err(err) => error_response(err),
    }
}

async fn insert_row(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Json(payload): Json<InsertRequest>,
) -> Response {
    let row = match row_from_object(&payload.row) {
        Ok(row) => row,
        Err(err) => return error_response(err),
    };
    let result = state
        .client
        .open_table(&TableRef::name(&table))
        .and_then(|store| store.insert(row.clone()));
    match result {
        Ok(()) => json_response(json!({ "ok": true, "row": row_json(&row) })),
        Err(err) => error_response(err),
    }
}

async fn update_rows(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Json(payload): Json<UpdateRequest>,
) -> Response {
    let set = match pairs_from_object(&payload.set) {
        Ok(set) => set,
        Err(err) => return error_response(err),
    };
    let criteria = match pairs_from_object(&payload.criteria) {
        Ok(criteria) => criteria,
        Err(err) => return error_response(err),
    };
    let result = state
        .client
        .open_table(&TableRef::name(&table))
        .and_then(|store| store.update(&set, &criteria));
    match result {
        Ok(matched) => json_response(json!({ "ok": true, "matched": matched })),
        Err(err) => error_response(err),
    }
}

async fn delete_rows(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Json(payload): Json<DeleteRequest>,
) -> Response {
    let criteria = match pairs_from_object(&payload.criteria) {
        Ok(criteria) => criteria,
        Err(err) => return error_response(err),
    };
    let result = state
        .client
        .open_table(&TableRef::name(&table))
        .and_then(|store| store.delete(&criteria));
    match result {
        Ok(deleted) => json_response(json!({ "ok": true, "deleted": deleted })),
        Err(err) => error_response(err),
    }
}

async fn backup_table(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
) -> Response {
    let result = state
        .client
        .open_table(&TableRef::name(&table))
        .and_then(|store| store.backup());
    match result {
        Ok(path) => json_response(json!({
            "backup": {
                "table": table,
                "path": path.display().to_string(),
                "time": rfc3339_now(),
            }
        })),
        Err(err) => error_response(err),
    }
}

async fn restore_table(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
) -> Response {
    let result = state
        .client
        .open_table(&TableRef::name(&table))
        .and_then(|store| store.restore());
    match result {
        Ok(()) => json_response(json!({ "ok": true })),
        Err(err) => error_response(err),
    }
}

async fn view_table(
    State(state): State<Arc<AppState>>,
    AxumPath(table): AxumPath<String>,
    Query(query): Query<Vec<(String, String)>>,
) -> Response {
    // Empty form fields arrive as empty-string values; they are not criteria.
    let criteria: Vec<(String, String)> = query
        .into_iter()
        .filter(|(_, value)| !value.is_empty())
        .collect();

    let result = state
        .client
        .open_table(&TableRef::name(&table))
        .and_then(|store| {
            let info = store.info()?;
            let rows = store.fetch(&criteria)?;
            Ok((info, rows))
        });

    let page = match result {
        Ok((info, rows)) => {
            let error = if rows.is_empty() {
                Some("No entries found.")
            } else {
                None
            };
            render_table_page(&table, &info.columns, &rows, error)
        }
        Err(err) => render_table_page(&table, &[], &[], Some(&err.to_string())),
    };
    let mut response = Html(page).into_response();
    version_header(&mut response);
    response
}

fn rfc3339_now() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_default()
}

fn json_response(payload: Value) -> Response {
    let mut response = Json(payload).into_response();
    version_header(&mut response);
    response
}

fn version_header(response: &mut Response) {
    response
        .headers_mut()
        .insert("gridfile-version", HeaderValue::from_static("0"));
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage | ErrorKind::MissingField => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Corrupt | ErrorKind::Io | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
            field: err.field().map(str::to_string),
            path: err.path().map(|path| path.to_string_lossy().to_string()),
            line: err.line(),
            hint: err.hint().map(str::to_string),
        },
    };
    let mut response = (status, Json(body)).into_response();
    version_header(&mut response);
    response
}
