//! Purpose: Provide an HTTP client for the `gridfile serve` JSON protocol.
//! Exports: `RemoteClient`, `RemoteTable`, `RemoteTableInfo`.
//! Role: Transport client that mirrors local table operations remotely.
//! Invariants: Request/response envelopes match the serve layer exactly.
//! Invariants: Remote refs resolve to a base URL plus a table name (no paths).
#![allow(clippy::result_large_err)]

use crate::core::error::{Error, ErrorKind};
use crate::core::table::Row;
use crate::row_json::{row_from_object, row_json};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use url::Url;

type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug)]
pub struct RemoteClient {
    base_url: Url,
    agent: ureq::Agent,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RemoteTableInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Deserialize)]
struct TablesEnvelope {
    tables: Vec<RemoteTableInfo>,
}

#[derive(Deserialize)]
struct TableEnvelope {
    table: RemoteTableInfo,
}

#[derive(Deserialize)]
struct RowsEnvelope {
    rows: Vec<Map<String, Value>>,
}

#[derive(Deserialize)]
struct UpdateEnvelope {
    matched: usize,
}

#[derive(Deserialize)]
struct DeleteEnvelope {
    deleted: usize,
}

#[derive(Deserialize)]
#[allow(dead_code)]
struct OkEnvelope {
    ok: bool,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: RemoteError,
}

#[derive(Deserialize)]
struct RemoteError {
    kind: String,
    message: String,
    field: Option<String>,
    hint: Option<String>,
}

impl RemoteClient {
    pub fn connect(base_url: &str) -> ApiResult<Self> {
        let url = Url::parse(base_url).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid server url")
                .with_source(err)
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("server url must use http or https"));
        }
        Ok(Self {
            base_url: url,
            agent: ureq::agent(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn list_tables(&self) -> ApiResult<Vec<RemoteTableInfo>> {
        let url = self.endpoint(&["v0", "tables"])?;
        let envelope: TablesEnvelope = self.request_json("GET", &url, None)?;
        Ok(envelope.tables)
    }

    pub fn create_table(&self, table: &str, columns: &[String]) -> ApiResult<RemoteTableInfo> {
        ensure_table_name(table)?;
        let url = self.endpoint(&["v0", "tables"])?;
        let body = json!({ "table": table, "columns": columns });
        let envelope: TableEnvelope = self.request_json("POST", &url, Some(&body))?;
        Ok(envelope.table)
    }

    pub fn delete_table(&self, table: &str) -> ApiResult<()> {
        ensure_table_name(table)?;
        let url = self.endpoint(&["v0", "tables", table])?;
        let _: OkEnvelope = self.request_json("DELETE", &url, None)?;
        Ok(())
    }

    pub fn table_info(&self, table: &str) -> ApiResult<RemoteTableInfo> {
        ensure_table_name(table)?;
        let url = self.endpoint(&["v0", "tables", table])?;
        let envelope: TableEnvelope = self.request_json("GET", &url, None)?;
        Ok(envelope.table)
    }

    pub fn table(&self, name: impl Into<String>) -> ApiResult<RemoteTable> {
        let name = name.into();
        ensure_table_name(&name)?;
        Ok(RemoteTable {
            client: self.clone(),
            name,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> ApiResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                Error::new(ErrorKind::Usage).with_message("server url cannot hold a path")
            })?;
            path.pop_if_empty();
            for segment in segments {
                path.push(segment);
            }
        }
        Ok(url)
    }

    fn request_json<R>(&self, method: &str, url: &Url, body: Option<&Value>) -> ApiResult<R>
    where
        R: DeserializeOwned,
    {
        let request = self
            .agent
            .request(method, url.as_str())
            .set("Accept", "application/json");
        let response = match body {
            None => request.call(),
            Some(value) => {
                let payload = serde_json::to_string(value).map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to encode request json")
                        .with_source(err)
                })?;
                request
                    .set("Content-Type", "application/json")
                    .send_string(&payload)
            }
        };

        match response {
            Ok(resp) => read_json_response(resp),
            Err(ureq::Error::Status(code, resp)) => Err(parse_error_response(code, resp)),
            Err(ureq::Error::Transport(err)) => Err(Error::new(ErrorKind::Io)
                .with_message("request failed")
                .with_source(err)),
        }
    }
}

#[derive(Clone)]
pub struct RemoteTable {
    client: RemoteClient,
    name: String,
}

impl RemoteTable {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fetch(&self, criteria: &[(String, String)]) -> ApiResult<Vec<Row>> {
        let mut url = self.client.endpoint(&["v0", "tables", &self.name, "rows"])?;
        {
            let mut query = url.query_pairs_mut();
            for (field, value) in criteria {
                query.append_pair(field, value);
            }
        }
        let envelope: RowsEnvelope = self.client.request_json("GET", &url, None)?;
        envelope.rows.iter().map(row_from_object).collect()
    }

    pub fn insert(&self, row: &Row) -> ApiResult<()> {
        let url = self.client.endpoint(&["v0", "tables", &self.name, "rows"])?;
        let body = json!({ "row": row_json(row) });
        let _: OkEnvelope = self.client.request_json("POST", &url, Some(&body))?;
        Ok(())
    }

    pub fn update(
        &self,
        set: &[(String, String)],
        criteria: &[(String, String)],
    ) -> ApiResult<usize> {
        let url = self
            .client
            .endpoint(&["v0", "tables", &self.name, "update"])?;
        let body = json!({ "set": pairs_to_object(set), "where": pairs_to_object(criteria) });
        let envelope: UpdateEnvelope = self.client.request_json("POST", &url, Some(&body))?;
        Ok(envelope.matched)
    }

    pub fn delete(&self, criteria: &[(String, String)]) -> ApiResult<usize> {
        let url = self
            .client
            .endpoint(&["v0", "tables", &self.name, "delete"])?;
        let body = json!({ "where": pairs_to_object(criteria) });
        let envelope: DeleteEnvelope = self.client.request_json("POST", &url, Some(&body))?;
        Ok(envelope.deleted)
    }
}

fn ensure_table_name(table: &str) -> ApiResult<()> {
    if table.is_empty() || table.contains('/') {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("remote table names must be bare names without path separators"));
    }
    Ok(())
}

fn pairs_to_object(pairs: &[(String, String)]) -> Map<String, Value> {
    let mut object = Map::new();
    for (field, value) in pairs {
        object.insert(field.clone(), Value::String(value.clone()));
    }
    object
}

fn read_json_response<R>(response: ureq::Response) -> ApiResult<R>
where
    R: DeserializeOwned,
{
    let body = response.into_string().map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read response body")
            .with_source(err)
    })?;
    serde_json::from_str(&body).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("invalid response json")
            .with_source(err)
    })
}

fn parse_error_response(status: u16, response: ureq::Response) -> Error {
    let body = response.into_string().unwrap_or_default();
    if let Ok(envelope) = serde_json::from_str::<ErrorEnvelope>(&body) {
        return error_from_remote(envelope.error);
    }
    let kind = error_kind_from_status(status);
    Error::new(kind).with_message(format!("remote error status {status}"))
}

fn error_from_remote(remote: RemoteError) -> Error {
    let kind = match remote.kind.as_str() {
        "Usage" => ErrorKind::Usage,
        "NotFound" => ErrorKind::NotFound,
        "AlreadyExists" => ErrorKind::AlreadyExists,
        "MissingField" => ErrorKind::MissingField,
        "Corrupt" => ErrorKind::Corrupt,
        "Io" => ErrorKind::Io,
        _ => ErrorKind::Internal,
    };
    let mut error = Error::new(kind).with_message(remote.message);
    if let Some(field) = remote.field {
        error = error.with_field(field);
    }
    if let Some(hint) = remote.hint {
        error = error.with_hint(hint);
    }
    error
}

fn error_kind_from_status(status: u16) -> ErrorKind {
    match status {
        400 => ErrorKind::Usage,
        404 => ErrorKind::NotFound,
        409 => ErrorKind::AlreadyExists,
        _ => ErrorKind::Internal,
    }
}
