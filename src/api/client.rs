//! Purpose: Define the public API client surface for local table resolution.
//! Exports: `TableRef`, `LocalClient`, and local table lifecycle operations.
//! Role: Stable boundary for the CLI and serve layer; mirrors CLI resolution rules.
//! Invariants: Named refs resolve inside the client's table directory only.
//! Invariants: Remote table refs are accepted as values but rejected here;
//! the remote client owns them.

use crate::core::error::{Error, ErrorKind};
use crate::core::store::{Store, TableInfo};
use crate::table_paths::{TableNameResolveError, default_table_dir, resolve_named_table_path};
use std::path::{Path, PathBuf};

pub type ApiResult<T> = Result<T, Error>;

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TableRef {
    Name(String),
    Path(PathBuf),
    Url(String),
}

impl TableRef {
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn url(url: impl Into<String>) -> Self {
        Self::Url(url.into())
    }

    fn resolve_local_path(&self, table_dir: &Path) -> ApiResult<PathBuf> {
        match self {
            TableRef::Name(name) => resolve_name(name, table_dir),
            TableRef::Path(path) => Ok(path.clone()),
            TableRef::Url(_) => Err(Error::new(ErrorKind::Usage)
                .with_message("remote table refs are not handled by the local client")
                .with_hint("Use the serve URL with the CLI, or RemoteClient in code.")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct LocalClient {
    table_dir: PathBuf,
}

impl Default for LocalClient {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalClient {
    pub fn new() -> Self {
        Self {
            table_dir: default_table_dir(),
        }
    }

    pub fn with_table_dir(mut self, table_dir: impl Into<PathBuf>) -> Self {
        self.table_dir = table_dir.into();
        self
    }

    pub fn table_dir(&self) -> &Path {
        &self.table_dir
    }

    pub fn create_table(&self, table_ref: &TableRef, columns: &[String]) -> ApiResult<TableInfo> {
        let path = table_ref.resolve_local_path(&self.table_dir)?;
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to create table directory")
                    .with_path(parent)
                    .with_source(err)
            })?;
        }
        let store = Store::create(&path, columns)?;
        store.info()
    }

    pub fn open_table(&self, table_ref: &TableRef) -> ApiResult<Store> {
        let path = table_ref.resolve_local_path(&self.table_dir)?;
        Store::open(&path)
    }

    pub fn table_info(&self, table_ref: &TableRef) -> ApiResult<TableInfo> {
        let store = self.open_table(table_ref)?;
        store.info()
    }

    pub fn list_tables(&self) -> ApiResult<Vec<TableInfo>> {
        let entries = match std::fs::read_dir(&self.table_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(Error::new(ErrorKind::Io)
                    .with_message("failed to read table directory")
                    .with_path(&self.table_dir)
                    .with_source(err));
            }
        };

        let mut infos = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to read table directory entry")
                    .with_path(&self.table_dir)
                    .with_source(err)
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("csv") {
                continue;
            }
            let store = Store::open(&path)?;
            infos.push(store.info()?);
        }
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(infos)
    }

    pub fn delete_table(&self, table_ref: &TableRef) -> ApiResult<()> {
        let path = table_ref.resolve_local_path(&self.table_dir)?;
        std::fs::remove_file(&path).map_err(|err| {
            let kind = if err.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::Io
            };
            Error::new(kind)
                .with_message("failed to delete table file")
                .with_path(&path)
                .with_source(err)
        })?;
        // Sidecars are best-effort cleanup; a missing one is not an error.
        let _ = std::fs::remove_file(path.with_extension("lock"));
        let _ = std::fs::remove_file(path.with_extension("backup"));
        Ok(())
    }
}

pub fn table_dir_or_default(dir: Option<PathBuf>) -> PathBuf {
    dir.unwrap_or_else(default_table_dir)
}

fn resolve_name(name: &str, table_dir: &Path) -> ApiResult<PathBuf> {
    resolve_named_table_path(name, table_dir).map_err(|err| match err {
        TableNameResolveError::ContainsPathSeparator => Error::new(ErrorKind::Usage)
            .with_message("table names must not contain path separators")
            .with_hint("Use a bare name like `people`, or pass a full path."),
    })
}

#[cfg(test)]
mod tests {
    use super::{LocalClient, TableRef};
    use crate::core::error::ErrorKind;

    fn columns(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn create_list_delete_flow() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = LocalClient::new().with_table_dir(temp.path().join("tables"));

        let info = client
            .create_table(&TableRef::name("people"), &columns(&["name", "street"]))
            .expect("create");
        assert!(info.path.ends_with("people.csv"));
        assert_eq!(info.columns, vec!["name", "street"]);
        assert_eq!(info.row_count, 0);

        let listed = client.list_tables().expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].path, info.path);

        client.delete_table(&TableRef::name("people")).expect("delete");
        assert!(client.list_tables().expect("list").is_empty());
    }

    #[test]
    fn listing_an_absent_directory_is_empty() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = LocalClient::new().with_table_dir(temp.path().join("nowhere"));
        assert!(client.list_tables().expect("list").is_empty());
    }

    #[test]
    fn name_with_separator_is_a_usage_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = LocalClient::new().with_table_dir(temp.path());
        let err = client
            .table_info(&TableRef::name("a/b"))
            .expect_err("separator");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn url_refs_are_rejected_locally() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = LocalClient::new().with_table_dir(temp.path());
        let err = client
            .table_info(&TableRef::url("http://127.0.0.1:9711/people"))
            .expect_err("url");
        assert_eq!(err.kind(), ErrorKind::Usage);
    }

    #[test]
    fn delete_missing_table_is_not_found() {
        let temp = tempfile::tempdir().expect("tempdir");
        let client = LocalClient::new().with_table_dir(temp.path());
        let err = client
            .delete_table(&TableRef::name("ghost"))
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
