//! Purpose: Shared local table-directory and table-name path resolution helpers.
//! Exports: `default_table_dir` and `resolve_named_table_path`.
//! Role: Keep CLI and API-client path semantics aligned from one source.
//! Invariants: Default table directory remains `~/.gridfile/tables`.
//! Invariants: Named table refs must not contain path separators.

use std::path::{Path, PathBuf};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub(crate) enum TableNameResolveError {
    ContainsPathSeparator,
}

pub(crate) fn default_table_dir() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".gridfile").join("tables")
}

pub(crate) fn resolve_named_table_path(
    name: &str,
    table_dir: &Path,
) -> Result<PathBuf, TableNameResolveError> {
    if name.contains('/') {
        return Err(TableNameResolveError::ContainsPathSeparator);
    }
    if name.ends_with(".csv") {
        return Ok(table_dir.join(name));
    }
    Ok(table_dir.join(format!("{name}.csv")))
}
