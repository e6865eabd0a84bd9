//! Purpose: CSV-backed record store with locked read-modify-write operations.
//! Exports: `Store`, `TableInfo`, `FilterMode`, `filter_rows`.
//! Role: The storage core; every public operation is one full
//! read-filter-or-mutate-rewrite transaction against the table file.
//! Invariants: The file is the sole persisted state; each operation re-reads it.
//! Invariants: Writes are rendered in memory and land via temp file + rename,
//! so a failed operation leaves the previous file state intact.
//! Invariants: Mutations hold an exclusive advisory lock; fetches hold a shared one.

use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tempfile::NamedTempFile;

use crate::core::error::{Error, ErrorKind};
use crate::core::table::{Row, Table, parse_table, render_table};

/// Selects equality-keep vs. inequality-keep filtering.
///
/// `KeepDiffering` keeps rows whose value differs from the criteria on EVERY
/// given field (an AND of per-field inequalities, not a negated match-all):
/// equality on any single criteria field drops the row.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FilterMode {
    KeepMatching,
    KeepDiffering,
}

pub fn filter_rows(
    rows: &[Row],
    mode: FilterMode,
    criteria: &[(String, String)],
) -> Result<Vec<Row>, Error> {
    let mut kept = Vec::new();
    for row in rows {
        if row_passes(row, mode, criteria)? {
            kept.push(row.clone());
        }
    }
    Ok(kept)
}

fn row_passes(row: &Row, mode: FilterMode, criteria: &[(String, String)]) -> Result<bool, Error> {
    for (field, expected) in criteria {
        let actual = row.require(field)?;
        let keep = match mode {
            FilterMode::KeepMatching => actual == expected,
            FilterMode::KeepDiffering => actual != expected,
        };
        if !keep {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableInfo {
    pub path: PathBuf,
    pub columns: Vec<String>,
    pub row_count: usize,
}

/// A record store over one table file.
///
/// The store keeps a sidecar `<stem>.lock` file handle for its lifetime and
/// takes advisory locks on it around each operation. The data file itself is
/// reopened per operation because rename-based persistence replaces its inode
/// on every write.
#[derive(Debug)]
pub struct Store {
    path: PathBuf,
    lock: File,
}

impl Store {
    /// Create a new table file holding only the header line.
    ///
    /// Refuses to overwrite an existing file.
    pub fn create(path: impl AsRef<Path>, columns: &[String]) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        validate_columns(columns)?;

        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&path)
            .map_err(|err| {
                let kind = if err.kind() == std::io::ErrorKind::AlreadyExists {
                    ErrorKind::AlreadyExists
                } else {
                    ErrorKind::Io
                };
                Error::new(kind)
                    .with_message("failed to create table file")
                    .with_path(&path)
                    .with_source(err)
            })?;

        let mut header_line = columns.join(",");
        header_line.push('\n');
        file.write_all(header_line.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write table header")
                    .with_path(&path)
                    .with_source(err)
            })?;
        drop(file);

        Self::open(path)
    }

    /// Open an existing table file, validating that it parses.
    ///
    /// The table file is probed before the lock sidecar is created so a
    /// missing table reports `NotFound` and leaves no stray files behind.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();
        read_table_at(&path)?;

        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path(&path))
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to open lock file")
                    .with_path(&path)
                    .with_source(err)
            })?;

        Ok(Self { path, lock })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        self.path.with_extension("backup")
    }

    /// Return the rows matching every criteria pair, in file order.
    /// Empty criteria returns every row.
    pub fn fetch(&self, criteria: &[(String, String)]) -> Result<Vec<Row>, Error> {
        let _guard = self.lock_shared()?;
        let table = self.read_table()?;
        filter_rows(&table.rows, FilterMode::KeepMatching, criteria)
    }

    /// Append a row and rewrite the table.
    ///
    /// The row must cover the header set exactly: a field outside the headers
    /// is a `Usage` error, a missing header field a `MissingField` error, and
    /// either aborts before the file is touched.
    pub fn insert(&self, row: Row) -> Result<(), Error> {
        let _guard = self.lock_exclusive()?;
        let mut table = self.read_table()?;
        validate_known_fields(&table.headers, row.names())?;
        validate_values(row.iter())?;
        table.rows.push(row);
        self.write_table(&table)
    }

    /// Overwrite the `set` fields on every row matching the criteria,
    /// preserving table order. Returns the number of rows changed.
    pub fn update(
        &self,
        set: &[(String, String)],
        criteria: &[(String, String)],
    ) -> Result<usize, Error> {
        let _guard = self.lock_exclusive()?;
        let mut table = self.read_table()?;
        validate_known_fields(&table.headers, set.iter().map(|(field, _)| field.as_str()))?;
        validate_values(set.iter().map(|(field, value)| (field.as_str(), value.as_str())))?;

        let mut matched = 0;
        for row in &mut table.rows {
            if row_passes(row, FilterMode::KeepMatching, criteria)? {
                for (field, value) in set {
                    row.set(field.clone(), value.clone());
                }
                matched += 1;
            }
        }
        self.write_table(&table)?;
        Ok(matched)
    }

    /// Keep only the rows that differ from the criteria on every given
    /// field; a row equal on any criteria field is dropped. Empty criteria
    /// wipes the table entirely. Returns the number of rows removed.
    pub fn delete(&self, criteria: &[(String, String)]) -> Result<usize, Error> {
        let _guard = self.lock_exclusive()?;
        let mut table = self.read_table()?;
        let before = table.rows.len();
        if criteria.is_empty() {
            table.rows.clear();
        } else {
            table.rows = filter_rows(&table.rows, FilterMode::KeepDiffering, criteria)?;
        }
        let removed = before - table.rows.len();
        self.write_table(&table)?;
        Ok(removed)
    }

    pub fn info(&self) -> Result<TableInfo, Error> {
        let _guard = self.lock_shared()?;
        let table = self.read_table()?;
        Ok(TableInfo {
            path: self.path.clone(),
            columns: table.headers,
            row_count: table.rows.len(),
        })
    }

    /// Copy the table file to its sibling `<stem>.backup` path.
    pub fn backup(&self) -> Result<PathBuf, Error> {
        let _guard = self.lock_exclusive()?;
        let backup = self.backup_path();
        fs::copy(&self.path, &backup).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to write backup")
                .with_path(&backup)
                .with_source(err)
        })?;
        Ok(backup)
    }

    /// Replace the table file with the most recent backup copy.
    pub fn restore(&self) -> Result<(), Error> {
        let _guard = self.lock_exclusive()?;
        let backup = self.backup_path();
        let mut source = File::open(&backup).map_err(|err| {
            let kind = if err.kind() == std::io::ErrorKind::NotFound {
                ErrorKind::NotFound
            } else {
                ErrorKind::Io
            };
            Error::new(kind)
                .with_message("no backup to restore")
                .with_path(&backup)
                .with_source(err)
        })?;
        let mut text = String::new();
        source.read_to_string(&mut text).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to read backup")
                .with_path(&backup)
                .with_source(err)
        })?;
        self.replace_file(text.as_bytes())
    }

    fn read_table(&self) -> Result<Table, Error> {
        read_table_at(&self.path)
    }

    fn write_table(&self, table: &Table) -> Result<(), Error> {
        // Render the whole file before touching disk; any row error leaves
        // the previous state untouched.
        let rendered = render_table(table)?;
        self.replace_file(rendered.as_bytes())
    }

    fn replace_file(&self, contents: &[u8]) -> Result<(), Error> {
        // A bare file name has an empty parent; stage the temp file in cwd.
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp = NamedTempFile::new_in(dir).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to create temp file")
                .with_path(&self.path)
                .with_source(err)
        })?;
        temp.write_all(contents)
            .and_then(|_| temp.as_file().sync_all())
            .map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("failed to write temp file")
                    .with_path(&self.path)
                    .with_source(err)
            })?;
        temp.persist(&self.path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to replace table file")
                .with_path(&self.path)
                .with_source(err.error)
        })?;
        Ok(())
    }

    fn lock_shared(&self) -> Result<LockGuard<'_>, Error> {
        self.lock.lock_shared().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to acquire shared lock")
                .with_path(&self.path)
                .with_source(err)
        })?;
        Ok(LockGuard { file: &self.lock })
    }

    fn lock_exclusive(&self) -> Result<LockGuard<'_>, Error> {
        self.lock.lock_exclusive().map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to acquire exclusive lock")
                .with_path(&self.path)
                .with_source(err)
        })?;
        Ok(LockGuard { file: &self.lock })
    }
}

struct LockGuard<'a> {
    file: &'a File,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

fn lock_path(path: &Path) -> PathBuf {
    path.with_extension("lock")
}

fn read_table_at(path: &Path) -> Result<Table, Error> {
    let mut file = File::open(path).map_err(|err| {
        let kind = if err.kind() == std::io::ErrorKind::NotFound {
            ErrorKind::NotFound
        } else {
            ErrorKind::Io
        };
        Error::new(kind)
            .with_message("failed to open table file")
            .with_path(path)
            .with_source(err)
    })?;
    let mut text = String::new();
    file.read_to_string(&mut text).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read table file")
            .with_path(path)
            .with_source(err)
    })?;
    parse_table(&text).map_err(|err| err.with_path(path))
}

fn validate_columns(columns: &[String]) -> Result<(), Error> {
    if columns.is_empty() {
        return Err(Error::new(ErrorKind::Usage).with_message("a table needs at least one column"));
    }
    for (index, column) in columns.iter().enumerate() {
        if column.is_empty() {
            return Err(Error::new(ErrorKind::Usage).with_message("column names must not be empty"));
        }
        if column.contains(',') || column.contains('\n') || column.contains('\r') {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("column names must not contain commas or line breaks")
                .with_field(column));
        }
        if columns[..index].contains(column) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("duplicate column name")
                .with_field(column));
        }
    }
    Ok(())
}

fn validate_known_fields<'a>(
    headers: &[String],
    names: impl Iterator<Item = &'a str>,
) -> Result<(), Error> {
    for name in names {
        if !headers.iter().any(|header| header == name) {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("field is not a table column")
                .with_field(name)
                .with_hint("Columns are fixed at table creation; recreate the table to change them."));
        }
    }
    Ok(())
}

fn validate_values<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Result<(), Error> {
    for (field, value) in pairs {
        if value.contains(',') {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("value must not contain the comma delimiter")
                .with_field(field));
        }
        if value.contains('\n') || value.contains('\r') {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("value must not contain a line terminator")
                .with_field(field));
        }
    }
    Ok(())
}
