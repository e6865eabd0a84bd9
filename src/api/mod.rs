//! Purpose: Define the stable public Rust API boundary for gridfile.
//! Exports: Core types and operations needed by the CLI and serve layer.
//! Role: Public, additive-only surface; hides internal storage modules.
//! Invariants: This module is the only public path to storage primitives.
//! Invariants: Internal modules remain private and are not directly exposed.

mod client;
mod remote;

#[doc(hidden)]
pub use crate::core::error::to_exit_code;
pub use crate::core::error::{Error, ErrorKind};
pub use crate::core::store::{FilterMode, Store, TableInfo, filter_rows};
pub use crate::core::table::{Row, Table, parse_table, render_table};
pub use client::{LocalClient, TableRef, table_dir_or_default};
pub use remote::{RemoteClient, RemoteTable, RemoteTableInfo};
