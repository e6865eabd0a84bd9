//! Purpose: Hold top-level CLI command dispatch for `gridfile`.
//! Exports: `dispatch_command`.
//! Role: Keep `main.rs` focused on parse/bootstrap and delegate command execution.
//! Invariants: Command behavior, output envelopes, and exit code semantics stay unchanged.
//! Invariants: Helpers in `main.rs` remain the source of shared parsing/emission logic.

use super::*;

pub(super) fn dispatch_command(
    command: Command,
    table_dir: PathBuf,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        Command::Completion { shell } => {
            let mut cmd = Cli::command();
            clap_complete::aot::generate(shell, &mut cmd, "gridfile", &mut io::stdout());
            Ok(RunOutcome::ok())
        }
        Command::Version => {
            emit_json(
                json!({ "name": "gridfile", "version": env!("CARGO_PKG_VERSION") }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Table { command } => dispatch_table_command(command, table_dir, color_mode),
        Command::Fetch { table, criteria } => {
            let criteria = parse_pairs(&criteria, "filter")?;
            let rows = match parse_table_target(&table)? {
                TableTarget::Local(table_ref) => {
                    let client = LocalClient::new().with_table_dir(&table_dir);
                    client.open_table(&table_ref)?.fetch(&criteria)?
                }
                TableTarget::Remote { base_url, table } => RemoteClient::connect(&base_url)?
                    .table(table)?
                    .fetch(&criteria)?,
            };
            emit_json(
                json!({ "rows": rows_json(&rows), "count": rows.len() }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Insert {
            table,
            values,
            json: json_row,
        } => {
            let row = row_from_cli(&values, json_row.as_deref())?;
            match parse_table_target(&table)? {
                TableTarget::Local(table_ref) => {
                    let client = LocalClient::new().with_table_dir(&table_dir);
                    client.open_table(&table_ref)?.insert(row.clone())?;
                }
                TableTarget::Remote { base_url, table } => {
                    RemoteClient::connect(&base_url)?.table(table)?.insert(&row)?;
                }
            }
            emit_json(json!({ "ok": true, "row": row_json(&row) }), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Update {
            table,
            set,
            criteria,
        } => {
            let set = parse_pairs(&set, "set pair")?;
            let criteria = parse_pairs(&criteria, "filter")?;
            let matched = match parse_table_target(&table)? {
                TableTarget::Local(table_ref) => {
                    let client = LocalClient::new().with_table_dir(&table_dir);
                    client.open_table(&table_ref)?.update(&set, &criteria)?
                }
                TableTarget::Remote { base_url, table } => RemoteClient::connect(&base_url)?
                    .table(table)?
                    .update(&set, &criteria)?,
            };
            emit_json(json!({ "ok": true, "matched": matched }), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Delete {
            table,
            criteria,
            all,
        } => {
            if criteria.is_empty() && !all {
                return Err(Error::new(ErrorKind::Usage)
                    .with_message("refusing to delete every row without --all")
                    .with_hint("Pass --all to wipe the table, or add --where filters."));
            }
            let criteria = parse_pairs(&criteria, "filter")?;
            let deleted = match parse_table_target(&table)? {
                TableTarget::Local(table_ref) => {
                    let client = LocalClient::new().with_table_dir(&table_dir);
                    client.open_table(&table_ref)?.delete(&criteria)?
                }
                TableTarget::Remote { base_url, table } => RemoteClient::connect(&base_url)?
                    .table(table)?
                    .delete(&criteria)?,
            };
            emit_json(json!({ "ok": true, "deleted": deleted }), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Backup { table } => {
            let table_ref = local_only_ref(&table, "backup")?;
            let client = LocalClient::new().with_table_dir(&table_dir);
            let path = client.open_table(&table_ref)?.backup()?;
            emit_json(
                json!({
                    "backup": {
                        "table": table,
                        "path": path.display().to_string(),
                        "time": backup_time_now(),
                    }
                }),
                color_mode,
            );
            Ok(RunOutcome::ok())
        }
        Command::Restore { table } => {
            let table_ref = local_only_ref(&table, "restore")?;
            let client = LocalClient::new().with_table_dir(&table_dir);
            client.open_table(&table_ref)?.restore()?;
            emit_json(json!({ "ok": true }), color_mode);
            Ok(RunOutcome::ok())
        }
        Command::Serve(args) => {
            let bind: SocketAddr = args.bind.parse().map_err(|_| {
                Error::new(ErrorKind::Usage)
                    .with_message("invalid bind address")
                    .with_hint("Use a host:port value like 127.0.0.1:9711.")
            })?;
            let config = serve::ServeConfig {
                bind,
                table_dir,
                allow_non_loopback: args.allow_non_loopback,
                max_body_bytes: args.max_body_bytes,
            };
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .map_err(|err| {
                    Error::new(ErrorKind::Internal)
                        .with_message("failed to start async runtime")
                        .with_source(err)
                })?;
            runtime.block_on(serve::serve(config))?;
            Ok(RunOutcome::ok())
        }
    }
}

fn dispatch_table_command(
    command: TableCommand,
    table_dir: PathBuf,
    color_mode: ColorMode,
) -> Result<RunOutcome, Error> {
    match command {
        TableCommand::Create { table, columns } => {
            let created = match parse_table_target(&table)? {
                TableTarget::Local(table_ref) => {
                    let client = LocalClient::new().with_table_dir(&table_dir);
                    let info = client.create_table(&table_ref, &columns)?;
                    table_info_json(&table, &info)
                }
                TableTarget::Remote { base_url, table } => {
                    let info = RemoteClient::connect(&base_url)?.create_table(&table, &columns)?;
                    remote_table_info_json(&info)
                }
            };
            emit_json(json!({ "created": [created] }), color_mode);
            Ok(RunOutcome::ok())
        }
        TableCommand::List { url } => {
            let tables = match url {
                Some(url) => RemoteClient::connect(&url)?
                    .list_tables()?
                    .iter()
                    .map(remote_table_info_json)
                    .collect::<Vec<_>>(),
                None => {
                    let client = LocalClient::new().with_table_dir(&table_dir);
                    client
                        .list_tables()?
                        .into_iter()
                        .map(|info| {
                            let name = info
                                .path
                                .file_stem()
                                .and_then(|name| name.to_str())
                                .unwrap_or_default()
                                .to_string();
                            table_info_json(&name, &info)
                        })
                        .collect()
                }
            };
            emit_json(json!({ "tables": tables }), color_mode);
            Ok(RunOutcome::ok())
        }
        TableCommand::Info { table } => {
            let info = match parse_table_target(&table)? {
                TableTarget::Local(table_ref) => {
                    let client = LocalClient::new().with_table_dir(&table_dir);
                    table_info_json(&table, &client.table_info(&table_ref)?)
                }
                TableTarget::Remote { base_url, table } => {
                    remote_table_info_json(&RemoteClient::connect(&base_url)?.table_info(&table)?)
                }
            };
            emit_json(json!({ "table": info }), color_mode);
            Ok(RunOutcome::ok())
        }
        TableCommand::Delete { tables } => {
            let mut deleted = Vec::new();
            for table in tables {
                match parse_table_target(&table)? {
                    TableTarget::Local(table_ref) => {
                        let client = LocalClient::new().with_table_dir(&table_dir);
                        client.delete_table(&table_ref)?;
                    }
                    TableTarget::Remote { base_url, table } => {
                        RemoteClient::connect(&base_url)?.delete_table(&table)?;
                    }
                }
                deleted.push(table);
            }
            emit_json(json!({ "deleted": deleted }), color_mode);
            Ok(RunOutcome::ok())
        }
    }
}

fn local_only_ref(raw: &str, what: &str) -> Result<TableRef, Error> {
    match parse_table_target(raw)? {
        TableTarget::Local(table_ref) => Ok(table_ref),
        TableTarget::Remote { .. } => Err(Error::new(ErrorKind::Usage)
            .with_message(format!("{what} works on local tables only"))
            .with_hint("Run it on the machine that owns the table file.")),
    }
}

fn remote_table_info_json(info: &RemoteTableInfo) -> Value {
    json!({
        "name": info.name,
        "columns": info.columns,
        "row_count": info.row_count,
    })
}
