//! Purpose: `gridfile` CLI entry point and command dispatch bootstrap.
//! Role: Binary crate root; parses args, runs commands, emits JSON on stdout.
//! Invariants: Commands emit stable stdout JSON envelopes.
//! Invariants: Non-interactive errors are emitted as JSON on stderr.
//! Invariants: Process exit code is derived from `api::to_exit_code`.
//! Invariants: All table mutations go through `api::Store` (locks + atomic rename).
#![allow(clippy::result_large_err)]

use std::io::{self, IsTerminal};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::{
    CommandFactory, Parser, Subcommand, ValueEnum, ValueHint,
    error::ErrorKind as ClapErrorKind,
};
use clap_complete::aot::Shell;
use serde_json::{Map, Value, json};

mod command_dispatch;
mod serve;

use command_dispatch::dispatch_command;
use gridfile::api::{
    Error, ErrorKind, LocalClient, RemoteClient, RemoteTableInfo, Row, TableRef,
    table_dir_or_default, to_exit_code,
};
use gridfile::row_json::{row_from_object, row_json, rows_json, table_info_json};

#[derive(Copy, Clone, Debug)]
struct RunOutcome {
    exit_code: i32,
}

impl RunOutcome {
    fn ok() -> Self {
        Self { exit_code: 0 }
    }

    fn with_code(exit_code: i32) -> Self {
        Self { exit_code }
    }
}

fn main() {
    let exit_code = match run() {
        Ok(outcome) => outcome.exit_code,
        Err((err, color_mode)) => {
            emit_error(&err, color_mode);
            to_exit_code(err.kind())
        }
    };
    std::process::exit(exit_code);
}

fn run() -> Result<RunOutcome, (Error, ColorMode)> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => match err.kind() {
            ClapErrorKind::DisplayHelp
            | ClapErrorKind::DisplayVersion
            | ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
                err.print().map_err(|io_err| {
                    (
                        Error::new(ErrorKind::Io)
                            .with_message("failed to write help")
                            .with_source(io_err),
                        ColorMode::Auto,
                    )
                })?;
                let exit_code = if matches!(
                    err.kind(),
                    ClapErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
                ) {
                    2
                } else {
                    0
                };
                return Ok(RunOutcome::with_code(exit_code));
            }
            _ => {
                return Err((
                    Error::new(ErrorKind::Usage)
                        .with_message(clap_error_summary(&err))
                        .with_hint("Run with --help for usage."),
                    ColorMode::Auto,
                ));
            }
        },
    };

    let table_dir = table_dir_or_default(cli.dir);
    let color_mode = cli.color;
    dispatch_command(cli.command, table_dir, color_mode).map_err(|err| (err, color_mode))
}

fn clap_error_summary(err: &clap::Error) -> String {
    let rendered = err.to_string();
    rendered
        .lines()
        .next()
        .unwrap_or("invalid arguments")
        .trim_start_matches("error: ")
        .to_string()
}

#[derive(Parser)]
#[command(
    name = "gridfile",
    version,
    about = "Flat-file CSV tables with a filtered CRUD view",
    help_template = r#"{about-with-newline}
{before-help}USAGE
  {usage}

COMMANDS
{subcommands}

OPTIONS
{options}

{after-help}
"#,
    long_about = None,
    before_help = r#"Tables are plain CSV files: the first line holds the column names, every
other line is one row. Filters are exact field=value matches.
"#,
    after_help = r#"EXAMPLES
  $ gridfile table create people --columns name,street
  $ gridfile insert people name=otto street=Landstr
  $ gridfile fetch people name=otto
  $ gridfile update people --set street=Waldstr --where name=maier
  $ gridfile delete people --where name=otto
  $ gridfile serve                      # JSON API + HTML view on 127.0.0.1:9711

LEARN MORE
  Common table operations:
    gridfile table create <name> --columns a,b,c
    gridfile table info <name>
    gridfile table list
    gridfile table delete <name>...

  $ gridfile <command> --help"#,
    arg_required_else_help = true,
    disable_help_subcommand = false
)]
struct Cli {
    #[arg(
        long,
        help = "Table directory for named tables (default: ~/.gridfile/tables)",
        value_hint = ValueHint::DirPath
    )]
    dir: Option<PathBuf>,
    #[arg(
        long,
        default_value = "auto",
        value_enum,
        help = "Colorize stderr diagnostics: auto|always|never"
    )]
    color: ColorMode,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum ColorMode {
    Auto,
    Always,
    Never,
}

impl ColorMode {
    fn use_color(self, is_tty: bool) -> bool {
        match self {
            ColorMode::Auto => is_tty,
            ColorMode::Always => true,
            ColorMode::Never => false,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    #[command(
        arg_required_else_help = true,
        about = "Manage table files",
        after_help = r#"EXAMPLES
  $ gridfile table create people --columns name,street
  $ gridfile table info people
  $ gridfile table list
  $ gridfile table delete people
  $ gridfile table list --url http://127.0.0.1:9711

NOTES
  - Default location: ~/.gridfile/tables (override with --dir)
  - Columns are fixed at creation; rows must cover them exactly"#
    )]
    Table {
        #[command(subcommand)]
        command: TableCommand,
    },
    #[command(
        about = "Fetch rows, optionally filtered by field=value pairs",
        after_help = r#"EXAMPLES
  $ gridfile fetch people                  # every row, file order
  $ gridfile fetch people name=otto        # equality filter
  $ gridfile fetch people name=otto street=Landstr
  $ gridfile fetch http://127.0.0.1:9711/people name=otto

NOTES
  - Filters AND together; a row must match every pair
  - Remote refs are shorthand: http(s)://host:port/<table>"#
    )]
    Fetch {
        #[arg(help = "Table ref: local name/path or shorthand URL http(s)://host:port/<table>")]
        table: String,
        #[arg(help = "Equality filters as field=value")]
        criteria: Vec<String>,
    },
    #[command(
        about = "Insert one row",
        after_help = r#"EXAMPLES
  $ gridfile insert people name=otto street=Landstr
  $ gridfile insert people --json '{"name": "otto", "street": "Landstr"}'

NOTES
  - The row must cover the table's columns exactly
  - Values must not contain commas or line breaks (the format has no quoting)"#
    )]
    Insert {
        #[arg(help = "Table ref: local name/path or shorthand URL http(s)://host:port/<table>")]
        table: String,
        #[arg(help = "Row fields as field=value")]
        values: Vec<String>,
        #[arg(long, help = "Full row as a JSON object", conflicts_with = "values")]
        json: Option<String>,
    },
    #[command(
        about = "Overwrite fields on every row matching the filters",
        after_help = r#"EXAMPLES
  $ gridfile update people --set street=Waldstr --where name=maier
  $ gridfile update people --set street=X      # no --where: every row"#
    )]
    Update {
        #[arg(help = "Table ref: local name/path or shorthand URL http(s)://host:port/<table>")]
        table: String,
        #[arg(
            long = "set",
            required = true,
            help = "Field to overwrite, as field=value (repeatable)"
        )]
        set: Vec<String>,
        #[arg(long = "where", help = "Equality filter as field=value (repeatable)")]
        criteria: Vec<String>,
    },
    #[command(
        about = "Delete rows differing from no filter pair, or wipe with --all",
        after_help = r#"EXAMPLES
  $ gridfile delete people --where name=otto
  $ gridfile delete people --all               # wipe every row

NOTES
  - Survivors must differ on EVERY --where pair; a row equal on any
    single pair is dropped"#
    )]
    Delete {
        #[arg(help = "Table ref: local name/path or shorthand URL http(s)://host:port/<table>")]
        table: String,
        #[arg(
            long = "where",
            help = "Equality filter as field=value (repeatable)",
            conflicts_with = "all"
        )]
        criteria: Vec<String>,
        #[arg(long, help = "Delete every row")]
        all: bool,
    },
    #[command(about = "Copy the table file to its .backup sibling")]
    Backup {
        #[arg(help = "Local table name or path")]
        table: String,
    },
    #[command(about = "Replace the table file with its .backup sibling")]
    Restore {
        #[arg(help = "Local table name or path")]
        table: String,
    },
    #[command(
        about = "Run the HTTP/JSON server with the HTML table view",
        after_help = r#"EXAMPLES
  $ gridfile serve
  $ gridfile serve --bind 127.0.0.1:9000
  $ curl http://127.0.0.1:9711/v0/tables/people/rows?name=otto
  $ open http://127.0.0.1:9711/tables/people   # HTML table view"#
    )]
    Serve(ServeArgs),
    #[command(about = "Generate shell completions")]
    Completion {
        #[arg(value_enum)]
        shell: Shell,
    },
    #[command(about = "Print version information as JSON")]
    Version,
}

#[derive(clap::Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1:9711", help = "Bind address host:port")]
    bind: String,
    #[arg(long, help = "Allow binding non-loopback addresses")]
    allow_non_loopback: bool,
    #[arg(
        long,
        default_value_t = 1_048_576,
        help = "Maximum request body size in bytes"
    )]
    max_body_bytes: u64,
}

#[derive(Subcommand)]
enum TableCommand {
    #[command(about = "Create a table with the given columns")]
    Create {
        #[arg(help = "Table ref: local name/path or shorthand URL http(s)://host:port/<table>")]
        table: String,
        #[arg(
            long,
            required = true,
            value_delimiter = ',',
            help = "Comma-separated column names"
        )]
        columns: Vec<String>,
    },
    #[command(about = "List tables in the table directory (or on a server)")]
    List {
        #[arg(long, help = "List tables on a running server instead", value_hint = ValueHint::Url)]
        url: Option<String>,
    },
    #[command(about = "Show one table's columns and row count")]
    Info {
        #[arg(help = "Table ref: local name/path or shorthand URL http(s)://host:port/<table>")]
        table: String,
    },
    #[command(about = "Delete table files and their sidecars")]
    Delete {
        #[arg(required = true)]
        tables: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum TableTarget {
    Local(TableRef),
    Remote { base_url: String, table: String },
}

fn parse_table_target(raw: &str) -> Result<TableTarget, Error> {
    if raw.starts_with("http://") || raw.starts_with("https://") {
        let parsed = url::Url::parse(raw).map_err(|err| {
            Error::new(ErrorKind::Usage)
                .with_message("invalid remote table ref")
                .with_source(err)
        })?;
        let segments: Vec<String> = parsed
            .path_segments()
            .map(|segments| {
                segments
                    .filter(|segment| !segment.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if segments.len() != 1 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message("remote table refs must be shorthand: http(s)://host:port/<table>")
                .with_hint("Example: http://127.0.0.1:9711/people"));
        }
        let mut base = parsed;
        base.set_path("");
        base.set_query(None);
        base.set_fragment(None);
        Ok(TableTarget::Remote {
            base_url: base.to_string(),
            table: segments.into_iter().next().unwrap_or_default(),
        })
    } else {
        Ok(TableTarget::Local(local_table_ref(raw)))
    }
}

fn local_table_ref(raw: &str) -> TableRef {
    if raw.contains('/') {
        TableRef::path(raw)
    } else {
        TableRef::name(raw)
    }
}

fn parse_pairs(args: &[String], what: &str) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    for arg in args {
        let split = arg.split_once('=');
        let Some((field, value)) = split else {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid {what} `{arg}`"))
                .with_hint("Use field=value, e.g. name=otto."));
        };
        if field.is_empty() {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("invalid {what} `{arg}`: empty field name"))
                .with_hint("Use field=value, e.g. name=otto."));
        }
        pairs.push((field.to_string(), value.to_string()));
    }
    Ok(pairs)
}

fn row_from_cli(values: &[String], json_text: Option<&str>) -> Result<Row, Error> {
    match (values.is_empty(), json_text) {
        (false, None) => Ok(Row::from_pairs(parse_pairs(values, "row field")?)),
        (true, Some(text)) => {
            let object: Map<String, Value> = serde_json::from_str(text).map_err(|err| {
                Error::new(ErrorKind::Usage)
                    .with_message("--json must be a JSON object of field values")
                    .with_source(err)
            })?;
            row_from_object(&object)
        }
        (true, None) => Err(Error::new(ErrorKind::Usage)
            .with_message("insert needs field=value pairs or --json")
            .with_hint("Example: gridfile insert people name=otto street=Landstr")),
        (false, Some(_)) => Err(Error::new(ErrorKind::Usage)
            .with_message("--json cannot be combined with field=value pairs")),
    }
}

fn emit_json(value: Value, color_mode: ColorMode) {
    let is_tty = io::stdout().is_terminal();
    let pretty = is_tty || color_mode.use_color(is_tty);
    let json = if pretty {
        serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
    } else {
        serde_json::to_string(&value)
            .unwrap_or_else(|_| "{\"error\":\"json encode failed\"}".to_string())
    };
    println!("{json}");
}

#[derive(Copy, Clone, Debug)]
enum AnsiColor {
    Red,
    Yellow,
}

fn colorize_label(label: &str, enabled: bool, color: AnsiColor) -> String {
    if !enabled {
        return label.to_string();
    }
    let code = match color {
        AnsiColor::Red => "31",
        AnsiColor::Yellow => "33",
    };
    format!("\u{1b}[{code}m{label}\u{1b}[0m")
}

fn emit_error(err: &Error, color_mode: ColorMode) {
    let is_tty = io::stderr().is_terminal();
    if is_tty {
        eprintln!("{}", error_text(err, color_mode.use_color(is_tty)));
        return;
    }

    let value = error_json(err);
    let json = serde_json::to_string(&value).unwrap_or_else(|_| {
        "{\"error\":{\"kind\":\"Internal\",\"message\":\"json encode failed\"}}".to_string()
    });
    eprintln!("{json}");
}

fn backup_time_now() -> Option<String> {
    use time::format_description::well_known::Rfc3339;
    let duration = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
    let ts = time::OffsetDateTime::from_unix_timestamp_nanos(duration.as_nanos() as i128).ok()?;
    ts.format(&Rfc3339).ok()
}

fn error_message(err: &Error) -> String {
    if let Some(message) = err.message() {
        return message.to_string();
    }
    match err.kind() {
        ErrorKind::Internal => "internal error".to_string(),
        ErrorKind::Usage => "usage error".to_string(),
        ErrorKind::NotFound => "not found".to_string(),
        ErrorKind::AlreadyExists => "already exists".to_string(),
        ErrorKind::MissingField => "missing field".to_string(),
        ErrorKind::Corrupt => "corrupt data".to_string(),
        ErrorKind::Io => "i/o error".to_string(),
    }
}

fn error_causes(err: &Error) -> Vec<String> {
    use std::error::Error as StdError;
    let mut causes = Vec::new();
    let mut cur = err.source();
    while let Some(source) = cur {
        causes.push(source.to_string());
        cur = source.source();
    }
    causes
}

fn error_json(err: &Error) -> Value {
    let mut inner = Map::new();
    inner.insert("kind".to_string(), json!(format!("{:?}", err.kind())));
    inner.insert("message".to_string(), json!(error_message(err)));
    if let Some(hint) = err.hint() {
        inner.insert("hint".to_string(), json!(hint));
    }
    if let Some(path) = err.path() {
        inner.insert("path".to_string(), json!(path.display().to_string()));
    }
    if let Some(field) = err.field() {
        inner.insert("field".to_string(), json!(field));
    }
    if let Some(line) = err.line() {
        inner.insert("line".to_string(), json!(line));
    }
    let causes = error_causes(err);
    if !causes.is_empty() {
        inner.insert("causes".to_string(), json!(causes));
    }

    let mut outer = Map::new();
    outer.insert("error".to_string(), Value::Object(inner));
    Value::Object(outer)
}

fn error_text(err: &Error, use_color: bool) -> String {
    let mut lines = Vec::new();
    lines.push(format!(
        "{} {}",
        colorize_label("error:", use_color, AnsiColor::Red),
        error_message(err)
    ));

    if let Some(hint) = err.hint() {
        lines.push(format!(
            "{} {hint}",
            colorize_label("hint:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(path) = err.path() {
        lines.push(format!(
            "{} {}",
            colorize_label("path:", use_color, AnsiColor::Yellow),
            path.display()
        ));
    }
    if let Some(field) = err.field() {
        lines.push(format!(
            "{} {field}",
            colorize_label("field:", use_color, AnsiColor::Yellow)
        ));
    }
    if let Some(line) = err.line() {
        lines.push(format!(
            "{} {line}",
            colorize_label("line:", use_color, AnsiColor::Yellow)
        ));
    }

    let causes = error_causes(err);
    if let Some(cause) = causes.first() {
        lines.push(format!(
            "{} {cause}",
            colorize_label("caused by:", use_color, AnsiColor::Yellow)
        ));
    }

    lines.join("\n")
}
