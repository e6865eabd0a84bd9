//! Purpose: In-memory table model plus the line-oriented text codec.
//! Exports: `Row`, `Table`, `parse_table`, `render_table`.
//! Role: Pure data layer beneath `core::store`; performs no file I/O.
//! Invariants: Header names are unique and define the column set for every row.
//! Invariants: Rendered output always has header arity on every data line.
//! Invariants: The format is naive comma-split text; no quoting or escaping exists.

use crate::core::error::{Error, ErrorKind};

/// One record: an ordered name-to-value mapping over the table's headers.
///
/// Field order is preserved as inserted. Equality compares fields pairwise in
/// order, which makes round-trip assertions exact.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Row {
    fields: Vec<(String, String)>,
}

impl Row {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut row = Self::new();
        for (name, value) in pairs {
            row.set(name.into(), value.into());
        }
        row
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    /// Look up a field that must exist; absent fields are a `MissingField` error.
    pub fn require(&self, name: &str) -> Result<&str, Error> {
        self.get(name).ok_or_else(|| {
            Error::new(ErrorKind::MissingField)
                .with_message("row has no such field")
                .with_field(name)
        })
    }

    /// Set a field, replacing an existing value or appending a new field.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(field, _)| *field == name) {
            Some((_, existing)) => *existing = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// The full persisted state: ordered headers plus rows in file order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Row>,
}

impl Table {
    pub fn new(headers: Vec<String>) -> Self {
        Self {
            headers,
            rows: Vec::new(),
        }
    }
}

/// Parse file text into a table.
///
/// The first line is the comma-joined header sequence; every following line
/// is one row. A data line whose field count differs from the header count is
/// a `Corrupt` error carrying the 1-based line number.
pub fn parse_table(text: &str) -> Result<Table, Error> {
    // `str::lines` strips the `\n` or `\r\n` terminator for us.
    let mut lines = text.lines();
    let header_line = lines
        .next()
        .ok_or_else(|| Error::new(ErrorKind::Corrupt).with_message("missing header line"))?;
    let headers: Vec<String> = header_line.split(',').map(str::to_string).collect();

    for (index, header) in headers.iter().enumerate() {
        if header.is_empty() {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("empty header name")
                .with_line(1));
        }
        if headers[..index].contains(header) {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("duplicate header name")
                .with_field(header)
                .with_line(1));
        }
    }

    let mut rows = Vec::new();
    for (index, line) in lines.enumerate() {
        let line_number = index as u64 + 2;
        let values: Vec<&str> = line.split(',').collect();
        if values.len() != headers.len() {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "row has {} fields, expected {}",
                    values.len(),
                    headers.len()
                ))
                .with_line(line_number));
        }
        rows.push(Row::from_pairs(
            headers.iter().map(String::as_str).zip(values),
        ));
    }

    Ok(Table { headers, rows })
}

/// Render a table to file text: header line plus one line per row, values
/// looked up by header name. A row missing a header field is a
/// `MissingField` error; nothing is emitted for fields outside the headers.
pub fn render_table(table: &Table) -> Result<String, Error> {
    let mut out = String::new();
    out.push_str(&table.headers.join(","));
    out.push('\n');
    for row in &table.rows {
        let mut first = true;
        for header in &table.headers {
            if !first {
                out.push(',');
            }
            first = false;
            out.push_str(row.require(header)?);
        }
        out.push('\n');
    }
    Ok(out)
}
