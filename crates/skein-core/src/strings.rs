//! The localized string table and its CSV loader.
//!
//! Strings are keyed by opaque ids (e.g. `line:0x5af1`); the machine never
//! parses them. The loader accepts the compiler's CSV export, whose header
//! names at least the `id` and `text` columns; `file`, `node` and
//! `lineNumber` are carried through when present.

use std::collections::HashMap;
use std::io::Read;

use thiserror::Error;

/// Errors that can occur when loading a string table.
#[derive(Debug, Error)]
pub enum StringTableError {
    #[error("failed to read string table: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("malformed string table at line {line}: {detail}")]
    Malformed { line: usize, detail: String },

    #[error("string table is missing required column {0:?}")]
    MissingColumn(&'static str),
}

/// One row of the string table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StringRow {
    /// Opaque string id.
    pub id: String,
    /// Localized text.
    pub text: String,
    /// Source file the line came from, if recorded.
    pub file: String,
    /// Source node the line came from, if recorded.
    pub node: String,
    /// Line number within the source file, if recorded.
    pub line_number: u32,
}

impl StringRow {
    /// Create a row with just an id and text.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            ..Self::default()
        }
    }
}

/// Mapping from string id to localized row.
#[derive(Clone, Debug, Default)]
pub struct StringTable {
    rows: HashMap<String, StringRow>,
}

impl StringTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, replacing any previous row with the same id.
    pub fn insert(&mut self, row: StringRow) {
        self.rows.insert(row.id.clone(), row);
    }

    /// Look up a row by id.
    pub fn get(&self, id: &str) -> Option<&StringRow> {
        self.rows.get(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Read a table from CSV with a header row.
    pub fn from_reader(mut r: impl Read) -> Result<Self, StringTableError> {
        let mut text = String::new();
        r.read_to_string(&mut text)?;
        Self::parse(&text)
    }

    /// Parse a table from CSV text with a header row.
    pub fn parse(text: &str) -> Result<Self, StringTableError> {
        let records = parse_csv(text)?;
        let mut records = records.into_iter();
        let Some(header) = records.next() else {
            return Err(StringTableError::MissingColumn("id"));
        };

        let column = |name: &'static str| header.iter().position(|h| h == name);
        let id_col = column("id").ok_or(StringTableError::MissingColumn("id"))?;
        let text_col = column("text").ok_or(StringTableError::MissingColumn("text"))?;
        let file_col = column("file");
        let node_col = column("node");
        let line_col = column("lineNumber");

        let cell = |record: &[String], col: Option<usize>| {
            col.and_then(|c| record.get(c)).cloned().unwrap_or_default()
        };

        let mut table = Self::new();
        for (index, record) in records.enumerate() {
            let line_number = match line_col.and_then(|c| record.get(c)) {
                None => 0,
                Some(s) if s.is_empty() => 0,
                Some(s) => s.parse().map_err(|_| StringTableError::Malformed {
                    line: index + 2,
                    detail: format!("bad lineNumber {s:?}"),
                })?,
            };
            table.insert(StringRow {
                id: cell(&record, Some(id_col)),
                text: cell(&record, Some(text_col)),
                file: cell(&record, file_col),
                node: cell(&record, node_col),
                line_number,
            });
        }
        Ok(table)
    }
}

/// Split CSV text into records of fields. Fields may be double-quoted;
/// quoted fields may contain commas, newlines and doubled quotes.
fn parse_csv(text: &str) -> Result<Vec<Vec<String>>, StringTableError> {
    let mut records = Vec::new();
    let mut record = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut line = 1;

    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                '\n' => {
                    line += 1;
                    field.push(c);
                }
                _ => field.push(c),
            }
            continue;
        }
        match c {
            '"' if field.is_empty() => in_quotes = true,
            ',' => record.push(std::mem::take(&mut field)),
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                line += 1;
                record.push(std::mem::take(&mut field));
                // Skip blank lines outside of records.
                if record.len() > 1 || !record[0].is_empty() {
                    records.push(std::mem::take(&mut record));
                } else {
                    record.clear();
                }
            }
            _ => field.push(c),
        }
    }
    if in_quotes {
        return Err(StringTableError::Malformed {
            line,
            detail: "unterminated quoted field".to_string(),
        });
    }
    if !field.is_empty() || !record.is_empty() {
        record.push(field);
        records.push(record);
    }
    Ok(records)
}
