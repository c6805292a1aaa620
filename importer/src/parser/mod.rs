//! Line scanner and row assembler for vertical dumps.
//!
//! A vertical dump is what `mysql -E` (or `\G`) prints: one decorated
//! header line per row followed by one `column: value` line per field.
//! Values that contain line breaks spill over onto following lines.
//!
//! ```text
//! *************************** 1. row ***************************
//!       COLUMN_id: 12
//!    COLUMN_title: Foo
//! COLUMN_abstract: first line
//! second line
//! *************************** 2. row ***************************
//! ...
//! ```
//!
//! [`RowScanner`] turns such input into a lazy sequence of [`RawRow`]s.

use std::io::BufRead;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::error::{ScanError, ScanResult};

/// Marker substituted for embedded line breaks in field values.
pub const DEFAULT_LINE_BREAK: &str = "<br/>";

static ROW_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*\*+ \d+\. row \*+\s*$").expect("valid row marker regex"));

static TAB_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\t+").expect("valid tab regex"));

// A run of line breaks, including blank lines in between.
static BREAK_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n(?: *\n)*").expect("valid line break regex"));

/// Whether the line is a decorated row header such as `*** 3. row ***`.
pub fn is_row_marker(line: &str) -> bool {
    ROW_MARKER.is_match(line)
}

// =============================================================================
// Field pattern
// =============================================================================

/// Compiled `prefix + name + ": " + value` line pattern.
///
/// The prefix is a regular-expression fragment, so a malformed prefix is
/// reported as [`ScanError::InvalidPattern`] before any line is read.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    prefix: String,
    regex: Regex,
}

impl FieldPattern {
    pub fn new(prefix: &str) -> ScanResult<Self> {
        let pattern = format!(r"^\s*{}(\w+): (.*)$", prefix);
        let regex = Regex::new(&pattern)
            .map_err(|source| ScanError::InvalidPattern { pattern, source })?;
        Ok(Self { prefix: prefix.to_string(), regex })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Split a field line into its cleaned name and raw value.
    pub fn parse<'l>(&self, line: &'l str) -> Option<(&'l str, &'l str)> {
        let caps = self.regex.captures(line)?;
        Some((caps.get(1)?.as_str(), caps.get(2)?.as_str()))
    }
}

/// Normalize an accumulated field value.
///
/// Tab runs become one space, the value is trimmed, and every run of line
/// breaks becomes a single `line_break` marker. A value made only of line
/// breaks ends up empty.
pub fn normalize_value(raw: &str, line_break: &str) -> String {
    let collapsed = TAB_RUN.replace_all(raw, " ");
    let trimmed = collapsed.trim();
    if trimmed.is_empty() {
        return String::new();
    }
    BREAK_RUN.replace_all(trimmed, line_break).into_owned()
}

// =============================================================================
// Raw rows
// =============================================================================

/// One row block of the dump: field names to normalized raw values.
///
/// Fields keep first-seen order and names are unique.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    /// 1-based position of the row block in the dump
    pub index: usize,
    /// 1-based line number of the row marker
    pub line: usize,
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Fields in source order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.fields.iter().map(|(n, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Accumulates one row while its lines are being read.
struct RowBuilder {
    index: usize,
    line: usize,
    fields: Vec<(String, String)>,
    open: Option<usize>,
}

impl RowBuilder {
    fn new(index: usize, line: usize) -> Self {
        Self { index, line, fields: Vec::new(), open: None }
    }

    /// Start (or restart) a field. A repeated name overwrites in place.
    fn open_field(&mut self, name: &str, value: &str) {
        match self.fields.iter().position(|(n, _)| n == name) {
            Some(pos) => {
                self.fields[pos].1 = value.to_string();
                self.open = Some(pos);
            }
            None => {
                self.fields.push((name.to_string(), value.to_string()));
                self.open = Some(self.fields.len() - 1);
            }
        }
    }

    /// Append a continuation line to the open field. Returns false when no
    /// field is open.
    fn continue_field(&mut self, line: &str) -> bool {
        match self.open {
            Some(pos) => {
                let value = &mut self.fields[pos].1;
                value.push('\n');
                value.push_str(line);
                true
            }
            None => false,
        }
    }

    fn finish(self, line_break: &str) -> RawRow {
        RawRow {
            index: self.index,
            line: self.line,
            fields: self
                .fields
                .into_iter()
                .map(|(name, value)| {
                    let value = normalize_value(&value, line_break);
                    (name, value)
                })
                .collect(),
        }
    }
}

// =============================================================================
// Scanner
// =============================================================================

/// Why a line was thrown away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Line appeared before the first row marker.
    BeforeFirstRow,
    /// Continuation line with no field open in the current row.
    NoOpenField,
}

/// A line that matched nothing and could not be attached to a field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DroppedLine {
    pub line: usize,
    pub text: String,
    pub reason: DropReason,
}

/// Lazy row iterator over a sequence of lines.
///
/// A row is yielded when the next row marker is read, and the last row is
/// yielded once the lines run out. Lines before the first marker are never
/// part of a row.
pub struct RowScanner<I> {
    lines: I,
    pattern: FieldPattern,
    line_break: String,
    current: Option<RowBuilder>,
    line_no: usize,
    rows_seen: usize,
    dropped: Vec<DroppedLine>,
    finished: bool,
}

impl<I> RowScanner<I>
where
    I: Iterator<Item = ScanResult<String>>,
{
    pub fn new(lines: I, pattern: FieldPattern, line_break: impl Into<String>) -> Self {
        Self {
            lines,
            pattern,
            line_break: line_break.into(),
            current: None,
            line_no: 0,
            rows_seen: 0,
            dropped: Vec::new(),
            finished: false,
        }
    }

    /// Lines dropped since the last call.
    pub fn take_dropped(&mut self) -> Vec<DroppedLine> {
        std::mem::take(&mut self.dropped)
    }

    /// Number of lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.line_no
    }

    fn drop_line(&mut self, text: &str, reason: DropReason) {
        self.dropped.push(DroppedLine {
            line: self.line_no,
            text: text.to_string(),
            reason,
        });
    }
}

impl<I> Iterator for RowScanner<I>
where
    I: Iterator<Item = ScanResult<String>>,
{
    type Item = ScanResult<RawRow>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e));
                }
                None => {
                    self.finished = true;
                    let line_break = self.line_break.clone();
                    return self.current.take().map(|row| Ok(row.finish(&line_break)));
                }
            };
            self.line_no += 1;
            let text = line.strip_suffix('\r').unwrap_or(&line);

            if is_row_marker(text) {
                self.rows_seen += 1;
                let next = RowBuilder::new(self.rows_seen, self.line_no);
                if let Some(done) = self.current.replace(next) {
                    return Some(Ok(done.finish(&self.line_break)));
                }
                continue;
            }

            let Some(row) = self.current.as_mut() else {
                self.drop_line(text, DropReason::BeforeFirstRow);
                continue;
            };

            if let Some((name, value)) = self.pattern.parse(text) {
                row.open_field(name, value);
            } else if !row.continue_field(text) {
                self.drop_line(text, DropReason::NoOpenField);
            }
        }
    }
}

/// Scan an in-memory dump.
pub fn scan_str<'a>(
    content: &'a str,
    pattern: FieldPattern,
    line_break: &str,
) -> RowScanner<impl Iterator<Item = ScanResult<String>> + 'a> {
    RowScanner::new(content.lines().map(|l| Ok(l.to_string())), pattern, line_break)
}

/// Scan a dump from any buffered reader, one line at a time.
pub fn scan_reader<R: BufRead>(
    reader: R,
    pattern: FieldPattern,
    line_break: &str,
) -> RowScanner<impl Iterator<Item = ScanResult<String>>> {
    RowScanner::new(
        reader.lines().map(|l| l.map_err(ScanError::from)),
        pattern,
        line_break,
    )
}

// =============================================================================
// Decoding
// =============================================================================

/// A dump file decoded to text.
#[derive(Debug, Clone)]
pub struct DecodedDump {
    pub content: String,
    /// Encoding used to decode the bytes
    pub encoding: String,
}

/// Detect the encoding of raw bytes using chardet
pub fn detect_encoding(bytes: &[u8]) -> String {
    let result = chardet::detect(bytes);
    let charset = result.0;

    match charset.to_lowercase().as_str() {
        "ascii" | "utf-8" | "utf8" => "utf-8".to_string(),
        "iso-8859-1" | "iso-8859-15" | "latin-1" | "latin1" => "iso-8859-1".to_string(),
        "windows-1252" | "cp1252" => "windows-1252".to_string(),
        _ => charset,
    }
}

/// Decode bytes to string using the given encoding label.
pub fn decode_content(bytes: &[u8], encoding: &str) -> ScanResult<String> {
    let codec = match encoding.to_lowercase().as_str() {
        "utf-8" | "utf8" | "ascii" => encoding_rs::UTF_8,
        "iso-8859-1" | "latin-1" | "latin1" => encoding_rs::ISO_8859_15,
        "windows-1252" | "cp1252" => encoding_rs::WINDOWS_1252,
        other => encoding_rs::Encoding::for_label(other.as_bytes()).ok_or_else(|| {
            ScanError::Encoding { encoding: encoding.to_string() }
        })?,
    };
    let (text, _, had_errors) = codec.decode(bytes);
    if had_errors && codec == encoding_rs::UTF_8 {
        return Err(ScanError::Encoding { encoding: encoding.to_string() });
    }
    Ok(text.into_owned())
}

/// Read a dump file, keeping UTF-8 as is and falling back to charset
/// detection for anything else.
pub fn read_dump<P: AsRef<Path>>(path: P) -> ScanResult<DecodedDump> {
    let bytes = std::fs::read(path.as_ref())?;
    match String::from_utf8(bytes) {
        Ok(content) => Ok(DecodedDump { content, encoding: "utf-8".to_string() }),
        Err(err) => {
            let bytes = err.into_bytes();
            let mut encoding = detect_encoding(&bytes);
            let known = encoding_rs::Encoding::for_label(encoding.as_bytes()).is_some();
            if encoding == "utf-8" || !known {
                // not UTF-8 after all, and chardet had no better guess
                encoding = "windows-1252".to_string();
            }
            let content = decode_content(&bytes, &encoding)?;
            Ok(DecodedDump { content, encoding })
        }
    }
}
