//! Rate table parsing and validation.
//!
//! Ingestion is all-or-nothing: a table with a single bad row is rejected in
//! full, and every problem found is reported with its line number.

use std::path::Path;
use std::str::FromStr;

use ratechart_shared::UploadConfig;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use super::types::RateRow;

/// Columns every rate table must declare, matched case-sensitively.
pub const REQUIRED_HEADERS: [&str; 4] = ["CLR", "FAT", "SNF", "RATE"];

/// Why an upload could not be ingested.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// File extension is not in the accepted set.
    #[error("unsupported file type '{0}'")]
    UnsupportedFileType(String),

    /// File exceeds the configured size limit.
    #[error("file too large: {size} bytes exceeds maximum {max} bytes")]
    FileTooLarge {
        /// Actual size.
        size: u64,
        /// Maximum allowed size.
        max: u64,
    },

    /// Content is binary or not valid UTF-8 text.
    #[error("content is not a delimited text table")]
    NotTabular,

    /// No header line was found.
    #[error("file is empty")]
    Empty,

    /// Required columns are absent from the header line.
    #[error("missing required headers: {}", .0.join(", "))]
    MissingHeaders(Vec<String>),

    /// One or more data lines failed validation.
    #[error("{} row(s) failed validation", .0.len())]
    InvalidRows(Vec<RowError>),
}

/// A data line that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[error("line {line}: {kind}")]
pub struct RowError {
    /// 1-based line number in the uploaded file.
    pub line: usize,
    /// What was wrong with the line.
    pub kind: RowErrorKind,
}

/// Per-line validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RowErrorKind {
    /// Line has a different number of fields than the header.
    #[error("column count mismatch (expected {expected}, found {found})")]
    ColumnCountMismatch {
        /// Header column count.
        expected: usize,
        /// Fields on this line.
        found: usize,
    },

    /// A required field is empty.
    #[error("missing field {column}")]
    MissingField {
        /// Column name.
        column: &'static str,
    },

    /// A required field is not a number.
    #[error("non-numeric value '{value}' in {column}")]
    NonNumeric {
        /// Column name.
        column: &'static str,
        /// Offending text.
        value: String,
    },

    /// A number has more than two decimal places or is too large to store.
    #[error("value '{value}' in {column} is out of range (at most 2 decimal places, below 100000000)")]
    OutOfRange {
        /// Column name.
        column: &'static str,
        /// Offending text.
        value: String,
    },
}

/// File-level limits checked before parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPolicy {
    /// Largest accepted file, in bytes.
    pub max_file_bytes: u64,
    /// Accepted extensions, lowercase, without the dot.
    pub allowed_extensions: Vec<String>,
}

impl UploadPolicy {
    /// Default max file size: 5 MiB.
    pub const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;

    /// Set maximum file size.
    #[must_use]
    pub fn with_max_file_bytes(mut self, max: u64) -> Self {
        self.max_file_bytes = max;
        self
    }

    /// Set accepted extensions.
    #[must_use]
    pub fn with_allowed_extensions(mut self, extensions: Vec<String>) -> Self {
        self.allowed_extensions = extensions
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        self
    }

    /// Check if a file name carries an accepted extension.
    #[must_use]
    pub fn is_extension_allowed(&self, file_name: &str) -> bool {
        Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| {
                self.allowed_extensions
                    .iter()
                    .any(|allowed| allowed.eq_ignore_ascii_case(ext))
            })
    }

    /// Rejects files by extension and size.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedFileType` or `FileTooLarge`.
    pub fn check_file(&self, file_name: &str, size: u64) -> Result<(), ParseError> {
        if !self.is_extension_allowed(file_name) {
            return Err(ParseError::UnsupportedFileType(file_name.to_string()));
        }
        if size > self.max_file_bytes {
            return Err(ParseError::FileTooLarge {
                size,
                max: self.max_file_bytes,
            });
        }
        Ok(())
    }
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            max_file_bytes: Self::DEFAULT_MAX_FILE_BYTES,
            allowed_extensions: vec!["csv".to_string()],
        }
    }
}

impl From<&UploadConfig> for UploadPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self::default()
            .with_max_file_bytes(config.max_file_bytes)
            .with_allowed_extensions(config.allowed_extensions.clone())
    }
}

/// Parses an uploaded file after the file-level checks.
///
/// # Errors
///
/// Returns a [`ParseError`] describing every problem found; no rows are
/// returned unless the whole table is valid.
pub fn parse_rate_table(
    file_name: &str,
    content: &[u8],
    policy: &UploadPolicy,
) -> Result<Vec<RateRow>, ParseError> {
    policy.check_file(file_name, content.len() as u64)?;

    let text = std::str::from_utf8(content).map_err(|_| ParseError::NotTabular)?;
    if text.contains('\0') {
        return Err(ParseError::NotTabular);
    }

    parse_rate_text(text.strip_prefix('\u{feff}').unwrap_or(text))
}

/// Parses comma-separated rate table text.
///
/// # Errors
///
/// See [`parse_rate_table`].
pub fn parse_rate_text(text: &str) -> Result<Vec<RateRow>, ParseError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line))
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header_line) = lines.next().ok_or(ParseError::Empty)?;
    let layout = ColumnLayout::locate(&split_fields(header_line)?)?;

    let mut rows = Vec::new();
    let mut errors = Vec::new();

    for (line, raw) in lines {
        match layout.extract(&split_fields(raw)?) {
            Ok(row) => rows.push(row),
            Err(kind) => errors.push(RowError { line, kind }),
        }
    }

    if !errors.is_empty() {
        return Err(ParseError::InvalidRows(errors));
    }

    Ok(rows)
}

/// Splits one line into unquoted, trimmed fields.
fn split_fields(line: &str) -> Result<Vec<String>, ParseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(line.as_bytes());

    let mut record = csv::StringRecord::new();
    let found = reader
        .read_record(&mut record)
        .map_err(|_| ParseError::NotTabular)?;
    if !found {
        return Ok(Vec::new());
    }

    Ok(record.iter().map(str::to_string).collect())
}

/// Positions of the required columns within the header.
#[derive(Debug)]
struct ColumnLayout {
    width: usize,
    clr: usize,
    fat: usize,
    snf: usize,
    rate: usize,
}

impl ColumnLayout {
    fn locate(header: &[String]) -> Result<Self, ParseError> {
        let position = |name: &str| header.iter().position(|h| h == name);

        let missing: Vec<String> = REQUIRED_HEADERS
            .iter()
            .filter(|name| position(name).is_none())
            .map(|name| (*name).to_string())
            .collect();

        match (
            position("CLR"),
            position("FAT"),
            position("SNF"),
            position("RATE"),
        ) {
            (Some(clr), Some(fat), Some(snf), Some(rate)) => Ok(Self {
                width: header.len(),
                clr,
                fat,
                snf,
                rate,
            }),
            _ => Err(ParseError::MissingHeaders(missing)),
        }
    }

    fn extract(&self, fields: &[String]) -> Result<RateRow, RowErrorKind> {
        if fields.len() != self.width {
            return Err(RowErrorKind::ColumnCountMismatch {
                expected: self.width,
                found: fields.len(),
            });
        }

        let columns = [
            ("CLR", fields[self.clr].as_str()),
            ("FAT", fields[self.fat].as_str()),
            ("SNF", fields[self.snf].as_str()),
            ("RATE", fields[self.rate].as_str()),
        ];

        if let Some(&(column, _)) = columns.iter().find(|(_, value)| value.is_empty()) {
            return Err(RowErrorKind::MissingField { column });
        }

        let [clr, fat, snf, rate] = columns;
        Ok(RateRow {
            clr: parse_number(clr)?,
            fat: parse_number(fat)?,
            snf: parse_number(snf)?,
            rate: parse_number(rate)?,
        })
    }
}

/// Largest magnitude a `NUMERIC(10, 2)` column holds, exclusive.
const MAX_MAGNITUDE: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

/// Decimal places a stored value keeps.
const MAX_SCALE: u32 = 2;

fn parse_number((column, value): (&'static str, &str)) -> Result<Decimal, RowErrorKind> {
    let non_numeric = || RowErrorKind::NonNumeric {
        column,
        value: value.to_string(),
    };

    // Digit separators are accepted by `Decimal` but are not CSV numbers.
    if value.contains('_') {
        return Err(non_numeric());
    }

    let number = Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|_| non_numeric())?;

    if number.normalize().scale() > MAX_SCALE || number.abs() >= MAX_MAGNITUDE {
        return Err(RowErrorKind::OutOfRange {
            column,
            value: value.to_string(),
        });
    }

    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = "CLR,FAT,SNF,RATE\n25.5,3.5,8.5,32.50\n26.0,4.0,9.0,35.00";

    #[test]
    fn test_parses_sample_table() {
        let rows = parse_rate_text(SAMPLE).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            RateRow {
                clr: dec!(25.5),
                fat: dec!(3.5),
                snf: dec!(8.5),
                rate: dec!(32.50),
            }
        );
        assert_eq!(rows[1].rate, dec!(35.00));
    }

    #[test]
    fn test_header_order_is_free_and_extra_columns_allowed() {
        let text = "RATE,NOTE,SNF,FAT,CLR\n40.25,x,9.1,4.2,27\n";
        let rows = parse_rate_text(text).unwrap();
        assert_eq!(
            rows,
            vec![RateRow {
                clr: dec!(27),
                fat: dec!(4.2),
                snf: dec!(9.1),
                rate: dec!(40.25),
            }]
        );
    }

    #[test]
    fn test_quoted_fields_and_blank_lines() {
        let text = "\"CLR\",\"FAT\",\"SNF\",\"RATE\"\r\n\r\n\"25\", 3.5 ,8.5,\"30.00\"\r\n   \r\n";
        let rows = parse_rate_text(text).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].clr, dec!(25));
        assert_eq!(rows[0].fat, dec!(3.5));
    }

    #[test]
    fn test_duplicate_keys_are_kept() {
        let text = "CLR,FAT,SNF,RATE\n25,3.5,8.5,30\n25,3.5,8.5,31\n";
        let rows = parse_rate_text(text).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].rate, dec!(31));
    }

    #[test]
    fn test_header_only_table_is_valid_and_empty() {
        assert!(parse_rate_text("CLR,FAT,SNF,RATE\n").unwrap().is_empty());
    }

    #[test]
    fn test_missing_headers_are_aggregated() {
        let err = parse_rate_text("CLR,fat,SNF\n1,2,3\n").unwrap_err();
        assert_eq!(
            err,
            ParseError::MissingHeaders(vec!["FAT".to_string(), "RATE".to_string()])
        );
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(parse_rate_text("\n  \n").unwrap_err(), ParseError::Empty);
    }

    #[test]
    fn test_row_errors_carry_line_numbers() {
        let text = "CLR,FAT,SNF,RATE\n25,3.5,8.5,30\n\n25,3.5,8.5\n25,,8.5,30\n25,3.5,abc,30\n";
        let ParseError::InvalidRows(errors) = parse_rate_text(text).unwrap_err() else {
            panic!("expected row errors");
        };
        assert_eq!(
            errors,
            vec![
                RowError {
                    line: 4,
                    kind: RowErrorKind::ColumnCountMismatch {
                        expected: 4,
                        found: 3
                    },
                },
                RowError {
                    line: 5,
                    kind: RowErrorKind::MissingField { column: "FAT" },
                },
                RowError {
                    line: 6,
                    kind: RowErrorKind::NonNumeric {
                        column: "SNF",
                        value: "abc".to_string()
                    },
                },
            ]
        );
    }

    #[rstest]
    #[case("3.555", RowErrorKind::OutOfRange { column: "FAT", value: "3.555".to_string() })]
    #[case("1e-3", RowErrorKind::OutOfRange { column: "FAT", value: "1e-3".to_string() })]
    #[case("100000000", RowErrorKind::OutOfRange { column: "FAT", value: "100000000".to_string() })]
    #[case("-1e9", RowErrorKind::OutOfRange { column: "FAT", value: "-1e9".to_string() })]
    #[case("1_000", RowErrorKind::NonNumeric { column: "FAT", value: "1_000".to_string() })]
    fn test_rejects_values_that_do_not_fit_storage(
        #[case] fat: &str,
        #[case] expected: RowErrorKind,
    ) {
        let text = format!("CLR,FAT,SNF,RATE\n25,3.5,8.5,30\n25,{fat},8.5,30\n");
        assert_eq!(
            parse_rate_text(&text).unwrap_err(),
            ParseError::InvalidRows(vec![RowError {
                line: 3,
                kind: expected
            }])
        );
    }

    #[rstest]
    #[case("99999999.99", dec!(99999999.99))]
    #[case("3.500", dec!(3.5))]
    #[case("1e2", dec!(100))]
    #[case("-0.25", dec!(-0.25))]
    fn test_accepts_values_that_fit_storage(#[case] rate: &str, #[case] expected: Decimal) {
        let text = format!("CLR,FAT,SNF,RATE\n25,3.5,8.5,{rate}\n");
        assert_eq!(parse_rate_text(&text).unwrap()[0].rate, expected);
    }

    #[test]
    fn test_out_of_range_rows_are_reported_together() {
        let text = "CLR,FAT,SNF,RATE\n25,3.555,8.5,1e9\n25,3.5,8.5,1_000\n";
        let ParseError::InvalidRows(errors) = parse_rate_text(text).unwrap_err() else {
            panic!("expected row errors");
        };
        assert_eq!(
            errors,
            vec![
                RowError {
                    line: 2,
                    kind: RowErrorKind::OutOfRange {
                        column: "FAT",
                        value: "3.555".to_string()
                    },
                },
                RowError {
                    line: 3,
                    kind: RowErrorKind::NonNumeric {
                        column: "RATE",
                        value: "1_000".to_string()
                    },
                },
            ]
        );
    }

    #[test]
    fn test_row_error_display() {
        let error = RowError {
            line: 3,
            kind: RowErrorKind::MissingField { column: "RATE" },
        };
        assert_eq!(error.to_string(), "line 3: missing field RATE");
    }

    #[rstest]
    #[case("chart.csv", true)]
    #[case("CHART.CSV", true)]
    #[case("chart.xlsx", false)]
    #[case("chart.csv.exe", false)]
    #[case("chart", false)]
    fn test_extension_policy(#[case] file_name: &str, #[case] allowed: bool) {
        assert_eq!(UploadPolicy::default().is_extension_allowed(file_name), allowed);
    }

    #[test]
    fn test_rejects_unsupported_extension_before_parsing() {
        let err = parse_rate_table("chart.pdf", SAMPLE.as_bytes(), &UploadPolicy::default())
            .unwrap_err();
        assert_eq!(err, ParseError::UnsupportedFileType("chart.pdf".to_string()));
    }

    #[test]
    fn test_rejects_oversized_file() {
        let policy = UploadPolicy::default().with_max_file_bytes(10);
        let err = parse_rate_table("chart.csv", SAMPLE.as_bytes(), &policy).unwrap_err();
        assert!(matches!(err, ParseError::FileTooLarge { max: 10, .. }));
    }

    #[test]
    fn test_rejects_binary_content() {
        let policy = UploadPolicy::default();
        assert_eq!(
            parse_rate_table("chart.csv", &[0xff, 0xfe, 0x00, 0x41], &policy).unwrap_err(),
            ParseError::NotTabular
        );
        assert_eq!(
            parse_rate_table("chart.csv", b"CLR,FAT\0,SNF,RATE", &policy).unwrap_err(),
            ParseError::NotTabular
        );
    }

    #[test]
    fn test_strips_byte_order_mark() {
        let content = format!("\u{feff}{SAMPLE}");
        let rows =
            parse_rate_table("chart.csv", content.as_bytes(), &UploadPolicy::default()).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_policy_from_config_normalizes_extensions() {
        let config = UploadConfig {
            max_file_bytes: 1024,
            allowed_extensions: vec![".CSV".to_string(), "txt".to_string()],
        };
        let policy = UploadPolicy::from(&config);
        assert_eq!(policy.max_file_bytes, 1024);
        assert!(policy.is_extension_allowed("rates.txt"));
        assert!(policy.is_extension_allowed("rates.csv"));
    }

    fn amount() -> impl Strategy<Value = String> {
        (0i64..100_000).prop_map(|n| Decimal::new(n, 2).to_string())
    }

    fn valid_line() -> impl Strategy<Value = String> {
        (amount(), amount(), amount(), amount())
            .prop_map(|(clr, fat, snf, rate)| format!("{clr},{fat},{snf},{rate}"))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// Every well-formed line becomes exactly one row, in order.
        #[test]
        fn prop_valid_tables_parse_completely(lines in prop::collection::vec(valid_line(), 0..40)) {
            let text = format!("CLR,FAT,SNF,RATE\n{}", lines.join("\n"));
            let rows = parse_rate_text(&text).unwrap();
            prop_assert_eq!(rows.len(), lines.len());
        }

        /// One non-numeric RATE rejects the whole table and names its line.
        #[test]
        fn prop_single_bad_rate_rejects_everything(
            lines in prop::collection::vec(valid_line(), 1..40),
            pick in any::<prop::sample::Index>(),
            junk in "[g-z]{1,6}",
        ) {
            let bad = pick.index(lines.len());
            let mut lines = lines;
            let mut fields: Vec<&str> = lines[bad].split(',').collect();
            fields[3] = &junk;
            let corrupted = fields.join(",");
            lines[bad] = corrupted;

            let text = format!("CLR,FAT,SNF,RATE\n{}", lines.join("\n"));
            match parse_rate_text(&text) {
                Err(ParseError::InvalidRows(errors)) => {
                    prop_assert_eq!(errors.len(), 1);
                    prop_assert_eq!(errors[0].line, bad + 2);
                }
                other => prop_assert!(false, "expected rejection, got {:?}", other),
            }
        }

        /// A third decimal place anywhere rejects the table as out of range.
        #[test]
        fn prop_third_decimal_place_is_out_of_range(
            lines in prop::collection::vec(valid_line(), 1..40),
            pick in any::<prop::sample::Index>(),
            cents in 0i64..100_000,
            extra in 1i64..10,
        ) {
            let bad = pick.index(lines.len());
            let value = Decimal::new(cents * 10 + extra, 3).to_string();
            let mut lines = lines;
            let mut fields: Vec<&str> = lines[bad].split(',').collect();
            fields[1] = &value;
            let corrupted = fields.join(",");
            lines[bad] = corrupted;

            let text = format!("CLR,FAT,SNF,RATE\n{}", lines.join("\n"));
            match parse_rate_text(&text) {
                Err(ParseError::InvalidRows(errors)) => {
                    prop_assert_eq!(errors.len(), 1);
                    prop_assert_eq!(errors[0].line, bad + 2);
                    prop_assert_eq!(
                        &errors[0].kind,
                        &RowErrorKind::OutOfRange { column: "FAT", value: value.clone() }
                    );
                }
                other => prop_assert!(false, "expected rejection, got {:?}", other),
            }
        }
    }
}
