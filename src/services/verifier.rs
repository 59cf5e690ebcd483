//! Record-level verification of split chunks.
//!
//! Records are semicolon-separated and positionally mapped onto the
//! schema of the resolved application. Validation runs in two layers:
//! structural field constraints first (presence, length, enumerations,
//! numeric bounds), then semantic date parsing. A single violating
//! record fails the whole object; violations are collected and logged
//! with line number and field name, and the failure is reported once
//! per object.

use crate::models::blob::Application;
use crate::models::report::{AggregateRecord, ReportMetaData};
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

/// Fixed currency code every record must carry.
const CURRENCY_EUR: &str = "978";

const AGGREGATE_FIELDS: usize = 13;
const TRANSACTION_FIELDS: usize = 19;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("cannot verify an object with an unrecognized application")]
    UnknownApplication,
    /// At least one record violated the schema; the whole object is
    /// rejected, there is no partial acceptance.
    #[error("{count} violations in `{name}`")]
    Invalid { name: String, count: usize },
    #[error("no valid records in `{0}`")]
    Empty(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One schema violation, located by line and field.
#[derive(Debug)]
pub struct Violation {
    pub line: usize,
    pub field: &'static str,
    pub reason: String,
}

pub struct Verifier {
    two_digit_code: Regex,
    hpan: Regex,
    bin: Regex,
}

impl Verifier {
    pub fn new() -> Self {
        Self {
            // Literal patterns, always compile.
            two_digit_code: Regex::new(r"^\d{2}$").expect("valid pattern"),
            hpan: Regex::new(r"^[a-fA-F0-9]{64}$").expect("valid pattern"),
            bin: Regex::new(r"^(\d{6}|\d{8})$").expect("valid pattern"),
        }
    }

    /// Verify every record in the file at `path`.
    ///
    /// Returns the number of valid records. While scanning aggregate
    /// records, each valid one is folded into `report` when present.
    /// `skip_first` drops one leading header/checksum line before
    /// validation begins.
    pub fn verify_file(
        &self,
        path: &Path,
        application: Application,
        skip_first: bool,
        mut report: Option<&mut ReportMetaData>,
    ) -> Result<usize, VerifyError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let reader = BufReader::new(File::open(path)?);

        let mut violations: Vec<Violation> = Vec::new();
        let mut valid = 0usize;
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if index == 0 && skip_first {
                continue;
            }
            if line.is_empty() {
                continue;
            }
            let line_number = index + 1;
            let before = violations.len();
            match application {
                Application::Aggregates => {
                    if let Some(record) =
                        self.check_aggregate(&line, line_number, &mut violations)
                    {
                        if let Some(report) = report.as_deref_mut() {
                            report.observe(&record);
                        }
                    }
                }
                Application::Transactions => {
                    self.check_transaction(&line, line_number, &mut violations);
                }
                // Contract chunks were validated element-wise while
                // splitting; nothing to do per record here.
                Application::Contracts => {}
                Application::Unknown => return Err(VerifyError::UnknownApplication),
            }
            if violations.len() == before {
                valid += 1;
            }
        }

        if !violations.is_empty() {
            for violation in &violations {
                tracing::warn!(
                    object = %name,
                    line = violation.line,
                    field = violation.field,
                    reason = %violation.reason,
                    "record violation"
                );
            }
            return Err(VerifyError::Invalid {
                name,
                count: violations.len(),
            });
        }
        if valid == 0 && application != Application::Contracts {
            return Err(VerifyError::Empty(name));
        }
        Ok(valid)
    }

    /// Validate one aggregate record, returning it for aggregation
    /// when clean.
    fn check_aggregate(
        &self,
        line: &str,
        line_number: usize,
        violations: &mut Vec<Violation>,
    ) -> Option<AggregateRecord> {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != AGGREGATE_FIELDS {
            violations.push(Violation {
                line: line_number,
                field: "record",
                reason: format!("expected {} fields, found {}", AGGREGATE_FIELDS, fields.len()),
            });
            return None;
        }
        let before = violations.len();

        require(fields[0], "sender_code", line_number, violations);
        self.code(fields[1], "operation_type", line_number, violations);
        let transmission_date = date(fields[2], "transmission_date", line_number, violations);
        let accounting_date = date(fields[3], "accounting_date", line_number, violations);
        let num_trx = positive(fields[4], "num_trx", line_number, violations);
        let total_amount = positive(fields[5], "total_amount", line_number, violations);
        currency(fields[6], line_number, violations);
        require(fields[7], "acquirer_id", line_number, violations);
        require(fields[8], "merchant_id", line_number, violations);
        require(fields[9], "terminal_id", line_number, violations);
        require(fields[10], "fiscal_code", line_number, violations);
        bounded(fields[11], "vat", 16, line_number, violations);
        self.code(fields[12], "pos_type", line_number, violations);

        if violations.len() > before {
            return None;
        }
        Some(AggregateRecord {
            sender_code: fields[0].to_string(),
            operation_type: fields[1].to_string(),
            transmission_date: transmission_date?,
            accounting_date: accounting_date?,
            num_trx: num_trx?,
            total_amount: total_amount?,
            currency: fields[6].to_string(),
            acquirer_id: fields[7].to_string(),
            merchant_id: fields[8].to_string(),
            terminal_id: fields[9].to_string(),
            fiscal_code: fields[10].to_string(),
            vat: fields[11].to_string(),
            pos_type: fields[12].to_string(),
        })
    }

    /// Validate one raw transaction record.
    fn check_transaction(
        &self,
        line: &str,
        line_number: usize,
        violations: &mut Vec<Violation>,
    ) {
        let fields: Vec<&str> = line.split(';').collect();
        if fields.len() != TRANSACTION_FIELDS {
            violations.push(Violation {
                line: line_number,
                field: "record",
                reason: format!(
                    "expected {} fields, found {}",
                    TRANSACTION_FIELDS,
                    fields.len()
                ),
            });
            return;
        }

        require(fields[0], "sender_code", line_number, violations);
        self.code(fields[1], "operation_type", line_number, violations);
        self.code(fields[2], "circuit_type", line_number, violations);
        if !self.hpan.is_match(fields[3]) {
            violations.push(Violation {
                line: line_number,
                field: "hpan",
                reason: "must be a 64-character hex digest".into(),
            });
        }
        timestamp(fields[4], "trx_date", line_number, violations);
        require(fields[5], "id_trx_acquirer", line_number, violations);
        require(fields[6], "id_trx_issuer", line_number, violations);
        // fields[7] correlation_id is optional
        positive(fields[8], "total_amount", line_number, violations);
        currency(fields[9], line_number, violations);
        require(fields[10], "acquirer_id", line_number, violations);
        require(fields[11], "merchant_id", line_number, violations);
        require(fields[12], "terminal_id", line_number, violations);
        if !self.bin.is_match(fields[13]) {
            violations.push(Violation {
                line: line_number,
                field: "bin",
                reason: "must be 6 or 8 digits".into(),
            });
        }
        require(fields[14], "mcc", line_number, violations);
        // fields[15] fiscal_code and fields[16] vat are optional
        bounded(fields[16], "vat", 16, line_number, violations);
        self.code(fields[17], "pos_type", line_number, violations);
        // fields[18] par is optional
    }

    fn code(
        &self,
        value: &str,
        field: &'static str,
        line: usize,
        violations: &mut Vec<Violation>,
    ) {
        if !self.two_digit_code.is_match(value) {
            violations.push(Violation {
                line,
                field,
                reason: "must be a two-digit code".into(),
            });
        }
    }
}

impl Default for Verifier {
    fn default() -> Self {
        Self::new()
    }
}

fn require(value: &str, field: &'static str, line: usize, violations: &mut Vec<Violation>) {
    if value.is_empty() {
        violations.push(Violation {
            line,
            field,
            reason: "must not be empty".into(),
        });
    }
}

fn bounded(
    value: &str,
    field: &'static str,
    max_len: usize,
    line: usize,
    violations: &mut Vec<Violation>,
) {
    if value.len() > max_len {
        violations.push(Violation {
            line,
            field,
            reason: format!("longer than {max_len} characters"),
        });
    }
}

fn currency(value: &str, line: usize, violations: &mut Vec<Violation>) {
    if value != CURRENCY_EUR {
        violations.push(Violation {
            line,
            field: "currency",
            reason: format!("must be {CURRENCY_EUR}"),
        });
    }
}

fn positive(
    value: &str,
    field: &'static str,
    line: usize,
    violations: &mut Vec<Violation>,
) -> Option<u64> {
    match value.parse::<u64>() {
        Ok(parsed) if parsed > 0 => Some(parsed),
        Ok(_) => {
            violations.push(Violation {
                line,
                field,
                reason: "must be greater than zero".into(),
            });
            None
        }
        Err(_) => {
            violations.push(Violation {
                line,
                field,
                reason: "must be a positive integer".into(),
            });
            None
        }
    }
}

fn date(
    value: &str,
    field: &'static str,
    line: usize,
    violations: &mut Vec<Violation>,
) -> Option<NaiveDate> {
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            violations.push(Violation {
                line,
                field,
                reason: "must be a yyyy-MM-dd date".into(),
            });
            None
        }
    }
}

fn timestamp(value: &str, field: &'static str, line: usize, violations: &mut Vec<Violation>) {
    if DateTime::parse_from_rfc3339(value).is_err() {
        violations.push(Violation {
            line,
            field,
            reason: "must be a timestamp with offset".into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn write_lines(lines: &[&str]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chunk");
        fs::write(&path, lines.join("\n")).unwrap();
        (dir, path)
    }

    fn aggregate_line(operation_type: &str, num_trx: &str, accounting_date: &str) -> String {
        format!(
            "12345;{operation_type};2022-05-03;{accounting_date};{num_trx};1500;978;ACQ01;M001;T001;FC123;VAT1;00"
        )
    }

    fn transaction_line() -> String {
        format!(
            "12345;00;01;{};2022-05-03T17:49:47.000+00:00;acq-trx-1;iss-trx-1;corr-1;\
             1500;978;ACQ01;M001;T001;123456;5812;FC123;VAT1;00;par-1",
            "a".repeat(64)
        )
    }

    #[test]
    fn clean_aggregates_pass_and_feed_the_report() {
        let (_dir, path) = write_lines(&[
            &aggregate_line("00", "3", "2022-05-01"),
            &aggregate_line("01", "2", "2022-04-20"),
        ]);
        let mut report = ReportMetaData::default();
        let valid = Verifier::new()
            .verify_file(&path, Application::Aggregates, false, Some(&mut report))
            .unwrap();
        assert_eq!(valid, 2);
        assert_eq!(report.positive_trx(), 3);
        assert_eq!(report.canceled_trx(), 2);
        assert_eq!(report.merchant_count(), 1);
    }

    #[test]
    fn one_bad_record_fails_the_whole_object() {
        let (_dir, path) = write_lines(&[
            &aggregate_line("00", "3", "2022-05-01"),
            &aggregate_line("00", "0", "2022-05-01"),
            &aggregate_line("00", "1", "2022-05-01"),
        ]);
        let result =
            Verifier::new().verify_file(&path, Application::Aggregates, false, None);
        assert!(matches!(result, Err(VerifyError::Invalid { count: 1, .. })));
    }

    #[test]
    fn zero_aggregate_amount_is_rejected() {
        let line = aggregate_line("00", "3", "2022-05-01").replace(";1500;", ";0;");
        let (_dir, path) = write_lines(&[&line]);
        let result =
            Verifier::new().verify_file(&path, Application::Aggregates, false, None);
        assert!(matches!(result, Err(VerifyError::Invalid { count: 1, .. })));
    }

    #[test]
    fn zero_transaction_amount_is_rejected() {
        let line = transaction_line().replace(";1500;", ";0;");
        let (_dir, path) = write_lines(&[&line]);
        let result =
            Verifier::new().verify_file(&path, Application::Transactions, false, None);
        assert!(matches!(result, Err(VerifyError::Invalid { count: 1, .. })));
    }

    #[test]
    fn bad_dates_are_rejected() {
        let (_dir, path) = write_lines(&[&aggregate_line("00", "3", "03/05/2022")]);
        let result =
            Verifier::new().verify_file(&path, Application::Aggregates, false, None);
        assert!(matches!(result, Err(VerifyError::Invalid { .. })));
    }

    #[test]
    fn zero_valid_records_is_a_failure() {
        let (_dir, path) = write_lines(&[]);
        let result =
            Verifier::new().verify_file(&path, Application::Aggregates, false, None);
        assert!(matches!(result, Err(VerifyError::Empty(_))));
    }

    #[test]
    fn skip_first_ignores_the_checksum_line() {
        let (_dir, path) = write_lines(&[
            "sha256:not-a-record",
            &aggregate_line("00", "3", "2022-05-01"),
        ]);
        let valid = Verifier::new()
            .verify_file(&path, Application::Aggregates, true, None)
            .unwrap();
        assert_eq!(valid, 1);
    }

    #[test]
    fn clean_transactions_pass() {
        let line = transaction_line();
        let (_dir, path) = write_lines(&[&line]);
        let valid = Verifier::new()
            .verify_file(&path, Application::Transactions, false, None)
            .unwrap();
        assert_eq!(valid, 1);
    }

    #[test]
    fn transaction_violations_are_located() {
        let line = transaction_line();
        let bad = line.replace(";978;", ";840;");
        let (_dir, path) = write_lines(&[&line, &bad]);
        let result =
            Verifier::new().verify_file(&path, Application::Transactions, false, None);
        assert!(matches!(result, Err(VerifyError::Invalid { count: 1, .. })));
    }

    #[test]
    fn wrong_field_count_is_structural() {
        let (_dir, path) = write_lines(&["a;b;c"]);
        let result =
            Verifier::new().verify_file(&path, Application::Transactions, false, None);
        assert!(matches!(result, Err(VerifyError::Invalid { .. })));
    }
}
