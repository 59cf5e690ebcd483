//! Running summary statistics gathered while aggregate records are
//! scanned, published as destination-side metadata after upload.

use chrono::NaiveDate;
use std::collections::HashSet;

/// Operation-type code marking a canonical (non-cancellation) record.
/// Every other code counts toward the canceled buckets.
pub const POSITIVE_OPERATION_TYPE: &str = "00";

/// One validated aggregate record, as seen by the aggregator.
#[derive(Clone, Debug)]
pub struct AggregateRecord {
    pub sender_code: String,
    pub operation_type: String,
    pub transmission_date: NaiveDate,
    pub accounting_date: NaiveDate,
    pub num_trx: u64,
    pub total_amount: u64,
    pub currency: String,
    pub acquirer_id: String,
    pub merchant_id: String,
    pub terminal_id: String,
    pub fiscal_code: String,
    pub vat: String,
    pub pos_type: String,
}

/// Read-only-after-scan snapshot of what an aggregate export contained.
///
/// Counters only ever increase; malformed records never reach
/// `observe` because verification rejects them first.
#[derive(Clone, Debug, Default)]
pub struct ReportMetaData {
    merchants: HashSet<String>,
    positive_trx: u64,
    canceled_trx: u64,
    positive_amount: u64,
    canceled_amount: u64,
    min_accounting_date: Option<NaiveDate>,
    max_accounting_date: Option<NaiveDate>,
    /// Checksum line captured from the head of the source file.
    pub checksum: String,
}

impl ReportMetaData {
    pub fn new(checksum: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
            ..Self::default()
        }
    }

    /// Fold one validated record into the running totals.
    pub fn observe(&mut self, record: &AggregateRecord) {
        self.merchants.insert(record.merchant_id.clone());
        if record.operation_type == POSITIVE_OPERATION_TYPE {
            self.positive_trx += record.num_trx;
            self.positive_amount += record.total_amount;
        } else {
            self.canceled_trx += record.num_trx;
            self.canceled_amount += record.total_amount;
        }
        let date = record.accounting_date;
        self.min_accounting_date = Some(match self.min_accounting_date {
            Some(current) => current.min(date),
            None => date,
        });
        self.max_accounting_date = Some(match self.max_accounting_date {
            Some(current) => current.max(date),
            None => date,
        });
    }

    pub fn merchant_count(&self) -> usize {
        self.merchants.len()
    }

    pub fn positive_trx(&self) -> u64 {
        self.positive_trx
    }

    pub fn canceled_trx(&self) -> u64 {
        self.canceled_trx
    }

    pub fn positive_amount(&self) -> u64 {
        self.positive_amount
    }

    pub fn canceled_amount(&self) -> u64 {
        self.canceled_amount
    }

    /// Serialize the snapshot as the header set the metadata PUT sends.
    pub fn to_headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            ("x-meta-merchant-count", self.merchants.len().to_string()),
            ("x-meta-positive-trx", self.positive_trx.to_string()),
            ("x-meta-canceled-trx", self.canceled_trx.to_string()),
            ("x-meta-positive-amount", self.positive_amount.to_string()),
            ("x-meta-canceled-amount", self.canceled_amount.to_string()),
        ];
        if let Some(min) = self.min_accounting_date {
            headers.push(("x-meta-min-accounting-date", min.to_string()));
        }
        if let Some(max) = self.max_accounting_date {
            headers.push(("x-meta-max-accounting-date", max.to_string()));
        }
        if !self.checksum.is_empty() {
            headers.push(("x-meta-checksum", self.checksum.clone()));
        }
        headers
    }
}
