//! Types for the contract export envelope: a header object followed by
//! a `contracts` array streamed element by element.

use serde::{Deserialize, Serialize};

/// Header object at the head of a contract export. Deserialized and
/// logged; its content is not validated further here.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportHeader {
    pub sender_code: String,
    #[serde(default)]
    pub creation_date: Option<String>,
    #[serde(default)]
    pub record_count: Option<u64>,
}

/// One element of the `contracts` array.
///
/// Unknown fields inside an element are tolerated; they are reported
/// by the splitter, not treated as deserialization failures.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRecord {
    pub action: String,
    pub import_outcome: String,
    pub contract_identifier: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_contract_identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason_message: Option<String>,
}

/// Field names `ContractRecord` knows about, used to report unknown
/// keys seen in the wild.
pub const CONTRACT_FIELDS: [&str; 5] = [
    "action",
    "importOutcome",
    "contractIdentifier",
    "originalContractIdentifier",
    "reasonMessage",
];
