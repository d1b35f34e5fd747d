//! Billing provider invoice types.

use serde::{Deserialize, Serialize};

/// Invoice as returned by the billing provider
///
/// Only the fields the application reads are typed; the rest is kept raw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub hosted_invoice_url: Option<String>,
    #[serde(default)]
    pub amount_due: Option<i64>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Draft invoice parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceDraft {
    pub customer_id: String,
    pub days_until_due: u32,
    pub currency: String,
    pub description: String,
    pub footer: Option<String>,
}

/// One line item on a draft invoice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceItemDraft {
    pub customer_id: String,
    pub currency: String,
    /// Amount in cents
    pub amount: i64,
    pub description: String,
}
