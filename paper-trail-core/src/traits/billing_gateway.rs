//! 第三方账单 API 抽象 Trait

use async_trait::async_trait;

use crate::error::CoreResult;
use crate::types::{Invoice, InvoiceDraft, InvoiceItemDraft};

/// Third-party billing API (invoices)
///
/// Implementations fetch the API key from the vault on every call and fail
/// with `CoreError::MissingApiKey` when none is stored.
#[async_trait]
pub trait BillingGateway: Send + Sync {
    /// Create a draft invoice
    async fn create_invoice(&self, draft: &InvoiceDraft) -> CoreResult<Invoice>;

    /// Attach a line item to a draft invoice
    async fn add_invoice_item(&self, invoice_id: &str, item: &InvoiceItemDraft)
        -> CoreResult<()>;

    async fn finalize_invoice(&self, invoice_id: &str) -> CoreResult<Invoice>;

    async fn send_invoice(&self, invoice_id: &str) -> CoreResult<Invoice>;

    async fn get_invoice(&self, invoice_id: &str) -> CoreResult<Invoice>;

    /// Mark an invoice as paid outside the billing provider
    async fn mark_paid_out_of_band(&self, invoice_id: &str) -> CoreResult<Invoice>;

    async fn void_invoice(&self, invoice_id: &str) -> CoreResult<Invoice>;
}
