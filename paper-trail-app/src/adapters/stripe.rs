//! Stripe invoicing over the REST API.
//!
//! Requests are form encoded; the secret key is read from the vault for
//! every call so a key saved in the settings takes effect immediately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use paper_trail_core::error::{CoreError, CoreResult};
use paper_trail_core::services::VaultService;
use paper_trail_core::traits::BillingGateway;
use paper_trail_core::types::{Invoice, InvoiceDraft, InvoiceItemDraft};

use super::http::{send, truncate_for_log};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

type Form = Vec<(&'static str, String)>;

pub struct StripeGateway {
    client: reqwest::Client,
    base_url: String,
    vault: Arc<VaultService>,
}

impl StripeGateway {
    /// # Errors
    /// Returns `CoreError::NetworkError` if the HTTP client cannot be built.
    pub fn new(vault: Arc<VaultService>) -> CoreResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CoreError::NetworkError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: STRIPE_API_BASE.to_string(),
            vault,
        })
    }

    async fn api_key(&self) -> CoreResult<String> {
        self.vault
            .get_secret()
            .await
            .filter(|key| !key.trim().is_empty())
            .ok_or(CoreError::MissingApiKey)
    }

    fn invoice_url(&self, invoice_id: &str, action: Option<&str>) -> String {
        let id = urlencoding::encode(invoice_id);
        match action {
            Some(action) => format!("{}/invoices/{id}/{action}", self.base_url),
            None => format!("{}/invoices/{id}", self.base_url),
        }
    }

    async fn post(&self, url: &str, form: &Form) -> CoreResult<String> {
        let key = self.api_key().await?;
        let request = self.client.post(url).bearer_auth(key).form(form);
        let (status, body) = send(request, "stripe", url).await?;
        check_status(status, body)
    }

    async fn get(&self, url: &str) -> CoreResult<String> {
        let key = self.api_key().await?;
        let request = self.client.get(url).bearer_auth(key);
        let (status, body) = send(request, "stripe", url).await?;
        check_status(status, body)
    }
}

fn check_status(status: u16, body: String) -> CoreResult<String> {
    if (200..300).contains(&status) {
        return Ok(body);
    }
    let message = serde_json::from_str::<StripeErrorBody>(&body)
        .ok()
        .and_then(|b| b.error.message)
        .unwrap_or_else(|| truncate_for_log(&body));
    log::warn!("[stripe] HTTP {status}: {message}");
    Err(CoreError::BillingError { status, message })
}

fn parse_invoice(body: &str) -> CoreResult<Invoice> {
    serde_json::from_str(body)
        .map_err(|e| CoreError::SerializationError(format!("Invalid invoice response: {e}")))
}

fn invoice_form(draft: &InvoiceDraft) -> Form {
    let mut form = vec![
        ("customer", draft.customer_id.clone()),
        ("collection_method", "send_invoice".to_string()),
        ("days_until_due", draft.days_until_due.to_string()),
        ("currency", draft.currency.clone()),
        ("description", draft.description.clone()),
    ];
    if let Some(footer) = &draft.footer {
        form.push(("footer", footer.clone()));
    }
    form
}

fn invoice_item_form(invoice_id: &str, item: &InvoiceItemDraft) -> Form {
    vec![
        ("customer", item.customer_id.clone()),
        ("invoice", invoice_id.to_string()),
        ("currency", item.currency.clone()),
        ("amount", item.amount.to_string()),
        ("description", item.description.clone()),
    ]
}

#[async_trait]
impl BillingGateway for StripeGateway {
    async fn create_invoice(&self, draft: &InvoiceDraft) -> CoreResult<Invoice> {
        let url = format!("{}/invoices", self.base_url);
        let invoice = parse_invoice(&self.post(&url, &invoice_form(draft)).await?)?;
        log::info!("[stripe] Draft invoice {} created", invoice.id);
        Ok(invoice)
    }

    async fn add_invoice_item(&self, invoice_id: &str, item: &InvoiceItemDraft) -> CoreResult<()> {
        let url = format!("{}/invoiceitems", self.base_url);
        self.post(&url, &invoice_item_form(invoice_id, item)).await?;
        Ok(())
    }

    async fn finalize_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        let url = self.invoice_url(invoice_id, Some("finalize"));
        parse_invoice(&self.post(&url, &Form::new()).await?)
    }

    async fn send_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        let url = self.invoice_url(invoice_id, Some("send"));
        parse_invoice(&self.post(&url, &Form::new()).await?)
    }

    async fn get_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        parse_invoice(&self.get(&self.invoice_url(invoice_id, None)).await?)
    }

    async fn mark_paid_out_of_band(&self, invoice_id: &str) -> CoreResult<Invoice> {
        let url = self.invoice_url(invoice_id, Some("pay"));
        let form = vec![("paid_out_of_band", "true".to_string())];
        parse_invoice(&self.post(&url, &form).await?)
    }

    async fn void_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        let url = self.invoice_url(invoice_id, Some("void"));
        parse_invoice(&self.post(&url, &Form::new()).await?)
    }
}
