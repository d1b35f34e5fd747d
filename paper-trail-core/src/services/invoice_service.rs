//! 发票服务
//!
//! Turns a timesheet into a billing-provider invoice and closes the timesheet.

use std::fmt::Write as _;
use std::sync::Arc;

use crate::error::{CoreError, CoreResult};
use crate::traits::BillingGateway;
use crate::types::{Invoice, InvoiceDraft, InvoiceItemDraft, TimesheetDetails};

use super::{ServiceContext, TimesheetService};

const INVOICE_CURRENCY: &str = "usd";
const DAYS_UNTIL_DUE: u32 = 30;

/// 发票服务
pub struct InvoiceService {
    timesheets: TimesheetService,
    gateway: Arc<dyn BillingGateway>,
}

impl InvoiceService {
    #[must_use]
    pub fn new(ctx: Arc<ServiceContext>, gateway: Arc<dyn BillingGateway>) -> Self {
        Self {
            timesheets: TimesheetService::new(ctx),
            gateway,
        }
    }

    /// 为时间表生成、定稿并发送发票，然后关闭时间表
    ///
    /// `customer_override` wins over the project's customer id.
    pub async fn generate_invoice(
        &self,
        timesheet_id: i64,
        customer_override: Option<&str>,
    ) -> CoreResult<Invoice> {
        let details = self.timesheets.get_timesheet(timesheet_id).await?;
        if details.timesheet.is_closed() {
            return Err(CoreError::TimesheetClosed(timesheet_id));
        }

        let customer_id = customer_override
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .or_else(|| details.customer_id.clone().filter(|s| !s.trim().is_empty()))
            .ok_or_else(|| {
                CoreError::ValidationError(
                    "Customer ID missing for invoice generation".to_string(),
                )
            })?;

        let summary = InvoiceSummary::from_details(&details);

        let draft = InvoiceDraft {
            customer_id: customer_id.clone(),
            days_until_due: DAYS_UNTIL_DUE,
            currency: INVOICE_CURRENCY.to_string(),
            description: format!(
                "Total hours: {}\n{}",
                summary.total_hours,
                details.timesheet.description.as_deref().unwrap_or_default()
            ),
            footer: (!summary.task_log.is_empty())
                .then(|| format!("Task log:\n{}", summary.task_log)),
        };
        let invoice = self.gateway.create_invoice(&draft).await?;

        if summary.total_amount > 0 {
            let item = InvoiceItemDraft {
                customer_id,
                currency: INVOICE_CURRENCY.to_string(),
                amount: summary.total_amount,
                description: format!(
                    "{} - {} hours",
                    details.timesheet.name, summary.total_hours
                ),
            };
            self.gateway.add_invoice_item(&invoice.id, &item).await?;
        }

        let finalized = self.gateway.finalize_invoice(&invoice.id).await?;
        let sent = self.gateway.send_invoice(&finalized.id).await?;

        if let Err(e) = self.timesheets.attach_invoice(timesheet_id, &invoice.id).await {
            log::error!(
                "Invoice {} sent but timesheet {timesheet_id} could not be closed: {e}",
                invoice.id
            );
            return Err(e);
        }

        log::info!("Invoice {} sent for timesheet {timesheet_id}", invoice.id);
        Ok(sent)
    }

    pub async fn get_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        self.gateway.get_invoice(validate_invoice_id(invoice_id)?).await
    }

    /// 标记为线下已付款
    pub async fn mark_paid(&self, invoice_id: &str) -> CoreResult<Invoice> {
        let invoice = self
            .gateway
            .mark_paid_out_of_band(validate_invoice_id(invoice_id)?)
            .await?;
        log::info!("Invoice {invoice_id} marked as paid");
        Ok(invoice)
    }

    pub async fn void_invoice(&self, invoice_id: &str) -> CoreResult<Invoice> {
        let invoice = self
            .gateway
            .void_invoice(validate_invoice_id(invoice_id)?)
            .await?;
        log::info!("Invoice {invoice_id} voided");
        Ok(invoice)
    }
}

fn validate_invoice_id(invoice_id: &str) -> CoreResult<&str> {
    let trimmed = invoice_id.trim();
    if trimmed.is_empty() {
        return Err(CoreError::ValidationError(
            "Invoice ID is required".to_string(),
        ));
    }
    Ok(trimmed)
}

/// Totals and task log of a timesheet
struct InvoiceSummary {
    total_hours: String,
    /// Cents
    total_amount: i64,
    task_log: String,
}

impl InvoiceSummary {
    fn from_details(details: &TimesheetDetails) -> Self {
        let mut task_log = String::new();
        let mut total_minutes = 0;
        let mut total_amount = 0;

        for entry in &details.entries {
            let _ = writeln!(
                task_log,
                "Date: {} | Hours: {} | Amount: ${} | Description: {}",
                entry.date,
                format_hours(entry.minutes),
                format_cents(entry.amount),
                entry.description
            );
            total_minutes += entry.minutes;
            total_amount += entry.amount;
        }

        Self {
            total_hours: format_hours(total_minutes),
            total_amount,
            task_log,
        }
    }
}

/// Hours with at most two decimals (`90` -> `1.5`)
#[allow(clippy::cast_precision_loss)]
fn format_hours(minutes: i64) -> String {
    let hours = (minutes as f64 / 60.0 * 100.0).round() / 100.0;
    format!("{hours}")
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
