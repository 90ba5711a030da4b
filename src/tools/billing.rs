use async_trait::async_trait;
use chrono::{ Duration, Utc };
use serde::Deserialize;
use serde_json::{ json, Value };

use super::{
    definition,
    no_parameters,
    parse_args,
    string_parameter,
    to_json,
    Tool,
    ToolError,
    ToolRegistry,
};
use crate::commerce::{ InvoiceStatus, RefundStatus, TieredLookup };
use crate::llm::chat::ToolDefinition;

/// Refunds are accepted up to this many days after the invoice was issued.
pub const REFUND_WINDOW_DAYS: i64 = 30;

pub const BILLING_TOOL_NAMES: [&str; 4] = ["getInvoiceStatus", "listInvoices", "getLastInvoice", "requestRefund"];

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvoiceNumberArgs {
    invoice_number: String,
}

#[derive(Clone)]
struct Scope {
    lookup: TieredLookup,
    user_id: String,
}

pub struct GetInvoiceStatus(Scope);
pub struct ListInvoices(Scope);
pub struct GetLastInvoice(Scope);
pub struct RequestRefund(Scope);

pub fn register_billing_tools(registry: &mut ToolRegistry, lookup: TieredLookup, user_id: &str) {
    let scope = Scope { lookup, user_id: user_id.to_string() };
    registry.register(GetInvoiceStatus(scope.clone()));
    registry.register(ListInvoices(scope.clone()));
    registry.register(GetLastInvoice(scope.clone()));
    registry.register(RequestRefund(scope));
}

#[async_trait]
impl Tool for GetInvoiceStatus {
    fn definition(&self) -> ToolDefinition {
        definition(
            "getInvoiceStatus",
            "Get the status and details of a specific invoice",
            string_parameter("invoiceNumber", "The invoice number")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: InvoiceNumberArgs = parse_args(input)?;
        match self.0.lookup.invoice(&self.0.user_id, &args.invoice_number).await {
            Some(found) => to_json(found.value),
            None => Ok(json!({ "error": "Invoice not found" })),
        }
    }
}

#[async_trait]
impl Tool for ListInvoices {
    fn definition(&self) -> ToolDefinition {
        definition("listInvoices", "List recent invoices for the user", no_parameters())
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let invoices = self.0.lookup.invoices(&self.0.user_id).await.value;
        if invoices.is_empty() {
            return Ok(json!({ "message": "No invoices found" }));
        }
        to_json(invoices)
    }
}

#[async_trait]
impl Tool for GetLastInvoice {
    fn definition(&self) -> ToolDefinition {
        definition("getLastInvoice", "Get the most recent invoice for the user", no_parameters())
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        match self.0.lookup.last_invoice(&self.0.user_id).await {
            Some(found) => to_json(found.value),
            None => Ok(json!({ "message": "No invoices found" })),
        }
    }
}

#[async_trait]
impl Tool for RequestRefund {
    fn definition(&self) -> ToolDefinition {
        definition(
            "requestRefund",
            "Request a refund for an invoice. Refund policy: requests must be made within 30 days of payment.",
            string_parameter("invoiceNumber", "The invoice number to refund")
        )
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let args: InvoiceNumberArgs = parse_args(input)?;
        let found = match self.0.lookup.invoice(&self.0.user_id, &args.invoice_number).await {
            Some(f) => f,
            None => {
                return Ok(json!({ "error": "Invoice not found" }));
            }
        };
        let invoice = &found.value;

        if invoice.status != InvoiceStatus::Paid {
            return Ok(json!({ "error": format!("Cannot refund invoice with status: {}", invoice.status.as_str()) }));
        }
        if invoice.refund_status != RefundStatus::None {
            return Ok(json!({ "error": format!("Refund status is already: {}", invoice.refund_status.as_str()) }));
        }
        if Utc::now() - invoice.created_at > Duration::days(REFUND_WINDOW_DAYS) {
            return Ok(
                json!({
                    "error": "Refund policy exceeded (30 days). Please contact human support.",
                    "needsHumanAssistance": true,
                })
            );
        }

        self.0.lookup.set_refund_status(&self.0.user_id, &found, RefundStatus::Requested).await?;

        Ok(
            json!({
                "message": "Refund request submitted successfully.",
                "invoiceNumber": invoice.invoice_number,
                "amount": invoice.amount,
                "refundStatus": RefundStatus::Requested,
            })
        )
    }
}
