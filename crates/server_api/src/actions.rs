use chrono::Utc;
use shared::{
    domain::InvoiceId,
    protocol::{ActionMessage, FormState, INVOICES_PATH},
};
use storage::{InvoiceChanges, NewInvoice};
use tracing::{error, info};

use crate::{
    validation::{validate_invoice_form, FormPayload},
    ApiContext,
};

pub const CREATE_MISSING_FIELDS: &str = "Missing Fields. Failed to Create Invoice.";
pub const UPDATE_MISSING_FIELDS: &str = "Missing Fields. Failed to Update Invoice.";
pub const CREATE_DATABASE_ERROR: &str = "Database Error: Failed to Create Invoice.";
pub const UPDATE_DATABASE_ERROR: &str = "Database Error: Failed to update Invoice.";
pub const DELETE_DATABASE_ERROR: &str = "Database Error: Failed to Delete Invoice.";
pub const DELETED_INVOICE: &str = "Deleted Invoice.";

/// Result of a form action. A redirect is terminal; the other variants
/// carry the state the form re-renders with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Redirect { to: String },
    Invalid(FormState),
    Failed(FormState),
}

impl ActionOutcome {
    pub fn is_redirect(&self) -> bool {
        matches!(self, Self::Redirect { .. })
    }
}

pub async fn create_invoice(ctx: &ApiContext, form: &FormPayload) -> ActionOutcome {
    let input = match validate_invoice_form(form) {
        Ok(input) => input,
        Err(errors) => {
            return ActionOutcome::Invalid(FormState::invalid(errors, CREATE_MISSING_FIELDS))
        }
    };

    let invoice = NewInvoice {
        customer_id: input.customer_id.clone(),
        amount_in_cents: input.amount_in_cents(),
        status: input.status,
        date: today(),
    };

    match ctx.invoices.insert_invoice(&invoice).await {
        Ok(invoice_id) => {
            info!(%invoice_id, customer_id = %invoice.customer_id, "invoice created");
        }
        Err(err) => {
            error!(error = %err, "failed to create invoice");
            return ActionOutcome::Failed(FormState::message(CREATE_DATABASE_ERROR));
        }
    }

    ctx.cache.revalidate_path(INVOICES_PATH).await;
    ActionOutcome::Redirect {
        to: INVOICES_PATH.to_string(),
    }
}

pub async fn update_invoice(
    ctx: &ApiContext,
    invoice_id: &InvoiceId,
    form: &FormPayload,
) -> ActionOutcome {
    let input = match validate_invoice_form(form) {
        Ok(input) => input,
        Err(errors) => {
            return ActionOutcome::Invalid(FormState::invalid(errors, UPDATE_MISSING_FIELDS))
        }
    };

    let changes = InvoiceChanges {
        customer_id: input.customer_id.clone(),
        amount_in_cents: input.amount_in_cents(),
        status: input.status,
    };

    match ctx.invoices.update_invoice(invoice_id, &changes).await {
        Ok(affected) => {
            info!(%invoice_id, affected, "invoice updated");
        }
        Err(err) => {
            error!(%invoice_id, error = %err, "failed to update invoice");
            return ActionOutcome::Failed(FormState::message(UPDATE_DATABASE_ERROR));
        }
    }

    ctx.cache.revalidate_path(INVOICES_PATH).await;
    ActionOutcome::Redirect {
        to: INVOICES_PATH.to_string(),
    }
}

/// Deletes an invoice. Deleting an id that does not exist still succeeds.
/// The listing is revalidated before the success message is returned.
pub async fn delete_invoice(
    ctx: &ApiContext,
    invoice_id: &InvoiceId,
) -> Result<ActionMessage, ActionMessage> {
    match ctx.invoices.delete_invoice(invoice_id).await {
        Ok(affected) => {
            info!(%invoice_id, affected, "invoice deleted");
            ctx.cache.revalidate_path(INVOICES_PATH).await;
            Ok(ActionMessage {
                message: DELETED_INVOICE.to_string(),
            })
        }
        Err(err) => {
            error!(%invoice_id, error = %err, "failed to delete invoice");
            Err(ActionMessage {
                message: DELETE_DATABASE_ERROR.to_string(),
            })
        }
    }
}

/// Current UTC calendar date as `YYYY-MM-DD`.
pub fn today() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

#[cfg(test)]
#[path = "tests/actions_tests.rs"]
mod tests;
