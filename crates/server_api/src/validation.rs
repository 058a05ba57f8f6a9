use std::collections::{hash_map::Entry, HashMap};

use serde::{Deserialize, Deserializer, Serialize};
use shared::{
    domain::{CustomerId, InvoiceStatus},
    protocol::FieldErrors,
};

pub const AMOUNT_NOT_A_NUMBER: &str = "Expected number, received nan";
pub const AMOUNT_NOT_POSITIVE: &str = "Please enter an amount greater than $0.";
pub const AMOUNT_TOO_LARGE: &str = "Please enter a smaller amount.";
pub const CUSTOMER_REQUIRED: &str = "Please select a customer";

/// Raw urlencoded form fields as submitted by the browser. When a field
/// repeats, the first value is kept, matching `FormData.get`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct FormPayload(HashMap<String, String>);

impl<'de> Deserialize<'de> for FormPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pairs = Vec::<(String, String)>::deserialize(deserializer)?;
        Ok(pairs.into_iter().collect())
    }
}

impl FormPayload {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for FormPayload
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields: HashMap<String, String> = HashMap::new();
        for (key, value) in iter {
            if let Entry::Vacant(slot) = fields.entry(key.into()) {
                slot.insert(value.into());
            }
        }
        Self(fields)
    }
}

/// A submitted invoice form that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceInput {
    pub customer_id: CustomerId,
    pub amount: f64,
    pub status: InvoiceStatus,
}

impl InvoiceInput {
    /// Dollars to cents, rounded so two-decimal inputs convert exactly.
    pub fn amount_in_cents(&self) -> i64 {
        (self.amount * 100.0).round() as i64
    }
}

/// Validates `customerId`, `amount` and `status`. Every failing field is
/// reported, not just the first.
pub fn validate_invoice_form(form: &FormPayload) -> Result<InvoiceInput, FieldErrors> {
    let mut errors = FieldErrors::default();

    let customer_id = match form.get("customerId") {
        Some(value) => Some(CustomerId::new(value)),
        None => {
            errors.push_customer_id(CUSTOMER_REQUIRED);
            None
        }
    };

    let amount = match coerce_number(form.get("amount")) {
        None => {
            errors.push_amount(AMOUNT_NOT_A_NUMBER);
            None
        }
        // Judged on the stored cents so sub-cent inputs cannot round to zero.
        Some(amount) if (amount * 100.0).round() <= 0.0 => {
            errors.push_amount(AMOUNT_NOT_POSITIVE);
            None
        }
        Some(amount) if amount * 100.0 >= i64::MAX as f64 => {
            errors.push_amount(AMOUNT_TOO_LARGE);
            None
        }
        Some(amount) => Some(amount),
    };

    let status = match form.get("status") {
        Some(value) => match value.parse::<InvoiceStatus>() {
            Ok(status) => Some(status),
            Err(_) => {
                errors.push_status(format!(
                    "Invalid enum value. Expected 'pending' | 'paid', received '{value}'"
                ));
                None
            }
        },
        None => {
            errors.push_status("Expected 'pending' | 'paid', received null");
            None
        }
    };

    match (customer_id, amount, status) {
        (Some(customer_id), Some(amount), Some(status)) if errors.is_empty() => Ok(InvoiceInput {
            customer_id,
            amount,
            status,
        }),
        _ => Err(errors),
    }
}

/// Numeric coercion for a form field: surrounding whitespace is ignored,
/// a missing or blank field is zero, anything else must be a finite number.
fn coerce_number(raw: Option<&str>) -> Option<f64> {
    let trimmed = raw.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }
    trimmed.parse::<f64>().ok().filter(|value| value.is_finite())
}

#[cfg(test)]
#[path = "tests/validation_tests.rs"]
mod tests;
