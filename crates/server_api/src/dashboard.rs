use std::future::Future;

use shared::{
    currency::format_currency,
    domain::InvoiceId,
    error::{ApiError, ErrorCode},
    protocol::{
        CardData, CustomerField, DashboardOverview, Fragment, InvoiceForm, InvoiceRow,
        InvoicesPage, LatestInvoice, RevenuePoint, INVOICES_PATH,
    },
};
use storage::InvoiceWithCustomer;
use tracing::warn;

use crate::{internal, ApiContext};

pub const ITEMS_PER_PAGE: u32 = 6;
pub const LATEST_INVOICES_LIMIT: u32 = 5;

pub async fn fetch_card_data(ctx: &ApiContext) -> anyhow::Result<CardData> {
    let totals = ctx.dashboard.fetch_card_totals().await?;
    Ok(CardData {
        number_of_invoices: totals.invoice_count,
        number_of_customers: totals.customer_count,
        total_paid_invoices: format_currency(totals.paid_cents),
        total_pending_invoices: format_currency(totals.pending_cents),
    })
}

pub async fn fetch_revenue(ctx: &ApiContext) -> anyhow::Result<Vec<RevenuePoint>> {
    let revenue = ctx.dashboard.fetch_revenue().await?;
    Ok(revenue
        .into_iter()
        .map(|entry| RevenuePoint {
            month: entry.month,
            revenue: entry.revenue,
        })
        .collect())
}

pub async fn fetch_latest_invoices(ctx: &ApiContext) -> anyhow::Result<Vec<LatestInvoice>> {
    let rows = ctx
        .dashboard
        .fetch_latest_invoices(LATEST_INVOICES_LIMIT)
        .await?;
    Ok(rows
        .into_iter()
        .map(|row| LatestInvoice {
            id: row.invoice.id,
            name: row.customer_name,
            email: row.customer_email,
            image_url: row.customer_image_url,
            amount: format_currency(row.invoice.amount),
        })
        .collect())
}

/// Loads the three overview fragments concurrently. A failing fragment
/// becomes `Fragment::Unavailable` and does not affect the others.
pub async fn load_overview(ctx: &ApiContext) -> DashboardOverview {
    let (cards, revenue, latest_invoices) = tokio::join!(
        into_fragment("cards", fetch_card_data(ctx)),
        into_fragment("revenue", fetch_revenue(ctx)),
        into_fragment("latest_invoices", fetch_latest_invoices(ctx)),
    );
    DashboardOverview {
        cards,
        revenue,
        latest_invoices,
    }
}

async fn into_fragment<T>(
    name: &'static str,
    load: impl Future<Output = anyhow::Result<T>>,
) -> Fragment<T> {
    match load.await {
        Ok(value) => Fragment::Ready(value),
        Err(error) => {
            warn!(fragment = name, %error, "dashboard fragment unavailable");
            Fragment::Unavailable
        }
    }
}

/// One page of the invoice listing, served from the path cache when the
/// listing has not been revalidated since it was last built.
pub async fn fetch_invoices_page(
    ctx: &ApiContext,
    query: &str,
    page: u32,
) -> Result<InvoicesPage, ApiError> {
    let query = query.trim();
    let page = page.max(1);
    let cache_key = format!("query={query}&page={page}");

    if let Some(cached) = ctx.cache.get(INVOICES_PATH, &cache_key).await {
        if let Ok(page) = serde_json::from_value::<InvoicesPage>(cached) {
            return Ok(page);
        }
    }

    let generation = ctx.cache.generation(INVOICES_PATH).await;
    let offset = (page - 1).saturating_mul(ITEMS_PER_PAGE);
    let rows = ctx
        .storage
        .fetch_filtered_invoices(query, ITEMS_PER_PAGE, offset)
        .await
        .map_err(internal)?;
    let total = ctx
        .storage
        .count_filtered_invoices(query)
        .await
        .map_err(internal)?;

    let listing = InvoicesPage {
        query: query.to_string(),
        current_page: page,
        total_pages: total_pages(total),
        invoices: rows.into_iter().map(invoice_row).collect(),
    };

    match serde_json::to_value(&listing) {
        Ok(value) => {
            ctx.cache
                .insert(INVOICES_PATH, &cache_key, generation, value)
                .await;
        }
        Err(error) => warn!(%error, "invoice listing not cacheable"),
    }
    Ok(listing)
}

pub async fn fetch_invoice_form(
    ctx: &ApiContext,
    invoice_id: &InvoiceId,
) -> Result<InvoiceForm, ApiError> {
    let invoice = ctx
        .storage
        .fetch_invoice_by_id(invoice_id)
        .await
        .map_err(internal)?
        .ok_or_else(|| ApiError::new(ErrorCode::NotFound, "invoice not found"))?;
    Ok(InvoiceForm {
        id: invoice.id,
        customer_id: invoice.customer_id,
        amount: invoice.amount as f64 / 100.0,
        status: invoice.status,
    })
}

pub async fn fetch_customer_fields(ctx: &ApiContext) -> Result<Vec<CustomerField>, ApiError> {
    let customers = ctx.storage.fetch_customers().await.map_err(internal)?;
    Ok(customers
        .into_iter()
        .map(|customer| CustomerField {
            id: customer.id,
            name: customer.name,
        })
        .collect())
}

fn total_pages(total: i64) -> u32 {
    let per_page = i64::from(ITEMS_PER_PAGE);
    let pages = (total.max(0) + per_page - 1) / per_page;
    u32::try_from(pages).unwrap_or(u32::MAX)
}

fn invoice_row(row: InvoiceWithCustomer) -> InvoiceRow {
    InvoiceRow {
        id: row.invoice.id,
        customer_id: row.invoice.customer_id,
        name: row.customer_name,
        email: row.customer_email,
        image_url: row.customer_image_url,
        date: row.invoice.date,
        amount: format_currency(row.invoice.amount),
        status: row.invoice.status,
    }
}

#[cfg(test)]
#[path = "tests/dashboard_tests.rs"]
mod tests;
