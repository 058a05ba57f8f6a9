use anyhow::{Context, Result};
use server_api::auth::hash_password;
use shared::domain::{Customer, CustomerId, InvoiceStatus};
use storage::{InvoiceStore, NewInvoice, Storage};

const CUSTOMERS: &[(&str, &str, &str, &str)] = &[
    (
        "d6e15727-9fe1-4961-8c5b-ea44a9bd81aa",
        "Evil Rabbit",
        "evil@rabbit.com",
        "/customers/evil-rabbit.png",
    ),
    (
        "3958dc9e-712f-4377-85e9-fec4b6a6442a",
        "Delba de Oliveira",
        "delba@oliveira.com",
        "/customers/delba-de-oliveira.png",
    ),
    (
        "3958dc9e-742f-4377-85e9-fec4b6a6442a",
        "Lee Robinson",
        "lee@robinson.com",
        "/customers/lee-robinson.png",
    ),
    (
        "76d65c26-f784-44a2-ac19-586678f7c2f2",
        "Michael Novotny",
        "michael@novotny.com",
        "/customers/michael-novotny.png",
    ),
    (
        "cc27c14a-0acf-4f4a-a6c9-d45682c144b9",
        "Amy Burns",
        "amy@burns.com",
        "/customers/amy-burns.png",
    ),
    (
        "13d07535-c59e-4157-a011-f8d2ef4e0cbb",
        "Balazs Orban",
        "balazs@orban.com",
        "/customers/balazs-orban.png",
    ),
];

/// (customer index, cents, status, date)
const INVOICES: &[(usize, i64, InvoiceStatus, &str)] = &[
    (0, 15795, InvoiceStatus::Pending, "2022-12-06"),
    (1, 20348, InvoiceStatus::Pending, "2022-11-14"),
    (4, 3040, InvoiceStatus::Paid, "2022-10-29"),
    (3, 44800, InvoiceStatus::Paid, "2023-09-10"),
    (5, 34577, InvoiceStatus::Pending, "2023-08-05"),
    (2, 54246, InvoiceStatus::Pending, "2023-07-16"),
    (0, 666, InvoiceStatus::Pending, "2023-06-27"),
    (3, 32545, InvoiceStatus::Paid, "2023-06-09"),
    (4, 1250, InvoiceStatus::Paid, "2023-06-17"),
    (5, 8546, InvoiceStatus::Paid, "2023-06-07"),
    (1, 500, InvoiceStatus::Paid, "2023-08-19"),
    (5, 8945, InvoiceStatus::Paid, "2023-06-03"),
    (2, 1000, InvoiceStatus::Paid, "2022-06-05"),
];

const REVENUE: &[(&str, i64)] = &[
    ("Jan", 2000),
    ("Feb", 1800),
    ("Mar", 2200),
    ("Apr", 2500),
    ("May", 2300),
    ("Jun", 3200),
    ("Jul", 3500),
    ("Aug", 3700),
    ("Sep", 2500),
    ("Oct", 2800),
    ("Nov", 3000),
    ("Dec", 4800),
];

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub customers: usize,
    pub invoices: usize,
    pub revenue_months: usize,
    pub users: usize,
}

/// Loads the sample data set. Customers, revenue and the user are upserts;
/// invoices are only inserted into an empty table.
pub async fn seed(storage: &Storage) -> Result<SeedReport> {
    let mut report = SeedReport::default();

    let password_hash = hash_password("123456")?;
    storage
        .insert_user("User", "user@nextmail.com", &password_hash)
        .await
        .context("failed to seed user")?;
    report.users = 1;

    for (id, name, email, image_url) in CUSTOMERS {
        storage
            .insert_customer(&Customer {
                id: CustomerId::new(*id),
                name: (*name).to_string(),
                email: (*email).to_string(),
                image_url: (*image_url).to_string(),
            })
            .await?;
        report.customers += 1;
    }

    if storage.count_filtered_invoices("").await? == 0 {
        for (customer, cents, status, date) in INVOICES {
            storage
                .insert_invoice(&NewInvoice {
                    customer_id: CustomerId::new(CUSTOMERS[*customer].0),
                    amount_in_cents: *cents,
                    status: *status,
                    date: (*date).to_string(),
                })
                .await
                .with_context(|| format!("failed to seed invoice dated {date}"))?;
            report.invoices += 1;
        }
    }

    for (month, revenue) in REVENUE {
        storage.upsert_revenue(month, *revenue).await?;
        report.revenue_months += 1;
    }

    Ok(report)
}
