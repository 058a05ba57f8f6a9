use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use shared::domain::{
    Customer, CustomerId, Invoice, InvoiceId, InvoiceStatus, Revenue, User, UserId,
};

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

/// Column values for a new invoice row. The store assigns the id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvoice {
    pub customer_id: CustomerId,
    pub amount_in_cents: i64,
    pub status: InvoiceStatus,
    pub date: String,
}

/// Replaceable columns of an existing invoice. `date` is never rewritten.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceChanges {
    pub customer_id: CustomerId,
    pub amount_in_cents: i64,
    pub status: InvoiceStatus,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceWithCustomer {
    pub invoice: Invoice,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_image_url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardTotals {
    pub invoice_count: i64,
    pub customer_count: i64,
    pub paid_cents: i64,
    pub pending_cents: i64,
}

/// Write side of the invoice table. Each call is a single statement.
#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<InvoiceId>;
    async fn update_invoice(&self, id: &InvoiceId, changes: &InvoiceChanges) -> Result<u64>;
    async fn delete_invoice(&self, id: &InvoiceId) -> Result<u64>;
}

/// Read queries backing the dashboard overview fragments.
#[async_trait]
pub trait DashboardStore: Send + Sync {
    async fn fetch_card_totals(&self) -> Result<CardTotals>;
    async fn fetch_revenue(&self) -> Result<Vec<Revenue>>;
    async fn fetch_latest_invoices(&self, limit: u32) -> Result<Vec<InvoiceWithCustomer>>;
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn insert_customer(&self, customer: &Customer) -> Result<()> {
        sqlx::query(
            "INSERT INTO customers (id, name, email, image_url) VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
        )
        .bind(customer.id.as_str())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.image_url)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to insert customer {}", customer.id))?;
        Ok(())
    }

    pub async fn fetch_customers(&self) -> Result<Vec<Customer>> {
        let rows = sqlx::query("SELECT id, name, email, image_url FROM customers ORDER BY name ASC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(customer_from_row).collect()
    }

    pub async fn insert_user(&self, name: &str, email: &str, password_hash: &str) -> Result<UserId> {
        let user_id = UserId::generate();
        sqlx::query(
            "INSERT INTO users (id, name, email, password) VALUES (?, ?, ?, ?)
             ON CONFLICT(email) DO UPDATE SET name = excluded.name, password = excluded.password",
        )
        .bind(user_id.as_str())
        .bind(name)
        .bind(email)
        .bind(password_hash)
        .execute(&self.pool)
        .await?;

        let row = sqlx::query("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(UserId(row.get::<String, _>(0)))
    }

    pub async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT id, name, email, password FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
            .context("failed to fetch user")?;
        Ok(row.map(|row| User {
            id: UserId(row.get::<String, _>("id")),
            name: row.get::<String, _>("name"),
            email: row.get::<String, _>("email"),
            password_hash: row.get::<String, _>("password"),
        }))
    }

    pub async fn upsert_revenue(&self, month: &str, revenue: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO revenue (month, revenue) VALUES (?, ?)
             ON CONFLICT(month) DO UPDATE SET revenue = excluded.revenue",
        )
        .bind(month)
        .bind(revenue)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fetch_invoice_by_id(&self, id: &InvoiceId) -> Result<Option<Invoice>> {
        let row = sqlx::query(
            "SELECT id, customer_id, amount, status, date FROM invoices WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(invoice_from_row).transpose()
    }

    pub async fn fetch_filtered_invoices(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<InvoiceWithCustomer>> {
        let pattern = like_pattern(query);
        let rows = sqlx::query(
            "SELECT invoices.id, invoices.customer_id, invoices.amount, invoices.status,
                    invoices.date, customers.name, customers.email, customers.image_url
             FROM invoices
             JOIN customers ON invoices.customer_id = customers.id
             WHERE customers.name LIKE ?1
                OR customers.email LIKE ?1
                OR CAST(invoices.amount AS TEXT) LIKE ?1
                OR invoices.date LIKE ?1
                OR invoices.status LIKE ?1
             ORDER BY invoices.date DESC, invoices.rowid DESC
             LIMIT ?2 OFFSET ?3",
        )
        .bind(pattern)
        .bind(i64::from(limit))
        .bind(i64::from(offset))
        .fetch_all(&self.pool)
        .await
        .context("failed to fetch filtered invoices")?;
        rows.iter().map(invoice_with_customer_from_row).collect()
    }

    pub async fn count_filtered_invoices(&self, query: &str) -> Result<i64> {
        let pattern = like_pattern(query);
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*)
             FROM invoices
             JOIN customers ON invoices.customer_id = customers.id
             WHERE customers.name LIKE ?1
                OR customers.email LIKE ?1
                OR CAST(invoices.amount AS TEXT) LIKE ?1
                OR invoices.date LIKE ?1
                OR invoices.status LIKE ?1",
        )
        .bind(pattern)
        .fetch_one(&self.pool)
        .await
        .context("failed to count filtered invoices")?;
        Ok(count)
    }
}

#[async_trait]
impl InvoiceStore for Storage {
    async fn insert_invoice(&self, invoice: &NewInvoice) -> Result<InvoiceId> {
        let row = sqlx::query(
            "INSERT INTO invoices (customer_id, amount, status, date)
             VALUES (?, ?, ?, ?)
             RETURNING id",
        )
        .bind(invoice.customer_id.as_str())
        .bind(invoice.amount_in_cents)
        .bind(invoice.status.as_str())
        .bind(&invoice.date)
        .fetch_one(&self.pool)
        .await?;
        Ok(InvoiceId(row.get::<String, _>(0)))
    }

    async fn update_invoice(&self, id: &InvoiceId, changes: &InvoiceChanges) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE invoices
             SET customer_id = ?, amount = ?, status = ?
             WHERE id = ?",
        )
        .bind(changes.customer_id.as_str())
        .bind(changes.amount_in_cents)
        .bind(changes.status.as_str())
        .bind(id.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_invoice(&self, id: &InvoiceId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM invoices WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl DashboardStore for Storage {
    async fn fetch_card_totals(&self) -> Result<CardTotals> {
        let invoice_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM invoices")
            .fetch_one(&self.pool)
            .await?;
        let customer_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
            .fetch_one(&self.pool)
            .await?;
        let row = sqlx::query(
            "SELECT
                COALESCE(SUM(CASE WHEN status = 'paid' THEN amount ELSE 0 END), 0) AS paid,
                COALESCE(SUM(CASE WHEN status = 'pending' THEN amount ELSE 0 END), 0) AS pending
             FROM invoices",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(CardTotals {
            invoice_count,
            customer_count,
            paid_cents: row.get::<i64, _>("paid"),
            pending_cents: row.get::<i64, _>("pending"),
        })
    }

    async fn fetch_revenue(&self) -> Result<Vec<Revenue>> {
        let rows = sqlx::query("SELECT month, revenue FROM revenue ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| Revenue {
                month: row.get::<String, _>("month"),
                revenue: row.get::<i64, _>("revenue"),
            })
            .collect())
    }

    async fn fetch_latest_invoices(&self, limit: u32) -> Result<Vec<InvoiceWithCustomer>> {
        let rows = sqlx::query(
            "SELECT invoices.id, invoices.customer_id, invoices.amount, invoices.status,
                    invoices.date, customers.name, customers.email, customers.image_url
             FROM invoices
             JOIN customers ON invoices.customer_id = customers.id
             ORDER BY invoices.date DESC, invoices.rowid DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(invoice_with_customer_from_row).collect()
    }
}

fn like_pattern(query: &str) -> String {
    format!("%{}%", query.trim())
}

fn invoice_from_row(row: &SqliteRow) -> Result<Invoice> {
    let status: String = row.try_get("status")?;
    Ok(Invoice {
        id: InvoiceId(row.try_get::<String, _>("id")?),
        customer_id: CustomerId(row.try_get::<String, _>("customer_id")?),
        amount: row.try_get::<i64, _>("amount")?,
        status: status
            .parse()
            .with_context(|| format!("invoice row carries invalid status '{status}'"))?,
        date: row.try_get::<String, _>("date")?,
    })
}

fn invoice_with_customer_from_row(row: &SqliteRow) -> Result<InvoiceWithCustomer> {
    Ok(InvoiceWithCustomer {
        invoice: invoice_from_row(row)?,
        customer_name: row.try_get::<String, _>("name")?,
        customer_email: row.try_get::<String, _>("email")?,
        customer_image_url: row.try_get::<String, _>("image_url")?,
    })
}

fn customer_from_row(row: &SqliteRow) -> Result<Customer> {
    Ok(Customer {
        id: CustomerId(row.try_get::<String, _>("id")?),
        name: row.try_get::<String, _>("name")?,
        email: row.try_get::<String, _>("email")?,
        image_url: row.try_get::<String, _>("image_url")?,
    })
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if database_url == "sqlite::memory:" || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
