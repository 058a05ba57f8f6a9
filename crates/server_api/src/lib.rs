use std::sync::Arc;

use shared::error::{ApiError, ErrorCode};
use storage::{DashboardStore, InvoiceStore, Storage};
use tracing::error;

pub mod actions;
pub mod auth;
pub mod cache;
pub mod dashboard;
pub mod session;
pub mod validation;

pub use actions::{create_invoice, delete_invoice, update_invoice, ActionOutcome};
pub use auth::{authenticate, AuthOutcome, AuthProvider, CredentialsProvider};
pub use cache::PathCache;
pub use session::SessionConfig;
pub use validation::FormPayload;

/// Handles shared by every action and read. Cloning is cheap; all members
/// are reference counted.
#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub invoices: Arc<dyn InvoiceStore>,
    pub dashboard: Arc<dyn DashboardStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub cache: PathCache,
    pub sessions: SessionConfig,
}

impl ApiContext {
    pub fn new(storage: Storage, sessions: SessionConfig) -> Self {
        Self {
            invoices: Arc::new(storage.clone()),
            dashboard: Arc::new(storage.clone()),
            auth: Arc::new(CredentialsProvider::new(storage.clone())),
            storage,
            cache: PathCache::new(),
            sessions,
        }
    }
}

pub(crate) fn internal(err: anyhow::Error) -> ApiError {
    error!(error = %err, "storage operation failed");
    ApiError::new(ErrorCode::Internal, "internal error")
}
