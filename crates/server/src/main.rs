use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use server_api::{
    authenticate, create_invoice, dashboard, delete_invoice,
    session::{verify_session_token, SessionClaims, SESSION_COOKIE},
    update_invoice, ActionOutcome, ApiContext, AuthOutcome, FormPayload, SessionConfig,
};
use shared::{
    domain::InvoiceId,
    error::{ApiError, ErrorCode},
    protocol::{
        AuthErrorResponse, CardData, CustomerField, DashboardOverview, InvoiceForm,
        InvoicesPage, LatestInvoice, RevenuePoint, DASHBOARD_PATH, LOGIN_PATH,
    },
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

type HttpError = (StatusCode, Json<ApiError>);

#[derive(Debug, Deserialize)]
struct ListInvoicesQuery {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    page: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EditInvoiceView {
    invoice: InvoiceForm,
    customers: Vec<CustomerField>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url);
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let api = ApiContext::new(
        storage,
        SessionConfig {
            secret: settings.session_secret,
            ttl_seconds: settings.session_ttl_seconds,
        },
    );

    let state = AppState { api };
    let app = build_router(Arc::new(state), settings.max_form_bytes);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>, max_form_bytes: usize) -> Router {
    let dashboard = Router::new()
        .route("/dashboard", get(http_overview))
        .route("/dashboard/cards", get(http_cards))
        .route("/dashboard/revenue", get(http_revenue))
        .route("/dashboard/latest-invoices", get(http_latest_invoices))
        .route(
            "/dashboard/invoices",
            get(http_list_invoices).post(http_create_invoice),
        )
        .route("/dashboard/invoices/:invoice_id", post(http_update_invoice))
        .route("/dashboard/invoices/:invoice_id/edit", get(http_edit_invoice))
        .route(
            "/dashboard/invoices/:invoice_id/delete",
            post(http_delete_invoice),
        )
        .route("/dashboard/customers", get(http_list_customers))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .merge(dashboard)
        .layer(RequestBodyLimitLayer::new(max_form_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.api.storage.health_check().await {
        Ok(()) => (StatusCode::OK, "ok"),
        Err(error) => {
            warn!(%error, "health check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
        }
    }
}

/// Lets a request through to the dashboard only with a valid session
/// cookie; the decoded claims are attached as a request extension.
async fn require_session(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let claims = session_cookie(request.headers())
        .and_then(|token| verify_session_token(&state.api.sessions, &token).ok());
    match claims {
        Some(claims) => {
            request.extensions_mut().insert::<SessionClaims>(claims);
            next.run(request).await
        }
        None => Redirect::to(LOGIN_PATH).into_response(),
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

async fn login(
    State(state): State<Arc<AppState>>,
    Form(form): Form<FormPayload>,
) -> Result<Response, HttpError> {
    let outcome = authenticate(&state.api, &form).await.map_err(|error| {
        error!(%error, "sign-in failed unexpectedly");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, "internal error")),
        )
    })?;

    Ok(match outcome {
        AuthOutcome::SignedIn { token, .. } => {
            let cookie = format!(
                "{SESSION_COOKIE}={token}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
                state.api.sessions.ttl_seconds
            );
            ([(header::SET_COOKIE, cookie)], Redirect::to(DASHBOARD_PATH)).into_response()
        }
        AuthOutcome::Rejected { message } => (
            StatusCode::UNAUTHORIZED,
            Json(AuthErrorResponse {
                message: message.to_string(),
            }),
        )
            .into_response(),
    })
}

async fn logout() -> Response {
    let cookie = format!("{SESSION_COOKIE}=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0");
    ([(header::SET_COOKIE, cookie)], Redirect::to(LOGIN_PATH)).into_response()
}

async fn http_overview(State(state): State<Arc<AppState>>) -> Json<DashboardOverview> {
    Json(dashboard::load_overview(&state.api).await)
}

async fn http_cards(State(state): State<Arc<AppState>>) -> Result<Json<CardData>, HttpError> {
    dashboard::fetch_card_data(&state.api)
        .await
        .map(Json)
        .map_err(fragment_error)
}

async fn http_revenue(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RevenuePoint>>, HttpError> {
    dashboard::fetch_revenue(&state.api)
        .await
        .map(Json)
        .map_err(fragment_error)
}

async fn http_latest_invoices(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<LatestInvoice>>, HttpError> {
    dashboard::fetch_latest_invoices(&state.api)
        .await
        .map(Json)
        .map_err(fragment_error)
}

async fn http_list_invoices(
    State(state): State<Arc<AppState>>,
    Query(q): Query<ListInvoicesQuery>,
) -> Result<Json<InvoicesPage>, HttpError> {
    let page = dashboard::fetch_invoices_page(
        &state.api,
        q.query.as_deref().unwrap_or_default(),
        q.page.unwrap_or(1),
    )
    .await
    .map_err(api_error)?;
    Ok(Json(page))
}

async fn http_edit_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<String>,
) -> Result<Json<EditInvoiceView>, HttpError> {
    let invoice_id = InvoiceId::new(invoice_id);
    let (invoice, customers) = tokio::join!(
        dashboard::fetch_invoice_form(&state.api, &invoice_id),
        dashboard::fetch_customer_fields(&state.api),
    );
    Ok(Json(EditInvoiceView {
        invoice: invoice.map_err(api_error)?,
        customers: customers.map_err(api_error)?,
    }))
}

async fn http_list_customers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<CustomerField>>, HttpError> {
    let customers = dashboard::fetch_customer_fields(&state.api)
        .await
        .map_err(api_error)?;
    Ok(Json(customers))
}

async fn http_create_invoice(
    State(state): State<Arc<AppState>>,
    Form(form): Form<FormPayload>,
) -> Response {
    action_response(create_invoice(&state.api, &form).await)
}

async fn http_update_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<String>,
    Form(form): Form<FormPayload>,
) -> Response {
    let outcome = update_invoice(&state.api, &InvoiceId::new(invoice_id), &form).await;
    action_response(outcome)
}

async fn http_delete_invoice(
    State(state): State<Arc<AppState>>,
    Path(invoice_id): Path<String>,
) -> Response {
    match delete_invoice(&state.api, &InvoiceId::new(invoice_id)).await {
        Ok(message) => (StatusCode::OK, Json(message)).into_response(),
        Err(message) => (StatusCode::INTERNAL_SERVER_ERROR, Json(message)).into_response(),
    }
}

fn action_response(outcome: ActionOutcome) -> Response {
    match outcome {
        ActionOutcome::Redirect { to } => Redirect::to(&to).into_response(),
        ActionOutcome::Invalid(state) => {
            (StatusCode::UNPROCESSABLE_ENTITY, Json(state)).into_response()
        }
        ActionOutcome::Failed(state) => {
            (StatusCode::INTERNAL_SERVER_ERROR, Json(state)).into_response()
        }
    }
}

fn api_error(err: ApiError) -> HttpError {
    let status = match err.code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(err))
}

fn fragment_error(err: anyhow::Error) -> HttpError {
    warn!(error = %err, "dashboard fragment failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(ErrorCode::Internal, "fragment unavailable")),
    )
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
