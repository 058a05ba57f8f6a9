use super::*;
use axum::{body, body::Body, http::Request};
use shared::{
    domain::{Customer, CustomerId},
    protocol::{ActionMessage, Fragment, FormState},
};
use tower::ServiceExt;

const FORM: &str = "application/x-www-form-urlencoded";

async fn test_app() -> (Router, ApiContext) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage
        .insert_customer(&Customer {
            id: CustomerId::new("c1"),
            name: "Lee Robinson".into(),
            email: "lee@robinson.com".into(),
            image_url: "/customers/lee-robinson.png".into(),
        })
        .await
        .expect("customer");
    let hash = server_api::auth::hash_password("123456").expect("hash");
    storage
        .insert_user("User", "user@nextmail.com", &hash)
        .await
        .expect("user");

    let api = ApiContext::new(
        storage,
        SessionConfig {
            secret: "test-secret".into(),
            ttl_seconds: 60,
        },
    );
    let app = build_router(Arc::new(AppState { api: api.clone() }), 64 * 1024);
    (app, api)
}

async fn read_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    serde_json::from_slice(&bytes).expect("json")
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("location")
        .to_str()
        .expect("ascii")
}

async fn login_cookie(app: &Router) -> String {
    let request = Request::post("/login")
        .header(header::CONTENT_TYPE, FORM)
        .body(Body::from("email=user%40nextmail.com&password=123456"))
        .expect("request");
    let response = app.clone().oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard");

    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie")
        .to_str()
        .expect("ascii");
    assert!(set_cookie.contains("HttpOnly"));
    set_cookie
        .split(';')
        .next()
        .expect("cookie pair")
        .to_string()
}

fn authed_get(uri: &str, cookie: &str) -> Request<Body> {
    Request::get(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .expect("request")
}

fn authed_form(uri: &str, cookie: &str, form: &str) -> Request<Body> {
    Request::post(uri)
        .header(header::COOKIE, cookie)
        .header(header::CONTENT_TYPE, FORM)
        .body(Body::from(form.to_string()))
        .expect("request")
}

#[tokio::test]
async fn healthz_reports_ok_when_storage_is_ready() {
    let (app, _api) = test_app().await;
    let request = Request::get("/healthz")
        .body(Body::empty())
        .expect("request");
    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::OK);

    let body = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    assert_eq!(body.as_ref(), b"ok");
}

#[tokio::test]
async fn dashboard_requires_session() {
    let (app, _api) = test_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::get("/dashboard/invoices")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");

    let response = app
        .oneshot(authed_get("/dashboard", "session=forged.token.value"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
}

#[tokio::test]
async fn login_with_wrong_password_reports_invalid_credentials() {
    let (app, _api) = test_app().await;
    let request = Request::post("/login")
        .header(header::CONTENT_TYPE, FORM)
        .body(Body::from("email=user%40nextmail.com&password=nope-nope"))
        .expect("request");

    let response = app.oneshot(request).await.expect("response");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    let body: AuthErrorResponse = read_json(response).await;
    assert_eq!(body.message, "Invalid credentials.");
}

#[tokio::test]
async fn create_invoice_redirects_to_listing() {
    let (app, _api) = test_app().await;
    let cookie = login_cookie(&app).await;

    let response = app
        .clone()
        .oneshot(authed_form(
            "/dashboard/invoices",
            &cookie,
            "customerId=c1&amount=45.00&status=pending",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard/invoices");

    let response = app
        .oneshot(authed_get("/dashboard/invoices", &cookie))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let page: InvoicesPage = read_json(response).await;
    assert_eq!(page.invoices.len(), 1);
    assert_eq!(page.invoices[0].amount, "$45.00");
    assert_eq!(page.invoices[0].date, server_api::actions::today());
}

#[tokio::test]
async fn create_invoice_with_bad_fields_returns_form_state() {
    let (app, api) = test_app().await;
    let cookie = login_cookie(&app).await;

    let response = app
        .oneshot(authed_form(
            "/dashboard/invoices",
            &cookie,
            "customerId=c1&amount=-5&status=overdue",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let state: FormState = read_json(response).await;
    assert_eq!(
        state.message.as_deref(),
        Some("Missing Fields. Failed to Create Invoice.")
    );
    let errors = state.errors.expect("field errors");
    assert_eq!(
        errors.amount,
        Some(vec!["Please enter an amount greater than $0.".to_string()])
    );
    assert!(errors.status.is_some());
    assert!(errors.customer_id.is_none());
    assert_eq!(
        api.storage
            .count_filtered_invoices("")
            .await
            .expect("count"),
        0
    );
}

#[tokio::test]
async fn repeated_form_field_uses_first_value() {
    let (app, _api) = test_app().await;
    let cookie = login_cookie(&app).await;

    let response = app
        .clone()
        .oneshot(authed_form(
            "/dashboard/invoices",
            &cookie,
            "customerId=c1&amount=12.50&amount=0&status=paid",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = app
        .oneshot(authed_get("/dashboard/invoices", &cookie))
        .await
        .expect("response");
    let page: InvoicesPage = read_json(response).await;
    assert_eq!(page.invoices[0].amount, "$12.50");
}

#[tokio::test]
async fn sub_cent_amount_is_a_field_error() {
    let (app, api) = test_app().await;
    let cookie = login_cookie(&app).await;

    let response = app
        .oneshot(authed_form(
            "/dashboard/invoices",
            &cookie,
            "customerId=c1&amount=0.004&status=pending",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let state: FormState = read_json(response).await;
    assert_eq!(
        state.errors.expect("field errors").amount,
        Some(vec!["Please enter an amount greater than $0.".to_string()])
    );
    assert_eq!(
        api.storage
            .count_filtered_invoices("")
            .await
            .expect("count"),
        0
    );
}

#[tokio::test]
async fn update_is_visible_in_cached_listing() {
    let (app, _api) = test_app().await;
    let cookie = login_cookie(&app).await;

    app.clone()
        .oneshot(authed_form(
            "/dashboard/invoices",
            &cookie,
            "customerId=c1&amount=10&status=pending",
        ))
        .await
        .expect("create");
    let response = app
        .clone()
        .oneshot(authed_get("/dashboard/invoices", &cookie))
        .await
        .expect("listing");
    let before: InvoicesPage = read_json(response).await;
    let invoice_id = before.invoices[0].id.clone();

    let response = app
        .clone()
        .oneshot(authed_form(
            &format!("/dashboard/invoices/{invoice_id}"),
            &cookie,
            "customerId=c1&amount=99.99&status=paid",
        ))
        .await
        .expect("update");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/dashboard/invoices");

    let response = app
        .clone()
        .oneshot(authed_get("/dashboard/invoices", &cookie))
        .await
        .expect("listing");
    let after: InvoicesPage = read_json(response).await;
    assert_eq!(after.invoices[0].amount, "$99.99");
    assert_eq!(after.invoices[0].date, before.invoices[0].date);

    let response = app
        .oneshot(authed_get(
            &format!("/dashboard/invoices/{invoice_id}/edit"),
            &cookie,
        ))
        .await
        .expect("edit");
    assert_eq!(response.status(), StatusCode::OK);
    let view: EditInvoiceView = read_json(response).await;
    assert_eq!(view.invoice.amount, 99.99);
    assert_eq!(view.customers.len(), 1);
}

#[tokio::test]
async fn delete_missing_invoice_still_succeeds() {
    let (app, _api) = test_app().await;
    let cookie = login_cookie(&app).await;

    let response = app
        .oneshot(authed_form(
            "/dashboard/invoices/does-not-exist/delete",
            &cookie,
            "",
        ))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let message: ActionMessage = read_json(response).await;
    assert_eq!(message.message, "Deleted Invoice.");
}

#[tokio::test]
async fn edit_of_missing_invoice_is_not_found() {
    let (app, _api) = test_app().await;
    let cookie = login_cookie(&app).await;

    let response = app
        .oneshot(authed_get("/dashboard/invoices/missing/edit", &cookie))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn overview_reports_every_fragment() {
    let (app, api) = test_app().await;
    api.storage.upsert_revenue("Jan", 2000).await.expect("revenue");
    let cookie = login_cookie(&app).await;

    let response = app
        .clone()
        .oneshot(authed_get("/dashboard", &cookie))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::OK);
    let overview: DashboardOverview = read_json(response).await;
    assert!(overview.cards.is_ready());
    assert!(overview.latest_invoices.is_ready());
    assert_eq!(
        overview.revenue,
        Fragment::Ready(vec![RevenuePoint {
            month: "Jan".into(),
            revenue: 2000
        }])
    );

    let response = app
        .oneshot(authed_get("/dashboard/cards", &cookie))
        .await
        .expect("response");
    let cards: CardData = read_json(response).await;
    assert_eq!(cards.number_of_customers, 1);
}

#[tokio::test]
async fn logout_expires_session_cookie() {
    let (app, _api) = test_app().await;
    let response = app
        .oneshot(Request::post("/logout").body(Body::empty()).expect("request"))
        .await
        .expect("response");
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/login");
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("set-cookie")
        .to_str()
        .expect("ascii");
    assert!(set_cookie.contains("Max-Age=0"));
}

#[test]
fn session_cookie_is_found_among_others() {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::COOKIE,
        "theme=dark; session=abc.def.ghi; other=1".parse().expect("header"),
    );
    assert_eq!(session_cookie(&headers).as_deref(), Some("abc.def.ghi"));

    let mut headers = HeaderMap::new();
    headers.insert(header::COOKIE, "session=".parse().expect("header"));
    assert_eq!(session_cookie(&headers), None);
}
