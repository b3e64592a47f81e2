//! In-process harness: the real router over `MemStorage`, driven with
//! `tower::ServiceExt::oneshot`.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use futures_util::future::BoxFuture;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use eventmaster_db::MemStorage;

use crate::mailer::{Mailer, OutgoingEmail};
use crate::payments::{NoPayments, PaymentError, PaymentGateway, PaymentIntent};
use crate::session::SESSION_COOKIE;
use crate::state::{AppState, AppStateInner, Settings};

pub const PASSWORD: &str = "password123";

#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    /// Emails go out on spawned tasks; give them a chance to run.
    pub async fn wait_for(&self, count: usize) -> Vec<OutgoingEmail> {
        for _ in 0..100 {
            if self.sent.lock().unwrap().len() >= count {
                break;
            }
            tokio::task::yield_now().await;
        }
        self.sent.lock().unwrap().clone()
    }
}

impl Mailer for RecordingMailer {
    fn send(&self, email: OutgoingEmail) -> BoxFuture<'static, anyhow::Result<()>> {
        self.sent.lock().unwrap().push(email);
        Box::pin(async { Ok(()) })
    }
}

/// Issues intents that succeed once `succeed` is set.
#[derive(Default)]
pub struct FakeGateway {
    pub succeed: AtomicBool,
    pub fail_create: AtomicBool,
    issued: AtomicUsize,
}

impl PaymentGateway for FakeGateway {
    fn enabled(&self) -> bool {
        true
    }

    fn create_intent(
        &self,
        amount_cents: i64,
        _currency: &str,
        _booking_reference: &str,
    ) -> BoxFuture<'static, Result<PaymentIntent, PaymentError>> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Box::pin(async { Err(PaymentError::Rejected("card_declined".into())) });
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            Ok(PaymentIntent {
                id: format!("pi_test_{n}"),
                client_secret: Some(format!("pi_test_{n}_secret_xyz")),
                status: "requires_payment_method".into(),
                amount: amount_cents,
            })
        })
    }

    fn retrieve_intent(&self, intent_id: &str) -> BoxFuture<'static, Result<PaymentIntent, PaymentError>> {
        let status = if self.succeed.load(Ordering::SeqCst) {
            "succeeded"
        } else {
            "requires_payment_method"
        };
        let id = intent_id.to_string();
        Box::pin(async move {
            Ok(PaymentIntent {
                id,
                client_secret: None,
                status: status.into(),
                amount: 0,
            })
        })
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        if self.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&self.body).unwrap()
    }

    pub fn text(&self) -> String {
        String::from_utf8(self.body.to_vec()).unwrap()
    }

    /// `em_session=<token>` from the response, ready for a `Cookie` header.
    pub fn session_cookie(&self) -> Option<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .find(|v| v.starts_with(SESSION_COOKIE))
            .and_then(|v| v.split(';').next())
            .map(str::to_string)
    }
}

pub struct TestApp {
    pub router: Router,
    pub mailer: Arc<RecordingMailer>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(Arc::new(NoPayments), None)
    }

    pub fn with_payments(payments: Arc<dyn PaymentGateway>) -> Self {
        Self::build(payments, None)
    }

    pub fn with_admin_email(email: &str) -> Self {
        Self::build(Arc::new(NoPayments), Some(email.to_string()))
    }

    fn build(payments: Arc<dyn PaymentGateway>, admin_email: Option<String>) -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        let state: AppState = Arc::new(AppStateInner {
            storage: Arc::new(MemStorage::new()),
            mailer: mailer.clone(),
            payments,
            settings: Settings {
                session_secret: "test-session-secret-0123456789abcdef".into(),
                session_ttl_hours: 1,
                cookie_secure: false,
                first_user_admin: true,
                currency: "usd".into(),
                admin_email,
            },
        });
        Self {
            router: crate::routes::router(state),
            mailer,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        cookie: Option<&str>,
        body: Option<Value>,
    ) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.send(req).await
    }

    pub async fn request_with_bearer(&self, method: Method, uri: &str, token: &str) -> TestResponse {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    async fn send(&self, req: Request<Body>) -> TestResponse {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let headers = resp.headers().clone();
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        TestResponse { status, headers, body }
    }

    /// Registers `<username>@example.com` and returns its session cookie.
    pub async fn register(&self, username: &str) -> String {
        let resp = self
            .request(
                Method::POST,
                "/api/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "register {username}: {}", resp.text());
        resp.session_cookie().unwrap()
    }

    /// Must be the first registration in the app.
    pub async fn admin(&self) -> String {
        let cookie = self.register("admin").await;
        let me = self.request(Method::GET, "/api/auth/me", Some(&cookie), None).await;
        assert_eq!(me.json()["role"], "admin");
        cookie
    }

    pub async fn user_id(&self, cookie: &str) -> String {
        let me = self.request(Method::GET, "/api/auth/me", Some(cookie), None).await;
        me.json()["id"].as_str().unwrap().to_string()
    }

    /// Creates a published event a week out; `overrides` replaces defaults.
    pub async fn create_event(&self, cookie: &str, overrides: Value) -> Value {
        let mut body = json!({
            "title": "Sample Event",
            "description": "A sample event.",
            "category": "Music",
            "location": "Main Hall",
            "starts_at": (Utc::now() + Duration::days(7)).to_rfc3339(),
            "price_cents": 1500,
            "capacity": 100,
        });
        if let (Some(base), Some(extra)) = (body.as_object_mut(), overrides.as_object()) {
            for (k, v) in extra {
                base.insert(k.clone(), v.clone());
            }
        }
        let resp = self
            .request(Method::POST, "/api/admin/events", Some(cookie), Some(body))
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "create event: {}", resp.text());
        resp.json()
    }

    pub async fn book(&self, cookie: &str, event_id: &str, quantity: u32) -> Value {
        let resp = self
            .request(
                Method::POST,
                "/api/bookings",
                Some(cookie),
                Some(json!({ "event_id": event_id, "quantity": quantity })),
            )
            .await;
        assert_eq!(resp.status, StatusCode::CREATED, "book: {}", resp.text());
        resp.json()
    }
}
