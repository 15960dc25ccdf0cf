use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use order_lifecycle_api::{
    app_router,
    auth::Claims,
    config::AppConfig,
    events::{Event, EventSender},
    models::Role,
    repositories::InMemoryOrderRepository,
    AppState,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const TEST_JWT_SECRET: &str = "integration_test_secret_with_enough_length_0123456789";

/// A user with a bearer token minted for the test application.
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: Uuid,
    pub role: Role,
    pub token: String,
}

/// Helper harness for driving the full router backed by an in-memory order store.
pub struct TestApp {
    router: Router,
    #[allow(dead_code)]
    pub state: AppState,
    #[allow(dead_code)]
    pub events: mpsc::Receiver<Event>,
}

impl TestApp {
    pub fn new() -> Self {
        let config = AppConfig::new(TEST_JWT_SECRET.to_string(), "test".to_string());
        let (event_tx, event_rx) = mpsc::channel(256);
        let state = AppState::new(
            config,
            Arc::new(InMemoryOrderRepository::new()),
            Some(Arc::new(EventSender::new(event_tx))),
        );

        Self {
            router: app_router(state.clone()),
            state,
            events: event_rx,
        }
    }

    pub fn user(&self, role: Role) -> TestUser {
        let id = Uuid::new_v4();
        TestUser {
            id,
            role,
            token: mint_token(&id.to_string(), &role.to_string(), 3600),
        }
    }

    pub fn admin(&self) -> TestUser {
        self.user(Role::Admin)
    }

    pub fn agent(&self) -> TestUser {
        self.user(Role::DeliveryAgent)
    }

    pub fn customer(&self) -> TestUser {
        self.user(Role::Customer)
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn request_as(
        &self,
        user: &TestUser,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> Response {
        self.request(method, uri, body, Some(&user.token)).await
    }

    /// Places a one-item order as `customer` and returns its id.
    pub async fn place_order(&self, customer: &TestUser) -> String {
        let response = self
            .request_as(customer, Method::POST, "/api/v1/orders", Some(sample_order()))
            .await;
        assert_eq!(response.status(), 201, "order placement should succeed");
        let body = response_json(response).await;
        body["data"]["id"]
            .as_str()
            .expect("order id in response")
            .to_string()
    }

    pub async fn set_status(&self, user: &TestUser, order_id: &str, status_id: u8) -> Response {
        self.request_as(
            user,
            Method::PUT,
            "/api/v1/orders/update-status",
            Some(json!({ "order_id": order_id, "status_id": status_id })),
        )
        .await
    }

    pub async fn assign(&self, admin: &TestUser, order_id: &str, agent_id: Uuid) -> Response {
        self.request_as(
            admin,
            Method::POST,
            "/api/v1/orders/assign-agent",
            Some(json!({ "order_id": order_id, "agent_id": agent_id })),
        )
        .await
    }
}

pub fn mint_token(sub: &str, role: &str, ttl_secs: i64) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now().timestamp() + ttl_secs) as usize,
        iss: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("token encodes")
}

pub fn sample_order() -> Value {
    json!({
        "items": [{
            "product_id": Uuid::new_v4(),
            "quantity": 2,
            "unit_price": "12.50"
        }],
        "address": "42 Wallaby Way, Sydney",
        "phone": "+61 2 5550 1234"
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}
