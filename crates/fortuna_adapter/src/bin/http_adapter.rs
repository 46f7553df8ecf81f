#![forbid(unsafe_code)]

use std::{
    env,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};

use fortuna_adapter::{
    AdapterError, AdapterRuntime, AdminOverrideRequest, ClaimRequest, InvoiceRequest,
    PlatformUpdate, SpinRequest,
};
use fortuna_core::coordinator::AllocationError;

type SharedRuntime = Arc<Mutex<AdapterRuntime>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind = env::var("FORTUNA_HTTP_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let addr: SocketAddr = bind.parse()?;

    let runtime = Arc::new(Mutex::new(AdapterRuntime::from_env()?));
    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/config", get(config))
        .route("/api/invoice", post(invoice))
        .route("/api/webhook", post(webhook))
        .route("/api/spin", post(spin))
        .route("/api/inventory/:user_id", get(inventory))
        .route("/api/claim", post(claim))
        .route("/api/admin/override", post(admin_override))
        .with_state(runtime);

    println!("fortuna_adapter_http listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn lock_poisoned() -> (StatusCode, Json<Value>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "adapter runtime lock poisoned" })),
    )
}

fn error_response(err: &AllocationError) -> (StatusCode, Json<Value>) {
    let (status, reason) = match err {
        AllocationError::NotReady => (StatusCode::PAYMENT_REQUIRED, "not paid yet"),
        AllocationError::AlreadyConsumed => (StatusCode::BAD_REQUEST, "used"),
        AllocationError::AlreadyProcessed => (StatusCode::BAD_REQUEST, "already processed"),
        AllocationError::WrongOwner => {
            eprintln!("fortuna_adapter_http ownership violation: {err}");
            (StatusCode::FORBIDDEN, "wrong user")
        }
        AllocationError::NotFound => (StatusCode::NOT_FOUND, "not found"),
        AllocationError::Contract(_) => (StatusCode::BAD_REQUEST, "invalid request"),
        AllocationError::Storage(_) | AllocationError::Messaging(_) => {
            eprintln!("fortuna_adapter_http internal error: {err}");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    };
    (status, Json(json!({ "error": reason })))
}

async fn healthz() -> (StatusCode, Json<Value>) {
    (StatusCode::OK, Json(json!({ "status": "ok" })))
}

async fn config(State(runtime): State<SharedRuntime>) -> (StatusCode, Json<Value>) {
    let runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match serde_json::to_value(runtime.config_response()) {
        Ok(body) => (StatusCode::OK, Json(body)),
        Err(_) => lock_poisoned(),
    }
}

async fn invoice(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<InvoiceRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.issue_invoice(&request) {
        Ok(response) => match serde_json::to_value(response) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(_) => lock_poisoned(),
        },
        Err(err) => error_response(&err),
    }
}

/// Platform updates are always acknowledged with 200 so the platform stops
/// redelivering; failures are logged instead of surfaced.
async fn webhook(
    State(runtime): State<SharedRuntime>,
    Json(update): Json<PlatformUpdate>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    if let Err(err) = runtime.handle_webhook(&update) {
        eprintln!("fortuna_adapter_http webhook handling failed: {err}");
    }
    (StatusCode::OK, Json(json!({ "ok": true })))
}

async fn spin(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<SpinRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.spin(&request) {
        Ok(response) => match serde_json::to_value(response) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(_) => lock_poisoned(),
        },
        Err(err) => error_response(&err),
    }
}

async fn inventory(
    State(runtime): State<SharedRuntime>,
    Path(user_id): Path<String>,
) -> (StatusCode, Json<Value>) {
    let runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.inventory(&user_id) {
        Ok(response) => match serde_json::to_value(response) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(_) => lock_poisoned(),
        },
        Err(err) => error_response(&err),
    }
}

async fn claim(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<ClaimRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.request_claim(&request) {
        Ok(response) => match serde_json::to_value(response) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(_) => lock_poisoned(),
        },
        Err(err) => error_response(&err),
    }
}

async fn admin_override(
    State(runtime): State<SharedRuntime>,
    Json(request): Json<AdminOverrideRequest>,
) -> (StatusCode, Json<Value>) {
    let mut runtime = match runtime.lock() {
        Ok(runtime) => runtime,
        Err(_) => return lock_poisoned(),
    };
    match runtime.admin_set_override(&request) {
        Ok(response) => match serde_json::to_value(response) {
            Ok(body) => (StatusCode::OK, Json(body)),
            Err(_) => lock_poisoned(),
        },
        Err(AdapterError::Forbidden) => (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "forbidden" })),
        ),
        Err(AdapterError::Allocation(err)) => error_response(&err),
    }
}
