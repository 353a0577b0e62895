//! HTTP endpoints.
//!
//! Thin glue: every handler extracts tenant/request id from headers, calls
//! straight into a domain module (`simulate`, `batch`, `execute`,
//! `transfer_ops`, `refund_ops`, `ap2`, `acp`, `agent_ops`, `context`,
//! `capabilities`, `facilitator`), and wraps the `Result<T, ApiError>` in the
//! response envelope — handlers stay free of cross-cutting concerns like
//! status-code mapping, idempotency replay, and cache negotiation, which
//! live in shared helpers below instead.

use crate::acp;
use crate::agent_ops;
use crate::ap2;
use crate::batch;
use crate::cache::{CacheBucket, CacheKey, ContextCache, bypasses_cache};
use crate::capabilities;
use crate::config::Config;
use crate::context;
use crate::envelope::RequestContext;
use crate::error::{ApiError, ErrorKind};
use crate::execute;
use crate::facilitator::{FacilitatorConfig, PaymentPayload, SandboxFacilitator};
use crate::idempotency::IdempotencyStore;
use crate::ids;
use crate::refund_ops;
use crate::store::Store;
use crate::store::simulation::{ActionPayload, BatchRequest};
use crate::transfer_ops;
use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, patch, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;

/// Everything a handler needs: the store, the two in-process caches, the
/// sandbox facilitator, and resolved config. Cloning is cheap — every field
/// is an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Arc<ContextCache>,
    pub idempotency: Arc<IdempotencyStore>,
    pub facilitator: Arc<SandboxFacilitator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, config: Arc<Config>) -> Self {
        let facilitator_config = FacilitatorConfig::default();
        Self {
            store,
            cache: ContextCache::new(),
            idempotency: IdempotencyStore::new(),
            facilitator: Arc::new(SandboxFacilitator::new(facilitator_config)),
            config,
        }
    }
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/simulate", post(simulate_create))
        .route("/v1/simulate/batch", post(simulate_batch))
        .route("/v1/simulate/{id}", get(simulate_get))
        .route("/v1/simulate/{id}/execute", post(simulate_execute))
        .route("/v1/transfers", post(transfers_create))
        .route("/v1/transfers/{id}", get(transfers_get))
        .route("/v1/transfers/{id}/cancel", post(transfers_cancel))
        .route("/v1/refunds", post(refunds_create))
        .route("/v1/refunds/{id}", get(refunds_get))
        .route("/v1/ap2/mandates", post(mandates_create))
        .route("/v1/ap2/mandates/{id}", get(mandates_get))
        .route("/v1/ap2/mandates/{id}/execute", post(mandates_execute))
        .route("/v1/ap2/mandates/{id}/cancel", patch(mandates_cancel))
        .route("/v1/acp/checkouts", post(checkouts_create))
        .route("/v1/acp/checkouts/{id}", get(checkouts_get))
        .route("/v1/acp/checkouts/{id}/complete", post(checkouts_complete))
        .route("/v1/acp/checkouts/{id}/cancel", patch(checkouts_cancel))
        .route("/v1/agents", post(agents_create))
        .route("/v1/agents/{id}", get(agents_get))
        .route("/v1/agents/{id}", delete(agents_delete))
        .route("/v1/agents/{id}/suspend", patch(agents_suspend))
        .route("/v1/agents/{id}/activate", patch(agents_activate))
        .route("/v1/x402/facilitator/verify", post(x402_verify))
        .route("/v1/x402/facilitator/settle", post(x402_settle))
        .route("/v1/x402/facilitator/supported", get(x402_supported))
        .route("/v1/capabilities", get(capabilities_get))
        .route("/v1/context/account/{id}", get(context_account))
        .route("/v1/context/transfer/{id}", get(context_transfer))
        .route("/v1/context/agent/{id}", get(context_agent))
        .route("/v1/context/batch/{id}", get(context_batch))
}

/// Wires [`routes`] onto `state` and layers tracing + CORS, the same stack
/// the binary serves in production. Shared with integration tests so they
/// exercise the exact router callers hit over HTTP.
pub fn app(state: AppState) -> Router {
    use axum::http::Method;
    use tower_http::cors;
    use tower_http::trace::TraceLayer;

    Router::new().merge(routes().with_state(state)).layer(TraceLayer::new_for_http()).layer(
        cors::CorsLayer::new()
            .allow_origin(cors::Any)
            .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
            .allow_headers(cors::Any),
    )
}

// ---------------------------------------------------------------------
// Request context helpers
// ---------------------------------------------------------------------

fn tenant_of(headers: &HeaderMap) -> String {
    headers
        .get("x-tenant-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .unwrap_or("default_tenant")
        .to_string()
}

/// Honors a caller-supplied `X-Request-Id` if present; otherwise mints one.
fn request_id_of(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or_else(ids::request_id)
}

fn ctx_of(headers: &HeaderMap, config: &Config) -> RequestContext {
    RequestContext::new(request_id_of(headers), config.environment().to_string())
}

fn idempotency_key_of(headers: &HeaderMap) -> Option<String> {
    headers.get("idempotency-key").and_then(|v| v.to_str().ok()).map(|s| s.to_string())
}

/// Runs a mutating operation behind the `Idempotency-Key` replay cache:
/// repeated keys within the bounded window return the original response.
/// Only successful results are cached — a failed attempt is worth retrying
/// with the same key.
async fn with_idempotency<T, Fut>(state: &AppState, headers: &HeaderMap, tenant: &str, ctx: &RequestContext, created_status: StatusCode, op: impl FnOnce() -> Fut) -> Response
where
    T: Serialize,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let key = idempotency_key_of(headers);
    if let Some(key) = &key {
        if let Some(recorded) = state.idempotency.get(tenant, key) {
            let status = StatusCode::from_u16(recorded.status).unwrap_or(StatusCode::OK);
            return ctx.success_with_status(status, recorded.body);
        }
    }
    match op().await {
        Ok(data) => {
            let value = serde_json::to_value(&data).unwrap_or(Value::Null);
            if let Some(key) = &key {
                state.idempotency.put(tenant, key, created_status.as_u16(), value.clone());
            }
            ctx.success_with_status(created_status, value)
        }
        Err(err) => ctx.error(err),
    }
}

// ---------------------------------------------------------------------
// Simulation engine
// ---------------------------------------------------------------------

async fn simulate_create(State(state): State<AppState>, headers: HeaderMap, Json(payload): Json<ActionPayload>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match crate::simulate::create(state.store.as_ref(), &tenant, payload).await {
        Ok(simulation) => ctx.success_with_status(StatusCode::CREATED, simulation),
        Err(err) => ctx.error(err),
    }
}

async fn simulate_get(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match state.store.get_simulation(&id).await {
        Some(simulation) if simulation.tenant == tenant => ctx.success(simulation),
        _ => ctx.error(ApiError::not_found(ErrorKind::SimulationNotFound, "simulation_id", &id)),
    }
}

async fn simulate_execute(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match execute::execute_simulation(state.store.as_ref(), &tenant, &id).await {
        Ok(result) => {
            let status = if result.already_executed { StatusCode::OK } else { StatusCode::CREATED };
            if !result.already_executed {
                invalidate_context_for_account_pair(&state, &result.resource_url);
            }
            ctx.success_with_status(status, result)
        }
        Err(err) => ctx.error(err),
    }
}

/// Batch processor. Unlike `POST /v1/simulate` with
/// `action_type=batch` (which wraps the batch as a single `Simulation`
/// preview), this endpoint returns the `Batch` aggregate directly and
/// persists it so `/context/batch/{id}` can look it up afterwards.
async fn simulate_batch(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<BatchRequest>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match batch::process(state.store.as_ref(), &tenant, req.simulations, req.stop_on_first_error.unwrap_or(false)).await {
        Ok(result) => {
            state.store.put_batch(result.clone()).await;
            ctx.success_with_status(StatusCode::CREATED, result)
        }
        Err(err) => ctx.error(err),
    }
}

/// Best-effort context-cache invalidation after an execution gate win
///. `resource_url` is of the
/// form `/v1/transfers/{id}`; only the transfer's own context is known
/// without re-reading the created resource, so that's what gets invalidated
/// — the account-level aggregates fall out of their own (much shorter)
/// TTLs rather than being force-evicted here.
fn invalidate_context_for_account_pair(state: &AppState, resource_url: &str) {
    if let Some(id) = resource_url.rsplit('/').next() {
        state.cache.invalidate_prefix(&format!("/context/transfer/{id}"));
    }
}

// ---------------------------------------------------------------------
// Direct transfers
// ---------------------------------------------------------------------

async fn transfers_create(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<transfer_ops::CreateTransferRequest>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    let from = req.from_account.clone();
    let to = req.to_account.clone();
    let response = with_idempotency(&state, &headers, &tenant, &ctx, StatusCode::CREATED, || transfer_ops::create_direct(state.store.as_ref(), &tenant, req)).await;
    state.cache.invalidate_prefix(&format!("/context/account/{from}"));
    state.cache.invalidate_prefix(&format!("/context/account/{to}"));
    response
}

async fn transfers_get(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    match transfer_ops::get(state.store.as_ref(), &id).await {
        Ok(transfer) => ctx.success(transfer),
        Err(err) => ctx.error(err),
    }
}

async fn transfers_cancel(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    match transfer_ops::cancel(state.store.as_ref(), &id).await {
        Ok(transfer) => {
            state.cache.invalidate_prefix(&format!("/context/transfer/{id}"));
            ctx.success(transfer)
        }
        Err(err) => ctx.error(err),
    }
}

// ---------------------------------------------------------------------
// Refunds
// ---------------------------------------------------------------------

async fn refunds_create(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<refund_ops::CreateRefundRequest>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    let original_transfer = req.original_transfer.clone();
    let response = with_idempotency(&state, &headers, &tenant, &ctx, StatusCode::CREATED, || refund_ops::create(state.store.as_ref(), &tenant, req)).await;
    state.cache.invalidate_prefix(&format!("/context/transfer/{original_transfer}"));
    response
}

async fn refunds_get(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match refund_ops::get(state.store.as_ref(), &tenant, &id).await {
        Ok(refund) => ctx.success(refund),
        Err(err) => ctx.error(err),
    }
}

// ---------------------------------------------------------------------
// AP2 mandates
// ---------------------------------------------------------------------

async fn mandates_create(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<ap2::CreateMandateRequest>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    with_idempotency(&state, &headers, &tenant, &ctx, StatusCode::CREATED, || ap2::create(state.store.as_ref(), &tenant, req)).await
}

async fn mandates_get(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match ap2::get(state.store.as_ref(), &tenant, &id).await {
        Ok(mandate) => ctx.success(mandate),
        Err(err) => ctx.error(err),
    }
}

async fn mandates_execute(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Json(req): Json<ap2::ExecuteMandateRequest>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    let id_for_cache = id.clone();
    let response = with_idempotency(&state, &headers, &tenant, &ctx, StatusCode::CREATED, || ap2::execute(state.store.as_ref(), &tenant, &id, req)).await;
    state.cache.invalidate_prefix(&format!("/context/agent/{id_for_cache}"));
    response
}

async fn mandates_cancel(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match ap2::cancel(state.store.as_ref(), &tenant, &id).await {
        Ok(mandate) => ctx.success(mandate),
        Err(err) => ctx.error(err),
    }
}

// ---------------------------------------------------------------------
// ACP checkouts
// ---------------------------------------------------------------------

async fn checkouts_create(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<acp::CreateCheckoutRequest>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    with_idempotency(&state, &headers, &tenant, &ctx, StatusCode::CREATED, || acp::create(state.store.as_ref(), &tenant, req)).await
}

async fn checkouts_get(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match acp::get(state.store.as_ref(), &tenant, &id).await {
        Ok(checkout) => ctx.success(checkout),
        Err(err) => ctx.error(err),
    }
}

async fn checkouts_complete(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Json(req): Json<acp::CompleteCheckoutRequest>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    with_idempotency(&state, &headers, &tenant, &ctx, StatusCode::OK, || acp::complete(state.store.as_ref(), &tenant, &id, req)).await
}

async fn checkouts_cancel(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match acp::cancel(state.store.as_ref(), &tenant, &id).await {
        Ok(checkout) => ctx.success(checkout),
        Err(err) => ctx.error(err),
    }
}

// ---------------------------------------------------------------------
// Agents
// ---------------------------------------------------------------------

async fn agents_create(State(state): State<AppState>, headers: HeaderMap, Json(req): Json<agent_ops::CreateAgentRequest>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    with_idempotency(&state, &headers, &tenant, &ctx, StatusCode::CREATED, || agent_ops::create(state.store.as_ref(), &tenant, req)).await
}

async fn agents_get(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match agent_ops::get(state.store.as_ref(), &tenant, &id).await {
        Ok(agent) => ctx.success(agent),
        Err(err) => ctx.error(err),
    }
}

async fn agents_suspend(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match agent_ops::suspend(state.store.as_ref(), &tenant, &id).await {
        Ok(agent) => {
            state.cache.invalidate_prefix(&format!("/context/agent/{id}"));
            ctx.success(agent)
        }
        Err(err) => ctx.error(err),
    }
}

async fn agents_activate(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match agent_ops::activate(state.store.as_ref(), &tenant, &id).await {
        Ok(agent) => {
            state.cache.invalidate_prefix(&format!("/context/agent/{id}"));
            ctx.success(agent)
        }
        Err(err) => ctx.error(err),
    }
}

async fn agents_delete(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    match agent_ops::delete(state.store.as_ref(), &tenant, &id).await {
        Ok(()) => {
            state.cache.invalidate_prefix(&format!("/context/agent/{id}"));
            ctx.success(json!({"deleted": true, "agent_id": id}))
        }
        Err(err) => ctx.error(err),
    }
}

// ---------------------------------------------------------------------
// Sandbox x402 facilitator
// ---------------------------------------------------------------------

/// Refuses facilitator traffic outside `mock`/`sandbox` — production
/// traffic is expected to reach a real facilitator instead.
fn require_sandbox_active(state: &AppState) -> Result<(), ApiError> {
    use crate::config::Environment;
    let active = state.config.service_environments().resolve(state.config.service_environments().x402, state.config.environment());
    if matches!(active, Environment::Production) {
        return Err(ApiError::new(ErrorKind::CapabilityNotFound, "the sandbox x402 facilitator is not exposed when x402 is configured for production"));
    }
    if !state.config.feature_flags().is_enabled("X402_FACILITATOR") {
        return Err(ApiError::new(ErrorKind::CapabilityNotFound, "the x402 facilitator feature flag is disabled"));
    }
    Ok(())
}

async fn x402_verify(State(state): State<AppState>, headers: HeaderMap, Json(payment): Json<PaymentPayload>) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    if let Err(err) = require_sandbox_active(&state) {
        return ctx.error(err);
    }
    match state.facilitator.verify(&payment) {
        Ok(result) => ctx.success(result),
        Err(err) => ctx.error(err),
    }
}

async fn x402_settle(State(state): State<AppState>, headers: HeaderMap, Json(payment): Json<PaymentPayload>) -> Response {
    let tenant = tenant_of(&headers);
    let ctx = ctx_of(&headers, &state.config);
    if let Err(err) = require_sandbox_active(&state) {
        return ctx.error(err);
    }
    with_idempotency(&state, &headers, &tenant, &ctx, StatusCode::OK, || state.facilitator.settle(&payment)).await
}

async fn x402_supported(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    if let Err(err) = require_sandbox_active(&state) {
        return ctx.error(err);
    }
    ctx.success(state.facilitator.supported())
}

// ---------------------------------------------------------------------
// Capabilities registry
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CapabilitiesQuery {
    category: Option<String>,
    name: Option<String>,
}

async fn capabilities_get(State(state): State<AppState>, headers: HeaderMap, Query(query): Query<CapabilitiesQuery>) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    let catalog = capabilities::catalog(query.category.as_deref(), query.name.as_deref());
    ctx.success(catalog)
}

// ---------------------------------------------------------------------
// Context aggregators
// ---------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ContextQuery {
    fresh: Option<String>,
}

fn cache_control_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::CACHE_CONTROL).and_then(|v| v.to_str().ok())
}

fn if_none_match_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::IF_NONE_MATCH).and_then(|v| v.to_str().ok())
}

fn not_modified_response(etag: &str, age_seconds: u64, ttl_remaining: u64) -> Response {
    let mut response = StatusCode::NOT_MODIFIED.into_response();
    set_cache_headers(&mut response, etag, age_seconds, ttl_remaining, true);
    response
}

fn set_cache_headers(response: &mut Response, etag: &str, age_seconds: u64, ttl_remaining: u64, hit: bool) {
    let headers = response.headers_mut();
    headers.insert("x-cache", if hit { "HIT" } else { "MISS" }.parse().unwrap());
    if let Ok(value) = age_seconds.to_string().parse() {
        headers.insert("x-cache-age", value);
    }
    if let Ok(value) = format!("private, max-age={ttl_remaining}").parse() {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) = etag.parse() {
        headers.insert(header::ETAG, value);
    }
}

/// Shared GET `/context/*` flow: cache lookup + ETag negotiation, falling
/// through to the aggregator on a miss or bypass.
async fn serve_context<T, Fut>(state: &AppState, headers: &HeaderMap, query: &ContextQuery, ctx: &RequestContext, path: String, bucket: CacheBucket, fetch: Fut) -> Response
where
    T: Serialize,
    Fut: Future<Output = Result<(T, bool), ApiError>>,
{
    let tenant = tenant_of(headers);
    let key = CacheKey::new(tenant, path, String::new());
    let bypass = bypasses_cache(cache_control_header(headers), query.fresh.as_deref());

    if !bypass {
        if let Some(entry) = state.cache.get(&key) {
            if let Some(if_none_match) = if_none_match_header(headers) {
                if if_none_match == entry.etag {
                    return not_modified_response(&entry.etag, entry.age_seconds(), entry.ttl_remaining_seconds());
                }
            }
            let mut response = ctx.success(entry.body.clone());
            set_cache_headers(&mut response, &entry.etag, entry.age_seconds(), entry.ttl_remaining_seconds(), true);
            return response;
        }
    }

    match fetch.await {
        Ok((data, partial)) => {
            let value = serde_json::to_value(&data).unwrap_or(Value::Null);
            let entry = state.cache.put(key, value.clone(), bucket);
            let mut response = if partial { ctx.success_partial(value) } else { ctx.success(value) };
            set_cache_headers(&mut response, &entry.etag, 0, entry.ttl_remaining_seconds(), false);
            response
        }
        Err(err) => ctx.error(err),
    }
}

async fn context_account(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Query(query): Query<ContextQuery>) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    let path = format!("/context/account/{id}");
    serve_context(&state, &headers, &query, &ctx, path, CacheBucket::AccountMetadata, context::account(state.store.as_ref(), &id)).await
}

async fn context_transfer(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Query(query): Query<ContextQuery>) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    let path = format!("/context/transfer/{id}");
    serve_context(&state, &headers, &query, &ctx, path, CacheBucket::Transfer, context::transfer(state.store.as_ref(), &id)).await
}

async fn context_agent(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Query(query): Query<ContextQuery>) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    let path = format!("/context/agent/{id}");
    serve_context(&state, &headers, &query, &ctx, path, CacheBucket::Agent, context::agent(state.store.as_ref(), &id)).await
}

async fn context_batch(State(state): State<AppState>, headers: HeaderMap, Path(id): Path<String>, Query(query): Query<ContextQuery>) -> Response {
    let ctx = ctx_of(&headers, &state.config);
    let path = format!("/context/batch/{id}");
    serve_context(&state, &headers, &query, &ctx, path, CacheBucket::Batch, context::batch(state.store.as_ref(), &id)).await
}
