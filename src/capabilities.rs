//! Capabilities registry.
//!
//! `GET /v1/capabilities` hands a caller — typically an agent framework
//! wiring up tool calls rather than a human reading docs — a machine
//! readable catalog of every operation this server exposes. Modeled as a
//! `static`/`Lazy` table built once at first access rather than rebuilding
//! the catalog per-request.

use once_cell::sync::Lazy;
use serde::Serialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct HttpRoute {
    pub path: &'static str,
    pub method: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct OperationDescriptor {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
    pub http: HttpRoute,
    pub parameters_schema: Value,
    pub returns_schema: Value,
    pub error_codes: &'static [&'static str],
    pub supports_simulation: bool,
    pub supports_idempotency: bool,
}

fn route(method: &'static str, path: &'static str) -> HttpRoute {
    HttpRoute { path, method }
}

fn op(
    name: &'static str,
    category: &'static str,
    description: &'static str,
    http: HttpRoute,
    parameters_schema: Value,
    returns_schema: Value,
    error_codes: &'static [&'static str],
    supports_simulation: bool,
    supports_idempotency: bool,
) -> OperationDescriptor {
    OperationDescriptor {
        name,
        category,
        description,
        http,
        parameters_schema,
        returns_schema,
        error_codes,
        supports_simulation,
        supports_idempotency,
    }
}

/// One entry per HTTP operation. `error_codes` lists the handful most
/// likely to be returned, not every kind the taxonomy defines.
static OPERATIONS: Lazy<Vec<OperationDescriptor>> = Lazy::new(|| {
    vec![
        op(
            "simulate.create",
            "simulation",
            "Dry-run a transfer, refund, or stream and return a bounded, immutable preview",
            route("POST", "/v1/simulate"),
            json!({"type": "object", "required": ["action"], "properties": {"action": {"type": "object"}}}),
            json!({"type": "object", "properties": {"simulation_id": {"type": "string"}, "preview": {"type": "object"}}}),
            &["ValidationError", "AccountNotFound", "InsufficientBalance"],
            true,
            false,
        ),
        op(
            "simulate.get",
            "simulation",
            "Fetch a previously created simulation by id",
            route("GET", "/v1/simulate/{id}"),
            json!({"type": "object", "required": ["id"], "properties": {"id": {"type": "string"}}}),
            json!({"type": "object", "properties": {"simulation_id": {"type": "string"}}}),
            &["SimulationNotFound"],
            false,
            false,
        ),
        op(
            "simulate.execute",
            "simulation",
            "Materialize a simulation's preview into a durable transfer, re-validated with bounded variance",
            route("POST", "/v1/simulate/{id}/execute"),
            json!({"type": "object", "required": ["id"], "properties": {"id": {"type": "string"}}}),
            json!({"type": "object", "properties": {"transfer_id": {"type": "string"}}}),
            &["SimulationNotFound", "SimulationExpired", "ExecutionAlreadyInProgress"],
            false,
            true,
        ),
        op(
            "simulate.batch",
            "simulation",
            "Simulate up to 1000 transfers under a shared cumulative-balance view",
            route("POST", "/v1/simulate/batch"),
            json!({"type": "object", "required": ["items"], "properties": {"items": {"type": "array", "maxItems": 1000}}}),
            json!({"type": "object", "properties": {"batch_id": {"type": "string"}, "successful": {"type": "integer"}, "failed": {"type": "integer"}}}),
            &["ValidationError", "BatchSizeInvalid"],
            true,
            false,
        ),
        op(
            "transfers.create",
            "transfers",
            "Create and settle a transfer directly, without a separate quote step",
            route("POST", "/v1/transfers"),
            json!({"type": "object", "required": ["from_account", "to_account", "amount", "currency"]}),
            json!({"type": "object", "properties": {"transfer_id": {"type": "string"}, "status": {"type": "string"}}}),
            &["ValidationError", "InsufficientBalance", "AccountNotFound"],
            false,
            true,
        ),
        op(
            "transfers.get",
            "transfers",
            "Fetch a transfer by id",
            route("GET", "/v1/transfers/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"transfer_id": {"type": "string"}}}),
            &["TransferNotFound"],
            false,
            false,
        ),
        op(
            "transfers.cancel",
            "transfers",
            "Cancel a transfer that has not yet reached a terminal state",
            route("POST", "/v1/transfers/{id}/cancel"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"status": {"type": "string"}}}),
            &["TransferNotFound", "TransferNotCancellable"],
            false,
            true,
        ),
        op(
            "refunds.create",
            "refunds",
            "Refund all or part of a completed transfer",
            route("POST", "/v1/refunds"),
            json!({"type": "object", "required": ["original_transfer", "amount", "reason"]}),
            json!({"type": "object", "properties": {"refund_id": {"type": "string"}}}),
            &["OriginalTransferNotFound", "RefundWindowExpired", "RefundAmountExceedsAvailable"],
            false,
            true,
        ),
        op(
            "refunds.get",
            "refunds",
            "Fetch a refund by id",
            route("GET", "/v1/refunds/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"refund_id": {"type": "string"}}}),
            &["RefundNotFound"],
            false,
            false,
        ),
        op(
            "ap2.mandates.create",
            "ap2",
            "Authorize an AP2 mandate an agent can later execute against",
            route("POST", "/v1/ap2/mandates"),
            json!({"type": "object", "required": ["agent_id", "account_id", "currency", "authorized_amount"]}),
            json!({"type": "object", "properties": {"mandate_id": {"type": "string"}}}),
            &["AgentNotFound", "AccountNotFound", "ValidationError"],
            false,
            true,
        ),
        op(
            "ap2.mandates.get",
            "ap2",
            "Fetch a mandate by id",
            route("GET", "/v1/ap2/mandates/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"mandate_id": {"type": "string"}}}),
            &["MandateNotFound"],
            false,
            false,
        ),
        op(
            "ap2.mandates.execute",
            "ap2",
            "Execute a payment against a mandate's remaining authorized spend",
            route("POST", "/v1/ap2/mandates/{id}/execute"),
            json!({"type": "object", "required": ["id", "amount"]}),
            json!({"type": "object", "properties": {"transfer_id": {"type": "string"}, "remaining_amount": {"type": "string"}}}),
            &["MandateNotFound", "Ap2MandateExceeded", "MandateExpired"],
            false,
            true,
        ),
        op(
            "ap2.mandates.cancel",
            "ap2",
            "Cancel an active mandate",
            route("PATCH", "/v1/ap2/mandates/{id}/cancel"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"status": {"type": "string"}}}),
            &["MandateNotFound"],
            false,
            true,
        ),
        op(
            "acp.checkouts.create",
            "acp",
            "Create an ACP checkout pending completion with a shared payment token",
            route("POST", "/v1/acp/checkouts"),
            json!({"type": "object", "required": ["account_id", "amount", "currency"]}),
            json!({"type": "object", "properties": {"checkout_id": {"type": "string"}}}),
            &["AccountNotFound", "ValidationError"],
            false,
            true,
        ),
        op(
            "acp.checkouts.get",
            "acp",
            "Fetch a checkout by id",
            route("GET", "/v1/acp/checkouts/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"checkout_id": {"type": "string"}}}),
            &["CheckoutNotFound"],
            false,
            false,
        ),
        op(
            "acp.checkouts.complete",
            "acp",
            "Complete a pending checkout with its shared payment token, settling the transfer",
            route("POST", "/v1/acp/checkouts/{id}/complete"),
            json!({"type": "object", "required": ["id", "shared_payment_token"]}),
            json!({"type": "object", "properties": {"transfer_id": {"type": "string"}}}),
            &["CheckoutNotFound", "CheckoutExpired", "AcpSharedTokenInvalid"],
            false,
            true,
        ),
        op(
            "acp.checkouts.cancel",
            "acp",
            "Cancel a pending checkout",
            route("PATCH", "/v1/acp/checkouts/{id}/cancel"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"status": {"type": "string"}}}),
            &["CheckoutNotFound"],
            false,
            true,
        ),
        op(
            "agents.create",
            "agents",
            "Create a spending agent under a business account",
            route("POST", "/v1/agents"),
            json!({"type": "object", "required": ["parent_account"]}),
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}}}),
            &["AccountNotFound", "ValidationError"],
            false,
            true,
        ),
        op(
            "agents.get",
            "agents",
            "Fetch an agent by id",
            route("GET", "/v1/agents/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"agent_id": {"type": "string"}}}),
            &["AgentNotFound"],
            false,
            false,
        ),
        op(
            "agents.suspend",
            "agents",
            "Suspend an active agent",
            route("POST", "/v1/agents/{id}/suspend"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"status": {"type": "string"}}}),
            &["AgentNotFound", "AgentSameStateTransition"],
            false,
            true,
        ),
        op(
            "agents.activate",
            "agents",
            "Reactivate a suspended agent",
            route("POST", "/v1/agents/{id}/activate"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"status": {"type": "string"}}}),
            &["AgentNotFound", "AgentSameStateTransition"],
            false,
            true,
        ),
        op(
            "agents.delete",
            "agents",
            "Delete an agent that owns no active managed streams",
            route("DELETE", "/v1/agents/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object"}),
            &["AgentNotFound", "AgentHasActiveStreams"],
            false,
            false,
        ),
        op(
            "x402.facilitator.verify",
            "x402",
            "Verify an x402 payment payload against its requirements without settling it",
            route("POST", "/v1/x402/facilitator/verify"),
            json!({"type": "object", "required": ["payment_payload", "payment_requirements"]}),
            json!({"type": "object", "properties": {"is_valid": {"type": "boolean"}}}),
            &["UnsupportedX402Scheme", "UnsupportedX402Network", "X402PaymentInvalid"],
            false,
            false,
        ),
        op(
            "x402.facilitator.settle",
            "x402",
            "Settle a verified x402 payment, returning a synthetic settlement transaction hash",
            route("POST", "/v1/x402/facilitator/settle"),
            json!({"type": "object", "required": ["payment_payload", "payment_requirements"]}),
            json!({"type": "object", "properties": {"success": {"type": "boolean"}, "transaction": {"type": "string"}}}),
            &["X402PaymentInvalid", "X402SettlementFailed", "FacilitatorUnreachable"],
            false,
            true,
        ),
        op(
            "x402.facilitator.supported",
            "x402",
            "List the scheme/network combinations this facilitator accepts",
            route("GET", "/v1/x402/facilitator/supported"),
            json!({"type": "object"}),
            json!({"type": "object", "properties": {"kinds": {"type": "array"}}}),
            &[],
            false,
            false,
        ),
        op(
            "context.account",
            "context",
            "360-degree account view: balances, 30-day activity, risk assessment, available actions",
            route("GET", "/v1/context/account/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"account": {"type": "object"}, "risk": {"type": "object"}}}),
            &["AccountNotFound"],
            false,
            false,
        ),
        op(
            "context.transfer",
            "context",
            "360-degree transfer view: refund history, refund eligibility, counterparties",
            route("GET", "/v1/context/transfer/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"transfer": {"type": "object"}}}),
            &["TransferNotFound"],
            false,
            false,
        ),
        op(
            "context.agent",
            "context",
            "360-degree agent view: parent account, cumulative mandate spend, available actions",
            route("GET", "/v1/context/agent/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"agent": {"type": "object"}}}),
            &["AgentNotFound"],
            false,
            false,
        ),
        op(
            "context.batch",
            "context",
            "360-degree batch view: per-item status and recommended bulk actions",
            route("GET", "/v1/context/batch/{id}"),
            json!({"type": "object", "required": ["id"]}),
            json!({"type": "object", "properties": {"batch": {"type": "object"}}}),
            &["BatchNotFound"],
            false,
            false,
        ),
        op(
            "capabilities.catalog",
            "capabilities",
            "Machine-readable catalog of every operation this server exposes",
            route("GET", "/v1/capabilities"),
            json!({"type": "object", "properties": {"category": {"type": "string"}, "name": {"type": "string"}}}),
            json!({"type": "object", "properties": {"operations": {"type": "array"}}}),
            &["CapabilityNotFound"],
            false,
            false,
        ),
    ]
});

static SUPPORTED_CURRENCIES: &[&str] = &["USD", "USDC", "BRL", "MXN", "ARS", "COP"];
static SUPPORTED_RAILS: &[&str] = &["internal", "pix", "spei", "cvu", "pse", "wire"];
static WEBHOOK_EVENTS: &[&str] = &[
    "transfer.completed",
    "transfer.failed",
    "transfer.cancelled",
    "refund.created",
    "mandate.executed",
    "mandate.cancelled",
    "mandate.expired",
    "checkout.completed",
    "checkout.cancelled",
    "checkout.expired",
    "agent.suspended",
    "agent.activated",
];

#[derive(Debug, Clone, Serialize)]
pub struct ApiLimits {
    pub max_batch_size: u32,
    pub max_mandate_duration_days: i64,
    pub max_checkout_duration_minutes: i64,
    pub rate_limit_per_minute: u32,
}

const API_LIMITS: ApiLimits = ApiLimits {
    max_batch_size: 1000,
    max_mandate_duration_days: 365,
    max_checkout_duration_minutes: 30,
    rate_limit_per_minute: 600,
};

#[derive(Debug, Clone, Serialize)]
pub struct CapabilitiesCatalog {
    pub operations: Vec<OperationDescriptor>,
    pub supported_currencies: &'static [&'static str],
    pub supported_rails: &'static [&'static str],
    pub api_limits: ApiLimits,
    pub webhook_events: &'static [&'static str],
}

/// Returns the full catalog, optionally filtered by `category` and/or an
/// exact operation `name`.
pub fn catalog(category: Option<&str>, name: Option<&str>) -> CapabilitiesCatalog {
    let operations = OPERATIONS
        .iter()
        .filter(|op| category.map(|c| op.category.eq_ignore_ascii_case(c)).unwrap_or(true))
        .filter(|op| name.map(|n| op.name.eq_ignore_ascii_case(n)).unwrap_or(true))
        .cloned()
        .collect();
    CapabilitiesCatalog {
        operations,
        supported_currencies: SUPPORTED_CURRENCIES,
        supported_rails: SUPPORTED_RAILS,
        api_limits: API_LIMITS,
        webhook_events: WEBHOOK_EVENTS,
    }
}

/// Renders every operation as a `{name, description, parameters}` JSON
/// Schema tool definition, the shape most agent tool-call frameworks expect
///.
pub fn as_agent_tools() -> Value {
    let tools: Vec<Value> = OPERATIONS
        .iter()
        .map(|op| {
            json!({
                "name": op.name,
                "description": op.description,
                "parameters": op.parameters_schema,
            })
        })
        .collect();
    json!({ "tools": tools })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_without_filters_returns_every_operation() {
        let full = catalog(None, None);
        assert_eq!(full.operations.len(), OPERATIONS.len());
    }

    #[test]
    fn catalog_filters_by_category() {
        let ap2_only = catalog(Some("ap2"), None);
        assert!(ap2_only.operations.iter().all(|op| op.category == "ap2"));
        assert!(!ap2_only.operations.is_empty());
    }

    #[test]
    fn catalog_filters_by_name_case_insensitively() {
        let one = catalog(None, Some("Transfers.Create"));
        assert_eq!(one.operations.len(), 1);
        assert_eq!(one.operations[0].name, "transfers.create");
    }

    #[test]
    fn as_agent_tools_carries_one_entry_per_operation() {
        let tools = as_agent_tools();
        assert_eq!(tools["tools"].as_array().unwrap().len(), OPERATIONS.len());
    }
}
