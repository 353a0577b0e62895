//! Core Rust implementation of PayOS, a multi-rail payment orchestration
//! and settlement platform for Latin American payment rails (Pix, SPEI,
//! CVU, PSE) alongside the x402, AP2, and ACP agentic payment protocols.
//!
//! # Overview
//!
//! PayOS lets a caller preview a payment (`simulate`), inspect the preview
//! before committing (`GET /v1/simulate/{id}`), and materialize it exactly
//! once (`execute`) through an idempotent execution gate. Direct transfers,
//! refunds, AP2 spending mandates, and ACP agent checkouts all share that
//! same simulate → execute shape where the protocol calls for it.
//!
//! # Roles
//!
//! - **Merchant / platform integrator**: simulates and executes transfers,
//!   refunds, and batches against [`simulate`], [`execute`], [`transfer_ops`]
//!   and [`refund_ops`].
//! - **Agent orchestrator**: registers agents and AP2 spending mandates via
//!   [`agent_ops`] and [`ap2`], and drives ACP checkouts via [`acp`].
//! - **x402 payment facilitator caller**: verifies and settles x402 payments
//!   against the sandbox facilitator in [`facilitator`].
//!
//! # Modules
//!
//! - [`config`] — Three-valued (`mock`/`sandbox`/`production`) environment
//!   selection, per-service overrides, and feature flags.
//! - [`money`] — Exact decimal [`money::Money`] and the supported
//!   [`money::Currency`] set.
//! - [`store`] — The [`store::Store`] trait and its in-memory implementation;
//!   entity types live under `store::{account, transfer, simulation, batch,
//!   mandate, checkout, agent, refund}`.
//! - [`simulate`] — The simulation engine: fee/FX/limit computation, rail
//!   selection, and warning generation behind `POST /v1/simulate`.
//! - [`batch`] — Multi-transfer batch processing.
//! - [`execute`] — The execution gate: exactly-once materialization of a
//!   simulation into a settled resource.
//! - [`transfer_ops`] / [`refund_ops`] — Direct transfer and refund
//!   operations that bypass the simulate/execute split.
//! - [`ap2`] — AP2 spending mandate lifecycle.
//! - [`acp`] — ACP agent checkout lifecycle.
//! - [`agent_ops`] — Agent registration and status management.
//! - [`context`] — Read-side aggregators behind `GET /v1/context/*`.
//! - [`cache`] — The context cache backing those aggregators.
//! - [`idempotency`] — `Idempotency-Key` replay store for mutating endpoints.
//! - [`capabilities`] — The machine-readable capability/tool registry.
//! - [`facilitator`] — Sandbox x402 facilitator (verify/settle/supported).
//! - [`handlers`] — Axum HTTP endpoint handlers wiring the above together.
//! - [`envelope`] — The success/error response envelope and request context.
//! - [`error`] — The typed `ApiError`/`ErrorKind` taxonomy and retry guidance.
//! - [`ids`] — Prefixed id generation.
//! - [`telemetry`] — Structured logging setup.
//! - [`sig_down`] — Graceful shutdown on SIGTERM/SIGINT.

pub mod acp;
pub mod agent_ops;
pub mod ap2;
pub mod batch;
pub mod cache;
pub mod capabilities;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod execute;
pub mod facilitator;
pub mod handlers;
pub mod idempotency;
pub mod ids;
pub mod money;
pub mod refund_ops;
pub mod sig_down;
pub mod simulate;
pub mod store;
pub mod telemetry;
pub mod transfer_ops;
