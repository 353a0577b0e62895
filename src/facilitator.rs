//! Sandbox x402 facilitator.
//!
//! Stands in for a real on-chain facilitator behind the same interface a
//! production facilitator would implement, so production code paths never
//! need to branch on environment. `verify` checks
//! structural/scheme/network acceptance only; it never touches a signature.
//! `settle` mints a synthetic transaction hash and can be configured with an
//! artificial delay and failure rate for protocol-conformance testing.

use crate::error::{ApiError, ErrorKind};
use crate::ids;
use crate::money::Money;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scheme {
    ExactEvm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Network {
    #[serde(rename = "base")]
    BaseMainnet,
    #[serde(rename = "base-sepolia")]
    BaseSepolia,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SupportedKind {
    pub scheme: Scheme,
    pub network: Network,
}

/// Default accepted kinds: `exact-evm` on Base mainnet/Sepolia.
const SUPPORTED: &[SupportedKind] = &[
    SupportedKind {
        scheme: Scheme::ExactEvm,
        network: Network::BaseMainnet,
    },
    SupportedKind {
        scheme: Scheme::ExactEvm,
        network: Network::BaseSepolia,
    },
];

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentPayload {
    pub scheme: Scheme,
    pub network: Network,
    pub payer: String,
    pub payee: String,
    pub amount: Money,
    /// Accepted but never inspected — the sandbox does not verify signatures.
    #[serde(default)]
    pub signature: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyResponse {
    pub is_valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invalid_reason: Option<String>,
    pub payer: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SettleResponse {
    pub success: bool,
    pub transaction: String,
    pub network: Network,
}

/// Per-environment sandbox knobs: an optional settlement delay and a
/// random failure rate, both for protocol-conformance testing.
#[derive(Debug, Clone, Copy)]
pub struct FacilitatorConfig {
    pub settlement_delay_ms: u64,
    pub failure_rate: f64,
}

impl Default for FacilitatorConfig {
    fn default() -> Self {
        Self {
            settlement_delay_ms: 0,
            failure_rate: 0.0,
        }
    }
}

pub struct SandboxFacilitator {
    config: FacilitatorConfig,
}

impl SandboxFacilitator {
    pub fn new(config: FacilitatorConfig) -> Self {
        Self { config }
    }

    fn is_supported(scheme: Scheme, network: Network) -> bool {
        SUPPORTED.iter().any(|k| k.scheme == scheme && k.network == network)
    }

    /// Validates structure and accepted scheme+network. Never inspects
    /// `payment.signature`.
    pub fn verify(&self, payment: &PaymentPayload) -> Result<VerifyResponse, ApiError> {
        if !Self::is_supported(payment.scheme, payment.network) {
            return Err(ApiError::new(ErrorKind::UnsupportedX402Network, "scheme/network combination not accepted by this facilitator")
                .with_details(json!({"scheme": payment.scheme, "network": payment.network})));
        }
        if payment.amount.is_zero() || payment.amount.is_negative() {
            return Ok(VerifyResponse {
                is_valid: false,
                invalid_reason: Some("amount must be positive".to_string()),
                payer: payment.payer.clone(),
            });
        }
        if payment.payer.is_empty() || payment.payee.is_empty() {
            return Ok(VerifyResponse {
                is_valid: false,
                invalid_reason: Some("payer and payee must both be present".to_string()),
                payer: payment.payer.clone(),
            });
        }
        Ok(VerifyResponse {
            is_valid: true,
            invalid_reason: None,
            payer: payment.payer.clone(),
        })
    }

    /// Settles a previously-verified payment, generating a synthetic 32-byte
    /// hex transaction hash rather than broadcasting anything on-chain.
    pub async fn settle(&self, payment: &PaymentPayload) -> Result<SettleResponse, ApiError> {
        if !Self::is_supported(payment.scheme, payment.network) {
            return Err(ApiError::new(ErrorKind::UnsupportedX402Network, "scheme/network combination not accepted by this facilitator"));
        }
        if self.config.settlement_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.settlement_delay_ms)).await;
        }
        if self.config.failure_rate > 0.0 && rand::rng().random::<f64>() < self.config.failure_rate {
            return Err(ApiError::new(ErrorKind::X402SettlementFailed, "synthetic settlement failure (sandbox failure_rate)"));
        }
        Ok(SettleResponse {
            success: true,
            transaction: ids::synthetic_tx_hash(),
            network: payment.network,
        })
    }

    pub fn supported(&self) -> Value {
        json!({
            "kinds": SUPPORTED
                .iter()
                .map(|k| json!({"scheme": k.scheme, "network": k.network}))
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn payment(scheme: Scheme, network: Network, amount: Money) -> PaymentPayload {
        PaymentPayload {
            scheme,
            network,
            payer: "0xpayer".to_string(),
            payee: "0xpayee".to_string(),
            amount,
            signature: None,
        }
    }

    #[test]
    fn verify_accepts_a_supported_kind() {
        let facilitator = SandboxFacilitator::new(FacilitatorConfig::default());
        let result = facilitator
            .verify(&payment(Scheme::ExactEvm, Network::BaseSepolia, Money::new(dec!(10))))
            .unwrap();
        assert!(result.is_valid);
    }

    #[test]
    fn verify_never_inspects_signature() {
        let facilitator = SandboxFacilitator::new(FacilitatorConfig::default());
        let mut p = payment(Scheme::ExactEvm, Network::BaseMainnet, Money::new(dec!(1)));
        p.signature = Some("not-even-hex".to_string());
        assert!(facilitator.verify(&p).unwrap().is_valid);
    }

    #[test]
    fn verify_rejects_nonpositive_amount() {
        let facilitator = SandboxFacilitator::new(FacilitatorConfig::default());
        let result = facilitator
            .verify(&payment(Scheme::ExactEvm, Network::BaseMainnet, Money::ZERO))
            .unwrap();
        assert!(!result.is_valid);
    }

    #[tokio::test]
    async fn settle_produces_a_32_byte_hex_transaction() {
        let facilitator = SandboxFacilitator::new(FacilitatorConfig::default());
        let result = facilitator
            .settle(&payment(Scheme::ExactEvm, Network::BaseMainnet, Money::new(dec!(5))))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.transaction.starts_with("0x"));
        assert_eq!(result.transaction.len(), 66);
    }

    #[tokio::test]
    async fn settle_with_failure_rate_one_always_fails() {
        let facilitator = SandboxFacilitator::new(FacilitatorConfig {
            settlement_delay_ms: 0,
            failure_rate: 1.0,
        });
        let err = facilitator
            .settle(&payment(Scheme::ExactEvm, Network::BaseMainnet, Money::new(dec!(5))))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::X402SettlementFailed);
    }

    #[test]
    fn supported_lists_the_default_kinds() {
        let facilitator = SandboxFacilitator::new(FacilitatorConfig::default());
        let kinds = facilitator.supported();
        assert_eq!(kinds["kinds"].as_array().unwrap().len(), 2);
    }
}
