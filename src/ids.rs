//! Id generation helpers.
//!
//! Every entity id is a prefixed UUID (`txn_...`, `sim_...`) so logs and
//! error payloads are self-describing about what kind of resource an id
//! names.

use uuid::Uuid;

fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4().simple())
}

pub fn account_id() -> String {
    new_id("acc")
}

pub fn transfer_id() -> String {
    new_id("txn")
}

pub fn simulation_id() -> String {
    new_id("sim")
}

pub fn batch_id() -> String {
    new_id("batch")
}

pub fn mandate_id() -> String {
    new_id("mandate")
}

pub fn mandate_execution_id() -> String {
    new_id("mexec")
}

pub fn checkout_id() -> String {
    new_id("checkout")
}

pub fn refund_id() -> String {
    new_id("refund")
}

pub fn agent_id() -> String {
    new_id("agent")
}

pub fn request_id() -> String {
    new_id("req")
}

/// Generates a synthetic 32-byte settlement transaction hash, hex-encoded
/// and 0x-prefixed, the way the sandbox facilitator stands in for a real
/// on-chain transaction hash.
pub fn synthetic_tx_hash() -> String {
    let mut bytes = [0u8; 32];
    use rand::RngCore;
    rand::rng().fill_bytes(&mut bytes);
    format!("0x{}", hex::encode(bytes))
}
