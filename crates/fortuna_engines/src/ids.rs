#![forbid(unsafe_code)]

use rand::rngs::OsRng;
use rand::RngCore;

const SPIN_NONCE_LEN: usize = 8;
const ENTRY_UID_LEN: usize = 12;

fn random_hex(len: usize) -> String {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    let mut out = String::with_capacity(len * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Nonce part of a payment-token id (`spin:<user>:<nonce>`).
pub fn spin_nonce() -> String {
    random_hex(SPIN_NONCE_LEN)
}

/// Unique id for a freshly awarded inventory entry.
pub fn entry_uid() -> String {
    format!("inv_{}", random_hex(ENTRY_UID_LEN))
}
