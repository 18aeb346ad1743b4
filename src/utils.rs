//! Utility functions for identifiers and password digests

use bech32::Bech32m;
use uuid7::uuid7;

// construct a unique id then encode using bech32, e.g. `product_1...`
pub fn new_uuid_to_bech32(hrp: &str) -> anyhow::Result<String> {
    let hrp = bech32::Hrp::parse(hrp)?;
    let encode = bech32::encode::<Bech32m>(hrp, uuid7().as_bytes())?;
    Ok(encode)
}

/// Fresh random salt for a password digest.
pub fn new_salt() -> String {
    uuid7().to_string()
}

/// Salted SHA-256 digest of a password. Only the digest and salt are persisted.
pub fn digest_password(salt: &str, password: &str) -> String {
    sha256::digest(format!("{salt}:{password}"))
}
