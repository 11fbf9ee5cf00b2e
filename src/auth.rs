use crate::error::{KucoinError, Result};
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Gets the current UTC timestamp in milliseconds since the Unix epoch.
pub fn get_timestamp_ms() -> Result<u64> {
    let now = Utc::now();
    Ok(now.timestamp_millis() as u64)
}

/// Generates a KuCoin API signature for a given message string.
///
/// KuCoin signs the concatenation `timestamp + method + path + body` with
/// HMAC-SHA256 keyed by the API secret, then Base64-encodes the digest.
///
/// # Arguments
///
/// * `api_secret`: The API secret issued with the key pair.
/// * `message`: The message string to sign (typically timestamp + method + path + body).
///
/// # Returns
///
/// A Base64 encoded signature string.
pub fn generate_signature(api_secret: &str, message: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(api_secret.as_bytes()).map_err(|e| {
        KucoinError::AuthenticationError(format!("Failed to initialize HMAC: {}", e))
    })?;
    mac.update(message.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(base64::engine::general_purpose::STANDARD.encode(digest))
}

/// Signs the API passphrase itself, as required by KC-API-KEY-VERSION 2.
///
/// Version 2 keys transmit `KC-API-PASSPHRASE` as the HMAC-SHA256 signature
/// of the plaintext passphrase rather than the plaintext itself.
pub fn sign_passphrase(api_secret: &str, api_passphrase: &str) -> Result<String> {
    generate_signature(api_secret, api_passphrase)
}
