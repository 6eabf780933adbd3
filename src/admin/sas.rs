// src/admin/sas.rs
// Shared Access Signature tokens for the administrative REST API.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 60 * 60;

#[derive(Debug, thiserror::Error)]
#[error("Invalid signing key `{key_name}`: {reason}")]
pub struct SasError {
    pub key_name: String,
    pub reason: String,
}

/// `SharedAccessSignature sr=<uri>&sig=<hmac>&se=<expiry>&skn=<key name>`
pub fn generate_sas_token(
    resource_uri: &str,
    key_name: &str,
    key: &str,
    expires_at: DateTime<Utc>,
) -> Result<String, SasError> {
    let resource = urlencoding::encode(resource_uri);
    let expiry = expires_at.timestamp();

    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|e| SasError {
        key_name: key_name.to_string(),
        reason: e.to_string(),
    })?;
    mac.update(format!("{}\n{}", resource, expiry).as_bytes());
    let signature = STANDARD.encode(mac.finalize().into_bytes());

    Ok(format!(
        "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
        resource,
        urlencoding::encode(&signature),
        expiry,
        key_name
    ))
}
