use anyhow::anyhow;
use hmac::{Hmac, Mac};
use relay_domain::{Server, SignatureScheme};
use sha2::{Digest, Sha256};

use crate::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Hex digest a server with `scheme` and `secret` is expected to send for
/// `delivery_id`.
pub fn sign_delivery(
    scheme: SignatureScheme,
    secret: &str,
    delivery_id: &str,
) -> Result<String, AppError> {
    let digest = match scheme {
        SignatureScheme::HmacSha256 => {
            let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
                .map_err(|err| AppError::Internal(anyhow!("hmac init failed: {err}")))?;
            mac.update(delivery_id.as_bytes());
            mac.finalize().into_bytes().to_vec()
        }
        SignatureScheme::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(delivery_id.as_bytes());
            hasher.update(secret.as_bytes());
            hasher.finalize().to_vec()
        }
    };
    Ok(hex::encode(digest))
}

pub fn verify_delivery(
    server: &Server,
    delivery_id: &str,
    signature: &str,
) -> Result<bool, AppError> {
    let expected = sign_delivery(server.signature, &server.secret, delivery_id)?;
    let presented = signature.trim().to_ascii_lowercase();
    Ok(constant_time_eq(expected.as_bytes(), presented.as_bytes()))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}
