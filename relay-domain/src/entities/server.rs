// Server entity
// A webhook source registered under a routing name with its shared secret

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignatureScheme {
    /// HMAC-SHA256 keyed by the secret over the delivery id.
    #[default]
    HmacSha256,
    /// SHA-256 over the delivery id followed by the secret.
    Sha256,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub secret: String,
    #[serde(default)]
    pub signature: SignatureScheme,
}

impl Server {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            signature: SignatureScheme::default(),
        }
    }

    pub fn with_scheme(mut self, scheme: SignatureScheme) -> Self {
        self.signature = scheme;
        self
    }
}
