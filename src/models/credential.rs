// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Stored OAuth credential (one document per provider).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Encrypted OAuth token pair for one provider.
///
/// Writes always replace the whole document.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Provider name (also used as document ID)
    pub provider: String,
    /// AES-GCM sealed access token (nonce || ciphertext || tag)
    #[serde(with = "base64_bytes")]
    pub access_token_encrypted: Vec<u8>,
    /// AES-GCM sealed refresh token
    #[serde(with = "base64_bytes")]
    pub refresh_token_encrypted: Vec<u8>,
    pub token_type: String,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
    /// Granted OAuth scopes
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Provider-specific fields from the token response (e.g. user_id)
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("access_token_encrypted", &"[REDACTED]")
            .field("refresh_token_encrypted", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Serde helper storing byte vectors as standard base64 strings.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s).map_err(serde::de::Error::custom)
    }
}
