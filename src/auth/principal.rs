use crate::auth::error::{AuthError, AuthResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of hash bytes kept in a principal
pub const PRINCIPAL_LEN: usize = 16;

/// Public identifier of a client, derived from its bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Principal([u8; PRINCIPAL_LEN]);

impl Principal {
    pub fn from_token(token: &[u8; 32]) -> Self {
        let hash = blake3::hash(token);
        let mut bytes = [0u8; PRINCIPAL_LEN];
        bytes.copy_from_slice(&hash.as_bytes()[..PRINCIPAL_LEN]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; PRINCIPAL_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PRINCIPAL_LEN] {
        &self.0
    }

    /// Lowercase hex in groups of four, e.g. `1a2b-3c4d-...`
    pub fn to_text(&self) -> String {
        let hex = hex::encode(self.0);
        hex.as_bytes()
            .chunks(4)
            .map(|group| std::str::from_utf8(group).unwrap_or_default())
            .collect::<Vec<_>>()
            .join("-")
    }

    /// Parse the text form. Dashes are optional, case is ignored.
    pub fn from_text(text: &str) -> AuthResult<Self> {
        let compact: String = text
            .trim()
            .chars()
            .filter(|c| *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();

        if compact.len() != PRINCIPAL_LEN * 2 {
            return Err(AuthError::InvalidPrincipal(format!(
                "expected {} hex digits, got {} in {text:?}",
                PRINCIPAL_LEN * 2,
                compact.len()
            )));
        }

        let decoded = hex::decode(&compact)
            .map_err(|e| AuthError::InvalidPrincipal(format!("{text:?}: {e}")))?;
        let mut bytes = [0u8; PRINCIPAL_LEN];
        bytes.copy_from_slice(&decoded);
        Ok(Self(bytes))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

impl FromStr for Principal {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_text(s)
    }
}
