//! JWT Token Handler
//! Mission: Mint and verify access tokens; verification failures collapse to `None`

use crate::auth::models::{Account, Claims};
use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tracing::debug;

/// JWT Handler for access token operations
pub struct JwtHandler {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime_secs: i64,
}

impl JwtHandler {
    /// Create a new JWT handler with secret key and token lifetime
    pub fn new(secret: &str, lifetime_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            lifetime_secs,
        }
    }

    pub fn lifetime_secs(&self) -> i64 {
        self.lifetime_secs
    }

    /// Generate an access token whose subject is the account id
    pub fn generate_token(&self, account: &Account) -> Result<String> {
        let now = Utc::now();
        let lifetime = Duration::try_seconds(self.lifetime_secs)
            .with_context(|| format!("Token lifetime out of range: {}s", self.lifetime_secs))?;
        let expiration = now
            .checked_add_signed(lifetime)
            .context("Token expiry overflows the calendar")?;

        let claims = Claims {
            sub: account.id.to_string(),
            kind: account.kind,
            iat: now.timestamp(),
            exp: expiration.timestamp(),
        };

        debug!(
            account_id = %account.id,
            kind = account.kind.as_str(),
            lifetime_secs = self.lifetime_secs,
            "Generating access token"
        );

        encode(&Header::default(), &claims, &self.encoding_key)
            .context("Failed to generate JWT")
    }

    /// Verify signature and expiry. Any failure yields `None`.
    pub fn decode_access_token(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::default();
        validation.leeway = 0;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }

    /// Verify the signature only, so an expired token still reveals its subject.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Option<Claims> {
        let mut validation = Validation::default();
        validation.validate_exp = false;

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .ok()
    }
}
