//! SIP Digest Authentication (RFC 2617, RFC 3261, RFC 8760)

use super::message::SipError;
use crate::domain::event::Credentials;
use crate::domain::store::AuthorizeRow;
use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Nonces older than this are rejected
pub const NONCE_LIFETIME: Duration = Duration::from_secs(300);

/// Hash used for digest computations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    Sha256,
    Sha512,
}

impl DigestAlgorithm {
    /// Accepts the configuration spellings as well as the header tokens
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "md5" => Some(DigestAlgorithm::Md5),
            "sha2" | "sha256" | "sha-256" => Some(DigestAlgorithm::Sha256),
            "sha512" | "sha-512" => Some(DigestAlgorithm::Sha512),
            _ => None,
        }
    }

    /// Token used in WWW-Authenticate headers
    pub fn as_str(&self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Sha256 => "SHA-256",
            DigestAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Lowercase hex digest of `input`
    pub fn hash(&self, input: &str) -> String {
        match self {
            DigestAlgorithm::Md5 => format!("{:x}", md5::compute(input)),
            DigestAlgorithm::Sha256 => hex::encode(Sha256::digest(input.as_bytes())),
            DigestAlgorithm::Sha512 => hex::encode(Sha512::digest(input.as_bytes())),
        }
    }

    /// HA1 = H(user:realm:secret)
    pub fn compute(&self, user: &str, realm: &str, secret: &str) -> String {
        self.hash(&format!("{}:{}:{}", user, realm, secret))
    }
}

impl fmt::Display for DigestAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authentication challenge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub nonce: String,
    pub algorithm: DigestAlgorithm,
    /// The previous nonce was valid but has expired
    pub stale: bool,
}

impl AuthChallenge {
    pub fn new(realm: &str, algorithm: DigestAlgorithm) -> Self {
        Self {
            realm: realm.to_string(),
            nonce: Self::generate_nonce(),
            algorithm,
            stale: false,
        }
    }

    fn generate_nonce() -> String {
        let mut rng = rand::thread_rng();
        let random_bytes: Vec<u8> = (0..16).map(|_| rng.gen()).collect();
        hex::encode(random_bytes)
    }

    /// Format as WWW-Authenticate header value
    pub fn to_header_value(&self) -> String {
        let mut value = format!(
            r#"Digest realm="{}", nonce="{}", algorithm={}"#,
            self.realm, self.nonce, self.algorithm
        );
        if self.stale {
            value.push_str(", stale=true");
        }
        value
    }
}

/// SIP authenticator trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SipAuthenticator: Send + Sync {
    /// Generate an authentication challenge for `realm`
    async fn create_challenge(&self, realm: &str) -> AuthChallenge;

    /// Check request credentials against the stored credential row
    async fn verify(
        &self,
        credentials: &Credentials,
        method: &str,
        row: &AuthorizeRow,
        realm: &str,
    ) -> Result<(), SipError>;
}

/// Digest authentication manager
pub struct DigestAuth {
    algorithm: DigestAlgorithm,
    active_nonces: RwLock<HashMap<String, Instant>>,
}

impl DigestAuth {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            active_nonces: RwLock::new(HashMap::new()),
        }
    }

    pub fn algorithm(&self) -> DigestAlgorithm {
        self.algorithm
    }

    /// New challenge whose nonce is remembered for verification
    pub async fn issue(&self, realm: &str) -> AuthChallenge {
        let challenge = AuthChallenge::new(realm, self.algorithm);
        let mut nonces = self.active_nonces.write().await;
        nonces.insert(challenge.nonce.clone(), Instant::now());
        debug!("Created auth challenge with nonce: {}", challenge.nonce);
        challenge
    }

    /// Expected digest response for a request
    pub fn calculate_response(
        algorithm: DigestAlgorithm,
        username: &str,
        secret: &str,
        realm: &str,
        nonce: &str,
        method: &str,
        uri: &str,
    ) -> String {
        let ha1 = algorithm.compute(username, realm, secret);
        let ha2 = algorithm.hash(&format!("{}:{}", method, uri));
        algorithm.hash(&format!("{}:{}:{}", ha1, nonce, ha2))
    }

    async fn check_nonce(&self, nonce: &str) -> Result<(), SipError> {
        let nonces = self.active_nonces.read().await;
        let issued = nonces
            .get(nonce)
            .ok_or_else(|| SipError::Authentication("Invalid or expired nonce".to_string()))?;

        if issued.elapsed() > NONCE_LIFETIME {
            return Err(SipError::StaleNonce);
        }
        Ok(())
    }

    /// Clean up old nonces
    pub async fn cleanup_nonces(&self) -> usize {
        let mut nonces = self.active_nonces.write().await;
        let before = nonces.len();
        nonces.retain(|_, issued| issued.elapsed() <= NONCE_LIFETIME);
        before - nonces.len()
    }
}

impl Default for DigestAuth {
    fn default() -> Self {
        Self::new(DigestAlgorithm::default())
    }
}

#[async_trait]
impl SipAuthenticator for DigestAuth {
    async fn create_challenge(&self, realm: &str) -> AuthChallenge {
        self.issue(realm).await
    }

    async fn verify(
        &self,
        credentials: &Credentials,
        method: &str,
        row: &AuthorizeRow,
        realm: &str,
    ) -> Result<(), SipError> {
        let nonce = credentials
            .nonce
            .as_deref()
            .ok_or_else(|| SipError::Authentication("Missing nonce".to_string()))?;
        self.check_nonce(nonce).await?;

        if let Some(theirs) = credentials.realm.as_deref() {
            if theirs != realm {
                warn!("Realm mismatch: expected {}, got {}", realm, theirs);
                return Err(SipError::Authentication("Realm mismatch".to_string()));
            }
        }

        let uri = credentials
            .uri
            .as_deref()
            .ok_or_else(|| SipError::Authentication("Missing digest uri".to_string()))?;

        // the stored secret decides the algorithm; the client may only repeat it
        let algorithm = DigestAlgorithm::parse(&row.digest).unwrap_or(self.algorithm);
        if let Some(theirs) = credentials.algorithm.as_deref() {
            if DigestAlgorithm::parse(theirs) != Some(algorithm) {
                warn!(
                    "Algorithm mismatch for user {}: expected {}, got {}",
                    credentials.userid, algorithm, theirs
                );
                return Err(SipError::Authentication("Algorithm mismatch".to_string()));
            }
        }

        let expected = Self::calculate_response(
            algorithm,
            &credentials.userid,
            &row.secret,
            realm,
            nonce,
            method,
            uri,
        );

        if !credentials.digest.eq_ignore_ascii_case(&expected) {
            warn!(
                "Authentication failed for user {}: response mismatch",
                credentials.userid
            );
            return Err(SipError::Authentication("Invalid credentials".to_string()));
        }

        info!("Authentication successful for user: {}", credentials.userid);
        Ok(())
    }
}
