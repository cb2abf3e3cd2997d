//! ACME client contract
//!
//! The reconciliation engine talks to the CA only through [`AcmeClient`].
//! Transport, JWS signing and nonce handling live in the implementation,
//! which is built per issuer by the [`IssuerRegistry`](crate::IssuerRegistry).

use std::fmt;

use async_trait::async_trait;
use base64::prelude::{Engine, BASE64_URL_SAFE_NO_PAD};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors returned by an [`AcmeClient`]
#[derive(Debug, Clone, Error)]
pub enum AcmeError {
    /// Network or HTTP transport failure
    #[error("ACME transport error: {0}")]
    Transport(String),

    /// The server answered with a problem document (RFC 8555 section 6.7)
    #[error("ACME server returned {status} {kind}: {detail}")]
    Problem {
        status: u16,
        kind: String,
        detail: String,
    },

    /// The response could not be decoded
    #[error("invalid ACME response: {0}")]
    InvalidResponse(String),

    /// Failure computing a challenge proof
    #[error("failed to compute challenge proof: {0}")]
    Proof(String),
}

impl AcmeError {
    /// Whether the server reported that the requested resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, AcmeError::Problem { status: 404, .. })
    }
}

/// Challenge type as advertised by the ACME server
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChallengeType {
    Http01,
    Dns01,
    /// Any type this crate has no proof function for (e.g. `tls-alpn-01`)
    Other(String),
}

impl ChallengeType {
    pub fn as_str(&self) -> &str {
        match self {
            ChallengeType::Http01 => "http-01",
            ChallengeType::Dns01 => "dns-01",
            ChallengeType::Other(s) => s,
        }
    }
}

impl From<&str> for ChallengeType {
    fn from(s: &str) -> Self {
        match s {
            "http-01" => ChallengeType::Http01,
            "dns-01" => ChallengeType::Dns01,
            other => ChallengeType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ChallengeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChallengeType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ChallengeType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ChallengeType::from(s.as_str()))
    }
}

/// Order identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Identifier {
    Dns(String),
}

/// Request body for a new order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewOrder {
    pub identifiers: Vec<Identifier>,
}

impl NewOrder {
    /// Create an order template for the given DNS names
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            identifiers: names
                .into_iter()
                .map(|name| Identifier::Dns(name.into()))
                .collect(),
        }
    }
}

/// Server-side view of an order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcmeOrder {
    /// Order URL (from the `Location` header)
    #[serde(default)]
    pub url: String,
    /// Status string exactly as reported by the server
    pub status: String,
    #[serde(rename = "finalize")]
    pub finalize_url: String,
    #[serde(rename = "certificate", default)]
    pub certificate_url: Option<String>,
    /// Authorization URLs, in server order
    #[serde(default)]
    pub authorizations: Vec<String>,
}

/// Server-side view of an authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    #[serde(default)]
    pub url: String,
    pub identifier: AuthorizationIdentifier,
    #[serde(default)]
    pub wildcard: bool,
    /// Offered challenges, in server order
    pub challenges: Vec<AcmeChallenge>,
}

/// Identifier an authorization proves control of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationIdentifier {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
}

/// One challenge option offered within an authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeChallenge {
    #[serde(rename = "type")]
    pub kind: ChallengeType,
    pub url: String,
    pub token: String,
}

/// Narrow ACME client contract consumed by the reconciliation engine
#[async_trait]
pub trait AcmeClient: Send + Sync {
    /// Open a new order for the given identifiers
    async fn create_order(&self, order: &NewOrder) -> Result<AcmeOrder, AcmeError>;

    /// Fetch the current state of an order
    async fn get_order(&self, url: &str) -> Result<AcmeOrder, AcmeError>;

    /// Fetch an authorization
    async fn get_authorization(&self, url: &str) -> Result<Authorization, AcmeError>;

    /// Submit a DER-encoded CSR; returns the DER certificate chain
    async fn finalize_order(&self, finalize_url: &str, csr: &[u8])
        -> Result<Vec<Vec<u8>>, AcmeError>;

    /// Key authorization to serve for an HTTP-01 challenge
    fn http01_challenge_response(&self, token: &str) -> Result<String, AcmeError>;

    /// TXT record value to publish for a DNS-01 challenge
    fn dns01_challenge_record(&self, token: &str) -> Result<String, AcmeError>;
}

/// The response value to use for challenge responses
///
/// Client implementations can build this from the challenge token and the
/// base64url-encoded JWK thumbprint of the account key.
///
/// <https://datatracker.ietf.org/doc/html/rfc8555#section-8.1>
pub struct KeyAuthorization(String);

impl KeyAuthorization {
    pub fn new(token: &str, thumbprint: &str) -> Self {
        Self(format!("{token}.{thumbprint}"))
    }

    /// Get the key authorization value
    ///
    /// This is the HTTP-01 challenge response.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base64url-encoded SHA-256 digest of the key authorization
    ///
    /// This is the DNS-01 TXT record value.
    pub fn dns_value(&self) -> String {
        BASE64_URL_SAFE_NO_PAD.encode(Sha256::digest(self.0.as_bytes()))
    }
}

impl fmt::Debug for KeyAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("KeyAuthorization").finish()
    }
}
