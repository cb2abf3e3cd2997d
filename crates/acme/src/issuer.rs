//! Issuer resolution
//!
//! An Order names its issuer through an [`IssuerRef`]. Resolution happens
//! in two steps:
//!
//! 1. [`IssuerLookup`] turns the reference into an [`Issuer`] definition
//! 2. [`IssuerRegistry`] builds the [`AcmeClient`] for that issuer using the
//!    constructor registered for its [`IssuerType`]
//!
//! The registry is an explicit value built at startup and handed to the
//! [`OrderController`](crate::OrderController); there is no global
//! registration.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use sentinel_common::ResourceKey;

use crate::client::{AcmeClient, AcmeError, ChallengeType};
use crate::error::OrderError;
use crate::resources::{IssuerKind, IssuerRef};

/// An issuer definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    pub name: String,
    #[serde(default)]
    pub kind: IssuerKind,
    /// Namespace of a namespaced issuer; ignored for cluster issuers
    #[serde(default)]
    pub namespace: String,
    /// ACME settings; absent for non-ACME issuers
    #[serde(default)]
    pub acme: Option<AcmeIssuer>,
}

impl Issuer {
    /// Catalog key of this issuer
    pub fn key(&self) -> (IssuerKind, ResourceKey) {
        match self.kind {
            IssuerKind::Issuer => (self.kind, ResourceKey::new(&self.namespace, &self.name)),
            IssuerKind::ClusterIssuer => (self.kind, ResourceKey::cluster(&self.name)),
        }
    }

    pub fn issuer_type(&self) -> Option<IssuerType> {
        self.acme.as_ref().map(|_| IssuerType::Acme)
    }
}

/// ACME issuer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeIssuer {
    /// Directory URL of the ACME server
    pub server: String,
    #[serde(default)]
    pub email: String,
    /// Name of the secret holding the account private key
    pub private_key_secret: String,
    #[serde(default)]
    pub skip_tls_verify: bool,
    #[serde(default)]
    pub http01: Option<AcmeHttp01Config>,
    #[serde(default)]
    pub dns01: Option<AcmeDns01Config>,
}

impl AcmeIssuer {
    pub fn capabilities(&self) -> AcmeCapabilities {
        AcmeCapabilities {
            http01: self.http01.is_some(),
            dns01: self.dns01.is_some(),
        }
    }
}

/// HTTP-01 settings of an ACME issuer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeHttp01Config {}

/// DNS-01 settings of an ACME issuer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcmeDns01Config {
    #[serde(default)]
    pub providers: Vec<DnsProviderConfig>,
}

/// A named DNS provider that DNS-01 solver configs refer to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsProviderConfig {
    pub name: String,
    /// Provider backend (e.g. `cloudflare`, `route53`)
    pub provider: String,
}

/// Challenge mechanisms an ACME issuer is configured for
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcmeCapabilities {
    pub http01: bool,
    pub dns01: bool,
}

impl AcmeCapabilities {
    pub fn enables(&self, kind: &ChallengeType) -> bool {
        match kind {
            ChallengeType::Http01 => self.http01,
            ChallengeType::Dns01 => self.dns01,
            ChallengeType::Other(_) => false,
        }
    }
}

/// Issuer backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IssuerType {
    Acme,
}

impl fmt::Display for IssuerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IssuerType::Acme => f.write_str("acme"),
        }
    }
}

/// Resolves issuer references
pub trait IssuerLookup: Send + Sync {
    /// Resolve `issuer_ref` as seen from a resource in `namespace`
    fn get_issuer(&self, issuer_ref: &IssuerRef, namespace: &str) -> Result<Issuer, OrderError>;
}

/// In-memory issuer catalog
#[derive(Debug, Default, Clone)]
pub struct IssuerCatalog {
    issuers: HashMap<(IssuerKind, ResourceKey), Issuer>,
}

impl IssuerCatalog {
    pub fn new(issuers: impl IntoIterator<Item = Issuer>) -> Self {
        Self {
            issuers: issuers.into_iter().map(|i| (i.key(), i)).collect(),
        }
    }

    pub fn insert(&mut self, issuer: Issuer) {
        self.issuers.insert(issuer.key(), issuer);
    }

    pub fn len(&self) -> usize {
        self.issuers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.issuers.is_empty()
    }
}

impl IssuerLookup for IssuerCatalog {
    fn get_issuer(&self, issuer_ref: &IssuerRef, namespace: &str) -> Result<Issuer, OrderError> {
        let key = match issuer_ref.kind {
            IssuerKind::Issuer => ResourceKey::new(namespace, &issuer_ref.name),
            IssuerKind::ClusterIssuer => ResourceKey::cluster(&issuer_ref.name),
        };
        self.issuers
            .get(&(issuer_ref.kind, key.clone()))
            .cloned()
            .ok_or(OrderError::IssuerNotFound {
                kind: issuer_ref.kind,
                key,
            })
    }
}

/// Environment passed to client constructors
#[derive(Debug, Clone)]
pub struct IssuerContext {
    /// Namespace holding secrets of cluster issuers
    pub cluster_resource_namespace: String,
}

impl IssuerContext {
    /// Namespace in which the issuer's secrets are looked up
    pub fn secret_namespace<'a>(&'a self, issuer: &'a Issuer) -> &'a str {
        match issuer.kind {
            IssuerKind::Issuer => &issuer.namespace,
            IssuerKind::ClusterIssuer => &self.cluster_resource_namespace,
        }
    }
}

/// Builds the ACME client for an issuer
pub type ClientConstructor =
    Arc<dyn Fn(&IssuerContext, &Issuer) -> Result<Arc<dyn AcmeClient>, AcmeError> + Send + Sync>;

/// An issuer resolved for one sync pass
pub struct ResolvedIssuer {
    pub issuer: Issuer,
    pub capabilities: AcmeCapabilities,
    pub client: Arc<dyn AcmeClient>,
}

impl fmt::Debug for ResolvedIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedIssuer")
            .field("issuer", &self.issuer.name)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

/// Registry of client constructors keyed by issuer type
#[derive(Clone)]
pub struct IssuerRegistry {
    context: IssuerContext,
    constructors: HashMap<IssuerType, ClientConstructor>,
}

impl IssuerRegistry {
    pub fn new(context: IssuerContext) -> Self {
        Self {
            context,
            constructors: HashMap::new(),
        }
    }

    /// Register the constructor for an issuer type, replacing any previous one
    pub fn register<F>(mut self, issuer_type: IssuerType, constructor: F) -> Self
    where
        F: Fn(&IssuerContext, &Issuer) -> Result<Arc<dyn AcmeClient>, AcmeError>
            + Send
            + Sync
            + 'static,
    {
        self.constructors.insert(issuer_type, Arc::new(constructor));
        self
    }

    pub fn context(&self) -> &IssuerContext {
        &self.context
    }

    /// Build the client and capability set for an ACME issuer
    pub fn resolve(&self, issuer: Issuer) -> Result<ResolvedIssuer, OrderError> {
        let issuer_type = issuer.issuer_type().ok_or_else(|| OrderError::IssuerNotAcme {
            issuer: issuer.name.clone(),
        })?;
        let capabilities = issuer
            .acme
            .as_ref()
            .map(AcmeIssuer::capabilities)
            .unwrap_or_default();

        let constructor = self
            .constructors
            .get(&issuer_type)
            .ok_or(OrderError::IssuerTypeNotRegistered(issuer_type))?;

        debug!(
            issuer = %issuer.name,
            issuer_type = %issuer_type,
            secret_namespace = %self.context.secret_namespace(&issuer),
            "Building ACME client for issuer"
        );
        let client = constructor(&self.context, &issuer).map_err(OrderError::ClientSetup)?;

        Ok(ResolvedIssuer {
            issuer,
            capabilities,
            client,
        })
    }
}

impl fmt::Debug for IssuerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuerRegistry")
            .field("context", &self.context)
            .field("types", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}
