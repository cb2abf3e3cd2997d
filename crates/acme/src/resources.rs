//! Persisted resource types
//!
//! An [`Order`] is one certificate issuance attempt. The engine owns its
//! status block. A [`Challenge`] is created per planned challenge spec and
//! progressed by a separate reconciler; the engine only reads its state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentinel_common::{ResourceKey, ResourceUid};

use crate::client::ChallengeType;
use crate::state::State;

/// Metadata shared by all stored resources
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    /// Empty for cluster-scoped resources
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    /// Assigned by the store on create
    #[serde(default)]
    pub uid: ResourceUid,
    /// Bumped by the store on every write; used for optimistic concurrency
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub owner_references: Vec<OwnerReference>,
}

impl ObjectMeta {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(self.namespace.clone(), self.name.clone())
    }
}

/// Link from a dependent resource to the resource that owns it
///
/// The store collaborator uses these to garbage collect dependents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerReference {
    pub kind: String,
    pub name: String,
    pub uid: ResourceUid,
    /// Whether the owner is the managing controller of the dependent
    #[serde(default)]
    pub controller: bool,
}

/// A resource that can be kept in an [`ObjectStore`](crate::ObjectStore)
pub trait Resource: Clone + Send + Sync + 'static {
    const KIND: &'static str;

    fn meta(&self) -> &ObjectMeta;

    fn meta_mut(&mut self) -> &mut ObjectMeta;

    fn key(&self) -> ResourceKey {
        self.meta().key()
    }
}

// =============================================================================
// Issuer references and solver configuration
// =============================================================================

/// Kind of issuer an [`IssuerRef`] points at
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IssuerKind {
    /// Namespaced issuer, resolved in the namespace of the referencing resource
    #[default]
    Issuer,
    /// Cluster-scoped issuer
    ClusterIssuer,
}

/// Reference to the issuer an Order is issued by
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IssuerRef {
    pub name: String,
    #[serde(default)]
    pub kind: IssuerKind,
}

impl IssuerRef {
    pub fn issuer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IssuerKind::Issuer,
        }
    }

    pub fn cluster_issuer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: IssuerKind::ClusterIssuer,
        }
    }
}

/// HTTP-01 solver settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Http01SolverConfig {
    /// Existing ingress to add the challenge path to
    #[serde(default)]
    pub ingress: Option<String>,
    /// Ingress class for a dedicated solver ingress
    #[serde(default)]
    pub ingress_class: Option<String>,
}

/// DNS-01 solver settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dns01SolverConfig {
    /// Name of a DNS provider configured on the issuer
    pub provider: String,
}

/// Which challenge mechanisms may be used for a set of domains
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverConfig {
    #[serde(default)]
    pub http01: Option<Http01SolverConfig>,
    #[serde(default)]
    pub dns01: Option<Dns01SolverConfig>,
}

impl SolverConfig {
    pub fn enables(&self, kind: &ChallengeType) -> bool {
        match kind {
            ChallengeType::Http01 => self.http01.is_some(),
            ChallengeType::Dns01 => self.dns01.is_some(),
            ChallengeType::Other(_) => false,
        }
    }
}

/// Solver configuration for a set of domain patterns
///
/// Wildcard identifiers are matched by their `*.`-prefixed form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainSolverConfig {
    pub domains: Vec<String>,
    #[serde(flatten)]
    pub solver: SolverConfig,
}

// =============================================================================
// Order
// =============================================================================

/// A single certificate issuance attempt against an ACME server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub metadata: ObjectMeta,
    pub spec: OrderSpec,
    #[serde(default)]
    pub status: OrderStatus,
}

/// User supplied order parameters; immutable after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSpec {
    /// DER-encoded certificate signing request
    pub csr: Vec<u8>,
    pub issuer_ref: IssuerRef,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub dns_names: Vec<String>,
    /// Per-domain solver configuration, first match wins
    #[serde(default)]
    pub config: Vec<DomainSolverConfig>,
}

/// Engine-owned order status
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    /// Order URL on the ACME server; empty until the order is created
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub finalize_url: String,
    #[serde(default)]
    pub certificate_url: String,
    #[serde(default)]
    pub state: State,
    /// Planned challenges, one per authorization in server order.
    /// Populated once and never re-derived afterwards.
    #[serde(default)]
    pub challenges: Vec<ChallengeSpec>,
    /// Last time the order was observed in a failure state
    #[serde(default)]
    pub failure_time: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: OrderSpec) -> Self {
        Self {
            metadata: ObjectMeta::new(namespace, name),
            spec,
            status: OrderStatus::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }
}

impl Resource for Order {
    const KIND: &'static str = "Order";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}

// =============================================================================
// Challenge
// =============================================================================

/// A persisted challenge, created lazily from a planned [`ChallengeSpec`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    pub metadata: ObjectMeta,
    pub spec: ChallengeSpec,
    #[serde(default)]
    pub status: ChallengeStatus,
}

/// Everything needed to present and validate one challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeSpec {
    pub authz_url: String,
    #[serde(rename = "type")]
    pub kind: ChallengeType,
    pub url: String,
    pub dns_name: String,
    pub token: String,
    /// Proof value: key authorization (HTTP-01) or TXT record value (DNS-01)
    pub key: String,
    pub config: SolverConfig,
    #[serde(default)]
    pub wildcard: bool,
    pub issuer_ref: IssuerRef,
}

/// Challenge progress, owned by the challenge reconciler
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChallengeStatus {
    #[serde(default)]
    pub state: State,
    #[serde(default)]
    pub reason: String,
}

impl Resource for Challenge {
    const KIND: &'static str = "Challenge";

    fn meta(&self) -> &ObjectMeta {
        &self.metadata
    }

    fn meta_mut(&mut self) -> &mut ObjectMeta {
        &mut self.metadata
    }
}
