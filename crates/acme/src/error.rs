//! Order reconciliation error types

use std::fmt;

use thiserror::Error;

use sentinel_common::ResourceKey;

use crate::client::{AcmeError, ChallengeType};
use crate::issuer::IssuerType;
use crate::resources::IssuerKind;
use crate::state::State;
use crate::store::StoreError;

/// Errors that can occur while reconciling an Order
///
/// None of these are fatal to the process. Every error is returned so the
/// scheduler re-queues the Order with backoff; configuration errors (see
/// [`OrderError::is_configuration`]) will keep recurring until the Order or
/// its Issuer is edited.
#[derive(Debug, Error)]
pub enum OrderError {
    /// No solver configuration covers the authorization's domain
    #[error("solver configuration for domain {domain:?} not found; configure a challenge mechanism for it in the order's solver config")]
    ConfigurationNotFound { domain: String },

    /// None of the offered challenges is enabled by both solver and issuer
    #[error("ACME server does not allow selected challenge type or no provider is configured for domain {domain:?}")]
    NoAcceptableChallenge { domain: String },

    #[error("unsupported challenge type {0}")]
    UnsupportedChallengeType(ChallengeType),

    #[error("issuer {kind:?} {key} not found")]
    IssuerNotFound { kind: IssuerKind, key: ResourceKey },

    #[error("issuer {issuer:?} is not configured as an ACME issuer and cannot be used for ACME orders")]
    IssuerNotAcme { issuer: String },

    #[error("no client constructor registered for issuer type {0}")]
    IssuerTypeNotRegistered(IssuerType),

    #[error("failed to set up ACME client: {0}")]
    ClientSetup(#[source] AcmeError),

    /// Re-entry guard: one Order resource maps to exactly one ACME order
    #[error("refusing to recreate a new order for Order {order:?}; create a new Order resource to initiate a new order")]
    AlreadyCreated { order: String },

    #[error("order URL is blank for Order {order:?}; the order has not been created yet")]
    NotYetCreated { order: String },

    #[error("unknown order state \"{0}\"")]
    UnrecognizedState(State),

    /// The order state was refreshed from `unknown`; the new state must be
    /// dispatched on a fresh pass
    #[error("updated unknown order state; retrying processing after applying back-off")]
    StateRefreshed,

    #[error("error creating new order: {0}")]
    CreateOrder(#[source] AcmeError),

    #[error("error fetching authorization {url}: {source}")]
    GetAuthorization {
        url: String,
        #[source]
        source: AcmeError,
    },

    #[error("error computing challenge proof for domain {domain:?}: {source}")]
    ChallengeProof {
        domain: String,
        #[source]
        source: AcmeError,
    },

    #[error("error fetching order status: {0}")]
    SyncStatus(#[source] AcmeError),

    #[error("error finalizing order: {0}")]
    Finalize(#[source] AcmeError),

    #[error("error ensuring Challenge resources for Order: {0}")]
    EnsureChallenges(AggregateError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Aggregate(AggregateError),
}

impl OrderError {
    /// Durable misconfiguration: retrying yields the same error until the
    /// user edits the Order or Issuer
    pub fn is_configuration(&self) -> bool {
        match self {
            OrderError::ConfigurationNotFound { .. }
            | OrderError::NoAcceptableChallenge { .. }
            | OrderError::UnsupportedChallengeType(_)
            | OrderError::IssuerNotFound { .. }
            | OrderError::IssuerNotAcme { .. }
            | OrderError::IssuerTypeNotRegistered(_) => true,
            OrderError::Aggregate(agg) | OrderError::EnsureChallenges(agg) => {
                agg.errors().iter().all(OrderError::is_configuration)
            }
            _ => false,
        }
    }

    /// Whether re-queueing with backoff can make progress without user action
    pub fn is_retryable(&self) -> bool {
        match self {
            OrderError::Store(_) => true,
            OrderError::Aggregate(agg) | OrderError::EnsureChallenges(agg) => {
                agg.errors().iter().any(OrderError::is_retryable)
            }
            other => !other.is_configuration(),
        }
    }

    /// Combine errors into one, flattening the trivial cases
    ///
    /// Returns `None` for an empty list and the error itself for a single one.
    pub fn aggregate(mut errors: Vec<OrderError>) -> Option<OrderError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(OrderError::Aggregate(AggregateError(errors))),
        }
    }
}

/// Several independent errors reported together
#[derive(Debug)]
pub struct AggregateError(Vec<OrderError>);

impl AggregateError {
    pub fn new(errors: Vec<OrderError>) -> Self {
        Self(errors)
    }

    pub fn errors(&self) -> &[OrderError] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.0.as_slice() {
            return write!(f, "{only}");
        }
        f.write_str("[")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{err}")?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for AggregateError {}
