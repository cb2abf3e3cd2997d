//! Sentinel ACME Order Engine
//!
//! Reconciles ACME certificate Orders. Each call to
//! [`OrderController::sync`] advances one Order a single step through the
//! ACME flow:
//!
//! - **Creation**: open the order on the ACME server and plan one challenge
//!   per authorization
//! - **Challenges**: ensure a Challenge resource exists for every planned
//!   challenge and poll the order once they settle
//! - **Finalization**: submit the CSR once the order is ready
//!
//! Progress is recorded only in the Order's status block, so a crash at any
//! point is recovered by the next sync.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use sentinel_acme::{ControllerConfig, IssuerRegistry, IssuerType, MemoryStore, OrderController};
//! use tokio_util::sync::CancellationToken;
//!
//! let config = ControllerConfig::from_file("acme.toml")?;
//! let registry = IssuerRegistry::new(config.issuer_context())
//!     .register(IssuerType::Acme, |ctx, issuer| build_client(ctx, issuer));
//!
//! let controller = OrderController::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(config.issuer_catalog()),
//!     registry,
//! )
//! .with_order_name_label(&config.order_name_label);
//!
//! controller.sync_key(&CancellationToken::new(), &key).await?;
//! ```

// ============================================================================
// Module Declarations
// ============================================================================

pub mod challenges;
pub mod client;
pub mod config;
pub mod controller;
pub mod error;
pub mod issuer;
pub mod order;
pub mod resources;
pub mod solver;
pub mod state;
pub mod store;

// ============================================================================
// Public API Re-exports
// ============================================================================

// Controller
pub use controller::{Clock, OrderController, SystemClock};

// Errors
pub use error::{AggregateError, OrderError};

// ACME client contract
pub use client::{
    AcmeChallenge, AcmeClient, AcmeError, AcmeOrder, Authorization, AuthorizationIdentifier,
    ChallengeType, Identifier, KeyAuthorization, NewOrder,
};

// Resources
pub use resources::{
    Challenge, ChallengeSpec, ChallengeStatus, Dns01SolverConfig, DomainSolverConfig,
    Http01SolverConfig, IssuerKind, IssuerRef, ObjectMeta, Order, OrderSpec, OrderStatus,
    OwnerReference, Resource, SolverConfig,
};
pub use state::State;

// Storage
pub use store::{LabelSelector, MemoryStore, ObjectStore, StoreError};

// Issuers
pub use issuer::{
    AcmeCapabilities, AcmeDns01Config, AcmeHttp01Config, AcmeIssuer, ClientConstructor,
    DnsProviderConfig, Issuer, IssuerCatalog, IssuerContext, IssuerLookup, IssuerRegistry,
    IssuerType, ResolvedIssuer,
};

// Configuration
pub use config::{ConfigError, ControllerConfig};

// Helpers
pub use challenges::{
    build_challenge, challenge_name, challenge_selector_for_order, should_recheck_order,
    specs_to_create, DEFAULT_ORDER_NAME_LABEL,
};
pub use order::{order_identifiers, set_order_state, set_order_status};
pub use solver::{build_challenge_spec, select_challenge, solver_config_for_authorization};
