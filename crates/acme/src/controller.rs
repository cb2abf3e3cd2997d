//! Order sync state machine
//!
//! [`OrderController::sync`] is the single entry point the work queue calls
//! for an Order key. Each call works on a private copy of the Order, moves
//! it one step through the ACME flow and writes the status back only if it
//! changed.
//!
//! # State Machine
//!
//! | State                 | Action                                        |
//! |-----------------------|-----------------------------------------------|
//! | no order URL          | create the ACME order and plan challenges     |
//! | valid/invalid/failed/expired | nothing                                |
//! | unknown or unset      | refresh status, then force a retry            |
//! | ready                 | finalize, then refresh status                 |
//! | pending/processing    | ensure Challenges, refresh status when useful |
//! | anything else         | error                                         |

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use sentinel_common::{ResourceKey, SyncId};

use crate::challenges::{reconcile_challenges, DEFAULT_ORDER_NAME_LABEL};
use crate::client::AcmeClient;
use crate::error::{AggregateError, OrderError};
use crate::issuer::{IssuerLookup, IssuerRegistry, ResolvedIssuer};
use crate::order::{create_order, sync_order_status};
use crate::resources::{Challenge, Order, Resource};
use crate::state::State;
use crate::store::ObjectStore;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Run `fut` unless `cancel` fires first
///
/// Cancellation wins ties, so an already-cancelled token never starts work.
pub(crate) async fn cancellable<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, OrderError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OrderError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Everything one sync pass needs besides the Order itself
pub(crate) struct SyncContext<'a> {
    pub(crate) cancel: &'a CancellationToken,
    pub(crate) clock: &'a dyn Clock,
    pub(crate) issuer: &'a ResolvedIssuer,
    pub(crate) challenges: &'a dyn ObjectStore<Challenge>,
    pub(crate) order_name_label: &'a str,
}

impl SyncContext<'_> {
    pub(crate) fn client(&self) -> &dyn AcmeClient {
        self.issuer.client.as_ref()
    }
}

/// Reconciles ACME Orders
///
/// Holds no per-order state, so one controller can serve any number of
/// workers concurrently; the work queue guarantees that a single Order key
/// is never synced by two workers at once.
pub struct OrderController {
    orders: Arc<dyn ObjectStore<Order>>,
    challenges: Arc<dyn ObjectStore<Challenge>>,
    issuers: Arc<dyn IssuerLookup>,
    registry: IssuerRegistry,
    clock: Arc<dyn Clock>,
    order_name_label: String,
}

impl OrderController {
    pub fn new(
        orders: Arc<dyn ObjectStore<Order>>,
        challenges: Arc<dyn ObjectStore<Challenge>>,
        issuers: Arc<dyn IssuerLookup>,
        registry: IssuerRegistry,
    ) -> Self {
        Self {
            orders,
            challenges,
            issuers,
            registry,
            clock: Arc::new(SystemClock),
            order_name_label: DEFAULT_ORDER_NAME_LABEL.to_string(),
        }
    }

    /// Use a different clock for failure timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Use a different label key to tie Challenges to Orders
    pub fn with_order_name_label(mut self, label: impl Into<String>) -> Self {
        self.order_name_label = label.into();
        self
    }

    pub fn order_name_label(&self) -> &str {
        &self.order_name_label
    }

    /// Sync the Order stored under `key`
    ///
    /// A missing Order has been deleted and needs no work.
    pub async fn sync_key(
        &self,
        cancel: &CancellationToken,
        key: &ResourceKey,
    ) -> Result<(), OrderError> {
        match cancellable(cancel, self.orders.get(key)).await?? {
            Some(order) => self.sync(cancel, &order).await,
            None => {
                debug!(order = %key, "Order no longer exists, skipping");
                Ok(())
            }
        }
    }

    /// Move an Order one step through the ACME flow
    ///
    /// `order` is never modified; the resulting status is persisted through
    /// the order store if it differs from the input, even when the pass was
    /// cancelled part way. A persistence failure is returned alongside any
    /// error from the sync step itself.
    pub async fn sync(&self, cancel: &CancellationToken, order: &Order) -> Result<(), OrderError> {
        let span = info_span!(
            "sync_order",
            order = %order.key(),
            sync_id = %SyncId::new(),
            state = %order.status.state,
        );

        async {
            let mut working = order.clone();
            let result = self.sync_order(cancel, &mut working).await;

            if working.status == order.status {
                return result;
            }

            // Not raced against `cancel`: a created remote order must be recorded
            let update = self.orders.update(working).await.map_err(OrderError::from);
            match (result, update) {
                (Ok(()), Ok(_)) => Ok(()),
                (Ok(()), Err(update_err)) => {
                    warn!(error = %update_err, "Failed to persist order status");
                    Err(update_err)
                }
                (Err(err), Ok(_)) => Err(err),
                (Err(err), Err(update_err)) => {
                    warn!(error = %update_err, "Failed to persist order status");
                    Err(OrderError::Aggregate(AggregateError::new(vec![err, update_err])))
                }
            }
        }
        .instrument(span)
        .await
    }

    /// The state machine proper, operating on the private copy
    async fn sync_order(
        &self,
        cancel: &CancellationToken,
        order: &mut Order,
    ) -> Result<(), OrderError> {
        if !order.status.url.is_empty() && order.status.state.is_final() {
            debug!("Order is in a final state, nothing to do");
            return Ok(());
        }

        let issuer = self
            .issuers
            .get_issuer(&order.spec.issuer_ref, order.namespace())?;
        let issuer = self.registry.resolve(issuer)?;
        let ctx = SyncContext {
            cancel,
            clock: self.clock.as_ref(),
            issuer: &issuer,
            challenges: self.challenges.as_ref(),
            order_name_label: &self.order_name_label,
        };

        if order.status.url.is_empty() {
            return create_order(&ctx, order).await;
        }

        match order.status.state.clone() {
            State::Unknown | State::Unset => {
                sync_order_status(&ctx, order).await?;
                Err(OrderError::StateRefreshed)
            }
            State::Ready => finalize(&ctx, order).await,
            State::Pending | State::Processing => reconcile_challenges(&ctx, order).await,
            other => Err(OrderError::UnrecognizedState(other)),
        }
    }
}

/// Submit the CSR for a ready order, then record the server's view
///
/// The status refresh runs whatever the finalize outcome; a refresh error
/// takes precedence over a finalize error.
async fn finalize(ctx: &SyncContext<'_>, order: &mut Order) -> Result<(), OrderError> {
    info!(finalize_url = %order.status.finalize_url, "Finalizing order");
    let finalized = match cancellable(
        ctx.cancel,
        ctx.client()
            .finalize_order(&order.status.finalize_url, &order.spec.csr),
    )
    .await?
    {
        Ok(chain) => {
            debug!(certificates = chain.len(), "Order finalized");
            Ok(())
        }
        Err(e) => {
            warn!(error = %e, "Failed to finalize order");
            Err(OrderError::Finalize(e))
        }
    };

    sync_order_status(ctx, order).await?;
    finalized
}

impl std::fmt::Debug for OrderController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderController")
            .field("registry", &self.registry)
            .field("order_name_label", &self.order_name_label)
            .finish()
    }
}
