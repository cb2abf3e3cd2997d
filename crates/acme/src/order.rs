//! Order creation and status synchronization
//!
//! Both operations talk to the ACME server and project what it reports onto
//! the Order's status block. Neither persists anything; the controller
//! writes the status back once the whole pass is done.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::client::{AcmeOrder, NewOrder};
use crate::controller::{cancellable, SyncContext};
use crate::error::OrderError;
use crate::resources::{ChallengeSpec, Order, OrderSpec, OrderStatus};
use crate::solver::build_challenge_spec;
use crate::state::State;

/// Identifiers to request for an Order: DNS names plus the common name,
/// deduplicated and sorted
pub fn order_identifiers(spec: &OrderSpec) -> BTreeSet<String> {
    let mut identifiers: BTreeSet<String> = spec.dns_names.iter().cloned().collect();
    if let Some(cn) = spec.common_name.as_deref().filter(|cn| !cn.is_empty()) {
        identifiers.insert(cn.to_string());
    }
    identifiers
}

/// Set the order state, stamping the failure time for failure states
///
/// The failure time is overwritten every time a failure state is set, so an
/// order that keeps being observed as failed keeps a fresh timestamp.
pub fn set_order_state(status: &mut OrderStatus, state: State, now: DateTime<Utc>) {
    status.state = state;
    if status.state.is_failure() {
        status.failure_time = Some(now);
    }
}

/// Project a server-side order onto the status block
///
/// The server's status string is taken as-is; unrecognized values surface
/// later as an unrecognized state when dispatched.
pub fn set_order_status(status: &mut OrderStatus, acme_order: &AcmeOrder, now: DateTime<Utc>) {
    set_order_state(status, State::from(acme_order.status.as_str()), now);
    status.url = acme_order.url.clone();
    status.finalize_url = acme_order.finalize_url.clone();
    status.certificate_url = acme_order.certificate_url.clone().unwrap_or_default();
}

/// Open a new ACME order for an Order that has none yet
///
/// On success the status carries the order URLs, state and the planned
/// challenge list. If an authorization cannot be fetched or turned into a
/// challenge spec, the error is returned and the challenge list stays
/// unset, although the order URL has already been recorded.
pub(crate) async fn create_order(ctx: &SyncContext<'_>, order: &mut Order) -> Result<(), OrderError> {
    if !order.status.url.is_empty() {
        return Err(OrderError::AlreadyCreated {
            order: order.name().to_string(),
        });
    }

    let identifiers = order_identifiers(&order.spec);
    info!(identifiers = ?identifiers, "Creating new ACME order");

    let template = NewOrder::new(identifiers);
    let acme_order = cancellable(ctx.cancel, ctx.client().create_order(&template))
        .await?
        .map_err(OrderError::CreateOrder)?;

    set_order_status(&mut order.status, &acme_order, ctx.clock.now());
    info!(
        url = %order.status.url,
        state = %order.status.state,
        authorizations = acme_order.authorizations.len(),
        "Created ACME order"
    );

    order.status.challenges = derive_challenges(ctx, order, &acme_order.authorizations).await?;
    Ok(())
}

/// Fetch every authorization in order and build its challenge spec
///
/// All or nothing: the first failure aborts the whole list.
pub(crate) async fn derive_challenges(
    ctx: &SyncContext<'_>,
    order: &Order,
    authz_urls: &[String],
) -> Result<Vec<ChallengeSpec>, OrderError> {
    let mut specs = Vec::with_capacity(authz_urls.len());
    for url in authz_urls {
        let mut authz = cancellable(ctx.cancel, ctx.client().get_authorization(url))
            .await?
            .map_err(|source| OrderError::GetAuthorization {
                url: url.clone(),
                source,
            })?;
        if authz.url.is_empty() {
            authz.url = url.clone();
        }

        let spec = build_challenge_spec(
            &order.spec.config,
            &ctx.issuer.capabilities,
            ctx.client(),
            &order.spec.issuer_ref,
            &authz,
        )?;
        debug!(
            domain = %spec.dns_name,
            challenge_type = %spec.kind,
            wildcard = spec.wildcard,
            "Planned challenge for authorization"
        );
        specs.push(spec);
    }
    Ok(specs)
}

/// Refresh the order status from the ACME server
///
/// Returns the fetched order so callers can inspect fields that are not
/// part of the status block (e.g. authorization URLs).
pub(crate) async fn sync_order_status(
    ctx: &SyncContext<'_>,
    order: &mut Order,
) -> Result<AcmeOrder, OrderError> {
    if order.status.url.is_empty() {
        return Err(OrderError::NotYetCreated {
            order: order.name().to_string(),
        });
    }

    let url = order.status.url.clone();
    let mut acme_order = match cancellable(ctx.cancel, ctx.client().get_order(&url)).await? {
        Ok(acme_order) => acme_order,
        Err(e) => {
            // TODO: classify a 404 from the server as a failed order instead
            // of retrying forever
            if e.is_not_found() {
                warn!(url = %url, error = %e, "ACME server does not know this order");
            }
            return Err(OrderError::SyncStatus(e));
        }
    };
    if acme_order.url.is_empty() {
        acme_order.url = url;
    }

    let previous = order.status.state.clone();
    set_order_status(&mut order.status, &acme_order, ctx.clock.now());
    if previous != order.status.state {
        info!(from = %previous, to = %order.status.state, "Order state changed");
    } else {
        debug!(state = %order.status.state, "Order state unchanged");
    }

    Ok(acme_order)
}
