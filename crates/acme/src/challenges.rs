//! Challenge fan-out for pending and processing Orders
//!
//! Ensures a Challenge resource exists for the planned challenge specs,
//! then decides from the Challenges' states whether it is worth asking the
//! ACME server for a fresh order status.

use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::controller::{cancellable, SyncContext};
use crate::error::{AggregateError, OrderError};
use crate::order::{derive_challenges, sync_order_status};
use crate::resources::{Challenge, ChallengeSpec, ObjectMeta, Order, OwnerReference, Resource};
use crate::state::State;
use crate::store::LabelSelector;

/// Default label key tying a Challenge to its Order
pub const DEFAULT_ORDER_NAME_LABEL: &str = "acme.sentinel.dev/order-name";

/// Labels put on every Challenge created for `order`
pub fn challenge_labels_for_order(label_key: &str, order: &Order) -> BTreeMap<String, String> {
    BTreeMap::from([(label_key.to_string(), order.name().to_string())])
}

/// Selector matching every Challenge created for `order`
pub fn challenge_selector_for_order(label_key: &str, order: &Order) -> LabelSelector {
    LabelSelector::new().with(label_key, order.name())
}

/// Name of the Challenge for the planned spec at `index`
pub fn challenge_name(order: &Order, index: usize) -> String {
    format!("{}-{}", order.name(), index)
}

/// Planned specs that still need a Challenge resource, with their index
///
/// Specs are matched to existing Challenges by domain name. The walk stops
/// at the first planned spec that already has a Challenge: later specs are
/// left for a future pass even if they are missing.
pub fn specs_to_create<'a>(
    planned: &'a [ChallengeSpec],
    existing: &[Challenge],
) -> Vec<(usize, &'a ChallengeSpec)> {
    planned
        .iter()
        .enumerate()
        .take_while(|(_, spec)| !existing.iter().any(|ch| ch.spec.dns_name == spec.dns_name))
        .collect()
}

/// Build the Challenge resource for a planned spec
pub fn build_challenge(label_key: &str, index: usize, order: &Order, spec: &ChallengeSpec) -> Challenge {
    Challenge {
        metadata: ObjectMeta {
            namespace: order.namespace().to_string(),
            name: challenge_name(order, index),
            labels: challenge_labels_for_order(label_key, order),
            owner_references: vec![OwnerReference {
                kind: Order::KIND.to_string(),
                name: order.name().to_string(),
                uid: order.metadata.uid.clone(),
                controller: true,
            }],
            ..Default::default()
        },
        spec: spec.clone(),
        status: Default::default(),
    }
}

/// Whether the Challenges' states warrant re-polling the ACME order
///
/// Any failed or expired Challenge forces a poll so the server's verdict is
/// recorded. Otherwise a poll happens only once no Challenge is still
/// pending or processing.
pub fn should_recheck_order(challenges: &[Challenge]) -> bool {
    let mut any_active = false;
    let mut any_failed = false;
    for ch in challenges {
        match ch.status.state {
            State::Pending | State::Processing => any_active = true,
            State::Failed | State::Expired => any_failed = true,
            _ => {}
        }
    }
    any_failed || !any_active
}

/// Reconcile the Challenges of a pending or processing Order
pub(crate) async fn reconcile_challenges(
    ctx: &SyncContext<'_>,
    order: &mut Order,
) -> Result<(), OrderError> {
    if order.status.challenges.is_empty() && !rederive_challenges(ctx, order).await? {
        return Ok(());
    }

    let selector = challenge_selector_for_order(ctx.order_name_label, order);
    let mut existing = cancellable(ctx.cancel, ctx.challenges.list(order.namespace(), &selector))
        .await??;

    let to_create = specs_to_create(&order.status.challenges, &existing);
    info!(count = to_create.len(), existing = existing.len(), "Need to create challenges");

    let mut errors = Vec::new();
    for (index, spec) in to_create {
        let challenge = build_challenge(ctx.order_name_label, index, order, spec);
        let name = challenge.metadata.name.clone();
        match cancellable(ctx.cancel, ctx.challenges.create(challenge)).await {
            Ok(Ok(created)) => {
                debug!(challenge = %name, domain = %spec.dns_name, "Created challenge");
                existing.push(created);
            }
            Ok(Err(e)) => {
                warn!(challenge = %name, error = %e, "Failed to create challenge");
                errors.push(OrderError::Store(e));
            }
            Err(cancelled) => errors.push(cancelled),
        }
    }
    if !errors.is_empty() {
        return Err(OrderError::EnsureChallenges(AggregateError::new(errors)));
    }

    if !should_recheck_order(&existing) {
        info!("Waiting for all challenges to leave the pending state");
        return Ok(());
    }

    sync_order_status(ctx, order).await?;
    Ok(())
}

/// Derive the challenge list for an order that exists remotely but whose
/// creation pass failed before the list was recorded
///
/// Returns whether reconciliation should continue with the derived list.
async fn rederive_challenges(ctx: &SyncContext<'_>, order: &mut Order) -> Result<bool, OrderError> {
    let acme_order = sync_order_status(ctx, order).await?;
    if acme_order.authorizations.is_empty()
        || !matches!(order.status.state, State::Pending | State::Processing)
    {
        return Ok(false);
    }

    order.status.challenges = derive_challenges(ctx, order, &acme_order.authorizations).await?;
    info!(
        count = order.status.challenges.len(),
        "Derived challenges for previously created order"
    );
    Ok(true)
}
