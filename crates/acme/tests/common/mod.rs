//! Shared fixtures for order engine integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use sentinel_acme::{
    AcmeChallenge, AcmeClient, AcmeError, AcmeHttp01Config, AcmeIssuer, AcmeOrder, Authorization,
    AuthorizationIdentifier, Challenge, ChallengeType, Clock, DomainSolverConfig,
    Http01SolverConfig, Issuer, IssuerCatalog, IssuerContext, IssuerKind, IssuerRef,
    IssuerRegistry, IssuerType, KeyAuthorization, MemoryStore, NewOrder, ObjectStore, Order,
    OrderController, OrderError, OrderSpec, Resource, SolverConfig, State,
};
use sentinel_common::ResourceKey;

pub const NAMESPACE: &str = "default";
pub const ISSUER: &str = "letsencrypt";
pub const THUMBPRINT: &str = "account-thumbprint";

/// ACME client operation, used to script failures and count calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateOrder,
    GetOrder,
    GetAuthorization,
    FinalizeOrder,
}

/// A recorded client call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOrder(Vec<String>),
    GetOrder(String),
    GetAuthorization(String),
    FinalizeOrder(String),
}

impl Call {
    fn op(&self) -> Op {
        match self {
            Call::CreateOrder(_) => Op::CreateOrder,
            Call::GetOrder(_) => Op::GetOrder,
            Call::GetAuthorization(_) => Op::GetAuthorization,
            Call::FinalizeOrder(_) => Op::FinalizeOrder,
        }
    }
}

#[derive(Default)]
struct MockState {
    calls: Vec<Call>,
    new_order: Option<AcmeOrder>,
    orders: HashMap<String, AcmeOrder>,
    authorizations: HashMap<String, Authorization>,
    failures: HashMap<Op, AcmeError>,
    cancel_on: Option<(Op, CancellationToken)>,
}

/// Scripted ACME server that records every call
#[derive(Default)]
pub struct MockAcmeClient {
    state: Mutex<MockState>,
}

impl MockAcmeClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Serve `order` from create-order and from get-order on its URL
    pub fn set_order(&self, order: AcmeOrder) {
        let mut state = self.state.lock();
        state.new_order = Some(order.clone());
        state.orders.insert(order.url.clone(), order);
    }

    /// Change the status get-order reports for `url`
    pub fn set_order_status(&self, url: &str, status: &str) {
        if let Some(order) = self.state.lock().orders.get_mut(url) {
            order.status = status.to_string();
        }
    }

    pub fn add_authorization(&self, authz: Authorization) {
        self.state
            .lock()
            .authorizations
            .insert(authz.url.clone(), authz);
    }

    pub fn fail(&self, op: Op, err: AcmeError) {
        self.state.lock().failures.insert(op, err);
    }

    /// Cancel `token` while serving the first `op` call
    pub fn cancel_during(&self, op: Op, token: CancellationToken) {
        self.state.lock().cancel_on = Some((op, token));
    }

    pub fn recover(&self, op: Op) {
        self.state.lock().failures.remove(&op);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.state.lock().calls.iter().filter(|c| c.op() == op).count()
    }

    pub fn reset_calls(&self) {
        self.state.lock().calls.clear();
    }

    fn record(&self, call: Call) -> Result<(), AcmeError> {
        let mut state = self.state.lock();
        let op = call.op();
        state.calls.push(call);
        if state.cancel_on.as_ref().is_some_and(|(on, _)| *on == op) {
            if let Some((_, token)) = state.cancel_on.take() {
                token.cancel();
            }
        }
        match state.failures.get(&op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }
}

fn not_found(what: &str) -> AcmeError {
    AcmeError::Problem {
        status: 404,
        kind: "urn:ietf:params:acme:error:malformed".into(),
        detail: format!("{what} not found"),
    }
}

#[async_trait]
impl AcmeClient for MockAcmeClient {
    async fn create_order(&self, order: &NewOrder) -> Result<AcmeOrder, AcmeError> {
        let names = order
            .identifiers
            .iter()
            .map(|id| match id {
                sentinel_acme::Identifier::Dns(name) => name.clone(),
            })
            .collect();
        self.record(Call::CreateOrder(names))?;
        self.state
            .lock()
            .new_order
            .clone()
            .ok_or_else(|| AcmeError::Transport("no order scripted".into()))
    }

    async fn get_order(&self, url: &str) -> Result<AcmeOrder, AcmeError> {
        self.record(Call::GetOrder(url.to_string()))?;
        self.state
            .lock()
            .orders
            .get(url)
            .cloned()
            .ok_or_else(|| not_found(url))
    }

    async fn get_authorization(&self, url: &str) -> Result<Authorization, AcmeError> {
        self.record(Call::GetAuthorization(url.to_string()))?;
        self.state
            .lock()
            .authorizations
            .get(url)
            .cloned()
            .ok_or_else(|| not_found(url))
    }

    async fn finalize_order(
        &self,
        finalize_url: &str,
        _csr: &[u8],
    ) -> Result<Vec<Vec<u8>>, AcmeError> {
        self.record(Call::FinalizeOrder(finalize_url.to_string()))?;
        Ok(vec![b"certificate".to_vec()])
    }

    fn http01_challenge_response(&self, token: &str) -> Result<String, AcmeError> {
        Ok(KeyAuthorization::new(token, THUMBPRINT).as_str().to_string())
    }

    fn dns01_challenge_record(&self, token: &str) -> Result<String, AcmeError> {
        Ok(KeyAuthorization::new(token, THUMBPRINT).dns_value())
    }
}

/// Clock that only moves when told to
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            now: Mutex::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()),
        })
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

pub fn acme_issuer() -> Issuer {
    Issuer {
        name: ISSUER.into(),
        kind: IssuerKind::Issuer,
        namespace: NAMESPACE.into(),
        acme: Some(AcmeIssuer {
            server: "https://acme.test/directory".into(),
            email: "ops@example.com".into(),
            private_key_secret: "acme-account-key".into(),
            skip_tls_verify: false,
            http01: Some(AcmeHttp01Config {}),
            dns01: None,
        }),
    }
}

/// Engine wired to in-memory stores and a scripted ACME server
pub struct Harness {
    pub client: Arc<MockAcmeClient>,
    pub orders: Arc<MemoryStore<Order>>,
    pub challenges: Arc<MemoryStore<Challenge>>,
    pub clock: Arc<ManualClock>,
    pub controller: OrderController,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_issuers(vec![acme_issuer()])
    }

    pub fn with_issuers(issuers: Vec<Issuer>) -> Self {
        let client = MockAcmeClient::new();
        let orders = Arc::new(MemoryStore::new());
        let challenges = Arc::new(MemoryStore::new());
        let clock = ManualClock::new();

        let shared = client.clone();
        let registry = IssuerRegistry::new(IssuerContext {
            cluster_resource_namespace: "sentinel-system".into(),
        })
        .register(IssuerType::Acme, move |_, _| {
            Ok(shared.clone() as Arc<dyn AcmeClient>)
        });

        let controller = OrderController::new(
            orders.clone(),
            challenges.clone(),
            Arc::new(IssuerCatalog::new(issuers)),
            registry,
        )
        .with_clock(clock.clone());

        Self {
            client,
            orders,
            challenges,
            clock,
            controller,
        }
    }

    pub async fn sync(&self, key: &ResourceKey) -> Result<(), OrderError> {
        self.controller.sync_key(&CancellationToken::new(), key).await
    }

    pub async fn order(&self, key: &ResourceKey) -> Order {
        self.orders.get(key).await.unwrap().unwrap()
    }

    pub async fn all_challenges(&self) -> Vec<Challenge> {
        self.challenges
            .list(NAMESPACE, &sentinel_acme::LabelSelector::new())
            .await
            .unwrap()
    }

    /// Set the state of a stored Challenge, as the challenge reconciler would
    pub async fn set_challenge_state(&self, name: &str, state: State) {
        let key = ResourceKey::new(NAMESPACE, name);
        let mut ch = self.challenges.get(&key).await.unwrap().unwrap();
        ch.status.state = state;
        self.challenges.put(ch);
    }
}

pub fn order_spec(dns_names: &[&str]) -> OrderSpec {
    OrderSpec {
        csr: b"csr-der".to_vec(),
        issuer_ref: IssuerRef::issuer(ISSUER),
        common_name: None,
        dns_names: dns_names.iter().map(|s| s.to_string()).collect(),
        config: vec![DomainSolverConfig {
            domains: dns_names.iter().map(|s| s.to_string()).collect(),
            solver: SolverConfig {
                http01: Some(Http01SolverConfig::default()),
                dns01: None,
            },
        }],
    }
}

pub fn order_url(name: &str) -> String {
    format!("https://acme.test/order/{name}")
}

pub fn authz_url(domain: &str) -> String {
    format!("https://acme.test/authz/{domain}")
}

pub fn acme_order(name: &str, status: &str, domains: &[&str]) -> AcmeOrder {
    AcmeOrder {
        url: order_url(name),
        status: status.into(),
        finalize_url: format!("{}/finalize", order_url(name)),
        certificate_url: None,
        authorizations: domains.iter().map(|d| authz_url(d)).collect(),
    }
}

pub fn authorization(domain: &str) -> Authorization {
    Authorization {
        url: authz_url(domain),
        identifier: AuthorizationIdentifier {
            kind: "dns".into(),
            value: domain.into(),
        },
        wildcard: false,
        challenges: vec![
            AcmeChallenge {
                kind: ChallengeType::Dns01,
                url: format!("https://acme.test/chal/{domain}/dns"),
                token: format!("{domain}-dns-token"),
            },
            AcmeChallenge {
                kind: ChallengeType::Http01,
                url: format!("https://acme.test/chal/{domain}/http"),
                token: format!("{domain}-http-token"),
            },
        ],
    }
}

/// Script the server for an order over `domains` and store a fresh Order
pub fn new_order(harness: &Harness, name: &str, domains: &[&str]) -> ResourceKey {
    harness.client.set_order(acme_order(name, "pending", domains));
    for domain in domains {
        harness.client.add_authorization(authorization(domain));
    }
    harness
        .orders
        .put(Order::new(NAMESPACE, name, order_spec(domains)))
        .key()
}

/// Store an Order that has already been created remotely
pub fn existing_order(harness: &Harness, name: &str, state: State, domains: &[&str]) -> ResourceKey {
    let remote = acme_order(name, state.as_str(), domains);
    harness.client.set_order(remote.clone());
    for domain in domains {
        harness.client.add_authorization(authorization(domain));
    }

    let mut order = Order::new(NAMESPACE, name, order_spec(domains));
    order.status.url = remote.url;
    order.status.finalize_url = remote.finalize_url;
    order.status.state = state;
    harness.orders.put(order).key()
}
