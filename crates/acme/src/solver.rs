//! Challenge spec construction
//!
//! Turns one ACME authorization into the concrete [`ChallengeSpec`] the
//! Order will ask a Challenge resource to fulfil: which solver config
//! applies, which offered challenge to use, and the proof value to present.

use tracing::trace;

use crate::client::{AcmeChallenge, AcmeClient, Authorization, ChallengeType};
use crate::error::OrderError;
use crate::issuer::AcmeCapabilities;
use crate::resources::{ChallengeSpec, DomainSolverConfig, IssuerRef, SolverConfig};

/// Domain name used to look up the solver config for an authorization
///
/// Wildcard authorizations carry the bare domain as identifier; they are
/// configured under their `*.` form.
pub fn solver_lookup_domain(authz: &Authorization) -> String {
    if authz.wildcard {
        format!("*.{}", authz.identifier.value)
    } else {
        authz.identifier.value.clone()
    }
}

/// Find the first solver config whose domain list contains the lookup domain
pub fn solver_config_for_authorization<'a>(
    configs: &'a [DomainSolverConfig],
    authz: &Authorization,
) -> Result<&'a SolverConfig, OrderError> {
    let domain = solver_lookup_domain(authz);
    configs
        .iter()
        .find(|cfg| cfg.domains.iter().any(|d| *d == domain))
        .map(|cfg| &cfg.solver)
        .ok_or(OrderError::ConfigurationNotFound { domain })
}

/// Pick the offered challenge to complete
///
/// A challenge qualifies when its type is enabled both by the solver config
/// and by the issuer. When several qualify, the last one in server order
/// wins.
pub fn select_challenge<'a>(
    solver: &SolverConfig,
    capabilities: &AcmeCapabilities,
    authz: &'a Authorization,
) -> Option<&'a AcmeChallenge> {
    authz
        .challenges
        .iter()
        .rev()
        .find(|ch| solver.enables(&ch.kind) && capabilities.enables(&ch.kind))
}

/// Compute the value that proves control for the given challenge
pub fn challenge_proof(
    client: &dyn AcmeClient,
    challenge: &AcmeChallenge,
    domain: &str,
) -> Result<String, OrderError> {
    let proof = match challenge.kind {
        ChallengeType::Http01 => client.http01_challenge_response(&challenge.token),
        ChallengeType::Dns01 => client.dns01_challenge_record(&challenge.token),
        ChallengeType::Other(_) => {
            return Err(OrderError::UnsupportedChallengeType(challenge.kind.clone()))
        }
    };
    proof.map_err(|source| OrderError::ChallengeProof {
        domain: domain.to_string(),
        source,
    })
}

/// Build the challenge spec for one authorization
pub fn build_challenge_spec(
    configs: &[DomainSolverConfig],
    capabilities: &AcmeCapabilities,
    client: &dyn AcmeClient,
    issuer_ref: &IssuerRef,
    authz: &Authorization,
) -> Result<ChallengeSpec, OrderError> {
    let solver = solver_config_for_authorization(configs, authz)?;

    let domain = &authz.identifier.value;
    let challenge = select_challenge(solver, capabilities, authz).ok_or_else(|| {
        OrderError::NoAcceptableChallenge {
            domain: domain.clone(),
        }
    })?;

    let key = challenge_proof(client, challenge, domain)?;

    trace!(domain = %domain, challenge_type = %challenge.kind, "Selected challenge");

    Ok(ChallengeSpec {
        authz_url: authz.url.clone(),
        kind: challenge.kind.clone(),
        url: challenge.url.clone(),
        dns_name: domain.clone(),
        token: challenge.token.clone(),
        key,
        config: solver.clone(),
        wildcard: authz.wildcard,
        issuer_ref: issuer_ref.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{AcmeError, AcmeOrder, AuthorizationIdentifier, NewOrder};
    use crate::resources::{Dns01SolverConfig, Http01SolverConfig};
    use async_trait::async_trait;
    use proptest::prelude::*;

    /// Client that only implements the proof functions
    struct ProofClient;

    #[async_trait]
    impl AcmeClient for ProofClient {
        async fn create_order(&self, _: &NewOrder) -> Result<AcmeOrder, AcmeError> {
            unreachable!()
        }
        async fn get_order(&self, _: &str) -> Result<AcmeOrder, AcmeError> {
            unreachable!()
        }
        async fn get_authorization(&self, _: &str) -> Result<Authorization, AcmeError> {
            unreachable!()
        }
        async fn finalize_order(&self, _: &str, _: &[u8]) -> Result<Vec<Vec<u8>>, AcmeError> {
            unreachable!()
        }
        fn http01_challenge_response(&self, token: &str) -> Result<String, AcmeError> {
            Ok(format!("http:{token}"))
        }
        fn dns01_challenge_record(&self, token: &str) -> Result<String, AcmeError> {
            Ok(format!("dns:{token}"))
        }
    }

    fn both() -> SolverConfig {
        SolverConfig {
            http01: Some(Http01SolverConfig::default()),
            dns01: Some(Dns01SolverConfig {
                provider: "cloudflare".into(),
            }),
        }
    }

    fn all_caps() -> AcmeCapabilities {
        AcmeCapabilities {
            http01: true,
            dns01: true,
        }
    }

    fn challenge(kind: &str, n: usize) -> AcmeChallenge {
        AcmeChallenge {
            kind: ChallengeType::from(kind),
            url: format!("https://ca.test/chal/{n}"),
            token: format!("token-{n}"),
        }
    }

    fn authz(domain: &str, wildcard: bool, kinds: &[&str]) -> Authorization {
        Authorization {
            url: format!("https://ca.test/authz/{domain}"),
            identifier: AuthorizationIdentifier {
                kind: "dns".into(),
                value: domain.into(),
            },
            wildcard,
            challenges: kinds
                .iter()
                .enumerate()
                .map(|(i, k)| challenge(k, i))
                .collect(),
        }
    }

    #[test]
    fn test_last_matching_challenge_wins() {
        let configs = vec![DomainSolverConfig {
            domains: vec!["example.com".into()],
            solver: both(),
        }];
        let authz = authz("example.com", false, &["dns-01", "http-01"]);

        let spec = build_challenge_spec(
            &configs,
            &all_caps(),
            &ProofClient,
            &IssuerRef::issuer("le"),
            &authz,
        )
        .unwrap();

        assert_eq!(spec.kind, ChallengeType::Http01);
        assert_eq!(spec.token, "token-1");
        assert_eq!(spec.key, "http:token-1");
        assert_eq!(spec.authz_url, "https://ca.test/authz/example.com");
        assert_eq!(spec.dns_name, "example.com");
        assert!(!spec.wildcard);
    }

    #[test]
    fn test_wildcard_uses_prefixed_lookup() {
        let configs = vec![
            DomainSolverConfig {
                domains: vec!["example.com".into()],
                solver: SolverConfig {
                    http01: Some(Http01SolverConfig::default()),
                    dns01: None,
                },
            },
            DomainSolverConfig {
                domains: vec!["*.example.com".into()],
                solver: SolverConfig {
                    http01: None,
                    dns01: Some(Dns01SolverConfig {
                        provider: "route53".into(),
                    }),
                },
            },
        ];
        let authz = authz("example.com", true, &["dns-01", "http-01"]);
        assert_eq!(solver_lookup_domain(&authz), "*.example.com");

        let spec = build_challenge_spec(
            &configs,
            &all_caps(),
            &ProofClient,
            &IssuerRef::issuer("le"),
            &authz,
        )
        .unwrap();
        assert_eq!(spec.kind, ChallengeType::Dns01);
        assert_eq!(spec.key, "dns:token-0");
        assert!(spec.wildcard);
        // The spec records the bare domain, not the lookup pattern
        assert_eq!(spec.dns_name, "example.com");
    }

    #[test]
    fn test_first_config_entry_wins() {
        let configs = vec![
            DomainSolverConfig {
                domains: vec!["a.com".into(), "b.com".into()],
                solver: SolverConfig {
                    http01: None,
                    dns01: Some(Dns01SolverConfig {
                        provider: "first".into(),
                    }),
                },
            },
            DomainSolverConfig {
                domains: vec!["b.com".into()],
                solver: SolverConfig {
                    http01: None,
                    dns01: Some(Dns01SolverConfig {
                        provider: "second".into(),
                    }),
                },
            },
        ];
        let cfg = solver_config_for_authorization(&configs, &authz("b.com", false, &[])).unwrap();
        assert_eq!(cfg.dns01.as_ref().unwrap().provider, "first");
    }

    #[test]
    fn test_configuration_not_found() {
        let configs = vec![DomainSolverConfig {
            domains: vec!["example.com".into()],
            solver: both(),
        }];
        // A wildcard authorization does not match the bare pattern
        let err = solver_config_for_authorization(&configs, &authz("example.com", true, &[]))
            .unwrap_err();
        match err {
            OrderError::ConfigurationNotFound { domain } => assert_eq!(domain, "*.example.com"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_issuer_capability_filters_choice() {
        let configs = vec![DomainSolverConfig {
            domains: vec!["example.com".into()],
            solver: both(),
        }];
        let caps = AcmeCapabilities {
            http01: false,
            dns01: true,
        };
        let spec = build_challenge_spec(
            &configs,
            &caps,
            &ProofClient,
            &IssuerRef::issuer("le"),
            &authz("example.com", false, &["dns-01", "http-01"]),
        )
        .unwrap();
        assert_eq!(spec.kind, ChallengeType::Dns01);
    }

    #[test]
    fn test_no_acceptable_challenge() {
        let configs = vec![DomainSolverConfig {
            domains: vec!["example.com".into()],
            solver: SolverConfig {
                http01: Some(Http01SolverConfig::default()),
                dns01: None,
            },
        }];
        let err = build_challenge_spec(
            &configs,
            &all_caps(),
            &ProofClient,
            &IssuerRef::issuer("le"),
            &authz("example.com", false, &["dns-01", "tls-alpn-01"]),
        )
        .unwrap_err();
        assert!(matches!(err, OrderError::NoAcceptableChallenge { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_unsupported_challenge_type_proof() {
        let err = challenge_proof(&ProofClient, &challenge("tls-alpn-01", 0), "example.com")
            .unwrap_err();
        assert!(matches!(err, OrderError::UnsupportedChallengeType(_)));
        assert!(err.is_configuration());
    }

    fn offered_kind() -> impl Strategy<Value = &'static str> {
        prop_oneof![Just("http-01"), Just("dns-01"), Just("tls-alpn-01")]
    }

    proptest! {
        #[test]
        fn prop_selection_is_last_acceptable(
            kinds in proptest::collection::vec(offered_kind(), 0..6),
            http in any::<bool>(),
            dns in any::<bool>(),
        ) {
            let authz = authz("example.com", false, &kinds);
            let caps = AcmeCapabilities { http01: http, dns01: dns };
            let selected = select_challenge(&both(), &caps, &authz);

            let expected = kinds.iter().rposition(|k| match *k {
                "http-01" => http,
                "dns-01" => dns,
                _ => false,
            });
            prop_assert_eq!(selected.map(|c| c.token.clone()), expected.map(|i| format!("token-{i}")));
        }
    }
}
