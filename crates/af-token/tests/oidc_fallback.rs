// SPDX-License-Identifier: MIT OR Apache-2.0
//! Federated-validation fallback behavior against a mock provider.

use std::time::Duration;

use af_token::{AuthService, OidcConfig, OidcValidator, TokenError, TokenService};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn local_service() -> TokenService {
    TokenService::new(
        b"an-adequately-long-signing-secret!!",
        Duration::from_secs(3600),
    )
    .unwrap()
}

fn oidc_for(uri: &str) -> OidcValidator {
    OidcValidator::new(OidcConfig {
        issuer: uri.to_string(),
        refresh_interval: Duration::from_secs(300),
    })
}

#[tokio::test]
async fn unreachable_provider_reports_unavailable() {
    // Nothing listens on this port.
    let oidc = oidc_for("http://127.0.0.1:1");
    let err = oidc.validate("whatever").await.unwrap_err();
    assert!(matches!(
        err,
        TokenError::IdentityProviderUnavailable { .. }
    ));
}

#[tokio::test]
async fn discovery_failure_falls_back_to_local_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let auth = AuthService::federated(local_service(), oidc_for(&server.uri()));
    let token = auth
        .local_service()
        .issue("t1", "u1", vec!["viewer".into()], vec![])
        .unwrap();

    // The provider is down, the caller never notices.
    let claims = auth.validate(&token).await.unwrap();
    assert_eq!(claims.tenant_id, "t1");
    assert_eq!(auth.fallback_count(), 1);
}

#[tokio::test]
async fn broken_key_set_falls_back_to_local_validation() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "issuer": server.uri(),
            "jwks_uri": format!("{}/keys", server.uri()),
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/keys"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let auth = AuthService::federated(local_service(), oidc_for(&server.uri()));
    let token = auth
        .local_service()
        .issue("t2", "u9", vec!["admin".into()], vec!["*:*".into()])
        .unwrap();

    let claims = auth.validate(&token).await.unwrap();
    assert_eq!(claims.user_id, "u9");
    assert_eq!(auth.fallback_count(), 1);
}

#[tokio::test]
async fn fallback_still_rejects_bad_tokens() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let auth = AuthService::federated(local_service(), oidc_for(&server.uri()));
    let err = auth.validate("garbage.token.here").await.unwrap_err();
    // The surfaced error is a local validation error, never provider
    // unavailability.
    assert!(matches!(err, TokenError::Invalid { .. }));
}
