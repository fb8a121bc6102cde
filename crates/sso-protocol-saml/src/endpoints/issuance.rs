//! Diagnostic issuance endpoint.
//!
//! Authenticates a user against a registered relying party and returns the
//! assertion the pipeline would issue for it.

use axum::{
    Json,
    extract::{Query, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Deserializer};
use sso_core::{Event, EventType};

use crate::context::{
    AuthenticatedAssertionContext, DescriptorOverrides, IssuanceRequestContext,
};
use crate::encryption::encrypt_assertion;
use crate::error::{SamlError, SamlResult};
use crate::types::SamlBinding;
use crate::xml;

use super::state::IssuanceState;

/// Parameters accepted by the diagnostic endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuanceParams {
    /// Principal to authenticate.
    pub username: Option<String>,
    /// Principal's password.
    pub password: Option<String>,
    /// Relying-party entity ID.
    pub entity_id: Option<String>,
    /// Encrypt the whole assertion (and its attributes).
    #[serde(default, deserialize_with = "lenient_flag")]
    pub encrypt: bool,
}

/// What a successful run of the endpoint produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IssuanceOutcome {
    /// Wire form of the issued assertion.
    Issued(String),
    /// The relying party is unknown or its metadata is unavailable.
    NoContent,
}

/// GET handler: parameters in the query string.
pub async fn issue_get(
    State(state): State<IssuanceState>,
    headers: HeaderMap,
    Query(params): Query<IssuanceParams>,
) -> Response {
    respond(&state, params, client_address(&headers)).await
}

/// POST handler: parameters as a JSON object.
pub async fn issue_post(
    State(state): State<IssuanceState>,
    headers: HeaderMap,
    payload: Result<Json<IssuanceParams>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(params)) => respond(&state, params, client_address(&headers)).await,
        Err(rejection) => {
            let err = SamlError::InvalidRequest(rejection.body_text());
            tracing::error!(error = %err, "rejected issuance request");
            error_response(&err)
        }
    }
}

async fn respond(state: &IssuanceState, params: IssuanceParams, address: Option<String>) -> Response {
    match issue_assertion(state, params, address).await {
        Ok(IssuanceOutcome::Issued(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml")],
            body,
        )
            .into_response(),
        Ok(IssuanceOutcome::NoContent) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => error_response(&e),
    }
}

/// Runs the whole pipeline for one diagnostic request.
///
/// Credentials are checked before relying-party metadata is resolved.
///
/// # Errors
///
/// Any failure other than an unknown or unresolvable relying party.
#[tracing::instrument(
    skip_all,
    fields(entity_id = params.entity_id.as_deref().unwrap_or_default(), encrypt = params.encrypt)
)]
pub async fn issue_assertion(
    state: &IssuanceState,
    params: IssuanceParams,
    client_address: Option<String>,
) -> SamlResult<IssuanceOutcome> {
    let entity_id = required(params.entity_id.as_deref(), "entityId")?;
    let username = required(params.username.as_deref(), "username")?;
    let password = params.password.as_deref().unwrap_or_default();

    let Some(registered) = state.registry.find_service_by(entity_id).await? else {
        tracing::info!("relying party is not registered");
        audit_refusal(state, entity_id, Some(username), "relying party is not registered");
        return Ok(IssuanceOutcome::NoContent);
    };

    let result = run(state, &registered, username, password, params.encrypt, client_address).await;
    match &result {
        Ok(IssuanceOutcome::NoContent) => {
            audit_refusal(state, entity_id, Some(username), "relying party metadata unavailable");
        }
        Err(e) => audit_refusal(state, entity_id, Some(username), &e.to_string()),
        Ok(IssuanceOutcome::Issued(_)) => {}
    }
    result
}

async fn run(
    state: &IssuanceState,
    registered: &crate::context::RelyingPartyDescriptor,
    username: &str,
    password: &str,
    encrypt: bool,
    client_address: Option<String>,
) -> SamlResult<IssuanceOutcome> {
    state.registry.ensure_access_allowed(registered).await?;
    let descriptor = registered.derive(&DescriptorOverrides::encryption(encrypt));

    let authenticated = state
        .authenticator
        .authenticate(&descriptor, username, password)
        .await?;
    let released = state
        .release_policy
        .attributes_to_release(&authenticated, &descriptor)
        .await?;

    let mut attributes = authenticated.attributes.clone();
    attributes.extend(released);
    let principal = AuthenticatedAssertionContext::new(authenticated.principal.clone(), attributes)?;

    let facade = match state.metadata.resolve(&descriptor.entity_id).await {
        Ok(facade) => facade,
        Err(e) if e.is_trust_failure() => {
            tracing::warn!(error = %e, "relying party metadata unavailable");
            return Ok(IssuanceOutcome::NoContent);
        }
        Err(e) => return Err(e),
    };

    let request = IssuanceRequestContext {
        in_response_to: None,
        authn_context_class: authenticated.authn_context_class.clone(),
        session_index: authenticated.session_index.clone(),
        client_address,
    };
    let assertion = state
        .assembler
        .assemble(&request, &principal, &descriptor, &facade, SamlBinding::HttpPost)
        .await?;

    let body = if descriptor.encrypt_assertions {
        let encrypted = encrypt_assertion(state.encrypter.as_ref(), &assertion, &facade)?;
        xml::write_encrypted_assertion(&encrypted)?
    } else {
        xml::write_assertion(&assertion)?
    };

    tracing::info!(
        assertion_id = %assertion.id,
        principal = %principal.name(),
        signed = assertion.is_signed(),
        encrypted = descriptor.encrypt_assertions,
        "assertion issued"
    );
    state.audit.record(
        &Event::builder(EventType::AssertionIssued)
            .relying_party(&descriptor.entity_id)
            .principal(principal.name())
            .ip_address(request.client_address.as_deref())
            .session(request.session_index.as_deref())
            .detail("assertion_id", &assertion.id)
            .detail("signed", assertion.is_signed().to_string())
            .detail("encrypted", descriptor.encrypt_assertions.to_string())
            .build(),
    );

    Ok(IssuanceOutcome::Issued(body))
}

fn audit_refusal(state: &IssuanceState, entity_id: &str, principal: Option<&str>, reason: &str) {
    let mut event = Event::builder(EventType::IssuanceError)
        .relying_party(entity_id)
        .failure(reason);
    if let Some(principal) = principal {
        event = event.principal(principal);
    }
    state.audit.record(&event.build());
}

fn required<'a>(value: Option<&'a str>, name: &str) -> SamlResult<&'a str> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| SamlError::InvalidRequest(format!("{name} parameter required")))
}

fn client_address(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// Client-error response carrying an escaped message.
///
/// The unescaped message stays in the server log.
fn error_response(err: &SamlError) -> Response {
    tracing::error!(error = %err, "assertion issuance failed");
    (StatusCode::BAD_REQUEST, html_escape(&err.to_string())).into_response()
}

/// Parses a flag the way the endpoint always has: `true` in any case is
/// true, anything else is false.
#[must_use]
pub fn parse_flag(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// Escapes text for inclusion in HTML.
#[must_use]
pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            c => out.push(c),
        }
    }
    out
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    Ok(match Option::<Flag>::deserialize(deserializer)? {
        Some(Flag::Bool(b)) => b,
        Some(Flag::Text(s)) => parse_flag(&s),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use sso_core::{EventOutcome, IssuanceConfig};
    use tower::ServiceExt;

    use super::*;
    use crate::context::RelyingPartyDescriptor;
    use crate::endpoints::{
        AttributeReleasePolicy, AuthenticationResult, Authenticator, ServiceRegistry,
        issuance_router,
    };
    use crate::metadata::{InMemoryMetadataResolver, MetadataTrustCache};
    use crate::profile::{AssertionAssembler, IssuerResolver};
    use crate::signature::{RsaSigningKey, SigningPolicy, XmlAssertionSigner};
    use crate::testing::{
        IDP_ENTITY_ID, RecordingAuditSink, SP_ENTITY_ID, recipient_key, recording_sink, sp_facade,
    };

    const PATH: &str = "/idp/profile/saml2/diagnostic";

    struct Registry(Vec<RelyingPartyDescriptor>);

    #[async_trait::async_trait]
    impl ServiceRegistry for Registry {
        async fn find_service_by(&self, entity_id: &str) -> SamlResult<Option<RelyingPartyDescriptor>> {
            Ok(self.0.iter().find(|d| d.entity_id == entity_id).cloned())
        }
    }

    struct Passwords;

    #[async_trait::async_trait]
    impl Authenticator for Passwords {
        async fn authenticate(
            &self,
            _: &RelyingPartyDescriptor,
            username: &str,
            password: &str,
        ) -> SamlResult<AuthenticationResult> {
            if username == "alice" && password == "wonderland" {
                Ok(AuthenticationResult {
                    principal: "alice".to_string(),
                    session_index: Some("_session-1".to_string()),
                    ..AuthenticationResult::default()
                })
            } else {
                Err(SamlError::Authentication(format!(
                    "invalid credentials for <{username}>"
                )))
            }
        }
    }

    struct EmailOnly;

    #[async_trait::async_trait]
    impl AttributeReleasePolicy for EmailOnly {
        async fn attributes_to_release(
            &self,
            principal: &AuthenticationResult,
            _: &RelyingPartyDescriptor,
        ) -> SamlResult<BTreeMap<String, Vec<String>>> {
            Ok(BTreeMap::from([(
                "email".to_string(),
                vec![format!("{}@example.org", principal.principal)],
            )]))
        }
    }

    struct Harness {
        state: IssuanceState,
        audit: Arc<RecordingAuditSink>,
    }

    fn harness(descriptors: Vec<RelyingPartyDescriptor>, metadata: InMemoryMetadataResolver) -> Harness {
        let audit = recording_sink();
        let cache = MetadataTrustCache::builder(Arc::new(metadata.with_idp_entity(IDP_ENTITY_ID)))
            .audit_sink(audit.clone())
            .build();
        let signing = SigningPolicy::new(
            Arc::new(XmlAssertionSigner::new(Arc::new(RsaSigningKey::generate().unwrap()))),
            audit.clone(),
        );
        let assembler = AssertionAssembler::new(
            IssuerResolver::new(Arc::new(cache.clone())),
            signing,
            &IssuanceConfig::default(),
        )
        .with_encrypter(Arc::new(crate::encryption::AesGcmXmlEncrypter::new()));

        let state = IssuanceState::new(
            Arc::new(Registry(descriptors)),
            Arc::new(Passwords),
            Arc::new(EmailOnly),
            cache,
            Arc::new(assembler),
        )
        .with_audit_sink(audit.clone());

        Harness { state, audit }
    }

    fn registered() -> Harness {
        harness(
            vec![RelyingPartyDescriptor::new(SP_ENTITY_ID)],
            InMemoryMetadataResolver::new()
                .with_relying_party(sp_facade().with_want_assertions_signed(true)),
        )
    }

    fn query(params: &[(&str, &str)]) -> String {
        let pairs: Vec<String> = params
            .iter()
            .map(|(k, v)| format!("{k}={}", v.replace(':', "%3A").replace('/', "%2F")))
            .collect();
        format!("{PATH}?{}", pairs.join("&"))
    }

    async fn get(state: IssuanceState, uri: String) -> (StatusCode, String) {
        let response = issuance_router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn flags_are_lenient() {
        assert!(parse_flag("true"));
        assert!(parse_flag("TRUE"));
        assert!(parse_flag(" True "));
        assert!(!parse_flag("yes"));
        assert!(!parse_flag("1"));
        assert!(!parse_flag(""));
    }

    #[test]
    fn escaping_removes_markup() {
        assert_eq!(
            html_escape(r#"<b a="1">x & 'y'</b>"#),
            "&lt;b a=&quot;1&quot;&gt;x &amp; &#x27;y&#x27;&lt;/b&gt;"
        );
    }

    #[tokio::test]
    async fn issues_signed_assertion_over_get() {
        let harness = registered();
        let uri = query(&[
            ("username", "alice"),
            ("password", "wonderland"),
            ("entityId", SP_ENTITY_ID),
        ]);

        let response = issuance_router(harness.state.clone())
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/xml"
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let xml = String::from_utf8(body.to_vec()).unwrap();
        assert!(xml.starts_with("<saml2:Assertion"));
        assert!(xml.contains("<ds:Signature"));
        assert!(xml.contains("alice@example.org"));
        assert!(xml.contains(&format!("<saml2:Audience>{SP_ENTITY_ID}</saml2:Audience>")));

        let issued: Vec<_> = harness
            .audit
            .events()
            .into_iter()
            .filter(|e| e.event_type == EventType::AssertionIssued)
            .collect();
        assert_eq!(issued.len(), 1);
        assert_eq!(issued[0].principal.as_deref(), Some("alice"));
        assert_eq!(issued[0].session_id.as_deref(), Some("_session-1"));
    }

    #[tokio::test]
    async fn issues_over_post_json() {
        let harness = registered();
        let body = serde_json::json!({
            "username": "alice",
            "password": "wonderland",
            "entityId": SP_ENTITY_ID,
            "encrypt": "false",
        });

        let response = issuance_router(harness.state)
            .oneshot(
                Request::post(PATH)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn encrypt_flag_wraps_assertion() {
        let (_, spki) = recipient_key();
        let harness = harness(
            vec![RelyingPartyDescriptor::new(SP_ENTITY_ID)],
            InMemoryMetadataResolver::new().with_relying_party(sp_facade().with_encryption_key(spki)),
        );
        let uri = query(&[
            ("username", "alice"),
            ("password", "wonderland"),
            ("entityId", SP_ENTITY_ID),
            ("encrypt", "TRUE"),
        ]);

        let (status, body) = get(harness.state, uri).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.starts_with("<saml2:EncryptedAssertion"));
        assert!(!body.contains("alice@example.org"));
    }

    #[tokio::test]
    async fn unknown_relying_party_is_no_content() {
        let harness = registered();
        let uri = query(&[
            ("username", "alice"),
            ("password", "wonderland"),
            ("entityId", "https://unknown.example/sp"),
        ]);

        let (status, body) = get(harness.state, uri).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
        assert!(
            harness
                .audit
                .events()
                .iter()
                .all(|e| e.event_type != EventType::AssertionIssued)
        );
    }

    #[tokio::test]
    async fn missing_metadata_is_no_content() {
        let harness = harness(
            vec![RelyingPartyDescriptor::new(SP_ENTITY_ID)],
            InMemoryMetadataResolver::new(),
        );
        let uri = query(&[
            ("username", "alice"),
            ("password", "wonderland"),
            ("entityId", SP_ENTITY_ID),
        ]);

        let (status, _) = get(harness.state, uri).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn bad_credentials_are_escaped_client_error() {
        let harness = registered();
        let uri = query(&[
            ("username", "mallory"),
            ("password", "guess"),
            ("entityId", SP_ENTITY_ID),
        ]);

        let (status, body) = get(harness.state, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("&lt;mallory&gt;"));
        assert!(!body.contains('<'));

        let events = harness.audit.events();
        let refusal = events
            .iter()
            .find(|e| e.event_type == EventType::IssuanceError)
            .unwrap();
        assert_eq!(refusal.outcome, EventOutcome::Failure);
        assert!(events.iter().all(|e| e.event_type != EventType::AssertionIssued));
    }

    #[tokio::test]
    async fn credentials_checked_before_metadata() {
        let harness = harness(
            vec![RelyingPartyDescriptor::new(SP_ENTITY_ID)],
            InMemoryMetadataResolver::new(),
        );
        let uri = query(&[
            ("username", "mallory"),
            ("password", "guess"),
            ("entityId", SP_ENTITY_ID),
        ]);

        let (status, _) = get(harness.state.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(harness.state.metadata.stats().fetches, 0);
    }

    #[tokio::test]
    async fn disabled_relying_party_is_client_error() {
        let mut descriptor = RelyingPartyDescriptor::new(SP_ENTITY_ID);
        descriptor.enabled = false;
        let harness = harness(
            vec![descriptor],
            InMemoryMetadataResolver::new().with_relying_party(sp_facade()),
        );
        let uri = query(&[
            ("username", "alice"),
            ("password", "wonderland"),
            ("entityId", SP_ENTITY_ID),
        ]);

        let (status, body) = get(harness.state, uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("access denied"));
    }

    #[tokio::test]
    async fn missing_entity_id_is_client_error() {
        let harness = registered();
        let (status, body) = get(harness.state, query(&[("username", "alice")])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("entityId parameter required"));
    }

    #[tokio::test]
    async fn malformed_json_is_client_error() {
        let harness = registered();
        let response = issuance_router(harness.state)
            .oneshot(
                Request::post(PATH)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
