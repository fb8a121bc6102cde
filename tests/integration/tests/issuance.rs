//! Diagnostic issuance endpoint tests.

use crate::common::{
    SEALED_SP_ENTITY_ID, SP_ENTITY_ID, TestEnv, UNRESOLVABLE_SP_ENTITY_ID,
};

#[tokio::test]
async fn test_signed_assertion_for_registered_relying_party() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.issue("alice", "wonderland", SP_ENTITY_ID, false).await?;
    assert_eq!(response.status().as_u16(), 200);

    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    assert!(content_type.contains("xml"), "unexpected content type {content_type}");

    let body = response.text().await?;
    assert!(body.starts_with("<saml2:Assertion"));
    assert!(body.contains("<saml2:Issuer>https://idp.example/idp</saml2:Issuer>"));
    assert!(body.contains("<ds:SignatureValue>"), "assertion should be signed");
    assert!(body.contains("<saml2:AuthnStatement"));
    assert!(body.contains("<saml2:NameID"));
    assert!(body.contains(">alice</saml2:NameID>"));
    assert!(body.contains(&format!("<saml2:Audience>{SP_ENTITY_ID}</saml2:Audience>")));
    assert!(body.contains("alice@example.org"));
    assert!(!body.contains("4711"), "unreleased attribute leaked");

    Ok(())
}

#[tokio::test]
async fn test_post_json_body() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .client
        .post(env.diagnostic_url())
        .json(&serde_json::json!({
            "username": "alice",
            "password": "wonderland",
            "entityId": SP_ENTITY_ID
        }))
        .send()
        .await?;
    assert_eq!(response.status().as_u16(), 200);
    assert!(response.text().await?.contains("<saml2:Assertion"));

    Ok(())
}

#[tokio::test]
async fn test_encrypted_assertion() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.issue("alice", "wonderland", SEALED_SP_ENTITY_ID, true).await?;
    assert_eq!(response.status().as_u16(), 200);

    let body = response.text().await?;
    assert!(body.starts_with("<saml2:EncryptedAssertion"));
    assert!(body.contains("<xenc:CipherValue>"));
    assert!(!body.contains("alice@example.org"));

    Ok(())
}

#[tokio::test]
async fn test_unknown_relying_party_is_no_content() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .issue("alice", "wonderland", "https://unknown.example/sp", false)
        .await?;
    assert_eq!(response.status().as_u16(), 204);
    assert!(response.text().await?.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_missing_metadata_is_no_content() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env
        .issue("alice", "wonderland", UNRESOLVABLE_SP_ENTITY_ID, false)
        .await?;
    assert_eq!(response.status().as_u16(), 204);

    Ok(())
}

#[tokio::test]
async fn test_bad_credentials_are_client_error() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.issue("alice", "wrong", SP_ENTITY_ID, false).await?;
    assert_eq!(response.status().as_u16(), 400);
    let body = response.text().await?;
    assert!(body.contains("authentication failed"));
    assert!(!body.contains("Assertion"));

    let response = env
        .issue("<script>alert(1)</script>", "wonderland", SP_ENTITY_ID, false)
        .await?;
    assert_eq!(response.status().as_u16(), 400);
    let body = response.text().await?;
    assert!(body.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    assert!(!body.contains('<'));

    Ok(())
}

#[tokio::test]
async fn test_health() -> anyhow::Result<()> {
    let env = TestEnv::new().await?;

    let response = env.client.get(format!("{}/health", env.base_url)).send().await?;
    assert!(response.status().is_success());

    Ok(())
}
