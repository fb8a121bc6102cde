//! Shared fixtures for unit tests.

use std::sync::Arc;

use aws_lc_rs::aead::{AES_256_GCM, Aad, LessSafeKey, NONCE_LEN, Nonce, UnboundKey};
use aws_lc_rs::encoding::AsDer;
use aws_lc_rs::rsa::{
    KeySize, OAEP_SHA256_MGF1SHA256, OaepPrivateDecryptingKey, PrivateDecryptingKey,
};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use sso_core::{AuditSink, Event};

use crate::context::AuthenticatedAssertionContext;
use crate::metadata::{AcsEndpoint, TrustFacade};
use crate::types::{EncryptedData, SamlBinding};

pub const SP_ENTITY_ID: &str = "https://sp.example/acs";
pub const IDP_ENTITY_ID: &str = "https://idp.example/idp";

/// Audit sink that keeps every event.
#[derive(Default)]
pub struct RecordingAuditSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingAuditSink {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, event: &Event) {
        self.events.lock().push(event.clone());
    }
}

pub fn recording_sink() -> Arc<RecordingAuditSink> {
    Arc::new(RecordingAuditSink::default())
}

pub fn alice() -> AuthenticatedAssertionContext {
    AuthenticatedAssertionContext::new(
        "alice",
        vec![("email".to_string(), vec!["alice@example.org".to_string()])],
    )
    .unwrap()
}

pub fn sp_facade() -> TrustFacade {
    TrustFacade::new(SP_ENTITY_ID)
        .with_acs(AcsEndpoint::new(SP_ENTITY_ID, SamlBinding::HttpPost))
}

pub fn recipient_key() -> (PrivateDecryptingKey, Vec<u8>) {
    let private = PrivateDecryptingKey::generate(KeySize::Rsa2048).unwrap();
    let spki = private.public_key().as_der().unwrap().as_ref().to_vec();
    (private, spki)
}

pub fn decrypt(private: PrivateDecryptingKey, data: &EncryptedData) -> String {
    let wrapped = STANDARD.decode(&data.encrypted_key.cipher_value).unwrap();
    let oaep = OaepPrivateDecryptingKey::new(private).unwrap();
    let mut key_buf = vec![0u8; oaep.min_output_size()];
    let content_key = oaep
        .decrypt(&OAEP_SHA256_MGF1SHA256, &wrapped, &mut key_buf, None)
        .unwrap()
        .to_vec();

    let sealed = STANDARD.decode(&data.cipher_value).unwrap();
    let key = LessSafeKey::new(UnboundKey::new(&AES_256_GCM, &content_key).unwrap());
    let (iv, body) = sealed.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(iv).unwrap();
    let mut in_out = body.to_vec();
    let plaintext = key.open_in_place(nonce, Aad::empty(), &mut in_out).unwrap();
    String::from_utf8(plaintext.to_vec()).unwrap()
}

pub fn input<'a>(
    request: &'a crate::context::IssuanceRequestContext,
    principal: &'a AuthenticatedAssertionContext,
    descriptor: &'a crate::context::RelyingPartyDescriptor,
    facade: &'a TrustFacade,
) -> crate::profile::BuildInput<'a> {
    crate::profile::BuildInput {
        request,
        principal,
        descriptor,
        facade,
        binding: SamlBinding::HttpPost,
        issue_instant: chrono::Utc::now(),
    }
}
