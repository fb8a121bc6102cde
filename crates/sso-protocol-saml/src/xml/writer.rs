use chrono::{DateTime, Utc};
use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::{SamlError, SamlResult};
use crate::signature::XmlSignature;
use crate::types::{
    Assertion, Attribute, AttributeStatement, AuthnStatement, Conditions, EncryptedAssertion,
    EncryptedData, SAML_NS, Subject, XMLDSIG_NS, XMLENC_NS, XMLENC11_NS,
    canonicalization_algorithms, transforms,
};

type XmlWriter = Writer<Vec<u8>>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// Formats an instant as an `xs:dateTime` in UTC with millisecond precision.
#[must_use]
pub fn format_instant(instant: &DateTime<Utc>) -> String {
    instant.format(TIMESTAMP_FORMAT).to_string()
}

/// Serializes an assertion, including its signature if present.
///
/// # Errors
///
/// Returns [`SamlError::Serialization`] if writing fails.
pub fn write_assertion(assertion: &Assertion) -> SamlResult<String> {
    let mut w = Writer::new(Vec::new());
    assertion_element(&mut w, assertion, true)?;
    into_string(w)
}

/// Serializes an assertion as if it carried no signature.
///
/// This is the octet stream an enveloped signature's reference digests.
///
/// # Errors
///
/// Returns [`SamlError::Serialization`] if writing fails.
pub fn write_unsigned_assertion(assertion: &Assertion) -> SamlResult<String> {
    let mut w = Writer::new(Vec::new());
    assertion_element(&mut w, assertion, false)?;
    into_string(w)
}

/// Serializes a standalone `<saml2:Attribute>`, the plaintext of an
/// `<saml2:EncryptedAttribute>`.
///
/// # Errors
///
/// Returns [`SamlError::Serialization`] if writing fails.
pub fn write_attribute(attribute: &Attribute) -> SamlResult<String> {
    let mut w = Writer::new(Vec::new());
    attribute_element(&mut w, attribute, true)?;
    into_string(w)
}

/// Serializes an `<saml2:EncryptedAssertion>`.
///
/// # Errors
///
/// Returns [`SamlError::Serialization`] if writing fails.
pub fn write_encrypted_assertion(encrypted: &EncryptedAssertion) -> SamlResult<String> {
    let mut w = Writer::new(Vec::new());
    let mut el = BytesStart::new("saml2:EncryptedAssertion");
    el.push_attribute(("xmlns:saml2", SAML_NS));
    start(&mut w, el)?;
    encrypted_data_element(&mut w, &encrypted.encrypted_data)?;
    end(&mut w, "saml2:EncryptedAssertion")?;
    into_string(w)
}

/// Serializes `<ds:SignedInfo>` for a signature.
///
/// The element declares the `ds` namespace itself so the same bytes are
/// produced standalone and inside `<ds:Signature>`.
///
/// # Errors
///
/// Returns [`SamlError::Serialization`] if writing fails.
pub fn write_signed_info(signature: &XmlSignature) -> SamlResult<String> {
    let mut w = Writer::new(Vec::new());
    signed_info_element(&mut w, signature)?;
    into_string(w)
}

fn into_string(w: XmlWriter) -> SamlResult<String> {
    String::from_utf8(w.into_inner()).map_err(|e| SamlError::Serialization(e.to_string()))
}

fn start(w: &mut XmlWriter, el: BytesStart<'_>) -> SamlResult<()> {
    w.write_event(Event::Start(el))?;
    Ok(())
}

fn end(w: &mut XmlWriter, name: &str) -> SamlResult<()> {
    w.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn empty(w: &mut XmlWriter, name: &str, attrs: &[(&str, &str)]) -> SamlResult<()> {
    let mut el = BytesStart::new(name);
    for attr in attrs {
        el.push_attribute(*attr);
    }
    w.write_event(Event::Empty(el))?;
    Ok(())
}

fn text_element(
    w: &mut XmlWriter,
    name: &str,
    attrs: &[(&str, &str)],
    text: &str,
) -> SamlResult<()> {
    let mut el = BytesStart::new(name);
    for attr in attrs {
        el.push_attribute(*attr);
    }
    start(w, el)?;
    w.write_event(Event::Text(BytesText::new(text)))?;
    end(w, name)
}

fn assertion_element(
    w: &mut XmlWriter,
    assertion: &Assertion,
    include_signature: bool,
) -> SamlResult<()> {
    let issue_instant = format_instant(&assertion.issue_instant);

    let mut el = BytesStart::new("saml2:Assertion");
    el.push_attribute(("xmlns:saml2", SAML_NS));
    el.push_attribute(("ID", assertion.id.as_str()));
    el.push_attribute(("IssueInstant", issue_instant.as_str()));
    el.push_attribute(("Version", assertion.version.as_str()));
    start(w, el)?;

    text_element(w, "saml2:Issuer", &[], &assertion.issuer)?;

    if include_signature {
        if let Some(signature) = &assertion.signature {
            signature_element(w, signature)?;
        }
    }
    if let Some(subject) = &assertion.subject {
        subject_element(w, subject)?;
    }
    if let Some(conditions) = &assertion.conditions {
        conditions_element(w, conditions)?;
    }
    if let Some(authn) = &assertion.authn_statement {
        authn_statement_element(w, authn)?;
    }
    if let Some(statement) = &assertion.attribute_statement {
        attribute_statement_element(w, statement)?;
    }

    end(w, "saml2:Assertion")
}

fn subject_element(w: &mut XmlWriter, subject: &Subject) -> SamlResult<()> {
    start(w, BytesStart::new("saml2:Subject"))?;

    if let Some(name_id) = &subject.name_id {
        let mut attrs = Vec::with_capacity(2);
        if let Some(format) = &name_id.format {
            attrs.push(("Format", format.as_str()));
        }
        if let Some(qualifier) = &name_id.sp_name_qualifier {
            attrs.push(("SPNameQualifier", qualifier.as_str()));
        }
        text_element(w, "saml2:NameID", &attrs, &name_id.value)?;
    }

    for confirmation in &subject.subject_confirmations {
        let mut el = BytesStart::new("saml2:SubjectConfirmation");
        el.push_attribute(("Method", confirmation.method.as_str()));
        start(w, el)?;

        if let Some(data) = &confirmation.subject_confirmation_data {
            let not_on_or_after = data.not_on_or_after.as_ref().map(format_instant);
            let mut attrs = Vec::with_capacity(4);
            if let Some(address) = &data.address {
                attrs.push(("Address", address.as_str()));
            }
            if let Some(in_response_to) = &data.in_response_to {
                attrs.push(("InResponseTo", in_response_to.as_str()));
            }
            if let Some(t) = &not_on_or_after {
                attrs.push(("NotOnOrAfter", t.as_str()));
            }
            if let Some(recipient) = &data.recipient {
                attrs.push(("Recipient", recipient.as_str()));
            }
            empty(w, "saml2:SubjectConfirmationData", &attrs)?;
        }

        end(w, "saml2:SubjectConfirmation")?;
    }

    end(w, "saml2:Subject")
}

fn conditions_element(w: &mut XmlWriter, conditions: &Conditions) -> SamlResult<()> {
    let not_before = conditions.not_before.as_ref().map(format_instant);
    let not_on_or_after = conditions.not_on_or_after.as_ref().map(format_instant);

    let mut el = BytesStart::new("saml2:Conditions");
    if let Some(t) = &not_before {
        el.push_attribute(("NotBefore", t.as_str()));
    }
    if let Some(t) = &not_on_or_after {
        el.push_attribute(("NotOnOrAfter", t.as_str()));
    }
    start(w, el)?;

    for restriction in &conditions.audience_restrictions {
        start(w, BytesStart::new("saml2:AudienceRestriction"))?;
        for audience in &restriction.audiences {
            text_element(w, "saml2:Audience", &[], audience)?;
        }
        end(w, "saml2:AudienceRestriction")?;
    }

    end(w, "saml2:Conditions")
}

fn authn_statement_element(w: &mut XmlWriter, statement: &AuthnStatement) -> SamlResult<()> {
    let authn_instant = format_instant(&statement.authn_instant);

    let mut el = BytesStart::new("saml2:AuthnStatement");
    el.push_attribute(("AuthnInstant", authn_instant.as_str()));
    if let Some(index) = &statement.session_index {
        el.push_attribute(("SessionIndex", index.as_str()));
    }
    start(w, el)?;

    if let Some(locality) = &statement.subject_locality {
        let attrs: Vec<(&str, &str)> = locality
            .address
            .iter()
            .map(|a| ("Address", a.as_str()))
            .collect();
        empty(w, "saml2:SubjectLocality", &attrs)?;
    }

    start(w, BytesStart::new("saml2:AuthnContext"))?;
    text_element(
        w,
        "saml2:AuthnContextClassRef",
        &[],
        &statement.authn_context_class_ref,
    )?;
    end(w, "saml2:AuthnContext")?;

    end(w, "saml2:AuthnStatement")
}

fn attribute_statement_element(
    w: &mut XmlWriter,
    statement: &AttributeStatement,
) -> SamlResult<()> {
    start(w, BytesStart::new("saml2:AttributeStatement"))?;
    for attribute in &statement.attributes {
        attribute_element(w, attribute, false)?;
    }
    for encrypted in &statement.encrypted_attributes {
        start(w, BytesStart::new("saml2:EncryptedAttribute"))?;
        encrypted_data_element(w, &encrypted.encrypted_data)?;
        end(w, "saml2:EncryptedAttribute")?;
    }
    end(w, "saml2:AttributeStatement")
}

fn attribute_element(w: &mut XmlWriter, attribute: &Attribute, declare_ns: bool) -> SamlResult<()> {
    let mut el = BytesStart::new("saml2:Attribute");
    if declare_ns {
        el.push_attribute(("xmlns:saml2", SAML_NS));
    }
    el.push_attribute(("Name", attribute.name.as_str()));
    if let Some(format) = &attribute.name_format {
        el.push_attribute(("NameFormat", format.as_str()));
    }
    start(w, el)?;

    for value in &attribute.values {
        text_element(w, "saml2:AttributeValue", &[], value)?;
    }

    end(w, "saml2:Attribute")
}

fn encrypted_data_element(w: &mut XmlWriter, data: &EncryptedData) -> SamlResult<()> {
    let mut el = BytesStart::new("xenc:EncryptedData");
    el.push_attribute(("xmlns:xenc", XMLENC_NS));
    el.push_attribute(("Type", EncryptedData::TYPE_ELEMENT));
    start(w, el)?;

    empty(
        w,
        "xenc:EncryptionMethod",
        &[("Algorithm", data.encryption_method.as_str())],
    )?;

    let mut key_info = BytesStart::new("ds:KeyInfo");
    key_info.push_attribute(("xmlns:ds", XMLDSIG_NS));
    start(w, key_info)?;

    let key = &data.encrypted_key;
    let mut encrypted_key = BytesStart::new("xenc:EncryptedKey");
    if let Some(recipient) = &key.recipient {
        encrypted_key.push_attribute(("Recipient", recipient.as_str()));
    }
    start(w, encrypted_key)?;

    let mut method = BytesStart::new("xenc:EncryptionMethod");
    method.push_attribute(("Algorithm", key.encryption_method.as_str()));
    start(w, method)?;
    empty(w, "ds:DigestMethod", &[("Algorithm", key.digest_method.as_str())])?;
    empty(
        w,
        "xenc11:MGF",
        &[("xmlns:xenc11", XMLENC11_NS), ("Algorithm", key.mgf.as_str())],
    )?;
    end(w, "xenc:EncryptionMethod")?;
    cipher_data(w, &key.cipher_value)?;

    end(w, "xenc:EncryptedKey")?;
    end(w, "ds:KeyInfo")?;

    cipher_data(w, &data.cipher_value)?;
    end(w, "xenc:EncryptedData")
}

fn cipher_data(w: &mut XmlWriter, cipher_value: &str) -> SamlResult<()> {
    start(w, BytesStart::new("xenc:CipherData"))?;
    text_element(w, "xenc:CipherValue", &[], cipher_value)?;
    end(w, "xenc:CipherData")
}

fn signature_element(w: &mut XmlWriter, signature: &XmlSignature) -> SamlResult<()> {
    let mut el = BytesStart::new("ds:Signature");
    el.push_attribute(("xmlns:ds", XMLDSIG_NS));
    start(w, el)?;

    signed_info_element(w, signature)?;
    text_element(w, "ds:SignatureValue", &[], &signature.signature_value)?;

    if let Some(cert) = &signature.x509_certificate {
        start(w, BytesStart::new("ds:KeyInfo"))?;
        start(w, BytesStart::new("ds:X509Data"))?;
        text_element(w, "ds:X509Certificate", &[], cert)?;
        end(w, "ds:X509Data")?;
        end(w, "ds:KeyInfo")?;
    }

    end(w, "ds:Signature")
}

fn signed_info_element(w: &mut XmlWriter, signature: &XmlSignature) -> SamlResult<()> {
    let mut el = BytesStart::new("ds:SignedInfo");
    el.push_attribute(("xmlns:ds", XMLDSIG_NS));
    start(w, el)?;

    empty(
        w,
        "ds:CanonicalizationMethod",
        &[("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N)],
    )?;
    empty(
        w,
        "ds:SignatureMethod",
        &[("Algorithm", signature.algorithm.uri())],
    )?;

    let mut reference = BytesStart::new("ds:Reference");
    reference.push_attribute(("URI", signature.reference_uri.as_str()));
    start(w, reference)?;

    start(w, BytesStart::new("ds:Transforms"))?;
    empty(
        w,
        "ds:Transform",
        &[("Algorithm", transforms::ENVELOPED_SIGNATURE)],
    )?;
    empty(
        w,
        "ds:Transform",
        &[("Algorithm", canonicalization_algorithms::EXCLUSIVE_C14N)],
    )?;
    end(w, "ds:Transforms")?;

    empty(
        w,
        "ds:DigestMethod",
        &[("Algorithm", signature.algorithm.digest_uri())],
    )?;
    text_element(w, "ds:DigestValue", &[], &signature.digest_value)?;

    end(w, "ds:Reference")?;
    end(w, "ds:SignedInfo")
}
