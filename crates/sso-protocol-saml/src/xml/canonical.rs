use xml_canonicalization::Canonicalizer;

use crate::error::{SamlError, SamlResult};

/// Canonicalizes a serialized element without comments.
///
/// Empty elements are expanded, attributes are ordered and redundant
/// namespace declarations are dropped. This is the form a verifier hashes
/// after applying the exclusive C14N transform.
///
/// # Errors
///
/// Returns [`SamlError::Serialization`] if the input is not well-formed.
pub fn canonicalize(xml: &str) -> SamlResult<String> {
    let mut output = Vec::new();
    Canonicalizer::read_from_str(xml)
        .write_to_writer(&mut output)
        .canonicalize(false)
        .map_err(|e| SamlError::Serialization(format!("XML canonicalization failed: {e}")))?;
    String::from_utf8(output).map_err(|e| SamlError::Serialization(e.to_string()))
}
