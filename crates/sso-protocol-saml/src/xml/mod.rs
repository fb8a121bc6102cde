//! Wire serialization of the assertion model.
//!
//! Output carries no insignificant whitespace and a fixed attribute order,
//! so the same assertion always produces the same bytes. Anything that is
//! digested or signed goes through [`canonicalize`] first.

mod canonical;
mod writer;

pub use canonical::canonicalize;
pub use writer::{
    format_instant, write_assertion, write_attribute, write_encrypted_assertion,
    write_signed_info, write_unsigned_assertion,
};
