//! SAML 2.0 assertion types.
//!
//! The object model the pipeline builds; [`crate::xml`] renders it.

mod assertion;
mod constants;
mod encrypted;
mod name_id;

pub use assertion::*;
pub use constants::*;
pub use encrypted::*;
pub use name_id::*;
