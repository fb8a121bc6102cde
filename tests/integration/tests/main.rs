//! End-to-end integration tests.
//!
//! Each test boots the issuance server on a free local port with a static
//! registry and drives it over HTTP.

mod common;
mod issuance;
