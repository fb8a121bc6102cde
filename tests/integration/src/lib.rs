//! End-to-end tests for the issuance server live under `tests/`.
