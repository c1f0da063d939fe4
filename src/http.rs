//! HTTP helpers for discovery and JWKS retrieval.

pub mod client;
pub mod discovery;
