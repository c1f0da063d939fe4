//! Issuer-keyed key-set cache and its refresh coordination.

pub mod entry;
pub mod gate;
pub mod manager;
