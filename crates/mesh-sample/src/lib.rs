//! # Mesh Sample
//!
//! A small task tracker on top of `resource-mesh`, exposed as a library for
//! the integration tests.

pub mod clients;
pub mod lifecycle;
pub mod model;
