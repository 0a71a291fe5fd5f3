//! # Tracing Setup
//!
//! Structured logging for nodes, collections and workers. Log lines carry the
//! routing context as fields (`collection`, `resource_id`, `node`, `peer`,
//! `action`), so a single request can be followed across the nodes of an
//! in-process cluster.
//!
//! ## Levels
//!
//! - `info`: node and collection lifecycle, peers joining, created and deleted
//!   resources, reconciliation summaries.
//! - `debug`: every routing decision, dispatch and published topic.
//! - `warn`: failed handlers, ownership conflicts, unreachable peers and rules
//!   that could not be reconciled.
//!
//! Set `RUST_LOG` to choose, e.g. `RUST_LOG=resource_mesh=debug,info`.

/// Installs the global subscriber: `RUST_LOG` filtering, compact output, no targets.
pub fn setup_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false) // the structured fields already say where a line comes from
        .compact()
        .init();
}
