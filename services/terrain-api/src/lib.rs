//! Terrain API service library.
//!
//! This module exposes the internal modules for testing purposes.

pub mod cleanup;
pub mod config;
pub mod handlers;
pub mod imaging;
pub mod metrics;
pub mod profile_graph;
pub mod routes;
pub mod state;
pub mod timing;
pub mod validation;
