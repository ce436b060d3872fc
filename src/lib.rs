//! House value prediction service.
//!
//! Request pipeline: [`types`] validates the payload, [`features`] reconciles it
//! into the model's fixed column layout, [`model`] scores it, [`store`] records
//! the result. [`aggregate`] computes the read-side summary views and
//! [`server`] wires everything behind axum routes.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod features;
pub mod model;
pub mod server;
pub mod store;
pub mod types;
