//! Client-side state layer for the dental clinic portals.
//!
//! Stores mirror backend collections (appointments, notifications,
//! payments), the reconciliation workflow keeps them consistent after a
//! notification action, and the payment flow drives the record/edit modal.

pub mod api;
pub mod config;
pub mod error;
pub mod model;
pub mod notice;
pub mod payment_flow;
pub mod reconcile;
pub mod session;
pub mod store;

pub use error::{ClientError, ClientResult};
