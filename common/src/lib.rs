//! # sweepr-common
//!
//! Types shared by every sweepr crate:
//!
//! * **[`model`]**: The project aggregate (assets, hosts, services, proofs).
//! * **[`network`]**: Target expressions and IPv4 range arithmetic.
//! * **[`rules`]**: The automation rule table and re-run policy.
//! * **[`profile`]**: Scan profiles and their partition granularity.
//! * **[`config`]**: Engine configuration.
//! * **[`error`]**: The error taxonomy.

pub mod config;
pub mod error;
pub mod model;
pub mod naming;
pub mod network;
pub mod profile;
pub mod rules;

pub use error::{Error, Result};
