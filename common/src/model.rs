//! Project data model: the aggregate scan results are merged into and
//! tool proofs and findings are attached to.

pub mod asset;
pub mod finding;
pub mod host;
pub mod project;
pub mod proof;
pub mod service;

pub use asset::{Asset, AssetKind};
pub use finding::{Finding, Severity};
pub use host::Host;
pub use project::Project;
pub use proof::Proof;
pub use service::{Protocol, Service, ServiceKey};
