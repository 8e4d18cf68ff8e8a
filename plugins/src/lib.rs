//! # sweepr-plugins
//!
//! The auxiliary-tool side of the engine. Everything that touches an
//! external program or a live service sits behind a trait here so the core
//! can be driven by fakes in tests:
//!
//! * **[`runner`]**: [`ToolRunner`] and the shell-backed [`ProcessToolRunner`].
//! * **[`probe`]**: [`ContentProbe`] and the reqwest-backed [`HttpProbe`].
//! * **[`process`]**: Spawning with capture, deadline and kill-on-drop.
//! * **[`artifact`]**: Collision-free output paths.
//! * **[`findings`]**: Findings read back from template-scanner output.
//! * **[`command`]**: Rule command template rendering.

pub mod artifact;
pub mod command;
pub mod findings;
pub mod probe;
pub mod process;
pub mod runner;

pub use artifact::{ArtifactAllocator, ArtifactPaths};
pub use probe::{ContentProbe, HttpProbe};
pub use runner::{ProcessToolRunner, ToolOutput, ToolRequest, ToolRunner};
