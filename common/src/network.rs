pub mod range;
pub mod target;
