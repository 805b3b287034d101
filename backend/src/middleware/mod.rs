//! Request extractors

mod actor;

pub use actor::Actor;
