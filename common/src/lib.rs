//! Common code shared between `relay_server` and `label_sender`.
pub mod labels;
pub mod protocol;

/// Error type.
pub type Error = Box<dyn std::error::Error>;
