//! Credential models carried by the pipeline and stores.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
