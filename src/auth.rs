//! Session credential models.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
