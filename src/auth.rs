//! Credential models: redacted secrets, access-token claims, and persisted session records.

pub mod claims;
pub mod secret;
pub mod session;

pub use claims::*;
pub use secret::*;
pub use session::*;
