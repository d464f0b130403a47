//! Connection identifiers, bearer credentials, and the sources that mint them.

pub mod client_credentials;
pub mod credential;
pub mod id;
pub mod secret;
pub mod source;

pub use client_credentials::*;
pub use credential::*;
pub use id::*;
pub use secret::*;
pub use source::*;
