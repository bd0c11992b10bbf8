//! Server role: the agreement registry, the verifier in front of protected
//! requests, and the [`Authority`] that ties them to the server identity.

mod authority;
mod config;
mod registry;
mod replay;
mod snapshot;
mod verifier;

pub use authority::*;
pub use config::*;
pub use registry::*;
pub use replay::*;
pub use snapshot::*;
pub use verifier::*;
