//! Core types shared by the node and server roles.
//!
//! Constants, error types, node identifiers and boundary messages.

mod constants;
mod error;
mod messages;
mod node_id;

pub use constants::*;
pub use error::*;
pub use messages::*;
pub use node_id::*;
