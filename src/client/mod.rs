//! Node role: register with a server and seal protected requests.

mod node;

pub use node::*;
