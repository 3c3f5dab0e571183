//! Remote fleet API: endpoint catalogue and HTTP transport.

mod client;
mod endpoints;

pub use client::*;
pub use endpoints::*;
