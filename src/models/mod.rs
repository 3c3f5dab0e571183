//! Data models for the fleet dashboard.
//!
//! Wire names match the remote fleet API (`_id` identifiers, camelCase fields).

mod bus;
mod driver;
mod stop;

pub use bus::*;
pub use driver::*;
pub use stop::*;
