//! Driver-to-bus assignment: exclusivity rules and the coordinator that
//! applies them.

mod coordinator;
mod exclusivity;

pub use coordinator::*;
pub use exclusivity::*;
