//! Routing module
//!
//! Regex route table consulted by the dispatcher for every request.

mod table;

pub use table::{RouteMatch, RouteTable};
