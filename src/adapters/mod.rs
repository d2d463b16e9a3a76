//! Adapters
//!
//! Inbound: the HTTP API served to the dashboard host.
//! Outbound: the pmproxy `/series` client.

pub mod inbound;
pub mod outbound;
