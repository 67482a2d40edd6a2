//! Frontend-facing control contract, router and stdio bridge.

pub mod channel;
pub mod contract;
pub mod handler;
pub mod stdio;
