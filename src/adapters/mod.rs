//! Adapters Layer
//!
//! Inbound servers that drive the application and outbound clients that
//! implement the domain ports.

pub mod inbound;
pub mod outbound;
