//! Networking module
//!
//! The world never encodes bytes itself. It builds notification values and
//! hands them to a client session's transport:
//! - Notification values for the connection layer to serialize
//! - Transport trait and its channel-backed and disconnected implementations
//! - Client sessions and the creatures they drive

pub mod message;
pub mod session;
pub mod transport;
