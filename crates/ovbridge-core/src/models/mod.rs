//! Data models for OVBridge

mod alert;
mod session;

pub use alert::*;
pub use session::*;
