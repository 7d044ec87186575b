//! Runtime plumbing: shutdown, OS signals and the status surface.

pub mod api;
pub mod shutdown;
pub mod signals;

pub use api::{health, Health, ServiceStatus};
pub use shutdown::ShutdownSignal;
