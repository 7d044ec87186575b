//! Infrastructure adapters: the process-backed session executor and roster files.

pub mod command;
pub mod roster;

pub use command::CommandSessionExecutor;
pub use roster::{load_roster, parse_roster};
