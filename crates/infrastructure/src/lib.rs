pub mod database;
pub mod error_handling;
pub mod senders;

pub use database::*;
pub use senders::TracingChannelSender;
