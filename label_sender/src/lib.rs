//! Clients of the relay: a prediction sender and a command poller.
pub mod client;
pub mod poller;
pub mod throttle;
