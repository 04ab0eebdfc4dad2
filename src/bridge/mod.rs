pub mod client;
pub mod commands;
pub mod host;
pub mod protocol;

pub use client::BridgeClient;
pub use host::Host;
