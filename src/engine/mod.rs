//! Engine module: the host-facing bridge, its worker thread and event delivery

mod bridge;
mod builder;
mod delivery;
mod worker;

pub use bridge::LlmBridge;
pub use builder::BridgeBuilder;
pub use delivery::{deliver, HostChannel};
