//! Runner for scale recipe sync.
//!
//! Connects [`scalesync_session`] to the outside world:
//! - [`TcpTransport`]: the scale's serial link reached through a TCP bridge
//! - [`ScaleClient`]: a session over that transport, ready to use once connected
//! - [`ScaleEmulator`]: a TCP server that behaves like the scale
//! - [`RunnerConfig`]: YAML configuration for the `scalesync` binary

pub mod client;
pub mod config;
pub mod emulator;
pub mod error;
pub mod tcp_transport;

pub use client::ScaleClient;
pub use config::{load_recipe, load_recipes, RunnerConfig, DEFAULT_ADDRESS};
pub use emulator::{ScaleEmulator, ScaleModel};
pub use error::{RunnerError, RunnerResult};
pub use tcp_transport::TcpTransport;
