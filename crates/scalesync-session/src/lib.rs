//! Recipe sync sessions with a kitchen scale.
//!
//! This crate drives the scale's recipe protocol on top of a byte transport:
//! - [`SessionMachine`]: the sans-I/O state machine (handshake, transfers, pacing, timeouts)
//! - [`Session`] / [`SessionHandle`]: an async actor that runs the machine on its own task
//! - [`Transport`]: the outbound seam, with [`MemoryTransport`] for tests
//!
//! # Example
//!
//! ```no_run
//! use scalesync_protocol::{Recipe, Step};
//! use scalesync_session::{memory_link, Session, SessionConfig};
//!
//! # async fn demo() -> scalesync_session::SessionResult<()> {
//! let (transport, events, _scale) = memory_link(64);
//! let (handle, _task) = Session::spawn(SessionConfig::default(), transport, events);
//!
//! let soup = Recipe::new("Soup", vec![Step::weighted("Water", "500")]);
//! handle.request_add(soup).await?;
//! println!("{:?}", handle.current_recipe_list());
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod event;
mod machine;
mod session;
mod state;
mod transport;

pub use config::*;
pub use error::*;
pub use event::*;
pub use machine::*;
pub use session::*;
pub use state::*;
pub use transport::*;
