//! JSON-RPC plumbing for tool servers
//!
//! This module turns a duplex byte stream into a request/response API plus
//! an initialize-then-discover handshake.
//!
//! # Module Layout
//!
//! - `types`     -- JSON-RPC 2.0 primitives and the tool-protocol surface
//! - `client`    -- Transport-agnostic correlation client and read loop
//! - `transport` -- `Transport` trait and implementations (stdio, HTTP, fake)
//! - `session`   -- Per-server session: pumps, handshake, `call_tool`

pub mod client;
pub mod session;
pub mod transport;
pub mod types;

pub use session::{SessionSettings, ToolSession};
pub use types::ToolDescriptor;
