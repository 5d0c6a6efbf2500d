//! Network layer.
//!
//! - `connection`: blocking stream with a buffered reader
//! - `client`: discovery, typed calls and reply decoding
//! - `session`: one served client
//! - `server`: mio listener loop and shared server state

pub mod client;
pub mod connection;
pub mod server;
pub mod session;

pub use client::{Call, Client, ClientConfig, Response};
pub use connection::{Connection, Stream};
pub use server::{Server, ServerConfig, ServerContext, ServerHandle};
pub use session::{ListenerKind, SessionInfo};
