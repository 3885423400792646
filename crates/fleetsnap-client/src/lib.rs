//! Client for the container platform's management API, spoken over the
//! daemon's local unix socket.

pub mod api;
pub mod client;
#[doc(hidden)]
pub mod testing;
pub mod transport;

// Re-export the pieces consumers wire together
pub use api::{ContainerRef, ImageProperties, ImageRef, OperationRecord};
pub use client::DaemonClient;
pub use hyper::Method;
pub use transport::{Transport, UnixSocketTransport};
