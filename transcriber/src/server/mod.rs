//! TCP accept loop, per-connection message handling and the shared
//! server-wide state (transcriber, GPU semaphore, rate limiters).

mod auth;
mod connection;
mod context;
mod rate_limit;

pub use connection::handle_connection;
pub use context::ServerContext;
