//! HTTP transport for the task API.

pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;
pub mod state;

pub use models::*;
pub use server::*;
pub use state::*;
