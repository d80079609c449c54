pub mod middleware;
pub mod server;
pub mod webhook;
