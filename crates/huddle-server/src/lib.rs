pub mod proxy;
pub mod server;
pub mod session;

pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
