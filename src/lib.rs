pub mod config;
pub mod error;
pub mod keys;
pub mod providers;
pub mod proxy;
pub mod server;
pub mod translate;
pub mod wrapper;

pub use config::{ProxyConfig, Route};
pub use error::{GatewayError, Result};
pub use keys::KeyPool;
pub use server::{build_router, AppState};
