//! The remote API the client reconciles against: actix-web handlers over a
//! MongoDB store.

pub mod auth;
pub mod error;
pub mod routes;
pub mod store;

use crate::config::ServerConfig;
use auth::TokenIssuer;
use store::Store;

pub struct AppState {
    pub store: Store,
    pub tokens: TokenIssuer,
}

impl AppState {
    pub fn new(store: Store, config: &ServerConfig) -> Self {
        AppState {
            store,
            tokens: TokenIssuer::new(&config.secret_key, config.token_ttl_days),
        }
    }
}
