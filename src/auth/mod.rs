use axum::Router;

use crate::state::AppState;

mod claims;
mod dto;
pub mod extractors;
pub mod handlers;
pub mod jwt;
pub mod password;
pub(crate) mod validate;

pub use claims::Claims;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
