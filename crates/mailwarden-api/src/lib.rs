//! MailWarden API - HTTP surface of the delivery engine
//!
//! Provider webhooks, recipient unsubscribe and tracking endpoints, health
//! and metrics, plus the API-key protected campaign actions.

pub mod auth;
pub mod handlers;
pub mod routes;

#[cfg(test)]
mod tests;

pub use auth::AppState;
pub use routes::create_router;
