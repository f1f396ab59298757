pub mod api;
pub mod auth;
pub mod channel;
pub mod events;
pub mod models;
