pub mod auth;
pub mod events;
pub mod health;
pub mod invoke;
pub mod stream;
