pub mod auth;
pub mod chat;
pub mod families;
pub mod health;
