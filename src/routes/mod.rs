pub mod auth;
pub mod geo;
pub mod health;
pub mod memory;
