pub mod client;
pub mod error;
pub mod models;

pub use client::{Client, DEFAULT_HOST};
pub use error::ApiError;
pub use models::{AuthResponse, Coffee, Ingredient};
