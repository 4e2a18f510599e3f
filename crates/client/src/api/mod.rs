//! Backend API endpoints.

pub mod auth;

pub use auth::{AuthApi, LoginRequest, LoginResponse};
