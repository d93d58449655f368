// Authentication module
// Registration, login, token rotation and request-time identity resolution

pub mod cookies;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod service;
pub mod token;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use cookies::SessionCookies;
pub use error::AuthError;
pub use handlers::{
    change_password_handler, current_user_handler, login_handler, logout_handler,
    refresh_handler, register_handler, update_avatar_handler,
};
pub use middleware::{require_auth, AuthenticatedUser};
pub use models::{
    AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, TokenPair,
    User, UserResponse,
};
pub use password::PasswordService;
pub use repository::{DynUserStore, InMemoryUserStore, PgUserStore, UserStore};
pub use service::AuthService;
pub use token::TokenService;
