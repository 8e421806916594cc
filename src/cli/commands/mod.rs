pub mod auth;

// Re-export the auth command surface
pub use auth::{AuthCommands, auth_command};
