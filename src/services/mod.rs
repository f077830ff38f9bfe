pub mod auth_service;
pub mod notifier;

pub use auth_service::{AuthOutcome, AuthenticationService, PasswordResetRequested};

pub use notifier::{NoopNotifier, ResetNotifier};
