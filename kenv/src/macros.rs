//! Macros for environment error handling.
//!
//! Provides convenience macros for creating and returning [`crate::error::EnvError`]
//! instances with reduced boilerplate for common error handling patterns.

/// Creates an [`crate::error::EnvError`] from error kind and description.
///
/// Accepts either a static description or a static description plus dynamic
/// detail (typically the identity of the owning resource).
#[macro_export]
macro_rules! env_error {
    ($kind:expr, $desc:expr) => {
        EnvError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        EnvError::from(($kind, $desc, $detail.to_string()))
    };
}

/// Creates and returns an [`crate::error::EnvError`] from the current function.
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return Err($crate::env_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return Err($crate::env_error!($kind, $desc, $detail))
    };
}
