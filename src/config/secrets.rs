//! Secret handling.
//!
//! Database passwords and connection URLs carrying credentials are held as
//! `SecretString` so `Debug` output and logs show `[REDACTED]`.

pub use secrecy::{ExposeSecret, SecretString};
