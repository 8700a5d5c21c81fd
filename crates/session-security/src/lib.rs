//! # Session Security
//!
//! Session token generation and client cookie descriptors.

pub mod token;
pub mod cookie;

pub use cookie::SessionCookie;
pub use token::{generate_session_token, is_well_formed};
