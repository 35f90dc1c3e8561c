//! Session authentication for the LocalPerks backend
//!
//! Credentials are exchanged once for an access/refresh token pair; after
//! that the gateway keeps the pair fresh on its own.

pub mod session;
pub mod tokens;

pub use session::{login, logout, status};
pub use tokens::{MemoryTokenStore, TokenPair, TokenStore};
