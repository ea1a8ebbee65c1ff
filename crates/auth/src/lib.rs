//! `trellis-auth` — session tokens, token revocation and role-based access.
//!
//! This crate is intentionally decoupled from HTTP and storage: the blacklist
//! is a trait, and the access policy is parsed from a storage-neutral
//! [`trellis_core::ResultSet`].

pub mod authorize;
pub mod blacklist;
pub mod claims;
pub mod roles;
pub mod session;

pub use authorize::{AREA_WIDE, AccessController, AccessPolicy, AccessPolicyError};
pub use blacklist::{Blacklist, BlacklistError, InMemoryBlacklist};
pub use claims::{SessionClaims, TokenRejection};
pub use roles::Role;
pub use session::{SessionConfig, SessionError, SessionManager, SessionResult};
