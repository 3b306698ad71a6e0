//! Wallet challenge/response authentication, session tokens and access tiers.

pub mod challenge;
pub mod message;
pub mod middleware;
pub mod nonce;
pub mod policy;
pub mod session;
pub mod verify;

pub use challenge::Authenticator;
pub use middleware::{AppState, AuthSession, Backends, HolderSession, MemberSession};
pub use nonce::NonceRegistry;
pub use session::SessionManager;
pub use verify::{Eip191Verifier, SignatureVerifier};
