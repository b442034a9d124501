//! Authentication plane for the Gatehouse MCP gateway
//!
//! Covers symmetric encryption of secrets at rest, JWT mint/verify, and the
//! OAuth 2.1 authorization-code flow with PKCE S256 against registered
//! providers.

pub mod crypto;
pub mod error;
pub mod jwt;
pub mod oauth;
pub mod pkce;

pub use crypto::{hash_password, verify_password, SecretCipher};
pub use error::{AuthError, AuthResult};
pub use jwt::{Claims, TokenSigner};
pub use oauth::{AuthService, NewProvider, Principal, ProviderSummary};
