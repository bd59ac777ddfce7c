//! OAuth2 authorization code flow with PKCE: client registrations, pending
//! authorizations and id token issuance.

pub mod authorization;
pub mod client;
pub mod id_token;
pub mod pkce;

pub use authorization::{AuthorizationError, AuthorizationStatus, Authorizations};
pub use client::{ClientDirectory, RegisteredClient, VerificationFailed};
pub use id_token::{IdTokenClaims, IdTokenSigner};
