//! # onegate
//!
//! Single sign-on service for first-party web applications.
//!
//! Relying parties send the browser to `/auth` with a PKCE challenge. Once the
//! browser session is logged in, through a one-time link minted by the operator
//! CLI, the pending authorization is linked to the user and the browser returns to
//! the client with a single-use code. The client redeems the code at `/token` for
//! an ES256 signed `id_token`.
//!
//! Browser sessions are stateless HMAC cookies backed by a session row; client
//! secrets are stored as PHC strings.

pub mod cli;
pub mod jwt;
pub mod login;
pub mod oauth;
pub mod onegate;
pub mod secret;
pub mod session;
pub mod storage;
