//! Authorization code + PKCE endpoints.

pub mod authorize;
pub mod callback;
pub mod error;
pub mod token;

pub use authorize::{authorize_get, authorize_post, AuthorizeParams, LOGIN_PATH};
pub use callback::callback;
pub use error::{ErrorBody, OAuthError};
pub use token::{token, TokenRequest, TokenResponse};
