//! HTTP features

use crate::Error;
use crate::consts;

pub use reqwest::Client;

/// Returns a default HTTP client builder.
pub fn builder() -> reqwest::ClientBuilder {
    reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::limited(5))
        .timeout(consts::HTTP_TIMEOUT)
        .user_agent(consts::HTTP_USER_AGENT)
}

/// Builds a default HTTP client.
///
/// # Errors
///
/// Returns an error if the TLS backend fails to initialize.
pub fn build_client() -> Result<Client, Error> {
    Ok(builder().build()?)
}
