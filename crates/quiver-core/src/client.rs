//! Signed HTTP client
//!
//! Every request carries the installation's public key as `Authorization`
//! and the maintainer email. Privileged requests additionally carry an
//! RSA-PSS signature over the request URL in `X-Signature`; bodies are
//! never signed.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    Method, Response,
};
use serde::Serialize;

use crate::{
    config::ConfigStore,
    error::{Error, Result},
    keystore::KeyPair,
    paths::Paths,
};

pub const SIGNATURE_HEADER: &str = "x-signature";
pub const MAINTAINER_EMAIL_HEADER: &str = "x-maintainer-email";

/// HTTP client that authenticates every request with the installation's
/// keypair.
pub struct SignedClient {
    http: reqwest::Client,
    keys: KeyPair,
    email: String,
}

impl SignedClient {
    /// Construction fails with a configuration error when either key file
    /// is missing; run [`crate::keystore::ensure_keypair`] first.
    pub fn new(paths: &Paths, config: &ConfigStore) -> Result<Self> {
        let keys = KeyPair::load(paths)?;
        let email = config.get_str("app.email").unwrap_or_default();
        Ok(Self {
            http: reqwest::Client::new(),
            keys,
            email,
        })
    }

    /// Generic request entry point; every verb helper forwards here.
    pub async fn send(&self, method: Method, url: &str, privileged: bool) -> Result<Response> {
        Ok(self.builder(method, url, privileged)?.send().await?)
    }

    pub async fn get(&self, url: &str) -> Result<Response> {
        self.send(Method::GET, url, false).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &T,
        privileged: bool,
    ) -> Result<Response> {
        Ok(self
            .builder(Method::POST, url, privileged)?
            .json(body)
            .send()
            .await?)
    }

    pub async fn post_multipart(
        &self,
        url: &str,
        form: reqwest::multipart::Form,
        privileged: bool,
    ) -> Result<Response> {
        Ok(self
            .builder(Method::POST, url, privileged)?
            .multipart(form)
            .send()
            .await?)
    }

    fn builder(
        &self,
        method: Method,
        url: &str,
        privileged: bool,
    ) -> Result<reqwest::RequestBuilder> {
        Ok(self
            .http
            .request(method, url)
            .headers(self.headers(url, privileged)?))
    }

    fn headers(&self, url: &str, privileged: bool) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(self.keys.public_key())?);
        headers.insert(MAINTAINER_EMAIL_HEADER, header_value(&self.email)?);
        if privileged {
            let signature = BASE64.encode(self.keys.sign(url.as_bytes())?);
            headers.insert(SIGNATURE_HEADER, header_value(&signature)?);
        }
        Ok(headers)
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| Error::Configuration(format!("invalid header value: {e}")))
}
