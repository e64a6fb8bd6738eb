//! HTTP client for the GemNet auth API and the collaborator traits the
//! validator and the registration flow are written against.

use reqwest::{multipart, Client, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use tracing::{debug, instrument};
use ulid::Ulid;
use url::Url;

use super::config::GateConfig;
use super::error::sanitize_body;
use super::registration::{ImageKind, ImageUpload, NicVerificationData, PersonalInfo};
use super::{Error, Result};
use crate::APP_USER_AGENT;

pub const VALIDATE_TOKEN_PATH: &str = "/api/auth/validate-token";
pub const LOGIN_PATH: &str = "/api/auth/login";
pub const REGISTER_PATH: &str = "/api/auth/register";
pub const VERIFY_FACE_PATH: &str = "/api/auth/verify-face";
pub const VERIFY_NIC_PATH: &str = "/api/auth/verify-nic";

const REQUEST_ID_HEADER: &str = "X-Request-Id";

/// Envelope every endpoint answers with.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiResponse<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_data(self, fallback: &str) -> Result<T> {
        match self.data {
            Some(data) if self.success => Ok(data),
            _ => Err(Error::Rejected(non_empty_or(self.message, fallback))),
        }
    }
}

fn non_empty_or(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        sanitize_body(&message)
    }
}

/// `data` of a successful login.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginData {
    pub token: String,
    pub user_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub verification_status: Option<String>,
    pub role: String,
}

/// Remote check that the backend still honours a bearer token.
pub trait TokenIntrospector: Send + Sync {
    /// `Ok(())` only for a 2xx answer.
    fn validate_token(&self, token: &SecretString) -> impl Future<Output = Result<()>> + Send;
}

/// The registration and verification endpoints.
pub trait IdentityApi: Send + Sync {
    /// Returns the new user's id.
    fn register(&self, info: &PersonalInfo) -> impl Future<Output = Result<String>> + Send;

    fn verify_face(
        &self,
        user_id: &str,
        image: &ImageUpload,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Returns the parsed envelope for any answer with a JSON body, including
    /// non-2xx ones. Only transport failures are errors.
    fn verify_nic(
        &self,
        user_id: &str,
        image: &ImageUpload,
    ) -> impl Future<Output = Result<ApiResponse<NicVerificationData>>> + Send;
}

#[derive(Clone, Debug)]
pub struct ApiClient {
    http: Client,
    config: GateConfig,
}

impl ApiClient {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: GateConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|err| Error::Config(format!("failed to build HTTP client: {err}")))?;
        Ok(Self { http, config })
    }

    #[must_use]
    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    fn endpoint_for_user(&self, path: &str, user_id: &str) -> Result<Url> {
        let mut url = self.config.endpoint(path)?;
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("cannot append user id to {path}")))?
            .push(user_id);
        Ok(url)
    }

    /// # Errors
    /// Returns [`Error::Rejected`] when the backend refuses the credentials, or
    /// the transport error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<LoginData> {
        let url = self.config.endpoint(LOGIN_PATH)?;
        let response = self
            .http
            .post(url)
            .header(REQUEST_ID_HEADER, Ulid::new().to_string())
            .json(&json!({
                "email": email,
                "password": password.expose_secret(),
            }))
            .send()
            .await?;

        envelope::<LoginData>(response)
            .await?
            .into_data("Login failed")
    }
}

async fn envelope<T: DeserializeOwned>(response: Response) -> Result<ApiResponse<T>> {
    let status = response.status();
    let body = response.text().await?;
    debug!("response status: {status}");

    match serde_json::from_str::<ApiResponse<T>>(&body) {
        Ok(envelope) => Ok(envelope),
        Err(_) if !status.is_success() => Err(Error::Http {
            status: status.as_u16(),
            message: sanitize_body(&body),
        }),
        Err(err) => Err(Error::Parse(format!("unexpected response body: {err}"))),
    }
}

fn image_form(kind: ImageKind, image: &ImageUpload) -> Result<multipart::Form> {
    let part = multipart::Part::bytes(image.bytes.clone())
        .file_name(image.file_name.clone())
        .mime_str(&image.content_type)?;
    Ok(multipart::Form::new().part(kind.field_name(), part))
}

impl TokenIntrospector for ApiClient {
    #[instrument(skip_all)]
    async fn validate_token(&self, token: &SecretString) -> Result<()> {
        let url = self.config.endpoint(VALIDATE_TOKEN_PATH)?;
        let response = self
            .http
            .post(url)
            .timeout(self.config.introspection_timeout())
            .bearer_auth(token.expose_secret())
            .header(REQUEST_ID_HEADER, Ulid::new().to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(Error::Http {
            status: status.as_u16(),
            message: sanitize_body(&body),
        })
    }
}

impl IdentityApi for ApiClient {
    #[instrument(skip_all, fields(email = %info.email))]
    async fn register(&self, info: &PersonalInfo) -> Result<String> {
        let url = self.config.endpoint(REGISTER_PATH)?;
        let response = self
            .http
            .post(url)
            .header(REQUEST_ID_HEADER, Ulid::new().to_string())
            .json(info)
            .send()
            .await?;

        envelope::<String>(response)
            .await?
            .into_data("Registration failed")
    }

    #[instrument(skip(self, image))]
    async fn verify_face(&self, user_id: &str, image: &ImageUpload) -> Result<()> {
        let url = self.endpoint_for_user(VERIFY_FACE_PATH, user_id)?;
        let form = image_form(ImageKind::Face, image)?;
        let response = self
            .http
            .post(url)
            .header(REQUEST_ID_HEADER, Ulid::new().to_string())
            .multipart(form)
            .send()
            .await?;

        let envelope = envelope::<Value>(response).await?;
        if envelope.success {
            Ok(())
        } else {
            Err(Error::Rejected(non_empty_or(
                envelope.message,
                "Face verification failed",
            )))
        }
    }

    #[instrument(skip(self, image))]
    async fn verify_nic(
        &self,
        user_id: &str,
        image: &ImageUpload,
    ) -> Result<ApiResponse<NicVerificationData>> {
        let url = self.endpoint_for_user(VERIFY_NIC_PATH, user_id)?;
        let form = image_form(ImageKind::Nic, image)?;
        let response = self
            .http
            .post(url)
            .header(REQUEST_ID_HEADER, Ulid::new().to_string())
            .multipart(form)
            .send()
            .await?;

        envelope(response).await
    }
}
