//! Storage: password-grant token exchange, then one authenticated upload.
//!
//! The token is fetched fresh for every run and consumed by the single
//! upload that follows it; it is never cached or refreshed.

use crate::client::ServiceClient;
use crate::error::PipelineError;
use crate::output::UploadReceipt;
use crate::protocol::{TokenRequest, TokenResponse, UploadRecord, UploadResponse};
use std::fmt;
use tracing::{info, warn};

/// Success sentinel in the data service's `result` field.
const RESULT_OK: &str = "ok";

/// Token type assumed when the auth service omits it.
const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Bearer credentials for one upload.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthToken {
    token_type: String,
    access_token: String,
}

impl AuthToken {
    pub fn new(token_type: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            token_type: token_type.into(),
            access_token: access_token.into(),
        }
    }

    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Value of the `Authorization` header, e.g. `Bearer abc123`.
    pub fn authorization(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl fmt::Debug for AuthToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthToken")
            .field("token_type", &self.token_type)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Client for the token endpoint.
#[derive(Debug, Clone)]
pub struct Authenticator {
    client: ServiceClient,
    base_url: String,
}

impl Authenticator {
    pub fn new(client: ServiceClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Exchange `user`/`password` for a token valid for `scope`.
    ///
    /// A response without `access_token` is a failure even on HTTP 200, and
    /// so is a non-success status.
    pub async fn authenticate(
        &self,
        user: &str,
        password: &str,
        scope: &str,
    ) -> Result<AuthToken, PipelineError> {
        let url = format!("{}/token", self.base_url);
        let form = TokenRequest::password_grant(user, password, scope);

        let response: TokenResponse = match self.client.post_form("auth", &url, &form).await {
            Ok(r) => r,
            Err(PipelineError::HttpStatus { status, body, .. }) => {
                return Err(PipelineError::AuthFailed {
                    user: user.to_string(),
                    detail: format!("HTTP {status}: {body}"),
                })
            }
            Err(e) => return Err(e),
        };

        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::AuthFailed {
                user: user.to_string(),
                detail: "response carries no access_token".into(),
            })?;

        let token_type = response.token_type.unwrap_or_else(|| {
            warn!("Token response has no token_type; assuming {}", DEFAULT_TOKEN_TYPE);
            DEFAULT_TOKEN_TYPE.to_string()
        });

        info!("User token obtained");
        Ok(AuthToken::new(token_type, access_token))
    }
}

/// Client for the document creation endpoint.
#[derive(Debug, Clone)]
pub struct Uploader {
    client: ServiceClient,
    base_url: String,
}

impl Uploader {
    pub fn new(client: ServiceClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Store `record`, spending `token` on the request.
    pub async fn upload(
        &self,
        token: AuthToken,
        record: &UploadRecord,
    ) -> Result<UploadReceipt, PipelineError> {
        let url = format!("{}/create", self.base_url);
        let authorization = token.authorization();
        drop(token);

        let response: UploadResponse = self
            .client
            .post_json("data", &url, record, Some(&authorization))
            .await?;

        if response.result != RESULT_OK {
            return Err(PipelineError::UploadFailed {
                result: response.result,
            });
        }

        let hash = response
            .hash
            .filter(|h| !h.is_empty())
            .ok_or_else(|| PipelineError::InvalidResponse {
                service: "data",
                detail: "result is ok but no hash was returned".into(),
            })?;

        let receipt = UploadReceipt {
            url: format!("{}/hash/{}", self.base_url, hash),
            hash,
        };
        info!("Upload succeeded");
        info!("Hash: {}", receipt.hash);
        info!("URL : {}", receipt.url);
        Ok(receipt)
    }
}
