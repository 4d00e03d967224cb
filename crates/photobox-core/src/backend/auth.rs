//! Identity provider endpoints (`/auth/v1`).

use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    BackendConfig, BackendError, BackendResult, classify_reqwest_error, error_from_response,
};

/// User record as returned by the identity provider.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Linked identities. An empty list on sign-up means the address was
    /// already registered and the provider silently accepted the request.
    #[serde(default)]
    pub identities: Option<Vec<Value>>,
    #[serde(default)]
    pub confirmation_sent_at: Option<String>,
}

/// Password grant response. Every field is optional so callers can tell a
/// malformed 2xx apart from a missing token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignInResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<AuthUser>,
}

/// Sign-up response: a bare user when confirmation is required, or a full
/// session when the project auto-confirms.
#[derive(Debug, Clone, Default)]
pub struct SignUpResponse {
    pub user: Option<AuthUser>,
    pub session: Option<SignInResponse>,
}

impl SignUpResponse {
    fn from_value(value: Value) -> BackendResult<Self> {
        if value.get("access_token").is_some() {
            let session: SignInResponse = serde_json::from_value(value)
                .map_err(|e| BackendError::parse(format!("Invalid sign-up session: {e}")))?;
            return Ok(Self {
                user: session.user.clone(),
                session: Some(session),
            });
        }

        let user_value = match value.get("user") {
            Some(user) if !user.is_null() => user.clone(),
            Some(_) => return Ok(Self::default()),
            None if value.get("id").is_some() => value,
            None => return Ok(Self::default()),
        };
        let user: AuthUser = serde_json::from_value(user_value)
            .map_err(|e| BackendError::parse(format!("Invalid sign-up user: {e}")))?;
        Ok(Self {
            user: Some(user),
            session: None,
        })
    }
}

/// Client for the identity provider.
pub struct AuthApi {
    config: BackendConfig,
    http: reqwest::Client,
}

impl AuthApi {
    pub fn new(config: BackendConfig, http: reqwest::Client) -> Self {
        Self { config, http }
    }

    /// Password sign-in.
    ///
    /// # Errors
    /// Returns a `BackendError` on transport failure, non-2xx status, or an
    /// unparseable body.
    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> BackendResult<SignInResponse> {
        let url = format!("{}/auth/v1/token?grant_type=password", self.config.url);
        let response = self
            .http
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        serde_json::from_str(&body)
            .map_err(|e| BackendError::parse(format!("Invalid sign-in response: {e}")))
    }

    /// Registers a new account.
    ///
    /// # Errors
    /// Returns a `BackendError` on transport failure, non-2xx status, or an
    /// unparseable body.
    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        redirect_to: Option<&str>,
    ) -> BackendResult<SignUpResponse> {
        let url = format!("{}/auth/v1/signup", self.config.url);
        let mut request = self
            .http
            .post(&url)
            .header("apikey", &self.config.anon_key)
            .json(&json!({ "email": email, "password": password }));
        if let Some(redirect) = redirect_to {
            request = request.query(&[("redirect_to", redirect)]);
        }

        let response = request.send().await.map_err(|e| classify_reqwest_error(&e))?;
        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;
        let value: Value = serde_json::from_str(&body)
            .map_err(|e| BackendError::parse(format!("Invalid sign-up response: {e}")))?;
        SignUpResponse::from_value(value)
    }

    /// Fetches the user owning `access_token`; fails with 401/403 once the
    /// token has expired or been revoked.
    ///
    /// # Errors
    /// Returns a `BackendError` on transport failure or non-2xx status.
    pub async fn get_user(&self, access_token: &str) -> BackendResult<AuthUser> {
        let url = format!("{}/auth/v1/user", self.config.url);
        let response = self
            .http
            .get(&url)
            .header("apikey", &self.config.anon_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&e))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::parse(format!("Invalid user response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_sign_up_response_bare_user() {
        let parsed = SignUpResponse::from_value(json!({
            "id": "u1",
            "email": "new@user.com",
            "identities": [{"provider": "email"}],
            "confirmation_sent_at": "2024-01-01T00:00:00Z"
        }))
        .unwrap();
        let user = parsed.user.unwrap();
        assert_eq!(user.id, "u1");
        assert!(user.confirmation_sent_at.is_some());
        assert!(parsed.session.is_none());
    }

    #[test]
    fn test_sign_up_response_with_session() {
        let parsed = SignUpResponse::from_value(json!({
            "access_token": "tok",
            "refresh_token": "ref",
            "user": {"id": "u2", "email": "a@b.co", "identities": [{}]}
        }))
        .unwrap();
        assert_eq!(parsed.user.unwrap().id, "u2");
        assert_eq!(parsed.session.unwrap().access_token.as_deref(), Some("tok"));
    }

    #[test]
    fn test_sign_up_response_null_user() {
        let parsed = SignUpResponse::from_value(json!({"user": null})).unwrap();
        assert!(parsed.user.is_none());
    }
}
