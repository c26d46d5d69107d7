//! Identity Toolkit REST client (email/password accounts).
//!
//! Endpoints used, all `POST {api_url}/accounts:{method}?key={api_key}`:
//! - `signUp`, `signInWithPassword`: return `idToken`, `localId`, `expiresIn`
//! - `lookup`: `{ users: [{ email, emailVerified, displayName, photoUrl }] }`
//! - `sendOobCode`: `VERIFY_EMAIL` (by token) and `PASSWORD_RESET` (by email)
//! - `update`: display name and photo URL

use crate::provider::{AuthGrant, AuthProvider, UserProfile, UserRecord};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracker_config_and_utils::{ProviderErrorCode, ValidationError};

/// REST client for the hosted identity service.
#[derive(Clone)]
pub struct IdentityToolkitClient {
    http_client: reqwest::Client,
    api_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    id_token: String,
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    expires_in: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct IdTokenRequest<'a> {
    id_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    #[serde(default)]
    users: Vec<AccountInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountInfo {
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
}

impl From<AccountInfo> for UserRecord {
    fn from(info: AccountInfo) -> Self {
        UserRecord {
            email: info.email,
            email_verified: info.email_verified,
            profile: UserProfile {
                display_name: info.display_name,
                photo_url: info.photo_url,
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OobCodeRequest<'a> {
    request_type: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateRequest<'a> {
    id_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    display_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    photo_url: Option<&'a str>,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
}

impl IdentityToolkitClient {
    /// Create a new client.
    ///
    /// # Arguments
    /// * `api_url` - Service base URL (e.g., `https://identitytoolkit.googleapis.com/v1`)
    /// * `api_key` - Public web API key of the project
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            api_url: api_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Build the URL of an `accounts:` method.
    fn accounts_url(&self, method: &str) -> String {
        format!("{}/accounts:{}?key={}", self.api_url, method, self.api_key)
    }

    async fn post<B, R>(&self, method: &str, body: &B) -> AuthResult<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .http_client
            .post(self.accounts_url(method))
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = error_from_body(&body);
            tracing::warn!(method, status = %status, kind = %error.kind(), "identity request rejected");
            return Err(error);
        }

        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| AuthError::Protocol(format!("{} response: {}", method, e)))
    }
}

#[async_trait]
impl AuthProvider for IdentityToolkitClient {
    async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthGrant> {
        tracing::debug!("Signing in with password");
        let response: TokenResponse = self
            .post(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(grant_from(response, Utc::now()))
    }

    async fn sign_up(&self, email: &str, password: &str) -> AuthResult<AuthGrant> {
        tracing::debug!("Creating account");
        let response: TokenResponse = self
            .post(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
            )
            .await?;
        Ok(grant_from(response, Utc::now()))
    }

    async fn lookup(&self, token: &str) -> AuthResult<UserRecord> {
        let response: LookupResponse = self
            .post("lookup", &IdTokenRequest { id_token: token })
            .await?;
        response
            .users
            .into_iter()
            .next()
            .map(UserRecord::from)
            .ok_or_else(|| AuthError::provider(ProviderErrorCode::ExpiredSession, "USER_NOT_FOUND"))
    }

    async fn send_verification_email(&self, token: &str) -> AuthResult<()> {
        let _: serde_json::Value = self
            .post(
                "sendOobCode",
                &OobCodeRequest {
                    request_type: "VERIFY_EMAIL",
                    id_token: Some(token),
                    email: None,
                },
            )
            .await?;
        Ok(())
    }

    async fn send_password_reset(&self, email: &str) -> AuthResult<()> {
        let _: serde_json::Value = self
            .post(
                "sendOobCode",
                &OobCodeRequest {
                    request_type: "PASSWORD_RESET",
                    id_token: None,
                    email: Some(email),
                },
            )
            .await?;
        Ok(())
    }

    async fn update_profile(&self, token: &str, profile: &UserProfile) -> AuthResult<UserRecord> {
        let _: serde_json::Value = self
            .post(
                "update",
                &UpdateRequest {
                    id_token: token,
                    display_name: profile.display_name.as_deref(),
                    photo_url: profile.photo_url.as_deref(),
                    return_secure_token: false,
                },
            )
            .await?;
        // The update response omits the verification flag; reload for a full record.
        self.lookup(token).await
    }
}

/// Map a provider error body (`{"error": {"message": "CODE : detail"}}`) to an [`AuthError`].
fn error_from_body(body: &str) -> AuthError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_default();
    map_error_message(&message)
}

fn map_error_message(message: &str) -> AuthError {
    let code = message
        .split(|c: char| c == ':' || c.is_whitespace())
        .next()
        .unwrap_or_default();

    match code {
        "INVALID_EMAIL" | "MISSING_EMAIL" => {
            AuthError::Validation(ValidationError::new("email", "Email address is invalid"))
        }
        "WEAK_PASSWORD" | "MISSING_PASSWORD" => AuthError::Validation(ValidationError::new(
            "password",
            "Password must be at least 6 characters",
        )),
        "EMAIL_EXISTS" => AuthError::provider(ProviderErrorCode::AlreadyExists, code),
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED" => {
            AuthError::provider(ProviderErrorCode::InvalidCredentials, code)
        }
        "TOO_MANY_ATTEMPTS_TRY_LATER" => AuthError::provider(ProviderErrorCode::RateLimited, code),
        "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "CREDENTIAL_TOO_OLD_LOGIN_AGAIN" => {
            AuthError::provider(ProviderErrorCode::ExpiredSession, code)
        }
        _ => AuthError::provider(ProviderErrorCode::Unknown, message),
    }
}

fn grant_from(response: TokenResponse, now: DateTime<Utc>) -> AuthGrant {
    let (issued_at, expires_at) = token_lifetime(&response.id_token, response.expires_in.as_deref(), now);
    AuthGrant {
        token: response.id_token,
        user_id: response.local_id,
        email: response.email,
        issued_at,
        expires_at,
    }
}

/// Issue and expiry times of an ID token.
///
/// Prefers the `iat`/`exp` claims of the JWT payload and falls back to
/// `now + expiresIn` when the token cannot be decoded.
fn token_lifetime(
    id_token: &str,
    expires_in: Option<&str>,
    now: DateTime<Utc>,
) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    let claims = id_token
        .split('.')
        .nth(1)
        .and_then(|payload| URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok())
        .and_then(|bytes| serde_json::from_slice::<TokenClaims>(&bytes).ok());

    let from_claim = |secs: Option<i64>| secs.and_then(|s| Utc.timestamp_opt(s, 0).single());

    let issued_at = claims.as_ref().and_then(|c| from_claim(c.iat)).or(Some(now));
    let expires_at = claims.as_ref().and_then(|c| from_claim(c.exp)).or_else(|| {
        expires_in
            .and_then(|secs| secs.parse::<i64>().ok())
            .map(|secs| now + Duration::seconds(secs))
    });
    (issued_at, expires_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracker_config_and_utils::ErrorKind;

    fn jwt(payload: &str) -> String {
        format!(
            "{}.{}.signature",
            URL_SAFE_NO_PAD.encode(r#"{"alg":"RS256"}"#),
            URL_SAFE_NO_PAD.encode(payload)
        )
    }

    #[test]
    fn test_accounts_url() {
        let client = IdentityToolkitClient::new("https://identity.test/v1/", "web-key");
        assert_eq!(
            client.accounts_url("signUp"),
            "https://identity.test/v1/accounts:signUp?key=web-key"
        );
    }

    #[test]
    fn test_map_error_codes() {
        let cases = [
            ("EMAIL_EXISTS", ErrorKind::AuthProvider(ProviderErrorCode::AlreadyExists)),
            ("INVALID_PASSWORD", ErrorKind::AuthProvider(ProviderErrorCode::InvalidCredentials)),
            (
                "INVALID_LOGIN_CREDENTIALS",
                ErrorKind::AuthProvider(ProviderErrorCode::InvalidCredentials),
            ),
            (
                "TOO_MANY_ATTEMPTS_TRY_LATER : Access to this account has been temporarily disabled",
                ErrorKind::AuthProvider(ProviderErrorCode::RateLimited),
            ),
            ("TOKEN_EXPIRED", ErrorKind::AuthProvider(ProviderErrorCode::ExpiredSession)),
            (
                "WEAK_PASSWORD : Password should be at least 6 characters",
                ErrorKind::Validation,
            ),
            ("INVALID_EMAIL", ErrorKind::Validation),
            ("OPERATION_NOT_ALLOWED", ErrorKind::AuthProvider(ProviderErrorCode::Unknown)),
            ("", ErrorKind::AuthProvider(ProviderErrorCode::Unknown)),
        ];

        for (message, expected) in cases {
            assert_eq!(map_error_message(message).kind(), expected, "{message}");
        }
    }

    #[test]
    fn test_error_from_body() {
        let body = r#"{"error":{"code":400,"message":"EMAIL_NOT_FOUND","errors":[]}}"#;
        assert_eq!(
            error_from_body(body).kind(),
            ErrorKind::AuthProvider(ProviderErrorCode::InvalidCredentials)
        );
        assert_eq!(
            error_from_body("<html>bad gateway</html>").kind(),
            ErrorKind::AuthProvider(ProviderErrorCode::Unknown)
        );
    }

    #[test]
    fn test_token_lifetime_from_claims() {
        let now = Utc.timestamp_opt(1_700_000_500, 0).unwrap();
        let token = jwt(r#"{"iat":1700000000,"exp":1700003600,"user_id":"u1"}"#);

        let (issued_at, expires_at) = token_lifetime(&token, Some("3600"), now);
        assert_eq!(issued_at.unwrap().timestamp(), 1_700_000_000);
        assert_eq!(expires_at.unwrap().timestamp(), 1_700_003_600);
    }

    #[test]
    fn test_token_lifetime_falls_back_to_expires_in() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        let (issued_at, expires_at) = token_lifetime("opaque-token", Some("3600"), now);
        assert_eq!(issued_at, Some(now));
        assert_eq!(expires_at.unwrap().timestamp(), 1_700_003_600);

        let (_, expires_at) = token_lifetime("opaque-token", None, now);
        assert_eq!(expires_at, None);
    }

    #[test]
    fn test_grant_from_response() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"idToken":"opaque","localId":"uid-9","email":"a@b.co","refreshToken":"r","expiresIn":"3600"}"#,
        )
        .unwrap();
        let grant = grant_from(response, Utc::now());
        assert_eq!(grant.user_id, "uid-9");
        assert_eq!(grant.email.as_deref(), Some("a@b.co"));
        assert!(grant.expires_at.is_some());
        assert!(!format!("{:?}", grant).contains("opaque"));
    }

    #[test]
    fn test_lookup_response_parsing() {
        let response: LookupResponse = serde_json::from_str(
            r#"{"kind":"x","users":[{"localId":"u","email":"a@b.co","emailVerified":true,"displayName":"Ana"}]}"#,
        )
        .unwrap();
        let record = UserRecord::from(response.users.into_iter().next().unwrap());
        assert!(record.email_verified);
        assert_eq!(record.profile.display_name.as_deref(), Some("Ana"));
        assert_eq!(record.profile.photo_url, None);
    }
}
