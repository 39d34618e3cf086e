use anyhow::{Error, Result, anyhow};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Serialize)]
struct AssertionClaims<'a> {
    sub: &'a str,
    iss: &'a str,
    jti: String,
    aud: String,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// Exchange a signed JWT client assertion for a bearer token.
pub async fn token_exchange(
    http_client: &Client,
    base_url: &str,
    api_key: &str,
    private_key_pem: &str,
    key_id: &str,
) -> Result<String, Error> {
    let token_url = format!("{}/oauth2/token", base_url);

    let mut header = Header::new(Algorithm::RS512);
    header.kid = Some(key_id.to_string());

    let now = Utc::now().timestamp();
    let jti = Uuid::new_v4().to_string();
    let claims = AssertionClaims {
        sub: api_key,
        iss: api_key,
        jti: jti.clone(),
        aud: token_url.clone(),
        iat: now,
        exp: now + 60,
    };

    let key = EncodingKey::from_rsa_pem(private_key_pem.as_bytes())
        .map_err(|e| anyhow!("Invalid provider private key: {}", e))?;
    let assertion = encode(&header, &claims, &key)
        .map_err(|e| anyhow!("Failed to sign client assertion: {}", e))?;

    info!(%jti, "Exchanging JWT for access token");

    let response = http_client
        .post(&token_url)
        .form(&[
            ("grant_type", "client_credentials"),
            (
                "client_assertion_type",
                "urn:ietf:params:oauth:client-assertion-type:jwt-bearer",
            ),
            ("client_assertion", assertion.as_str()),
        ])
        .send()
        .await
        .map_err(|e| {
            error!(error = %e, "Token exchange failed");
            anyhow!("Token exchange failed: {}", e)
        })?;

    let status = response.status();
    if !status.is_success() {
        error!(status = %status, "Token exchange failed");
        return Err(anyhow!("Token exchange returned status {}", status));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| anyhow!("Failed to parse token response: {}", e))?;

    token
        .access_token
        .ok_or_else(|| anyhow!("No token in response"))
}
