use std::path::{Path, PathBuf};

use errors::Result;
use reqwest::{Client, Response};

use self::jwt::{AuthorizedUserKey, CredentialFile, JwtToken, ServiceAccountKey, Token};
use crate::utils::timestamp;

pub use self::errors::GAuthError;
pub use self::metadata::MetadataClient;

mod errors;
mod jwt;
mod metadata;

/// Environment variable naming an application default credential file.
pub const CREDENTIALS_VAR: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// Seconds before expiry at which a cached token is considered stale.
const EXPIRY_MARGIN: u64 = 30;

#[derive(Debug, Clone)]
enum TokenSource {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUserKey),
    Metadata(MetadataClient),
}

/// Scoped credentials producing cached bearer tokens.
#[derive(Debug, Clone)]
pub struct GAuth {
    scopes: String,
    source: TokenSource,

    access_token: Option<String>,
    expires_at: Option<u64>,

    http_client: Client,
}

impl GAuth {
    fn new(source: TokenSource, scopes: &[&str]) -> Self {
        Self {
            scopes: scopes.join(" "),
            source,
            access_token: None,
            expires_at: None,
            http_client: Client::new(),
        }
    }

    /// Creates credentials from a service account or authorized user key file
    pub fn from_file(key_path: impl AsRef<Path>, scopes: &[&str]) -> Result<Self> {
        Ok(Self::from_credential_file(
            CredentialFile::from_file(key_path)?,
            scopes,
        ))
    }

    fn from_credential_file(file: CredentialFile, scopes: &[&str]) -> Self {
        let source = match file {
            CredentialFile::ServiceAccount(key) => TokenSource::ServiceAccount(key),
            CredentialFile::AuthorizedUser(key) => TokenSource::AuthorizedUser(key),
        };

        Self::new(source, scopes)
    }

    pub fn from_metadata(metadata: MetadataClient, scopes: &[&str]) -> Self {
        Self::new(TokenSource::Metadata(metadata), scopes)
    }

    /// Resolves [application default credentials](https://cloud.google.com/docs/authentication/application-default-credentials):
    /// `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud well-known file, then the metadata server.
    pub async fn application_default(metadata: &MetadataClient, scopes: &[&str]) -> Result<Self> {
        let explicit = std::env::var_os(CREDENTIALS_VAR).map(PathBuf::from);

        Self::application_default_from(explicit, well_known_file(), metadata, scopes).await
    }

    async fn application_default_from(
        explicit: Option<PathBuf>,
        well_known: Option<PathBuf>,
        metadata: &MetadataClient,
        scopes: &[&str],
    ) -> Result<Self> {
        if let Some(path) = explicit {
            tracing::debug!("Using credentials from {}", path.display());
            return Self::from_file(path, scopes);
        }

        if let Some(path) = well_known.filter(|path| path.is_file()) {
            tracing::debug!("Using gcloud credentials from {}", path.display());
            return Self::from_file(path, scopes);
        }

        if metadata.on_gce().await {
            tracing::debug!("Using metadata server credentials from {}", metadata.host());
            return Ok(Self::from_metadata(metadata.clone(), scopes));
        }

        Err(GAuthError::NoCredentials)
    }

    /// Short description of where tokens come from, for log lines.
    pub fn kind(&self) -> &'static str {
        match self.source {
            TokenSource::ServiceAccount(_) => "service account",
            TokenSource::AuthorizedUser(_) => "authorized user",
            TokenSource::Metadata(_) => "metadata server",
        }
    }

    fn access_token_inner(&mut self, token: Token) -> Result<String> {
        let expires_at = (timestamp()? + token.expires_in).saturating_sub(EXPIRY_MARGIN);
        let bearer = token.bearer_token();

        self.access_token = Some(bearer.clone());
        self.expires_at = Some(expires_at);

        Ok(bearer)
    }

    /// Returns an access token
    /// If the access token is not expired, it will return the cached access token
    /// Otherwise, a fresh token is requested from the credential source
    pub async fn access_token(&mut self) -> Result<String> {
        if let (Some(access_token), Some(expires_at)) = (&self.access_token, self.expires_at) {
            if expires_at > timestamp()? {
                return Ok(access_token.to_string());
            }
        }

        let token = match &self.source {
            TokenSource::ServiceAccount(key) => {
                let jwt_token = JwtToken::new(key)?.scope(self.scopes.clone());
                self.exchange_jwt_token_for_access_token(jwt_token).await?
            }
            TokenSource::AuthorizedUser(key) => self.refresh_user_token(key).await?,
            TokenSource::Metadata(metadata) => metadata.access_token().await?,
        };

        self.access_token_inner(token)
    }

    async fn exchange_jwt_token_for_access_token(&self, jwt_token: JwtToken) -> Result<Token> {
        let response = self
            .http_client
            .post(jwt_token.token_uri())
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", &jwt_token.to_string()?),
            ])
            .send()
            .await?;

        token_from_response(response).await
    }

    async fn refresh_user_token(&self, key: &AuthorizedUserKey) -> Result<Token> {
        let response = self
            .http_client
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "refresh_token"),
                ("client_id", &key.client_id),
                ("client_secret", &key.client_secret),
                ("refresh_token", &key.refresh_token),
            ])
            .send()
            .await?;

        token_from_response(response).await
    }
}

async fn token_from_response(response: Response) -> Result<Token> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(GAuthError::TokenEndpoint { status, body });
    }

    response.json::<Token>().await.map_err(Into::into)
}

/// Location where `gcloud auth application-default login` stores credentials.
fn well_known_file() -> Option<PathBuf> {
    let config_dir = if cfg!(windows) {
        PathBuf::from(std::env::var_os("APPDATA")?)
    } else {
        PathBuf::from(std::env::var_os("HOME")?).join(".config")
    };

    Some(
        config_dir
            .join("gcloud")
            .join("application_default_credentials.json"),
    )
}
