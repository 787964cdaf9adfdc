use std::fmt;

use oauth2::{AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl, basic::BasicClient};
use serde::Deserialize;

use crate::{AppError, AppResult, config::Config};

type HappyClient = Client<
    oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>,
    oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>,
    oauth2::StandardRevocableToken,
    oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>,
    oauth2::EndpointSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointNotSet,
    oauth2::EndpointSet,
>;

#[derive(Debug, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Apple,
}

impl ClientProvider {
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Apple => "apple.com",
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Clone)]
pub struct Clients {
    pub(crate) firebase_idp_url: Option<String>,
    google_client: Option<HappyClient>,
    apple_client: Option<HappyClient>,
}

impl Clients {
    pub fn from_config(config: &Config) -> Clients {
        let firebase_idp_url = config.firebase_api_key.as_ref().map(|key| {
            format!("https://identitytoolkit.googleapis.com/v1/accounts:signInWithIdp?key={key}")
        });
        if firebase_idp_url.is_none() {
            tracing::warn!("FIREBASE_API_KEY not supplied, OAuth sign-in disabled");
        }

        let redirect = |provider: &str| {
            RedirectUrl::new(format!("{}/auth/callback/{provider}", config.app_url))
                .expect("redirect url")
        };

        let google_client = match (&config.google_client_id, &config.google_client_secret) {
            (Some(id), Some(secret)) => Some(
                BasicClient::new(ClientId::new(id.clone()))
                    .set_client_secret(ClientSecret::new(secret.clone()))
                    .set_auth_uri(
                        AuthUrl::new("https://accounts.google.com/o/oauth2/auth".to_string())
                            .expect("auth url"),
                    )
                    .set_token_uri(
                        TokenUrl::new("https://oauth2.googleapis.com/token".to_string())
                            .expect("token url"),
                    )
                    .set_redirect_uri(redirect("google")),
            ),
            _ => None,
        };

        let apple_client = match (&config.apple_client_id, &config.apple_client_secret) {
            (Some(id), Some(secret)) => Some(
                BasicClient::new(ClientId::new(id.clone()))
                    .set_client_secret(ClientSecret::new(secret.clone()))
                    .set_auth_uri(
                        AuthUrl::new("https://appleid.apple.com/auth/authorize".to_string())
                            .expect("auth url"),
                    )
                    .set_token_uri(
                        TokenUrl::new("https://appleid.apple.com/auth/token".to_string())
                            .expect("token url"),
                    )
                    .set_redirect_uri(redirect("apple")),
            ),
            _ => None,
        };

        Clients {
            firebase_idp_url,
            google_client,
            apple_client,
        }
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<HappyClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Apple => self.apple_client.clone(),
        }
        .ok_or_else(|| AppError::bad_request(format!("OAuth provider {provider} keys not supplied")))
    }
}
