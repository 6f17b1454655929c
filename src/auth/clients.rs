use oauth2::{
    AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, TokenUrl,
    basic::BasicClient,
};

use crate::{AppResult, config::DiscordConfig};

pub(crate) const DISCORD_AUTH_URL: &str = "https://discord.com/oauth2/authorize";
pub(crate) const DISCORD_TOKEN_URL: &str = "https://discord.com/api/oauth2/token";
pub(crate) const DISCORD_ME_URL: &str = "https://discord.com/api/users/@me";

pub type HappyClient = BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// OAuth clients the login routes can use.
#[derive(Clone, Default)]
pub struct Clients {
    discord_client: Option<HappyClient>,
}

impl Clients {
    pub fn from_config(discord: Option<&DiscordConfig>) -> AppResult<Clients> {
        let Some(discord) = discord else {
            return Ok(Clients::default());
        };

        let client_id = ClientId::new(discord.client_id.clone());
        let client_secret = ClientSecret::new(discord.client_secret.clone());

        let auth_url = AuthUrl::new(DISCORD_AUTH_URL.to_owned())?;
        let token_url = TokenUrl::new(DISCORD_TOKEN_URL.to_owned())?;
        let redirect_url = RedirectUrl::new(discord.redirect_url.clone())?;

        Ok(Clients {
            discord_client: Some(
                BasicClient::new(client_id)
                    .set_client_secret(client_secret)
                    .set_auth_uri(auth_url)
                    .set_token_uri(token_url)
                    .set_redirect_uri(redirect_url),
            ),
        })
    }

    pub fn get_client(&self) -> AppResult<HappyClient> {
        self.discord_client
            .clone()
            .ok_or_else(|| "Discord login is not configured".into())
    }
}
