use anyhow::{anyhow, Result};
use clap::Args;
use pkc::authenticator::{
    AutoApprove, ConsolePresence, CredentialVault, FileVault, KeyringVault, SoftAuthenticator,
    UserPresence,
};
use pkc::ceremony::{CeremonyClient, ConsoleStatus};
use pkc::http::api_client::ApiClient;
use pkc::settings::{AppConfig, Target};
use std::sync::Arc;

#[derive(Args)]
pub struct Register {
    #[arg(required = true, short, long)]
    username: String,
    #[arg(short, long)]
    display_name: Option<String>,
    #[command(flatten)]
    connection: Connection,
}

#[derive(Args)]
pub struct Authenticate {
    #[arg(required = true, short, long)]
    username: String,
    #[command(flatten)]
    connection: Connection,
}

#[derive(Args)]
struct Connection {
    /// Base URL of the relying party, overrides the stored setting
    #[arg(long)]
    rp_url: Option<String>,
    /// Origin credentials are bound to, defaults to the relying party's
    #[arg(long)]
    origin: Option<String>,
    /// Approve authenticator prompts without asking
    #[arg(short = 'y', long)]
    yes: bool,
}

impl Register {
    /// Returns whether the ceremony succeeded.
    pub async fn run(&self, settings: &AppConfig) -> Result<bool> {
        let client = self.connection.client(settings)?;
        let outcome = client
            .register(self.username.as_str(), self.display_name.as_deref())
            .await;

        Ok(outcome.is_success())
    }
}

impl Authenticate {
    /// Returns whether the ceremony succeeded.
    pub async fn run(&self, settings: &AppConfig) -> Result<bool> {
        let client = self.connection.client(settings)?;
        let outcome = client.authenticate(self.username.as_str()).await;

        Ok(outcome.is_success())
    }
}

impl Connection {
    fn client(&self, settings: &AppConfig) -> Result<CeremonyClient> {
        let Target {
            relying_party,
            origin,
        } = settings.target(self.rp_url.clone(), self.origin.clone())?;

        let vault: Box<dyn CredentialVault> = if settings.keyring_enabled() {
            let account = origin
                .host_str()
                .ok_or_else(|| anyhow!("could not find origin host"))?;
            Box::new(KeyringVault::new(account.to_string()))
        } else {
            Box::new(FileVault::in_config_dir()?)
        };
        let presence: Box<dyn UserPresence> = match self.yes {
            true => Box::new(AutoApprove),
            false => Box::new(ConsolePresence),
        };

        let platform = SoftAuthenticator::new(origin, vault, presence);
        let exchange = ApiClient::new()?;

        CeremonyClient::new(
            relying_party,
            Arc::new(exchange),
            Arc::new(platform),
            Arc::new(ConsoleStatus),
        )
    }
}
