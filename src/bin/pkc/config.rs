use anyhow::Result;
use clap::{Args, Subcommand};
use pkc::settings::AppConfig;

#[derive(Args)]
pub struct Config {
    #[command(subcommand)]
    sub_command: ConfigSubCommand,
}

#[derive(Subcommand)]
enum ConfigSubCommand {
    /// Store the relying party and related settings
    Set(ConfigSet),
    /// Print the stored settings
    Show,
}

#[derive(Args)]
struct ConfigSet {
    #[arg(required = true, long)]
    rp_url: String,
    #[arg(long)]
    origin: Option<String>,
    #[arg(long, value_parser = true_or_false)]
    keyring_enabled: Option<bool>,
}

impl Config {
    pub fn run(&self, settings: &mut AppConfig) -> Result<()> {
        match &self.sub_command {
            ConfigSubCommand::Set(val) => val.run(settings),
            ConfigSubCommand::Show => {
                println!("{}", settings);

                Ok(())
            }
        }
    }
}

impl ConfigSet {
    fn run(&self, settings: &mut AppConfig) -> Result<()> {
        settings.set_relying_party(self.rp_url.clone())?;
        if let Some(origin) = &self.origin {
            settings.set_origin(origin.clone())?;
        }
        if let Some(keyring_enabled) = self.keyring_enabled {
            settings.set_keyring_enabled(keyring_enabled);
        }
        settings.write_config()?;

        Ok(())
    }
}

fn true_or_false(s: &str) -> Result<bool, &'static str> {
    match s {
        "true" => Ok(true),
        "false" => Ok(false),
        _ => Err("expected `true` or `false`"),
    }
}
