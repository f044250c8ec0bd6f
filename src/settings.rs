use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Serialize, Deserialize, Default, Debug, PartialEq)]
pub struct AppConfig {
    relying_party: Option<String>,
    origin: Option<String>,
    keyring_enabled: Option<bool>,
}

/// Where ceremonies run: the relying party the client talks to and the origin credentials are bound to.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub relying_party: Url,
    pub origin: Url,
}

impl AppConfig {
    pub fn set_relying_party(&mut self, relying_party: String) -> Result<()> {
        self.relying_party = Some(normalize_url(relying_party.as_str())?);

        Ok(())
    }

    pub fn set_origin(&mut self, origin: String) -> Result<()> {
        self.origin = Some(origin_of(&Url::parse(origin.as_str())?)?);

        Ok(())
    }

    pub fn set_keyring_enabled(&mut self, keyring_enabled: bool) {
        self.keyring_enabled = Some(keyring_enabled);
    }

    pub fn keyring_enabled(&self) -> bool {
        self.keyring_enabled.unwrap_or(true)
    }

    /// Combines the stored settings with command line overrides, which win.
    pub fn target(&self, relying_party: Option<String>, origin: Option<String>) -> Result<Target> {
        let relying_party = relying_party
            .or_else(|| self.relying_party.clone())
            .ok_or_else(|| {
                anyhow!("no relying party configured, pass --rp-url or run `pkc config set`")
            })?;
        let relying_party = Url::parse(normalize_url(relying_party.as_str())?.as_str())?;

        // an explicit relying party on the command line takes its own origin
        let origin = match origin {
            Some(origin) => Some(origin),
            None if self.relying_party.as_deref() == Some(relying_party.as_str()) => {
                self.origin.clone()
            }
            None => None,
        };
        let origin = match origin {
            Some(origin) => Url::parse(origin_of(&Url::parse(origin.as_str())?)?.as_str())?,
            None => Url::parse(origin_of(&relying_party)?.as_str())?,
        };

        Ok(Target {
            relying_party,
            origin,
        })
    }

    pub fn read_config() -> Result<Self> {
        AppConfig::read_from(&AppConfig::config_file()?)
    }

    pub fn write_config(&self) -> Result<()> {
        self.write_to(&AppConfig::config_file()?)
    }

    fn read_from(config_file: &Path) -> Result<Self> {
        if !config_file.exists() {
            return Ok(AppConfig::default());
        }

        let config_contents = fs::read(config_file)?;
        let config_contents = String::from_utf8(config_contents)?;
        let config: AppConfig = toml::from_str(config_contents.as_str())?;

        Ok(config)
    }

    fn write_to(&self, config_file: &Path) -> Result<()> {
        if let Some(config_dir) = config_file.parent() {
            fs::create_dir_all(config_dir)?;
        }

        let toml = toml::to_string(&self)?;
        fs::write(config_file, toml)?;

        Ok(())
    }

    fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("could not determine config directory"))?
            .join("pkc");

        Ok(config_dir)
    }

    fn config_file() -> Result<PathBuf> {
        let config_file = AppConfig::config_dir()?.join("settings.toml");

        Ok(config_file)
    }
}

impl std::fmt::Display for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "relying party: {}",
            self.relying_party.as_deref().unwrap_or("(not set)")
        )?;
        writeln!(
            f,
            "origin: {}",
            self.origin.as_deref().unwrap_or("(derived from relying party)")
        )?;
        write!(f, "keyring enabled: {}", self.keyring_enabled())
    }
}

fn normalize_url(url: &str) -> Result<String> {
    let mut url = Url::parse(url)?;

    // remove query
    url.set_query(None);

    // remove trailing slash
    url.path_segments_mut()
        .map_err(|_| "cannot be base")
        .map_err(|e| anyhow!(e))?
        .pop_if_empty();

    Ok(String::from(url))
}

/// `scheme://host[:port]` of `url`.
fn origin_of(url: &Url) -> Result<String> {
    if url.host_str().is_none() {
        return Err(anyhow!("{} has no host", url));
    }

    Ok(url.origin().unicode_serialization())
}
