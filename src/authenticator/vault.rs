use crate::webauthn::encoding::base64url;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tmuntaner_keyring::KeyringClient;

const KEYRING_SERVICE: &str = "pkc -- passkeys";
const KEYRING_APPLICATION: &str = "pkc";

/// A passkey held by the software authenticator.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    #[serde(with = "base64url")]
    pub credential_id: Vec<u8>,
    pub rp_id: String,
    #[serde(with = "base64url")]
    pub user_handle: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Raw P-256 scalar.
    #[serde(with = "base64url")]
    pub private_key: Vec<u8>,
    pub sign_count: u32,
}

#[derive(Deserialize, Serialize, Default)]
struct VaultContents {
    #[serde(default)]
    credentials: Vec<CredentialRecord>,
}

/// Persistent storage for [`CredentialRecord`]s.
pub trait CredentialVault: Send + Sync {
    fn load(&self) -> Result<Vec<CredentialRecord>>;
    fn store(&self, records: &[CredentialRecord]) -> Result<()>;
}

/// Records kept in a TOML file.
pub struct FileVault {
    path: PathBuf,
}

impl FileVault {
    pub fn new(path: PathBuf) -> Self {
        FileVault { path }
    }

    /// `<config dir>/pkc/credentials.toml`
    pub fn in_config_dir() -> Result<Self> {
        let path = dirs::config_dir()
            .ok_or_else(|| anyhow!("could not determine config directory"))?
            .join("pkc")
            .join("credentials.toml");

        Ok(FileVault::new(path))
    }
}

impl CredentialVault for FileVault {
    fn load(&self) -> Result<Vec<CredentialRecord>> {
        if !self.path.exists() {
            return Ok(vec![]);
        }

        let contents = fs::read_to_string(&self.path)?;
        let contents: VaultContents = toml::from_str(contents.as_str())?;

        Ok(contents.credentials)
    }

    fn store(&self, records: &[CredentialRecord]) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            create_private_dir(dir)?;
        }

        let contents = VaultContents {
            credentials: records.to_vec(),
        };
        let mut file = open_private_file(&self.path)?;
        file.write_all(toml::to_string(&contents)?.as_bytes())?;

        Ok(())
    }
}

// the vault holds private keys, so only the owner may read it
#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;

    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn open_private_file(path: &Path) -> io::Result<File> {
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode only applies on creation
    file.set_permissions(fs::Permissions::from_mode(0o600))?;

    Ok(file)
}

#[cfg(not(unix))]
fn open_private_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
}

/// Records kept as one JSON document in the OS keyring.
pub struct KeyringVault {
    account: String,
}

impl KeyringVault {
    pub fn new(account: String) -> Self {
        KeyringVault { account }
    }

    fn client(&self) -> Result<KeyringClient> {
        let client = KeyringClient::new(
            self.account.as_str(),
            KEYRING_SERVICE,
            KEYRING_APPLICATION,
        )?;

        Ok(client)
    }
}

impl CredentialVault for KeyringVault {
    fn load(&self) -> Result<Vec<CredentialRecord>> {
        match self.client()?.get_password()? {
            Some(json) => Ok(serde_json::from_str(json.as_str())?),
            None => Ok(vec![]),
        }
    }

    fn store(&self, records: &[CredentialRecord]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.client()?.set_password(json)?;

        Ok(())
    }
}
