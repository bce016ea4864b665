//! Settings and credential storage.
//!
//! The pipeline only needs credentials to be *present*; where they live is an
//! adapter choice. Secrets go to the OS keychain, everything else to a JSON
//! file under the platform config directory:
//!   macOS:   ~/Library/Application Support/snaplens/settings.json
//!   Linux:   ~/.config/snaplens/settings.json
//!   Windows: %APPDATA%/snaplens/settings.json

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

pub const KEY_ANALYSIS_API_KEY: &str = "analysisApiKey";
pub const KEY_UPLOAD_ACCOUNT_ID: &str = "uploadAccountId";
pub const KEY_UPLOAD_API_TOKEN: &str = "uploadApiToken";
pub const KEY_SHORTCUTS: &str = "shortcutsMap";

/// Keys routed to the keychain by [`SecureSplitStore`].
pub const SECRET_KEYS: &[&str] = &[KEY_ANALYSIS_API_KEY, KEY_UPLOAD_ACCOUNT_ID, KEY_UPLOAD_API_TOKEN];

const KEYRING_SERVICE: &str = "snaplens";

pub trait SettingsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError>;

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Keychain access failed: {0}")]
    Keyring(String),

    #[error("Settings file error: {0}")]
    Io(String),

    #[error("Settings file is not valid JSON: {0}")]
    Parse(String),
}

/// Opaque credentials. Only presence is ever checked, never format.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub analysis_api_key: String,
    pub upload_account_id: String,
    pub upload_api_token: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("analysis_api_key", &format_args!("<{} chars>", self.analysis_api_key.len()))
            .field("upload_account_id", &self.upload_account_id)
            .field("upload_api_token", &format_args!("<{} chars>", self.upload_api_token.len()))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CredentialKind {
    UploadAccountId,
    UploadApiToken,
    AnalysisApiKey,
}

impl CredentialKind {
    pub fn settings_key(self) -> &'static str {
        match self {
            CredentialKind::UploadAccountId => KEY_UPLOAD_ACCOUNT_ID,
            CredentialKind::UploadApiToken => KEY_UPLOAD_API_TOKEN,
            CredentialKind::AnalysisApiKey => KEY_ANALYSIS_API_KEY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CredentialKind::UploadAccountId => "upload account ID",
            CredentialKind::UploadApiToken => "upload API token",
            CredentialKind::AnalysisApiKey => "analysis API key",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Configure the {} in settings", .0.label())]
pub struct CredentialMissingError(pub CredentialKind);

impl Credentials {
    /// Fails on the first empty credential the run needs. Upload credentials
    /// only count when the image goes through an upload provider.
    pub fn ensure_present(&self, needs_upload: bool) -> Result<(), CredentialMissingError> {
        let blank = |s: &str| s.trim().is_empty();
        if needs_upload {
            if blank(&self.upload_account_id) {
                return Err(CredentialMissingError(CredentialKind::UploadAccountId));
            }
            if blank(&self.upload_api_token) {
                return Err(CredentialMissingError(CredentialKind::UploadApiToken));
            }
        }
        if blank(&self.analysis_api_key) {
            return Err(CredentialMissingError(CredentialKind::AnalysisApiKey));
        }
        Ok(())
    }
}

/// Reads the three credentials; absent entries come back empty.
pub fn load_credentials(store: &dyn SettingsStore) -> Result<Credentials, SettingsError> {
    let read = |key: &str| -> Result<String, SettingsError> { Ok(store.get(key)?.unwrap_or_default()) };
    Ok(Credentials {
        analysis_api_key: read(KEY_ANALYSIS_API_KEY)?,
        upload_account_id: read(KEY_UPLOAD_ACCOUNT_ID)?,
        upload_api_token: read(KEY_UPLOAD_API_TOKEN)?,
    })
}

/// In-process store, for tests and when no keychain is available.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.to_string(), value.to_string());
        }
        self
    }
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        let values = self
            .values
            .lock()
            .map_err(|e| SettingsError::Io(e.to_string()))?;
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let mut values = self
            .values
            .lock()
            .map_err(|e| SettingsError::Io(e.to_string()))?;
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// One OS keychain entry per key.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl Default for KeyringStore {
    fn default() -> Self {
        Self::new(KEYRING_SERVICE)
    }
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<keyring::Entry, SettingsError> {
        keyring::Entry::new(&self.service, key).map_err(|e| SettingsError::Keyring(e.to_string()))
    }
}

impl SettingsStore for KeyringStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(SettingsError::Keyring(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.entry(key)?
            .set_password(value)
            .map_err(|e| SettingsError::Keyring(e.to_string()))?;

        // Read back through a fresh entry; a backend that drops writes must not report success.
        match self.get(key)? {
            Some(stored) if stored == value => {
                log::info!("[SETTINGS] Stored {} in keychain", key);
                Ok(())
            }
            _ => Err(SettingsError::Keyring(format!(
                "keychain did not persist {}",
                key
            ))),
        }
    }
}

/// Flat JSON object of string values on disk.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `settings.json` in the platform config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snaplens")
            .join("settings.json")
    }

    fn read_all(&self) -> Result<HashMap<String, String>, SettingsError> {
        match std::fs::read_to_string(&self.path) {
            Ok(text) if text.trim().is_empty() => Ok(HashMap::new()),
            Ok(text) => serde_json::from_str(&text).map_err(|e| SettingsError::Parse(e.to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(SettingsError::Io(e.to_string())),
        }
    }
}

impl SettingsStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| SettingsError::Io(e.to_string()))?;
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value.to_string());

        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| SettingsError::Io(e.to_string()))?;
        }
        let text = serde_json::to_string_pretty(&all).map_err(|e| SettingsError::Parse(e.to_string()))?;
        std::fs::write(&self.path, text).map_err(|e| SettingsError::Io(e.to_string()))?;
        Ok(())
    }
}

/// Credential keys to one store, everything else to another.
pub struct SecureSplitStore {
    secrets: Box<dyn SettingsStore>,
    plain: Box<dyn SettingsStore>,
}

impl SecureSplitStore {
    pub fn new(secrets: Box<dyn SettingsStore>, plain: Box<dyn SettingsStore>) -> Self {
        Self { secrets, plain }
    }

    fn route(&self, key: &str) -> &dyn SettingsStore {
        if SECRET_KEYS.contains(&key) {
            self.secrets.as_ref()
        } else {
            self.plain.as_ref()
        }
    }
}

impl SettingsStore for SecureSplitStore {
    fn get(&self, key: &str) -> Result<Option<String>, SettingsError> {
        self.route(key).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), SettingsError> {
        self.route(key).set(key, value)
    }
}
