use crate::client::cipher::{self, Envelope};
use crate::common::CredentialRecord;
use crate::error::StorageError;
use secrecy::SecretString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

pub struct CredentialStore {
    credentials_path: PathBuf,
    passphrase: Option<SecretString>,
}

impl CredentialStore {
    pub fn new(credentials_path: impl Into<PathBuf>, passphrase: Option<SecretString>) -> Self {
        Self {
            credentials_path: credentials_path.into(),
            passphrase,
        }
    }

    pub fn path(&self) -> &Path {
        &self.credentials_path
    }

    pub fn is_encrypted(&self) -> bool {
        self.passphrase.is_some()
    }

    /// Replace the stored record. The file is written to a sibling temp file
    /// and renamed into place so an interrupted write never leaves a
    /// truncated record behind.
    pub fn save(&self, record: &CredentialRecord) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(record)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let contents = match &self.passphrase {
            Some(passphrase) => {
                let envelope = cipher::seal(json.as_bytes(), passphrase)?;
                serde_json::to_string_pretty(&envelope)
                    .map_err(|e| StorageError::Cipher(e.to_string()))?
            }
            None => json,
        };

        if let Some(parent) = self.credentials_path.parent() {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }

        let tmp_path = self.credentials_path.with_extension("json.tmp");
        write_private(&tmp_path, contents.as_bytes())?;
        fs::rename(&tmp_path, &self.credentials_path)
            .map_err(|e| StorageError::io(&self.credentials_path, e))?;

        tracing::debug!(
            path = %self.credentials_path.display(),
            encrypted = self.is_encrypted(),
            "Credentials saved"
        );
        Ok(())
    }

    pub fn load(&self) -> Result<Option<CredentialRecord>, StorageError> {
        if !self.credentials_path.exists() {
            return Ok(None);
        }

        let raw = fs::read_to_string(&self.credentials_path)
            .map_err(|e| StorageError::io(&self.credentials_path, e))?;

        let document: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let record_json = if Envelope::matches(&document) {
            let passphrase = self
                .passphrase
                .as_ref()
                .ok_or(StorageError::PassphraseRequired)?;
            let envelope: Envelope = serde_json::from_value(document)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            let plaintext = cipher::open(&envelope, passphrase)?;
            serde_json::from_slice(&plaintext).map_err(|e| StorageError::Corrupt(e.to_string()))?
        } else {
            if self.passphrase.is_some() {
                tracing::warn!(
                    path = %self.credentials_path.display(),
                    "Credential file is not encrypted; it will be encrypted on the next save"
                );
            }
            document
        };

        let record: CredentialRecord = serde_json::from_value(record_json)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        Ok(Some(record))
    }

    pub fn clear(&self) -> Result<(), StorageError> {
        match fs::remove_file(&self.credentials_path) {
            Ok(()) => {
                tracing::info!(path = %self.credentials_path.display(), "Credentials removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::io(&self.credentials_path, e)),
        }
    }
}

fn write_private(path: &Path, contents: &[u8]) -> Result<(), StorageError> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);

    // Owner read/write only
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path).map_err(|e| StorageError::io(path, e))?;
    file.write_all(contents)
        .and_then(|_| file.sync_all())
        .map_err(|e| StorageError::io(path, e))
}
