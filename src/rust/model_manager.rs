use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;

use crate::models::{BuiltinModel, ModelInfo};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Download error: {0}")]
    DownloadError(#[from] reqwest::Error),
    #[error("Download failed with HTTP status {0}")]
    HttpStatus(u16),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
    #[error("Model verification failed")]
    VerificationFailed,
    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },
}

/// Downloads backbone models into a local cache and verifies them.
#[derive(Clone)]
pub struct ModelManager {
    models_dir: PathBuf,
    download_lock: Arc<Mutex<()>>,
}

impl ModelManager {
    /// Creates a new ModelManager with the default models directory
    pub fn new_default() -> io::Result<Self> {
        Self::new(Self::get_default_models_dir())
    }

    /// Returns the default models directory path
    pub fn get_default_models_dir() -> PathBuf {
        if let Ok(path) = env::var("TRAITLENS_CACHE") {
            return PathBuf::from(path).join("models");
        }
        if let Some(cache_dir) = dirs::cache_dir() {
            return cache_dir.join("traitlens").join("models");
        }
        if let Some(home_dir) = dirs::home_dir() {
            return home_dir.join(".cache").join("traitlens").join("models");
        }
        env::temp_dir().join("traitlens").join("models")
    }

    pub fn new<P: AsRef<Path>>(models_dir: P) -> io::Result<Self> {
        let models_dir = models_dir.as_ref().to_path_buf();
        fs::create_dir_all(&models_dir)?;
        Ok(Self {
            models_dir,
            download_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn get_model_path(&self, name: &str) -> PathBuf {
        self.models_dir.join(name).join("model.onnx")
    }

    pub fn builtin_model_path(&self, model: BuiltinModel) -> PathBuf {
        self.get_model_path(&model.get_model_info().name)
    }

    pub fn is_model_downloaded(&self, name: &str) -> bool {
        let model_path = self.get_model_path(name);
        log::debug!("Model path: {:?} (exists: {})", model_path, model_path.exists());
        model_path.exists()
    }

    /// Downloads a model unless a verified copy is already cached
    pub async fn download_model(&self, info: &ModelInfo) -> Result<PathBuf, ModelError> {
        let _lock = self.download_lock.lock().await;

        let model_dir = self.models_dir.join(&info.name);
        log::info!("Creating model directory at {:?}", model_dir);
        fs::create_dir_all(&model_dir)?;

        let model_path = self.get_model_path(&info.name);
        if model_path.exists() && self.verify_model(info)? {
            log::info!("Existing model file verified successfully");
            return Ok(model_path);
        }

        match self.download_and_verify_file(&info.model_url, &model_path, info.model_hash.as_deref()).await {
            Ok(()) => {
                log::info!("Model '{}' ready to use", info.name);
                Ok(model_path)
            }
            Err(e) => {
                log::error!("Failed to set up model file: {}", e);
                let _ = self.remove_download(&info.name);
                Err(e)
            }
        }
    }

    fn file_hash(path: &Path) -> Result<String, ModelError> {
        let bytes = fs::read(path)?;
        Ok(hash_bytes(&bytes))
    }

    /// Checks the cached file against the expected hash.
    ///
    /// Without a pinned hash the file only has to exist and be non-empty.
    pub fn verify_model(&self, info: &ModelInfo) -> Result<bool, ModelError> {
        let model_path = self.get_model_path(&info.name);
        if !model_path.exists() {
            log::info!("Model file {:?} does not exist", model_path);
            return Ok(false);
        }
        match &info.model_hash {
            Some(expected) => {
                let actual = Self::file_hash(&model_path)?;
                log::debug!("Calculated hash: {} (expected {})", actual, expected);
                Ok(&actual == expected)
            }
            None => {
                log::warn!("No pinned hash for model '{}'; skipping checksum", info.name);
                Ok(fs::metadata(&model_path)?.len() > 0)
            }
        }
    }

    async fn download_and_verify_file(
        &self,
        url: &str,
        path: &Path,
        expected_hash: Option<&str>,
    ) -> Result<(), ModelError> {
        log::info!("Downloading model from {} to {:?}", url, path);
        let response = reqwest::get(url).await?;
        let status = response.status();
        log::info!("Download response status: {}", status);
        if !status.is_success() {
            return Err(ModelError::HttpStatus(status.as_u16()));
        }
        let bytes = response.bytes().await?;
        log::info!("Downloaded {} bytes", bytes.len());

        let hash = hash_bytes(&bytes);
        if let Some(expected) = expected_hash {
            if hash != expected {
                log::error!("Model hash mismatch: expected {}, got {}", expected, hash);
                return Err(ModelError::HashMismatch {
                    expected: expected.to_string(),
                    actual: hash,
                });
            }
        } else {
            log::warn!("Downloaded model has no pinned hash (sha256 {})", hash);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, &bytes)?;

        if Self::file_hash(path)? != hash {
            return Err(ModelError::VerificationFailed);
        }
        Ok(())
    }

    pub fn remove_download(&self, name: &str) -> Result<(), ModelError> {
        let model_path = self.get_model_path(name);
        if model_path.exists() {
            fs::remove_file(&model_path)?;
        }
        Ok(())
    }

    /// Ensures that a model is downloaded and verified, re-downloading on mismatch
    pub async fn ensure_model_downloaded(&self, info: &ModelInfo) -> Result<PathBuf, ModelError> {
        log::info!("Checking if model {} is downloaded...", info.name);
        if self.is_model_downloaded(&info.name) && !self.verify_model(info)? {
            log::info!("Model verification failed, re-downloading...");
            self.remove_download(&info.name)?;
        }
        self.download_model(info).await
    }
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_bytes_is_sha256_hex() {
        assert_eq!(
            hash_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_verify_with_and_without_pinned_hash() -> Result<(), ModelError> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        let mut info = ModelInfo {
            name: "local".to_string(),
            model_url: "http://localhost/model.onnx".to_string(),
            model_hash: Some(hash_bytes(b"weights")),
        };
        assert!(!manager.verify_model(&info)?);

        let path = manager.get_model_path("local");
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, b"weights")?;
        assert!(manager.is_model_downloaded("local"));
        assert!(manager.verify_model(&info)?);

        info.model_hash = Some(hash_bytes(b"other"));
        assert!(!manager.verify_model(&info)?);

        info.model_hash = None;
        assert!(manager.verify_model(&info)?);

        manager.remove_download("local")?;
        assert!(!manager.is_model_downloaded("local"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cached_model_is_not_downloaded_again() -> Result<(), ModelError> {
        let dir = tempfile::tempdir()?;
        let manager = ModelManager::new(dir.path())?;
        let info = ModelInfo {
            name: "cached".to_string(),
            // Unroutable: the test fails if a download is attempted
            model_url: "http://127.0.0.1:9/model.onnx".to_string(),
            model_hash: Some(hash_bytes(b"cached weights")),
        };
        let path = manager.get_model_path("cached");
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(&path, b"cached weights")?;

        let ready = manager.ensure_model_downloaded(&info).await?;
        assert_eq!(ready, path);
        Ok(())
    }
}
