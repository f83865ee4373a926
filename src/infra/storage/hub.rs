//! Remote artifact store with an on-disk cache.
//!
//! Downloads are written to a unique temporary file and renamed into place, so a
//! reader never sees a partial file. There is no locking: two processes fetching the
//! same artifact both download it and the last rename wins. There are no retries.

use super::{Artifact, LocalStore, WeightStore};
use crate::envconfig::EnvConfig;
use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*(/[A-Za-z0-9][A-Za-z0-9._-]*)?$").expect("identifier pattern is valid")
});

/// Sidecar written next to each cached file.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    url: String,
}

pub struct HubStore {
    local: LocalStore,
    cache_dir: PathBuf,
    endpoint: String,
    offline: bool,
    client: Client,
}

impl HubStore {
    pub fn new(config: &EnvConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()?;
        Ok(Self {
            local: LocalStore::new(),
            cache_dir: config.cache_dir.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            offline: config.offline,
            client,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(&EnvConfig::from_env())
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Remote location of `file` for a shortcut name, a `namespace/name` pair or a full URL.
    pub fn artifact_url(&self, identifier: &str, file: &str) -> Result<Url> {
        if identifier.starts_with("http://") || identifier.starts_with("https://") {
            return Ok(Url::parse(identifier)?);
        }
        if !IDENTIFIER.is_match(identifier) {
            return Err(Error::InvalidIdentifier(identifier.to_string()));
        }
        let url = if identifier.contains('/') {
            format!("{}/{}/{}", self.endpoint, identifier, file)
        } else {
            format!("{}/{}-{}", self.endpoint, identifier, file)
        };
        Ok(Url::parse(&url)?)
    }

    pub fn cache_path(&self, url: &Url) -> PathBuf {
        let digest = Sha256::digest(url.as_str().as_bytes());
        self.cache_dir.join(format!("{:x}", digest))
    }

    fn download(&self, url: &Url, identifier: &str, file: &str, dest: &Path) -> Result<()> {
        std::fs::create_dir_all(&self.cache_dir)?;

        let response = self.client.get(url.clone()).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::ArtifactNotFound {
                identifier: identifier.to_string(),
                file: file.to_string(),
            });
        }
        let mut response = response.error_for_status()?;
        let total = response.content_length();

        let tmp = self.cache_dir.join(format!("{}.tmp", uuid::Uuid::new_v4()));
        let result = (|| -> Result<()> {
            let writer = BufWriter::new(File::create(&tmp)?);
            let bar = match total {
                Some(len) => progress_bar(len, file),
                None => ProgressBar::hidden(),
            };
            let mut writer = bar.wrap_write(writer);
            io::copy(&mut response, &mut writer)?;
            writer.flush()?;
            bar.finish_and_clear();
            Ok(())
        })();
        if let Err(e) = result {
            let _ = std::fs::remove_file(&tmp);
            return Err(e);
        }

        std::fs::rename(&tmp, dest)?;
        let entry = CacheEntry { url: url.to_string() };
        std::fs::write(dest.with_extension("json"), serde_json::to_vec(&entry)?)?;
        info!(url = %url, path = %dest.display(), "downloaded artifact");
        Ok(())
    }
}

impl WeightStore for HubStore {
    fn resolve(&self, identifier: &str, artifact: Artifact) -> Result<PathBuf> {
        if self.local.locate(identifier).is_some() {
            return self.local.resolve(identifier, artifact);
        }

        let file = artifact.file_name();
        let url = self.artifact_url(identifier, file)?;
        let cached = self.cache_path(&url);
        if cached.is_file() {
            debug!(url = %url, path = %cached.display(), "cache hit");
            return Ok(cached);
        }
        if self.offline {
            return Err(Error::Offline(url.to_string()));
        }

        debug!(url = %url, "cache miss");
        self.download(&url, identifier, file, &cached)?;
        Ok(cached)
    }
}

fn progress_bar(len: u64, file: &str) -> ProgressBar {
    let bar = ProgressBar::new(len);
    let style = ProgressStyle::default_bar()
        .template("{msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar.set_message(file.to_string());
    bar
}
