use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use failure_derive::Fail;
use log::{debug, info, warn};
use serde_derive::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::bibliothek::{Bibliothek, BibliothekError, BuildQuery, DownloadTarget, DEFAULT_ARTIFACT};
use crate::utils::{CurlClient, HttpClient, Sha1Writer};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Base url of the Bibliothek instance
    pub api_url: String,
    pub project: String,
    #[serde(default = "default_artifact")]
    pub artifact: String,
    /// Name of the cached binary inside the target directory
    #[serde(default = "default_file_name")]
    pub file_name: String,
    #[serde(default = "default_verify_checksum")]
    pub verify_checksum: bool,
}
impl InstallerConfig {
    pub fn new(api_url: &str, project: &str) -> InstallerConfig {
        InstallerConfig {
            api_url: api_url.into(),
            project: project.into(),
            artifact: default_artifact(),
            file_name: default_file_name(),
            verify_checksum: default_verify_checksum()
        }
    }
}
fn default_artifact() -> String {
    DEFAULT_ARTIFACT.into()
}
fn default_file_name() -> String {
    "server.jar".into()
}
fn default_verify_checksum() -> bool {
    true
}

#[derive(Debug, Fail)]
pub enum InstallError {
    #[fail(display = "{}", _0)]
    Resolve(#[fail(cause)] BibliothekError),
    #[fail(display = "I/O error on {:?}: {}", path, cause)]
    Io {
        path: PathBuf,
        #[fail(cause)]
        cause: io::Error,
    },
    #[fail(display = "Checksum mismatch for {}: expected {} but got {}", file_name, expected, actual)]
    ChecksumMismatch {
        file_name: String,
        expected: String,
        actual: String,
    },
}
impl From<BibliothekError> for InstallError {
    #[inline]
    fn from(cause: BibliothekError) -> InstallError {
        InstallError::Resolve(cause)
    }
}

#[derive(Debug, Fail)]
#[fail(display = "Unable to install {} version {}: {}", project, version, cause)]
pub struct InstallFailed {
    pub project: String,
    pub version: String,
    #[fail(cause)]
    pub cause: InstallError,
}

/// Keeps a single binary of a Bibliothek project up to date in a directory.
///
/// A binary that is already present is trusted as-is unless an update is forced.
pub struct BibliothekInstaller<C = CurlClient> {
    config: InstallerConfig,
    api: Bibliothek<C>,
}
impl BibliothekInstaller<CurlClient> {
    #[inline]
    pub fn new(config: InstallerConfig) -> BibliothekInstaller<CurlClient> {
        BibliothekInstaller::with_client(config, CurlClient)
    }
}
impl<C: HttpClient> BibliothekInstaller<C> {
    pub fn with_client(config: InstallerConfig, client: C) -> BibliothekInstaller<C> {
        let api = Bibliothek::with_client(&config.api_url, client);
        BibliothekInstaller { config, api }
    }
    #[inline]
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }
    #[inline]
    pub fn api(&self) -> &Bibliothek<C> {
        &self.api
    }
    /// Where the binary for `target_dir` lives
    #[inline]
    pub fn artifact_path(&self, target_dir: &Path) -> PathBuf {
        target_dir.join(&self.config.file_name)
    }
    pub fn install(&self, version: &str, target_dir: &Path, force_update: bool) -> Result<PathBuf, InstallFailed> {
        let query = BuildQuery::new(self.config.project.as_str(), version);
        self.try_install(&query, target_dir, force_update)
            .map_err(|cause| InstallFailed {
                project: query.project.clone(),
                version: query.version.clone(),
                cause
            })
    }
    fn try_install(&self, query: &BuildQuery, target_dir: &Path, force_update: bool) -> Result<PathBuf, InstallError> {
        fs::create_dir_all(target_dir)
            .map_err(|cause| InstallError::Io { path: target_dir.into(), cause })?;
        info!("Preparing {}", self.config.file_name);
        let path = self.artifact_path(target_dir);
        if path.exists() && !force_update {
            debug!("Using cached {}", path.display());
            return Ok(path);
        }
        self.download_into(query, target_dir, &path)?;
        Ok(path)
    }
    #[cold]
    fn download_into(&self, query: &BuildQuery, target_dir: &Path, path: &Path) -> Result<(), InstallError> {
        let build = self.api.latest_build(query)?;
        if build == 0 {
            return Err(BibliothekError::NoBuildAvailable { query: query.clone() }.into())
        }
        let target = self.api.download_target(query, build, &self.config.artifact)?;
        info!("Downloading {} build #{} ({})", query, build, target.file_name);
        // Stage next to the destination so the final rename never crosses filesystems
        let io_error = |cause| InstallError::Io { path: target_dir.into(), cause };
        let mut staged = NamedTempFile::new_in(target_dir).map_err(io_error)?;
        let actual = {
            let mut writer = Sha1Writer::new(staged.as_file_mut());
            self.api.download(query, &target, &mut writer)?;
            writer.flush().map_err(io_error)?;
            writer.finish().1
        };
        self.verify(&target, &actual)?;
        staged.persist(path)
            .map_err(|e| InstallError::Io { path: path.into(), cause: e.error })?;
        info!("Installed {} into {}", target.file_name, path.display());
        Ok(())
    }
    fn verify(&self, target: &DownloadTarget, actual: &str) -> Result<(), InstallError> {
        if !self.config.verify_checksum {
            return Ok(())
        }
        match target.sha1 {
            Some(ref expected) if !expected.eq_ignore_ascii_case(actual) => {
                Err(InstallError::ChecksumMismatch {
                    file_name: target.file_name.clone(),
                    expected: expected.clone(),
                    actual: actual.into()
                })
            },
            Some(_) => Ok(()),
            None => {
                warn!("No checksum published for {}, skipping verification", target.file_name);
                Ok(())
            }
        }
    }
}
