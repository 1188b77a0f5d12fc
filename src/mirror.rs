//! Destructive directory mirroring over SFTP.
//!
//! The remote directory is emptied completely before the local tree is uploaded.
//! A failure midway leaves the remote partially cleared or partially uploaded,
//! there is no rollback.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use failure_derive::Fail;
use log::{debug, info, trace};

use crate::remote::{join_remote, Connector, EntryKind, RemoteError, RemoteFs, SftpConfig, SftpConnector};

#[derive(Debug, Fail)]
pub enum MirrorError {
    #[fail(display = "Unable to connect to {}:{}: {}", host, port, cause)]
    Connection {
        host: String,
        port: u16,
        #[fail(cause)]
        cause: RemoteError,
    },
    #[fail(display = "Remote {} of {} failed: {}", operation, remote_path, cause)]
    MirrorSync {
        remote_path: String,
        operation: &'static str,
        #[fail(cause)]
        cause: RemoteError,
    },
    #[fail(display = "Unable to read {:?}: {}", path, cause)]
    LocalIo {
        path: PathBuf,
        #[fail(cause)]
        cause: io::Error,
    },
}

pub struct MirrorUploader<T = SftpConnector> {
    config: SftpConfig,
    connector: T,
}
impl MirrorUploader {
    #[inline]
    pub fn new(config: SftpConfig) -> MirrorUploader {
        MirrorUploader::with_connector(config, SftpConnector)
    }
}
impl<T: Connector> MirrorUploader<T> {
    #[inline]
    pub fn with_connector(config: SftpConfig, connector: T) -> MirrorUploader<T> {
        MirrorUploader { config, connector }
    }
    #[inline]
    pub fn config(&self) -> &SftpConfig {
        &self.config
    }
    /// Replace the contents of `{root_path}/{segments...}` on the server with `local_dir`.
    ///
    /// One session is opened per call and closed again however the mirror ends.
    pub fn mirror<S: AsRef<str>>(&self, local_dir: &Path, segments: &[S]) -> Result<(), MirrorError> {
        check_local_dir(local_dir)?;
        info!("Connecting to {}@{}:{}", self.config.user, self.config.host, self.config.port);
        let remote = self.connector.connect(&self.config)
            .map_err(|cause| MirrorError::Connection {
                host: self.config.host.clone(),
                port: self.config.port,
                cause
            })?;
        let connector = &self.connector;
        let mut remote = ::scopeguard::guard(remote, |remote| connector.disconnect(remote));
        mirror_into(&mut *remote, &self.config.root_path, local_dir, segments)
    }
}

/// Mirror `local_dir` into `{root}/{segments...}` using an established remote.
pub fn mirror_into<R, S>(remote: &mut R, root: &str, local_dir: &Path, segments: &[S]) -> Result<(), MirrorError>
    where R: RemoteFs + ?Sized, S: AsRef<str> {
    check_local_dir(local_dir)?;
    run(remote, "cd", root, |r| r.cd(root))?;
    for segment in segments {
        let segment = segment.as_ref();
        if enter_segment(remote, segment)? {
            debug!("Created remote directory {}", remote.pwd());
        }
    }
    info!("Clearing {}", remote.pwd());
    clear(remote)?;
    info!("Uploading {} to {}", local_dir.display(), remote.pwd());
    upload(remote, local_dir)
}

/// Delete everything inside the current remote directory
pub fn clear<R: RemoteFs + ?Sized>(remote: &mut R) -> Result<(), MirrorError> {
    let entries = run(remote, "ls", ".", |r| r.ls())?;
    let (directories, files): (Vec<_>, Vec<_>) = entries.into_iter()
        .filter(|entry| entry.name != "." && entry.name != "..")
        .partition(|entry| entry.kind == EntryKind::Directory);
    for directory in &directories {
        let name = directory.name.as_str();
        run(remote, "cd", name, |r| r.cd(name))?;
        clear(remote)?;
        run(remote, "cd", "..", |r| r.cd(".."))?;
        run(remote, "rmdir", name, |r| r.rmdir(name))?;
    }
    for file in &files {
        let name = file.name.as_str();
        trace!("Removing {}", name);
        run(remote, "rm", name, |r| r.rm(name))?;
    }
    Ok(())
}

/// Upload the contents of `local_dir` into the current remote directory
pub fn upload<R: RemoteFs + ?Sized>(remote: &mut R, local_dir: &Path) -> Result<(), MirrorError> {
    for (name, path, is_dir) in local_entries(local_dir)? {
        if is_dir {
            run(remote, "mkdir", &name, |r| r.mkdir(&name))?;
            run(remote, "cd", &name, |r| r.cd(&name))?;
            upload(remote, &path)?;
            run(remote, "cd", "..", |r| r.cd(".."))?;
        } else {
            trace!("Uploading {}", path.display());
            run(remote, "put", &name, |r| r.put(&path, &name))?;
        }
    }
    Ok(())
}

/// The remote path a project's generated documentation is published under.
///
/// A custom directory takes the place of the root project name.
pub fn documentation_path(custom: Option<&str>, root_project: &str, project: Option<&str>) -> Vec<String> {
    let base = match custom {
        Some(custom) if !custom.is_empty() => custom,
        _ => root_project,
    };
    let mut path = vec![base.to_string()];
    if let Some(project) = project {
        if project != root_project {
            path.push(project.into());
        }
    }
    path
}

/// `RemoteFs::ensure_dir`, reporting the failed step as either `cd` or `mkdir`
fn enter_segment<R: RemoteFs + ?Sized>(remote: &mut R, segment: &str) -> Result<bool, MirrorError> {
    if run(remote, "cd", segment, |r| r.try_cd(segment))? {
        return Ok(false)
    }
    run(remote, "mkdir", segment, |r| r.mkdir(segment))?;
    run(remote, "cd", segment, |r| r.cd(segment))?;
    Ok(true)
}

fn run<R, T, F>(remote: &mut R, operation: &'static str, name: &str, action: F) -> Result<T, MirrorError>
    where R: RemoteFs + ?Sized, F: FnOnce(&mut R) -> Result<T, RemoteError> {
    action(&mut *remote).map_err(|cause| MirrorError::MirrorSync {
        remote_path: join_remote(&remote.pwd(), name),
        operation,
        cause
    })
}

fn check_local_dir(local_dir: &Path) -> Result<(), MirrorError> {
    if local_dir.is_dir() {
        Ok(())
    } else {
        Err(MirrorError::LocalIo {
            path: local_dir.into(),
            cause: io::Error::new(io::ErrorKind::NotFound, "not a directory")
        })
    }
}

/// Entries of a local directory sorted by name, following symlinks
fn local_entries(dir: &Path) -> Result<Vec<(String, PathBuf, bool)>, MirrorError> {
    let local_error = |cause| MirrorError::LocalIo { path: dir.into(), cause };
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir).map_err(local_error)? {
        let path = entry.map_err(local_error)?.path();
        let is_dir = fs::metadata(&path)
            .map_err(|cause| MirrorError::LocalIo { path: path.clone(), cause })?
            .is_dir();
        let name = match path.file_name() {
            Some(name) => name.to_string_lossy().into_owned(),
            None => continue,
        };
        entries.push((name, path, is_dir));
    }
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(entries)
}
