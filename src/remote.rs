//! Directory-oriented access to a remote filesystem.
//!
//! `RemoteFs` keeps a current directory like an interactive SFTP client does,
//! so the mirror logic reads as a series of `cd`/`mkdir`/`put` calls.
use std::fmt;
use std::fs::File;
use std::io;
use std::net::TcpStream;
use std::path::Path;

use failure_derive::Fail;
use log::{debug, warn};
use serde_derive::{Deserialize, Serialize};
use ssh2::{ErrorCode, Session, Sftp};

/// `LIBSSH2_FX_NO_SUCH_FILE`
const SFTP_NO_SUCH_FILE: i32 = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EntryKind {
    File,
    Directory
}
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteEntry {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug, Fail)]
pub enum RemoteError {
    #[fail(display = "{}", _0)]
    Ssh(#[fail(cause)] ssh2::Error),
    #[fail(display = "{}", _0)]
    Io(#[fail(cause)] io::Error),
    #[fail(display = "{}", _0)]
    Rejected(String),
}
impl From<ssh2::Error> for RemoteError {
    #[inline]
    fn from(cause: ssh2::Error) -> RemoteError {
        RemoteError::Ssh(cause)
    }
}
impl From<io::Error> for RemoteError {
    #[inline]
    fn from(cause: io::Error) -> RemoteError {
        RemoteError::Io(cause)
    }
}

pub trait RemoteFs {
    /// The absolute path of the current directory
    fn pwd(&self) -> String;
    /// Change into `dir`, returning `false` if it doesn't exist
    fn try_cd(&mut self, dir: &str) -> Result<bool, RemoteError>;
    fn mkdir(&mut self, name: &str) -> Result<(), RemoteError>;
    fn rmdir(&mut self, name: &str) -> Result<(), RemoteError>;
    fn rm(&mut self, name: &str) -> Result<(), RemoteError>;
    /// List the current directory
    fn ls(&mut self) -> Result<Vec<RemoteEntry>, RemoteError>;
    /// Upload the local file into the current directory as `name`
    fn put(&mut self, local: &Path, name: &str) -> Result<(), RemoteError>;

    fn cd(&mut self, dir: &str) -> Result<(), RemoteError> {
        if self.try_cd(dir)? {
            Ok(())
        } else {
            Err(RemoteError::Rejected(format!("No such directory {}", join_remote(&self.pwd(), dir))))
        }
    }
    /// Enter `dir`, creating it first if it's missing.
    ///
    /// Returns whether the directory had to be created.
    fn ensure_dir(&mut self, dir: &str) -> Result<bool, RemoteError> {
        if self.try_cd(dir)? {
            return Ok(false)
        }
        self.mkdir(dir)?;
        self.cd(dir)?;
        Ok(true)
    }
}

/// Resolve `path` relative to the absolute remote directory `base`
pub fn join_remote(base: &str, path: &str) -> String {
    let mut components: Vec<&str> = if path.starts_with('/') {
        Vec::new()
    } else {
        base.split('/').filter(|s| !s.is_empty()).collect()
    };
    for component in path.split('/') {
        match component {
            "" | "." => {},
            ".." => { components.pop(); },
            name => components.push(name),
        }
    }
    format!("/{}", components.join("/"))
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SftpConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub user: String,
    pub password: String,
    /// Directory every mirror path is relative to
    #[serde(default = "default_root_path")]
    pub root_path: String,
}
impl SftpConfig {
    pub fn new(host: &str, user: &str, password: &str) -> SftpConfig {
        SftpConfig {
            host: host.into(),
            port: default_port(),
            user: user.into(),
            password: password.into(),
            root_path: default_root_path()
        }
    }
}
impl fmt::Debug for SftpConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("SftpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("root_path", &self.root_path)
            .finish()
    }
}
fn default_port() -> u16 {
    22
}
fn default_root_path() -> String {
    "www".into()
}

/// Opens and closes the sessions a mirror runs in
pub trait Connector {
    type Remote: RemoteFs;
    fn connect(&self, config: &SftpConfig) -> Result<Self::Remote, RemoteError>;
    fn disconnect(&self, remote: Self::Remote);
}
impl<'a, C: Connector + ?Sized> Connector for &'a C {
    type Remote = C::Remote;
    #[inline]
    fn connect(&self, config: &SftpConfig) -> Result<C::Remote, RemoteError> {
        (**self).connect(config)
    }
    #[inline]
    fn disconnect(&self, remote: C::Remote) {
        (**self).disconnect(remote)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SftpConnector;
impl Connector for SftpConnector {
    type Remote = SftpRemote;
    #[inline]
    fn connect(&self, config: &SftpConfig) -> Result<SftpRemote, RemoteError> {
        SftpRemote::connect(config)
    }
    #[inline]
    fn disconnect(&self, remote: SftpRemote) {
        remote.disconnect()
    }
}

/// A password-authenticated SFTP session.
///
/// Host keys are not verified.
pub struct SftpRemote {
    session: Session,
    sftp: Sftp,
    cwd: String,
}
impl SftpRemote {
    pub fn connect(config: &SftpConfig) -> Result<SftpRemote, RemoteError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port))?;
        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        session.handshake()?;
        session.userauth_password(&config.user, &config.password)?;
        if !session.authenticated() {
            return Err(RemoteError::Rejected(format!("Authentication failed for {}", config.user)))
        }
        let sftp = session.sftp()?;
        let home = sftp.realpath(Path::new("."))?;
        let cwd = join_remote("/", &home.to_string_lossy());
        debug!("Connected to {}:{} in {}", config.host, config.port, cwd);
        Ok(SftpRemote { session, sftp, cwd })
    }
    /// Close the SFTP channel, then the session
    pub fn disconnect(self) {
        let SftpRemote { session, sftp, .. } = self;
        drop(sftp);
        if let Err(e) = session.disconnect(None, "closing", None) {
            warn!("Unable to cleanly disconnect: {}", e);
        }
    }
    #[inline]
    fn resolve(&self, name: &str) -> String {
        join_remote(&self.cwd, name)
    }
}
impl RemoteFs for SftpRemote {
    #[inline]
    fn pwd(&self) -> String {
        self.cwd.clone()
    }
    fn try_cd(&mut self, dir: &str) -> Result<bool, RemoteError> {
        let target = self.resolve(dir);
        match self.sftp.stat(Path::new(&target)) {
            Ok(ref stat) if stat.is_dir() => {
                self.cwd = target;
                Ok(true)
            },
            Ok(_) => Err(RemoteError::Rejected(format!("{} is not a directory", target))),
            Err(ref e) if is_missing(e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
    fn mkdir(&mut self, name: &str) -> Result<(), RemoteError> {
        self.sftp.mkdir(Path::new(&self.resolve(name)), 0o755)?;
        Ok(())
    }
    fn rmdir(&mut self, name: &str) -> Result<(), RemoteError> {
        self.sftp.rmdir(Path::new(&self.resolve(name)))?;
        Ok(())
    }
    fn rm(&mut self, name: &str) -> Result<(), RemoteError> {
        self.sftp.unlink(Path::new(&self.resolve(name)))?;
        Ok(())
    }
    fn ls(&mut self) -> Result<Vec<RemoteEntry>, RemoteError> {
        let entries = self.sftp.readdir(Path::new(&self.cwd))?;
        Ok(entries.into_iter().filter_map(|(path, stat)| {
            let name = path.file_name()?.to_string_lossy().into_owned();
            let kind = if stat.is_dir() { EntryKind::Directory } else { EntryKind::File };
            Some(RemoteEntry { name, kind })
        }).collect())
    }
    fn put(&mut self, local: &Path, name: &str) -> Result<(), RemoteError> {
        let mut source = File::open(local)?;
        let mut destination = self.sftp.create(Path::new(&self.resolve(name)))?;
        io::copy(&mut source, &mut destination)?;
        Ok(())
    }
}
fn is_missing(error: &ssh2::Error) -> bool {
    match error.code() {
        ErrorCode::SFTP(SFTP_NO_SUCH_FILE) => true,
        _ => false
    }
}
