//! Keeps Minecraft test servers and published documentation in sync with their sources.
//!
//! - [`BibliothekInstaller`] fetches the latest server build of a version from a
//!   Bibliothek metadata service, reusing the cached binary unless told otherwise.
//! - [`MirrorUploader`] makes a remote SFTP directory an exact copy of a local one.
//! - [`TestServer`] prepares a server directory around an installed binary
//!   (EULA, `server.properties`, the plugin under test).
extern crate indexmap;
extern crate failure;
extern crate failure_derive;
extern crate serde;
extern crate serde_derive;
extern crate serde_json;
extern crate curl;
extern crate ssh2;
extern crate sha1;
extern crate tempfile;
extern crate scopeguard;
extern crate log;

pub mod bibliothek;
pub mod installer;
pub mod remote;
pub mod mirror;
pub mod platform;
pub mod server;
mod version;
mod utils;
#[cfg(test)]
mod testing;

pub use self::bibliothek::{Bibliothek, BibliothekError, BuildQuery, DownloadTarget};
pub use self::installer::{BibliothekInstaller, InstallerConfig, InstallFailed};
pub use self::mirror::{MirrorUploader, MirrorError, documentation_path};
pub use self::remote::{Connector, RemoteFs, SftpConfig, SftpConnector};
pub use self::platform::Platform;
pub use self::server::{TestServer, PreparedServer};
pub use self::version::{MinecraftVersion, InvalidMinecraftVersion};
pub use self::utils::{HttpClient, CurlClient, TransferError};
