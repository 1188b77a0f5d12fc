use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use failure_derive::Fail;

use crate::installer::{BibliothekInstaller, InstallerConfig};

const PAPER_API: &str = "https://api.papermc.io";

/// A server software test servers can be installed from
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Platform {
    Paper,
    Folia
}
impl Platform {
    #[inline]
    pub fn id(self) -> &'static str {
        match self {
            Platform::Paper => "paper",
            Platform::Folia => "folia",
        }
    }
    #[inline]
    pub fn api_url(self) -> &'static str {
        match self {
            Platform::Paper | Platform::Folia => PAPER_API,
        }
    }
    /// The project name on the metadata service
    #[inline]
    pub fn project(self) -> &'static str {
        self.id()
    }
    #[inline]
    pub fn supports_server_properties(self) -> bool {
        true
    }
    #[inline]
    pub fn has_eula(self) -> bool {
        true
    }
    #[inline]
    pub fn plugin_dir_name(self) -> &'static str {
        "plugins"
    }
    /// Whether the server accepts `-add-plugin=<jar>` on its command line
    #[inline]
    pub fn supports_plugin_as_parameter(self) -> bool {
        true
    }
    pub fn installer_config(self) -> InstallerConfig {
        InstallerConfig::new(self.api_url(), self.project())
    }
    pub fn installer(self) -> BibliothekInstaller {
        BibliothekInstaller::new(self.installer_config())
    }
}
impl FromStr for Platform {
    type Err = UnknownPlatform;

    fn from_str(s: &str) -> Result<Self, UnknownPlatform> {
        Ok(match &*s.to_ascii_lowercase() {
            "paper" => Platform::Paper,
            "folia" => Platform::Folia,
            _ => return Err(UnknownPlatform(s.into()))
        })
    }
}
impl Display for Platform {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        f.write_str(self.id())
    }
}
#[derive(Debug, Fail)]
#[fail(display = "Unknown platform {:?}", _0)]
pub struct UnknownPlatform(String);
