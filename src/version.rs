use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use failure_derive::Fail;


/// A release version of the form `major.minor[.patch]`.
///
/// Whether the patch was written matters: `1.16` and `1.16.0` are different labels
/// on the metadata service. A pre-release suffix such as `-pre1` or `-rc2` is accepted
/// and dropped, so `1.11.2-pre1` compares like `1.11.2`.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct MinecraftVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: Option<u32>
}
impl MinecraftVersion {
    /// Servers from `1.0.x` up to `1.11.x` crash with native transport enabled.
    ///
    /// Only labels with an explicit patch count, so a bare `1.8` is not matched.
    pub fn needs_native_transport_disabled(self) -> bool {
        self.major == 1 && self.minor <= 11 && self.patch.is_some()
    }
    /// Servers up to `1.16.4` don't understand `-add-plugin` and need the plugin on disk.
    pub fn needs_plugin_copy(self) -> bool {
        if self.major != 1 {
            return false
        }
        match (self.minor, self.patch) {
            (minor, _) if minor <= 15 => true,
            (16, None) => true,
            (16, Some(patch)) => patch <= 4,
            _ => false
        }
    }
}
impl FromStr for MinecraftVersion {
    type Err = InvalidMinecraftVersion;

    fn from_str(s: &str) -> Result<Self, InvalidMinecraftVersion> {
        let error = || InvalidMinecraftVersion(s.into());
        let release = match s.find('-') {
            Some(index) if index + 1 < s.len() => &s[..index],
            Some(_) => return Err(error()),
            None => s,
        };
        let mut parts = release.split('.');
        let major = parts.next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(error)?;
        let minor = parts.next()
            .and_then(|s| s.parse().ok())
            .ok_or_else(error)?;
        Ok(match parts.next() {
            Some(s) => {
                let patch = s.parse().ok()
                    .ok_or_else(error)?;
                if parts.next().is_some() {
                    return Err(error())
                }
                MinecraftVersion { major, minor, patch: Some(patch) }
            }
            None => MinecraftVersion { major, minor, patch: None }
        })
    }
}
impl Display for MinecraftVersion {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(patch) = self.patch {
            write!(f, ".{}", patch)?;
        }
        Ok(())
    }
}
#[derive(Debug, Fail)]
#[fail(display = "Invalid minecraft version {:?}", _0)]
pub struct InvalidMinecraftVersion(String);
