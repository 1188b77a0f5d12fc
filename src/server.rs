//! Preparing a local test server directory for a plugin.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use failure::{Error, ResultExt};
use indexmap::IndexMap;
use log::{debug, info};

use crate::installer::BibliothekInstaller;
use crate::platform::Platform;
use crate::utils::HttpClient;
use crate::version::MinecraftVersion;

pub const EULA_NOTICE: &str = "By using this testing service, you agree to the EULA. \
    Please refer to it at https://account.mojang.com/documents/minecraft_eula";
/// The file name the plugin is copied to on servers that can't load it from the command line
pub const DEBUG_PLUGIN_NAME: &str = "debugPlugin.jar";
pub const DEFAULT_TESTING_DIRECTORY: &str = "test-environment";

/// The contents of a `server.properties` file, in file order.
///
/// Comments are not preserved when the file is rewritten.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ServerProperties(IndexMap<String, String>);
impl ServerProperties {
    /// Parse the Java properties format: `=`, `:` or whitespace separate a key from its
    /// value, and a line ending in an unescaped backslash continues on the next line.
    pub fn parse(text: &str) -> ServerProperties {
        let mut properties = IndexMap::new();
        for line in logical_lines(text) {
            let (key, value) = split_property(&line);
            properties.insert(unescape(key), unescape(value));
        }
        ServerProperties(properties)
    }
    /// Load the properties file, treating a missing file as empty
    pub fn load(path: &Path) -> Result<ServerProperties, Error> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(ServerProperties::parse(&text)),
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(ServerProperties::default()),
            Err(e) => Err(Error::from(e).context(format!("Unable to read {}", path.display())).into()),
        }
    }
    #[inline]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }
    /// Returns whether the value changed
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        if self.get(key) == Some(value) {
            return false
        }
        self.0.insert(key.into(), value.into());
        true
    }
    pub fn render(&self) -> String {
        let mut result = String::new();
        for (key, value) in &self.0 {
            result.push_str(&escape(key, true));
            result.push('=');
            result.push_str(&escape(value, false));
            result.push('\n');
        }
        result
    }
}
#[inline]
fn is_separator_space(c: char) -> bool {
    c == ' ' || c == '\t' || c == '\u{c}'
}
/// Join continued lines, dropping blanks and comments
fn logical_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<String> = None;
    for line in text.lines() {
        let line = line.trim_start_matches(is_separator_space);
        let mut logical = match current.take() {
            Some(logical) => logical,
            None if line.is_empty() || line.starts_with('#') || line.starts_with('!') => continue,
            None => String::new(),
        };
        logical.push_str(line);
        let trailing_backslashes = line.chars().rev().take_while(|&c| c == '\\').count();
        if trailing_backslashes % 2 == 1 {
            logical.pop();
            current = Some(logical);
        } else {
            lines.push(logical);
        }
    }
    lines.extend(current);
    lines
}
fn split_property(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (index, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '=' | ':' => {
                key_end = index;
                break
            },
            _ if is_separator_space(c) => {
                key_end = index;
                break
            },
            _ => {}
        }
    }
    let mut value = line[key_end..].trim_start_matches(is_separator_space);
    if value.starts_with('=') || value.starts_with(':') {
        value = value[1..].trim_start_matches(is_separator_space);
    }
    (&line[..key_end], value)
}
fn unescape(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue
        }
        match chars.next() {
            Some('t') => result.push('\t'),
            Some('n') => result.push('\n'),
            Some('r') => result.push('\r'),
            Some('f') => result.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(::std::char::from_u32) {
                    Some(decoded) => result.push(decoded),
                    None => {
                        result.push('u');
                        result.push_str(&hex);
                    }
                }
            },
            Some(other) => result.push(other),
            None => {}
        }
    }
    result
}
/// Keys escape every separator. Values only need a leading space escaped.
fn escape(s: &str, key: bool) -> String {
    let mut result = String::with_capacity(s.len());
    for (index, c) in s.chars().enumerate() {
        match c {
            '\\' => result.push_str("\\\\"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\u{c}' => result.push_str("\\f"),
            ' ' if key || index == 0 => result.push_str("\\ "),
            '=' | ':' if key => {
                result.push('\\');
                result.push(c);
            },
            '#' | '!' if key && index == 0 => {
                result.push('\\');
                result.push(c);
            },
            _ => result.push(c),
        }
    }
    result
}

/// A test server of one platform and version, living in its own directory
#[derive(Clone, Debug)]
pub struct TestServer {
    pub platform: Platform,
    pub version: String,
    pub directory: PathBuf,
    pub args: Vec<String>,
    pub jvm_args: Vec<String>,
    pub properties: IndexMap<String, String>,
}
impl TestServer {
    pub fn new(platform: Platform, version: &str, directory: PathBuf) -> TestServer {
        TestServer {
            platform,
            version: version.into(),
            directory,
            args: vec!["nogui".into()],
            jvm_args: Vec::new(),
            properties: IndexMap::new()
        }
    }
    /// A server in `{testing_directory}/{platform}/{version}`
    pub fn in_testing_directory(testing_directory: &Path, platform: Platform, version: &str) -> TestServer {
        let directory = testing_directory.join(platform.id()).join(version);
        TestServer::new(platform, version, directory)
    }
    pub fn property(&mut self, key: &str, value: &str) -> &mut TestServer {
        self.properties.insert(key.into(), value.into());
        self
    }
    #[inline]
    pub fn port(&mut self, port: u16) -> &mut TestServer {
        self.property("port", &port.to_string())
    }
    #[inline]
    pub fn online_mode(&mut self, online_mode: bool) -> &mut TestServer {
        self.property("online-mode", &online_mode.to_string())
    }
    #[inline]
    pub fn prepare(&self, plugin_jar: &Path, force_update: bool) -> Result<PreparedServer, Error> {
        self.prepare_with(&self.platform.installer(), plugin_jar, force_update)
    }
    pub fn prepare_with<C: HttpClient>(
        &self,
        installer: &BibliothekInstaller<C>,
        plugin_jar: &Path,
        force_update: bool
    ) -> Result<PreparedServer, Error> {
        let server_jar = installer.install(&self.version, &self.directory, force_update)?;
        let version = self.version.parse::<MinecraftVersion>().ok();
        if self.platform.has_eula() {
            self.accept_eula()?;
        }
        if self.platform.supports_server_properties() {
            self.update_properties(version)?;
        }
        let mut args = self.args.clone();
        if let Some(arg) = self.install_plugin(plugin_jar, version)? {
            args.push(arg);
        }
        Ok(PreparedServer {
            server_jar,
            directory: self.directory.clone(),
            args,
            jvm_args: self.jvm_args.clone()
        })
    }
    fn accept_eula(&self) -> Result<(), Error> {
        let eula = self.directory.join("eula.txt");
        if !eula.exists() {
            info!("{}", EULA_NOTICE);
            fs::write(&eula, "eula=true")
                .with_context(|_| format!("Unable to create {}", eula.display()))?;
        }
        Ok(())
    }
    fn update_properties(&self, version: Option<MinecraftVersion>) -> Result<(), Error> {
        info!("Preparing server.properties");
        let location = self.directory.join("server.properties");
        let mut properties = ServerProperties::load(&location)?;
        let mut changed = false;
        for (key, value) in &self.properties {
            changed |= properties.set(key, value);
        }
        if version.map_or(false, MinecraftVersion::needs_native_transport_disabled) {
            changed |= properties.set("use-native-transport", "false");
        }
        if changed {
            debug!("Writing {}", location.display());
            fs::write(&location, properties.render())
                .with_context(|_| format!("Unable to write {}", location.display()))?;
        }
        Ok(())
    }
    /// Put the plugin where the server will load it, returning any extra server argument
    fn install_plugin(&self, plugin_jar: &Path, version: Option<MinecraftVersion>) -> Result<Option<String>, Error> {
        info!("Preparing plugin");
        let plugin_dir = self.directory.join(self.platform.plugin_dir_name());
        fs::create_dir_all(&plugin_dir)
            .with_context(|_| format!("Unable to create {}", plugin_dir.display()))?;
        let debug_plugin = plugin_dir.join(DEBUG_PLUGIN_NAME);
        let copy_plugin = !self.platform.supports_plugin_as_parameter()
            || version.map_or(false, MinecraftVersion::needs_plugin_copy);
        if copy_plugin {
            fs::copy(plugin_jar, &debug_plugin)
                .with_context(|_| format!("Unable to copy plugin jar to {}", plugin_dir.display()))?;
            return Ok(None)
        }
        if debug_plugin.exists() {
            fs::remove_file(&debug_plugin)
                .with_context(|_| format!("Unable to remove existing {}", debug_plugin.display()))?;
        }
        let absolute = fs::canonicalize(plugin_jar)
            .with_context(|_| format!("Unable to locate plugin {}", plugin_jar.display()))?;
        Ok(Some(format!("-add-plugin={}", absolute.display())))
    }
}

/// An installed server ready to be launched
#[derive(Clone, Debug)]
pub struct PreparedServer {
    pub server_jar: PathBuf,
    pub directory: PathBuf,
    pub args: Vec<String>,
    pub jvm_args: Vec<String>,
}
impl PreparedServer {
    pub fn command(&self, java: &str) -> Command {
        let mut command = Command::new(java);
        command.args(&self.jvm_args)
            .arg("-jar")
            .arg(&self.server_jar)
            .args(&self.args)
            .current_dir(&self.directory);
        command
    }
}
