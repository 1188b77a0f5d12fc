//! In-memory stand-ins for the HTTP and SFTP transports.
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use sha1::{Digest, Sha1};

use crate::remote::{join_remote, Connector, EntryKind, RemoteEntry, RemoteError, RemoteFs, SftpConfig};
use crate::utils::{HttpClient, TransferError};

pub fn sha1_hex(data: &[u8]) -> String {
    format!("{:x}", Sha1::digest(data))
}

/// Serves canned responses and records every requested url.
///
/// Unknown urls fail like a refused connection.
#[derive(Default)]
pub struct MockHttp {
    responses: HashMap<String, (u32, Vec<u8>)>,
    requests: RefCell<Vec<String>>,
}
impl MockHttp {
    pub fn new() -> MockHttp {
        MockHttp::default()
    }
    pub fn respond(mut self, url: &str, status: u32, body: &[u8]) -> MockHttp {
        self.responses.insert(url.into(), (status, body.to_vec()));
        self
    }
    pub fn json(self, url: &str, body: &str) -> MockHttp {
        self.respond(url, 200, body.as_bytes())
    }
    pub fn requests(&self) -> Vec<String> {
        self.requests.borrow().clone()
    }
    pub fn request_count(&self, url: &str) -> usize {
        self.requests.borrow().iter().filter(|u| *u == url).count()
    }
}
impl HttpClient for MockHttp {
    fn get(&self, url: &str, output: &mut dyn Write) -> Result<u32, TransferError> {
        self.requests.borrow_mut().push(url.into());
        match self.responses.get(url) {
            Some(&(status, ref body)) => {
                output.write_all(body).map_err(TransferError::Io)?;
                Ok(status)
            },
            None => Err(TransferError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("no route to {}", url)
            )))
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Node {
    Directory,
    File(Vec<u8>),
}

/// A remote filesystem kept in a sorted map of absolute paths.
///
/// The root `/` always exists. `fail_on` makes one operation on one path fail.
pub struct MemoryRemote {
    nodes: BTreeMap<String, Node>,
    cwd: String,
    fail_on: Option<(&'static str, String)>,
    pub operations: Vec<String>,
}
impl MemoryRemote {
    pub fn new() -> MemoryRemote {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Directory);
        MemoryRemote { nodes, cwd: "/".into(), fail_on: None, operations: Vec::new() }
    }
    pub fn with_dir(mut self, path: &str) -> MemoryRemote {
        self.nodes.insert(join_remote("/", path), Node::Directory);
        self
    }
    pub fn with_file(mut self, path: &str, contents: &[u8]) -> MemoryRemote {
        self.nodes.insert(join_remote("/", path), Node::File(contents.to_vec()));
        self
    }
    pub fn fail_on(mut self, operation: &'static str, path: &str) -> MemoryRemote {
        self.fail_on = Some((operation, join_remote("/", path)));
        self
    }
    pub fn node(&self, path: &str) -> Option<&Node> {
        self.nodes.get(&join_remote("/", path))
    }
    /// Every path below `root`, relative to it, directories suffixed with `/`
    pub fn tree(&self, root: &str) -> Vec<String> {
        let root = join_remote("/", root);
        let prefix = if root == "/" { root.clone() } else { format!("{}/", root) };
        self.nodes.iter()
            .filter(|(path, _)| path.starts_with(&prefix) && **path != root)
            .map(|(path, node)| {
                let relative = &path[prefix.len()..];
                match *node {
                    Node::Directory => format!("{}/", relative),
                    Node::File(_) => relative.to_string(),
                }
            })
            .collect()
    }
    fn children(&self, dir: &str) -> Vec<(String, Node)> {
        self.nodes.iter()
            .filter(|(path, _)| *path != dir && parent(path) == dir)
            .map(|(path, node)| (path.clone(), node.clone()))
            .collect()
    }
    fn check(&mut self, operation: &'static str, path: &str) -> Result<(), RemoteError> {
        self.operations.push(format!("{} {}", operation, path));
        match self.fail_on {
            Some((failing, ref failing_path)) if failing == operation && failing_path == path => {
                Err(RemoteError::Rejected(format!("{} {}: permission denied", operation, path)))
            },
            _ => Ok(())
        }
    }
}
fn parent(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(index) => &path[..index],
        None => "/",
    }
}
impl RemoteFs for MemoryRemote {
    fn pwd(&self) -> String {
        self.cwd.clone()
    }
    fn try_cd(&mut self, dir: &str) -> Result<bool, RemoteError> {
        let target = join_remote(&self.cwd, dir);
        self.check("cd", &target)?;
        match self.nodes.get(&target) {
            Some(Node::Directory) => {
                self.cwd = target;
                Ok(true)
            },
            Some(Node::File(_)) => Err(RemoteError::Rejected(format!("{} is not a directory", target))),
            None => Ok(false),
        }
    }
    fn mkdir(&mut self, name: &str) -> Result<(), RemoteError> {
        let target = join_remote(&self.cwd, name);
        self.check("mkdir", &target)?;
        if self.nodes.contains_key(&target) {
            return Err(RemoteError::Rejected(format!("{} already exists", target)))
        }
        self.nodes.insert(target, Node::Directory);
        Ok(())
    }
    fn rmdir(&mut self, name: &str) -> Result<(), RemoteError> {
        let target = join_remote(&self.cwd, name);
        self.check("rmdir", &target)?;
        if self.nodes.get(&target) != Some(&Node::Directory) {
            return Err(RemoteError::Rejected(format!("{} is not a directory", target)))
        }
        if !self.children(&target).is_empty() {
            return Err(RemoteError::Rejected(format!("{} is not empty", target)))
        }
        self.nodes.remove(&target);
        Ok(())
    }
    fn rm(&mut self, name: &str) -> Result<(), RemoteError> {
        let target = join_remote(&self.cwd, name);
        self.check("rm", &target)?;
        match self.nodes.get(&target) {
            Some(Node::File(_)) => {
                self.nodes.remove(&target);
                Ok(())
            },
            _ => Err(RemoteError::Rejected(format!("{} is not a file", target))),
        }
    }
    fn ls(&mut self) -> Result<Vec<RemoteEntry>, RemoteError> {
        let cwd = self.cwd.clone();
        self.check("ls", &cwd)?;
        // Like a real server, the listing includes the self and parent entries
        let mut entries = vec![
            RemoteEntry { name: ".".into(), kind: EntryKind::Directory },
            RemoteEntry { name: "..".into(), kind: EntryKind::Directory },
        ];
        entries.extend(self.children(&cwd).into_iter().map(|(path, node)| RemoteEntry {
            name: path[path.rfind('/').map_or(0, |i| i + 1)..].to_string(),
            kind: match node {
                Node::Directory => EntryKind::Directory,
                Node::File(_) => EntryKind::File,
            }
        }));
        Ok(entries)
    }
    fn put(&mut self, local: &Path, name: &str) -> Result<(), RemoteError> {
        let target = join_remote(&self.cwd, name);
        self.check("put", &target)?;
        if self.nodes.get(parent(&target)) != Some(&Node::Directory) {
            return Err(RemoteError::Rejected(format!("No parent directory for {}", target)))
        }
        let contents = fs::read(local)?;
        self.nodes.insert(target, Node::File(contents));
        Ok(())
    }
}

/// Hands out one `MemoryRemote` as the session and takes it back on disconnect.
///
/// Without a remote to hand out, connecting fails.
pub struct MemoryConnector {
    remote: RefCell<Option<MemoryRemote>>,
    disconnects: Cell<u32>,
}
impl MemoryConnector {
    pub fn new(remote: MemoryRemote) -> MemoryConnector {
        MemoryConnector { remote: RefCell::new(Some(remote)), disconnects: Cell::new(0) }
    }
    pub fn refusing() -> MemoryConnector {
        MemoryConnector { remote: RefCell::new(None), disconnects: Cell::new(0) }
    }
    #[inline]
    pub fn disconnects(&self) -> u32 {
        self.disconnects.get()
    }
    /// The remote, once it has been handed back
    pub fn into_remote(self) -> Option<MemoryRemote> {
        self.remote.into_inner()
    }
}
impl Connector for MemoryConnector {
    type Remote = MemoryRemote;
    fn connect(&self, config: &SftpConfig) -> Result<MemoryRemote, RemoteError> {
        self.remote.borrow_mut().take()
            .ok_or_else(|| RemoteError::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{}:{} refused the connection", config.host, config.port)
            )))
    }
    fn disconnect(&self, remote: MemoryRemote) {
        self.disconnects.set(self.disconnects.get() + 1);
        *self.remote.borrow_mut() = Some(remote);
    }
}
