//! Bookkeeping for preview servers started by `pretext view`.
//!
//! Each running server is one line of `<home>/running_servers`:
//! `path_hash pid port binding`.

use std::fmt;
use std::fs;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;
use std::time::Duration;

use pretext_project::paths::home_path;

/// Number of entries at which inactive ones are cleaned up on insert.
///
/// Not a cap on concurrent servers.
pub const PURGE_LIMIT: usize = 10;

const FILE_NAME: &str = "running_servers";

/// Errors reading or writing the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid line in running servers file: '{0}'")]
    InvalidLine(String),

    #[error("Unable to access running servers file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One registered server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningServer {
    pub path_hash: String,
    pub pid: u32,
    pub port: u16,
    pub binding: String,
}

impl RunningServer {
    pub fn url(&self) -> String {
        format!("{}:{}", self.binding, self.port)
    }

    /// Whether something still accepts connections on the server's port.
    pub fn is_listening(&self) -> bool {
        let host = if self.binding == "0.0.0.0" {
            "127.0.0.1"
        } else {
            self.binding.as_str()
        };
        let Ok(addrs) = (host, self.port).to_socket_addrs() else {
            return false;
        };
        addrs
            .into_iter()
            .any(|addr| TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_ok())
    }
}

impl FromStr for RunningServer {
    type Err = RegistryError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let invalid = || RegistryError::InvalidLine(line.trim().to_string());
        let fields: Vec<&str> = line.split_whitespace().collect();
        let [path_hash, pid, port, binding] = fields.as_slice() else {
            return Err(invalid());
        };
        Ok(RunningServer {
            path_hash: path_hash.to_string(),
            pid: pid.parse().map_err(|_| invalid())?,
            port: port.parse().map_err(|_| invalid())?,
            binding: binding.to_string(),
        })
    }
}

impl fmt::Display for RunningServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.path_hash, self.pid, self.port, self.binding)
    }
}

/// The running servers file.
#[derive(Debug, Clone)]
pub struct Registry {
    path: PathBuf,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(home_path().join(FILE_NAME))
    }
}

impl Registry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// All entries on file. A missing file is an empty registry.
    pub fn load(&self) -> Result<Vec<RunningServer>, RegistryError> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.path).map_err(|e| self.io(e))?;
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(str::parse)
            .collect()
    }

    /// Overwrite the file with `servers`.
    pub fn save(&self, servers: &[RunningServer]) -> Result<(), RegistryError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.io(e))?;
        }
        let contents: String = servers.iter().map(|server| format!("{}\n", server)).collect();
        fs::write(&self.path, contents).map_err(|e| self.io(e))
    }

    /// Record a new server. Does not check for an existing one with the same hash.
    pub fn add(&self, server: RunningServer) -> Result<(), RegistryError> {
        let mut servers = self.load()?;
        tracing::debug!("Adding pretext web server entry {}", server);
        servers.push(server);
        if servers.len() >= PURGE_LIMIT {
            tracing::info!("There are {} or more servers on file. Cleaning up ...", PURGE_LIMIT);
            // Only the entries go; a recorded pid may since belong to another program.
            servers.retain(RunningServer::is_listening);
        }
        self.save(&servers)
    }

    pub fn remove(&self, path_hash: &str) -> Result<(), RegistryError> {
        let mut servers = self.load()?;
        let before = servers.len();
        servers.retain(|server| server.path_hash != path_hash);
        if servers.len() != before {
            self.save(&servers)?;
        }
        Ok(())
    }

    /// The entry for `path_hash`, if any.
    pub fn find(&self, path_hash: &str) -> Result<Option<RunningServer>, RegistryError> {
        Ok(self
            .load()?
            .into_iter()
            .find(|server| server.path_hash == path_hash))
    }

    /// The entry for `path_hash` if its server is still listening.
    ///
    /// Stale entries are dropped from the file.
    pub fn find_active(&self, path_hash: &str) -> Result<Option<RunningServer>, RegistryError> {
        let Some(server) = self.find(path_hash)? else {
            return Ok(None);
        };
        if server.is_listening() {
            tracing::info!("Found PreTeXt web server at {}", server.url());
            return Ok(Some(server));
        }
        tracing::debug!(
            "Found entry for process {} no longer listening on port {}; removing entry.",
            server.pid,
            server.port
        );
        self.remove(path_hash)?;
        Ok(None)
    }

    /// Remove the entry and stop its process.
    pub fn terminate(&self, server: &RunningServer) -> Result<(), RegistryError> {
        tracing::debug!("Terminating {}", server.pid);
        self.remove(&server.path_hash)?;
        if !kill(server.pid) {
            tracing::error!(
                "Attempt to terminate PreTeXt web server failed for process {} on port {}.",
                server.pid,
                server.port
            );
        }
        Ok(())
    }

    fn io(&self, source: io::Error) -> RegistryError {
        RegistryError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn kill(pid: u32) -> bool {
    let pid = pid.to_string();
    let mut command = if cfg!(windows) {
        let mut command = Command::new("taskkill");
        command.args(["/PID", &pid, "/F"]);
        command
    } else {
        let mut command = Command::new("kill");
        command.arg(&pid);
        command
    };
    match command.output() {
        Ok(output) => output.status.success(),
        Err(e) => {
            tracing::debug!("Could not run kill for {}: {}", pid, e);
            false
        }
    }
}
