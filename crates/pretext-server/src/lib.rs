//! Local preview server for PreTeXt projects.
//!
//! Serves built output with caching disabled, keeps track of running servers
//! in `~/.ptx/running_servers`, and watches sources for `view --watch`.

pub mod access;
pub mod registry;
pub mod server;
pub mod watcher;

pub use access::{binding_for_access, url_for_access, Access, Environment};
pub use registry::{Registry, RegistryError, RunningServer};
pub use server::{PreviewServer, ServerConfig, ServerError};
pub use watcher::{ChangeKind, FileWatcher, WatchEvent};
