//! Artifact sources
//!
//! Slugs are either copied from a path visible to this node or downloaded
//! from a remote transfer endpoint.

pub mod local;
pub mod remote;

pub use local::copy_file_with_progress;
pub use remote::{CurlSftpConnector, RemoteConnector, RemoteCredentials, RemoteSession};
