//! Remote file transfer

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use crate::errors::BuilderError;
use crate::event::{step, EventReporter, StepTags};
use crate::filesys::file::File;

/// Credentials for a remote transfer endpoint
#[derive(Debug, Clone)]
pub struct RemoteCredentials {
    pub host: String,
    pub port: String,
    pub username: String,
    pub password: SecretString,
}

/// An open transfer session.
///
/// Callers must call [`RemoteSession::close`] on every path once the session
/// was opened.
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// Download `remote_path` to `local_path`
    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        reporter: &dyn EventReporter,
    ) -> Result<(), BuilderError>;

    /// Release the session
    async fn close(&self) -> Result<(), BuilderError>;
}

/// Opens transfer sessions
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &RemoteCredentials,
    ) -> Result<Box<dyn RemoteSession>, BuilderError>;
}

/// Connector that drives the `curl` binary over SFTP
#[derive(Debug, Clone)]
pub struct CurlSftpConnector {
    program: String,
}

impl CurlSftpConnector {
    pub fn new() -> Self {
        Self {
            program: "curl".to_string(),
        }
    }

    /// Use a specific curl binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for CurlSftpConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteConnector for CurlSftpConnector {
    async fn connect(
        &self,
        credentials: &RemoteCredentials,
    ) -> Result<Box<dyn RemoteSession>, BuilderError> {
        if credentials.host.is_empty() {
            return Err(BuilderError::TransferError("missing sftp host".to_string()));
        }
        let port: u16 = credentials.port.parse().map_err(|_| {
            BuilderError::TransferError(format!("invalid sftp port: {}", credentials.port))
        })?;
        check_config_value("sftp username", &credentials.username)?;
        check_config_value("sftp password", credentials.password.expose_secret())?;

        debug!("Opening sftp session to {}:{}", credentials.host, port);
        Ok(Box::new(CurlSftpSession {
            program: self.program.clone(),
            host: credentials.host.clone(),
            port,
            username: credentials.username.clone(),
            password: credentials.password.clone(),
        }))
    }
}

/// One SFTP endpoint reached through curl
pub struct CurlSftpSession {
    program: String,
    host: String,
    port: u16,
    username: String,
    password: SecretString,
}

impl CurlSftpSession {
    /// URL of `remote_path` on this endpoint
    pub fn url_for(&self, remote_path: &str) -> String {
        format!(
            "sftp://{}:{}/{}",
            self.host,
            self.port,
            remote_path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl RemoteSession for CurlSftpSession {
    async fn download_file(
        &self,
        remote_path: &str,
        local_path: &Path,
        reporter: &dyn EventReporter,
    ) -> Result<(), BuilderError> {
        let url = self.url_for(remote_path);
        let target = File::new(local_path);
        target.ensure_parent().await?;

        reporter.info(
            &format!("Downloading {} from {}", remote_path, self.host),
            StepTags::step(step::SLUG_SHARE),
        );

        let config = curl_config(&self.username, &self.password)?;

        // Credentials go through a curl config on stdin, never argv. The host
        // key is checked against the user's ~/.ssh/known_hosts.
        let mut child = Command::new(&self.program)
            .args(["--silent", "--show-error", "--fail", "--config", "-"])
            .arg("--output")
            .arg(local_path)
            .arg(&url)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| BuilderError::TransferError(format!("failed to run curl: {}", e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(config.as_bytes()).await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let _ = target.delete().await;
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BuilderError::TransferError(format!(
                "download of {} failed: {}",
                url,
                stderr.trim()
            )));
        }

        info!("Downloaded {} to {}", url, local_path.display());
        reporter.info("Download finished", StepTags::step(step::SLUG_SHARE));
        Ok(())
    }

    async fn close(&self) -> Result<(), BuilderError> {
        debug!("Closing sftp session to {}:{}", self.host, self.port);
        Ok(())
    }
}

/// Control characters would end the quoted value and start a new directive
fn check_config_value(name: &str, value: &str) -> Result<(), BuilderError> {
    if value.chars().any(char::is_control) {
        return Err(BuilderError::TransferError(format!(
            "{} contains control characters",
            name
        )));
    }
    Ok(())
}

fn escape_config(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Curl config carrying the login, one `user` directive
fn curl_config(username: &str, password: &SecretString) -> Result<String, BuilderError> {
    check_config_value("sftp username", username)?;
    check_config_value("sftp password", password.expose_secret())?;
    Ok(format!(
        "user = \"{}:{}\"\n",
        escape_config(username),
        escape_config(password.expose_secret())
    ))
}
