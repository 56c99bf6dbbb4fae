use async_trait::async_trait;
use chrono::{DateTime, Utc};
use russh::client;
use russh::Disconnect;
use russh_keys::key::PublicKey;
use russh_keys::load_secret_key;
use std::collections::VecDeque;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::{classify_error, ListOptions, RemoteInfo, Transport};
use crate::error::{FsError, FsResult};
use crate::params::ConnectParams;
use crate::utils;

/// Engine for the SSH protocol family. Both the SFTP and SCP selections
/// bind here: they share the SSH security slot and the file operations
/// ride the SFTP subsystem of the one SSH connection.
pub struct SshTransport {
    handle: client::Handle<KeyChecker>,
    sftp: russh_sftp::client::SftpSession,
    closed: bool,
}

/// Host-key verification against the SSH slot of the connect parameters.
#[derive(Clone)]
struct KeyChecker {
    expected_fingerprint: Option<String>,
    accept_any: bool,
}

#[async_trait]
impl client::Handler for KeyChecker {
    type Error = FsError;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        if self.accept_any {
            tracing::debug!("host key verification skipped (accept_any)");
            return Ok(true);
        }
        match &self.expected_fingerprint {
            Some(expected) => {
                let actual = server_public_key.fingerprint();
                Ok(fingerprints_match(expected, &actual))
            }
            // Validation requires a fingerprint before open is attempted,
            // so this only triggers when that contract was bypassed.
            None => Ok(false),
        }
    }
}

fn fingerprints_match(expected: &str, actual: &str) -> bool {
    let norm = |s: &str| {
        s.trim()
            .trim_start_matches("SHA256:")
            .trim_end_matches('=')
            .to_string()
    };
    norm(expected) == norm(actual)
}

impl SshTransport {
    pub async fn open(params: &ConnectParams) -> FsResult<Self> {
        let config = client::Config {
            inactivity_timeout: Some(Duration::from_secs(300)),
            ..Default::default()
        };
        let checker = KeyChecker {
            expected_fingerprint: params.fingerprint().map(str::to_string),
            accept_any: params.accept_any(),
        };

        tracing::debug!(host = %params.host, port = params.port, "connecting ssh");

        let connect = client::connect(
            Arc::new(config),
            (params.host.as_str(), params.port),
            checker,
        );
        let mut handle = if params.timeout_ms() > 0 {
            tokio::time::timeout(Duration::from_millis(params.timeout_ms()), connect)
                .await
                .map_err(|_| {
                    FsError::transport(
                        "ssh connect",
                        format!("timed out after {}ms", params.timeout_ms()),
                    )
                })??
        } else {
            connect.await?
        };

        let authenticated = match params.private_key_path() {
            Some(key_path) => {
                let key = load_secret_key(key_path, params.private_key_passphrase())
                    .map_err(|e| FsError::transport("ssh auth", e.to_string()))?;
                handle
                    .authenticate_publickey(&params.username, Arc::new(key))
                    .await
                    .map_err(|e| FsError::transport("ssh auth", e.to_string()))?
            }
            None => handle
                .authenticate_password(&params.username, &params.password)
                .await
                .map_err(|e| FsError::transport("ssh auth", e.to_string()))?,
        };
        if !authenticated {
            return Err(FsError::transport(
                "ssh auth",
                "credentials rejected by server",
            ));
        }

        let channel = handle
            .channel_open_session()
            .await
            .map_err(|e| FsError::transport("sftp channel", e.to_string()))?;
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| FsError::transport("sftp channel", e.to_string()))?;
        let sftp = russh_sftp::client::SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| FsError::transport("sftp channel", e.to_string()))?;

        tracing::debug!(host = %params.host, "sftp subsystem ready");

        Ok(Self {
            handle,
            sftp,
            closed: false,
        })
    }

    fn info_from_attrs(
        full_name: String,
        attrs: &russh_sftp::protocol::FileAttributes,
    ) -> RemoteInfo {
        let name = {
            let base = utils::base_name(&full_name);
            if base.is_empty() {
                "/".to_string()
            } else {
                base.to_string()
            }
        };
        RemoteInfo {
            name,
            is_directory: attrs.is_dir(),
            length: attrs.size.unwrap_or(0),
            last_write_time: attrs
                .mtime
                .and_then(|t| DateTime::<Utc>::from_timestamp(i64::from(t), 0)),
            full_name,
        }
    }

    async fn remove_recursive(&mut self, path: &str) -> FsResult<()> {
        let info = self.stat(path).await?;
        if info.is_directory {
            let entries = self
                .list(path, ListOptions {
                    recursive: false,
                    include_directories: true,
                })
                .await?;
            for entry in entries {
                Box::pin(self.remove_recursive(&entry.full_name)).await?;
            }
            self.sftp
                .remove_dir(path)
                .await
                .map_err(|e| classify_error("remove", path, e.to_string()))
        } else {
            self.sftp
                .remove_file(path)
                .await
                .map_err(|e| classify_error("remove", path, e.to_string()))
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn stat(&mut self, path: &str) -> FsResult<RemoteInfo> {
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| classify_error("stat", path, e.to_string()))?;
        let full_name = self
            .sftp
            .canonicalize(path)
            .await
            .unwrap_or_else(|_| path.to_string());
        Ok(Self::info_from_attrs(full_name, &attrs))
    }

    async fn create_directory(&mut self, path: &str) -> FsResult<()> {
        self.sftp
            .create_dir(path)
            .await
            .map_err(|e| classify_error("create directory", path, e.to_string()))
    }

    async fn put_file(&mut self, local: &Path, remote: &str, remove_source: bool) -> FsResult<()> {
        let content = tokio::fs::read(local).await?;
        tracing::debug!(bytes = content.len(), remote, "sftp upload");
        self.sftp
            .write(remote, &content)
            .await
            .map_err(|e| classify_error("upload", remote, e.to_string()))?;
        if remove_source {
            tokio::fs::remove_file(local).await?;
        }
        Ok(())
    }

    async fn get_file(&mut self, remote: &str, local: &Path) -> FsResult<()> {
        let content = self
            .sftp
            .read(remote)
            .await
            .map_err(|e| classify_error("download", remote, e.to_string()))?;
        tracing::debug!(bytes = content.len(), remote, "sftp download");
        tokio::fs::write(local, &content).await?;
        Ok(())
    }

    async fn remove(&mut self, path: &str) -> FsResult<()> {
        self.remove_recursive(path).await
    }

    async fn list(&mut self, path: &str, options: ListOptions) -> FsResult<Vec<RemoteInfo>> {
        let mut result = Vec::new();
        let mut pending = VecDeque::from([path.to_string()]);

        while let Some(dir) = pending.pop_front() {
            let entries = self
                .sftp
                .read_dir(&dir)
                .await
                .map_err(|e| classify_error("list", &dir, e.to_string()))?;
            for entry in entries {
                let name = entry.file_name();
                if name == "." || name == ".." {
                    continue;
                }
                let full = utils::combine_remote(&dir, &name);
                let attrs = entry.metadata();
                let info = Self::info_from_attrs(full.clone(), &attrs);
                if info.is_directory && options.recursive {
                    pending.push_back(full);
                }
                if !info.is_directory || options.include_directories {
                    result.push(info);
                }
            }
        }
        Ok(result)
    }

    async fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        self.sftp
            .rename(old, new)
            .await
            .map_err(|e| classify_error("rename", old, e.to_string()))
    }

    async fn close(&mut self) -> FsResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(|e| FsError::transport("disconnect", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprints_match_ignores_prefix_and_padding() {
        assert!(fingerprints_match(
            "SHA256:Qn6BtvuOlAkqIvZ0NXIqxnN4pNjk8I1C/VP0pWp5dGM",
            "Qn6BtvuOlAkqIvZ0NXIqxnN4pNjk8I1C/VP0pWp5dGM="
        ));
        assert!(fingerprints_match("abc=", "abc"));
        assert!(!fingerprints_match("SHA256:abc", "SHA256:abd"));
    }
}
