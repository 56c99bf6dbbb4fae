use async_trait::async_trait;
use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use std::collections::VecDeque;
use std::net::ToSocketAddrs;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use suppaftp::native_tls::{Identity, TlsConnector};
use suppaftp::types::FileType;
use suppaftp::{NativeTlsConnector, NativeTlsFtpStream};

use super::{classify_error, ListOptions, RemoteInfo, Transport};
use crate::config::Secure;
use crate::error::{FsError, FsResult};
use crate::params::ConnectParams;
use crate::utils;

/// FTP engine over one persistent blocking suppaftp connection, driven
/// through `spawn_blocking`. The mutex serializes operations; sessions
/// carry one in-flight operation at a time anyway.
pub struct FtpTransport {
    stream: Arc<Mutex<Option<NativeTlsFtpStream>>>,
}

impl FtpTransport {
    pub async fn open(params: &ConnectParams) -> FsResult<Self> {
        let host = params.host.clone();
        let port = params.port;
        let username = params.username.clone();
        let password = params.password.clone();
        let secure = params.secure();
        let accept_any = params.accept_any();
        let identity_path = params.private_key_path().map(str::to_string);
        let identity_pass = params
            .private_key_passphrase()
            .unwrap_or_default()
            .to_string();
        let timeout_ms = params.timeout_ms();

        let stream = tokio::task::spawn_blocking(move || {
            let addr = format!("{}:{}", host, port);
            let mut ftp = match secure {
                Secure::Implicit => {
                    let tls = build_connector(accept_any, identity_path.as_deref(), &identity_pass)?;
                    NativeTlsFtpStream::connect_secure_implicit(
                        &addr,
                        NativeTlsConnector::from(tls),
                        &host,
                    )
                    .map_err(|e| FsError::transport("ftp connect", e.to_string()))?
                }
                _ => {
                    let plain = if timeout_ms > 0 {
                        let sock = addr
                            .to_socket_addrs()
                            .map_err(|e| FsError::transport("ftp connect", e.to_string()))?
                            .next()
                            .ok_or_else(|| {
                                FsError::transport("ftp connect", "host resolved to no address")
                            })?;
                        NativeTlsFtpStream::connect_timeout(
                            sock,
                            Duration::from_millis(timeout_ms),
                        )
                    } else {
                        NativeTlsFtpStream::connect(&addr)
                    }
                    .map_err(|e| FsError::transport("ftp connect", e.to_string()))?;

                    if secure == Secure::Explicit {
                        let tls =
                            build_connector(accept_any, identity_path.as_deref(), &identity_pass)?;
                        plain
                            .into_secure(NativeTlsConnector::from(tls), &host)
                            .map_err(|e| FsError::transport("ftp tls", e.to_string()))?
                    } else {
                        plain
                    }
                }
            };

            ftp.login(&username, &password)
                .map_err(|e| FsError::transport("ftp login", e.to_string()))?;
            ftp.transfer_type(FileType::Binary)
                .map_err(|e| FsError::transport("ftp connect", e.to_string()))?;
            Ok::<_, FsError>(ftp)
        })
        .await
        .map_err(|e| FsError::transport("ftp connect", e.to_string()))??;

        tracing::debug!(port, "ftp session established");

        Ok(Self {
            stream: Arc::new(Mutex::new(Some(stream))),
        })
    }

    /// Runs a blocking closure against the live connection.
    async fn run<T, F>(&self, op: &'static str, f: F) -> FsResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut NativeTlsFtpStream) -> FsResult<T> + Send + 'static,
    {
        let stream = self.stream.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = stream.lock().unwrap();
            let ftp = guard
                .as_mut()
                .ok_or_else(|| FsError::transport(op, "session is closed"))?;
            f(ftp)
        })
        .await
        .map_err(|e| FsError::transport(op, e.to_string()))?
    }

    async fn list_once(&self, path: &str) -> FsResult<Vec<RemoteInfo>> {
        let dir = path.to_string();
        self.run("list", move |ftp| {
            let lines = ftp
                .list(Some(&dir))
                .map_err(|e| classify_error("list", &dir, e.to_string()))?;
            Ok(lines
                .iter()
                .filter_map(|line| parse_list_line(line, &dir))
                .collect())
        })
        .await
    }

    async fn remove_recursive(&mut self, path: &str) -> FsResult<()> {
        let info = self.stat(path).await?;
        if info.is_directory {
            let entries = self.list_once(path).await?;
            for entry in entries {
                Box::pin(self.remove_recursive(&entry.full_name)).await?;
            }
            let dir = path.to_string();
            self.run("remove", move |ftp| {
                ftp.rmdir(&dir)
                    .map_err(|e| classify_error("remove", &dir, e.to_string()))
            })
            .await
        } else {
            let file = path.to_string();
            self.run("remove", move |ftp| {
                ftp.rm(&file)
                    .map_err(|e| classify_error("remove", &file, e.to_string()))
            })
            .await
        }
    }
}

#[async_trait]
impl Transport for FtpTransport {
    async fn stat(&mut self, path: &str) -> FsResult<RemoteInfo> {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(RemoteInfo {
                full_name: "/".to_string(),
                name: "/".to_string(),
                is_directory: true,
                length: 0,
                last_write_time: None,
            });
        }
        // FTP has no single stat command; look the entry up in its
        // parent's listing.
        let parent = utils::parent_path(trimmed);
        let name = utils::base_name(trimmed).to_string();
        let entries = self.list_once(&parent).await?;
        entries
            .into_iter()
            .find(|e| e.name == name)
            .ok_or_else(|| FsError::NotFound(path.to_string()))
    }

    async fn create_directory(&mut self, path: &str) -> FsResult<()> {
        let dir = path.to_string();
        self.run("create directory", move |ftp| {
            ftp.mkdir(&dir)
                .map_err(|e| classify_error("create directory", &dir, e.to_string()))
        })
        .await
    }

    async fn put_file(&mut self, local: &Path, remote: &str, remove_source: bool) -> FsResult<()> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        self.run("upload", move |ftp| {
            let mut file = std::fs::File::open(&local)?;
            ftp.put_file(&remote, &mut file)
                .map_err(|e| classify_error("upload", &remote, e.to_string()))?;
            if remove_source {
                std::fs::remove_file(&local)?;
            }
            Ok(())
        })
        .await
    }

    async fn get_file(&mut self, remote: &str, local: &Path) -> FsResult<()> {
        let local = local.to_path_buf();
        let remote = remote.to_string();
        self.run("download", move |ftp| {
            let buffer = ftp
                .retr_as_buffer(&remote)
                .map_err(|e| classify_error("download", &remote, e.to_string()))?;
            std::fs::write(&local, buffer.into_inner())?;
            Ok(())
        })
        .await
    }

    async fn remove(&mut self, path: &str) -> FsResult<()> {
        self.remove_recursive(path).await
    }

    async fn list(&mut self, path: &str, options: ListOptions) -> FsResult<Vec<RemoteInfo>> {
        let mut result = Vec::new();
        let mut pending = VecDeque::from([path.to_string()]);

        while let Some(dir) = pending.pop_front() {
            for info in self.list_once(&dir).await? {
                if info.is_directory && options.recursive {
                    pending.push_back(info.full_name.clone());
                }
                if !info.is_directory || options.include_directories {
                    result.push(info);
                }
            }
        }
        Ok(result)
    }

    async fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        let old = old.to_string();
        let new = new.to_string();
        self.run("rename", move |ftp| {
            ftp.rename(&old, &new)
                .map_err(|e| classify_error("rename", &old, e.to_string()))
        })
        .await
    }

    async fn close(&mut self) -> FsResult<()> {
        let stream = self.stream.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(mut ftp) = stream.lock().unwrap().take() {
                // Best effort; the connection drops either way
                let _ = ftp.quit();
            }
        })
        .await
        .map_err(|e| FsError::transport("disconnect", e.to_string()))?;
        Ok(())
    }
}

fn build_connector(
    accept_any: bool,
    identity_path: Option<&str>,
    identity_pass: &str,
) -> FsResult<TlsConnector> {
    let mut builder = TlsConnector::builder();
    if accept_any {
        builder.danger_accept_invalid_certs(true);
        builder.danger_accept_invalid_hostnames(true);
    }
    if let Some(path) = identity_path {
        let der = std::fs::read(path)?;
        let identity = Identity::from_pkcs12(&der, identity_pass)
            .map_err(|e| FsError::transport("ftp tls", e.to_string()))?;
        builder.identity(identity);
    }
    builder
        .build()
        .map_err(|e| FsError::transport("ftp tls", e.to_string()))
}

/// Parses one Unix-style LIST line, e.g.
/// `-rw-r--r-- 1 user group 12345 Nov 15 10:30 report.pdf`.
fn parse_list_line(line: &str, base: &str) -> Option<RemoteInfo> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 9 {
        return None;
    }

    let is_directory = parts[0].starts_with('d');
    let length = parts[4].parse::<u64>().unwrap_or(0);
    let name = parts[8..].join(" ");
    if name == "." || name == ".." {
        return None;
    }
    let last_write_time = parse_list_date(parts[5], parts[6], parts[7]);

    Some(RemoteInfo {
        full_name: utils::combine_remote(base, &name),
        name,
        is_directory,
        length,
        last_write_time,
    })
}

/// `Nov 15 10:30` (current year) or `Nov 15 2023` forms.
fn parse_list_date(month: &str, day: &str, time_or_year: &str) -> Option<DateTime<Utc>> {
    let month = match month {
        "Jan" => 1,
        "Feb" => 2,
        "Mar" => 3,
        "Apr" => 4,
        "May" => 5,
        "Jun" => 6,
        "Jul" => 7,
        "Aug" => 8,
        "Sep" => 9,
        "Oct" => 10,
        "Nov" => 11,
        "Dec" => 12,
        _ => return None,
    };
    let day: u32 = day.parse().ok()?;

    let (year, hour, minute) = if let Some((h, m)) = time_or_year.split_once(':') {
        (Utc::now().year(), h.parse().ok()?, m.parse().ok()?)
    } else {
        (time_or_year.parse().ok()?, 0, 0)
    };

    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    let naive = date.and_hms_opt(hour, minute, 0)?;
    Utc.from_utc_datetime(&naive).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_line_directory() {
        let line = "drwxr-xr-x 2 user group 4096 Nov 15 10:30 Documents";
        let entry = parse_list_line(line, "/pub").unwrap();

        assert_eq!(entry.name, "Documents");
        assert_eq!(entry.full_name, "/pub/Documents");
        assert!(entry.is_directory);
        assert_eq!(entry.length, 4096);
    }

    #[test]
    fn test_parse_list_line_file() {
        let line = "-rw-r--r-- 1 user group 12345 Nov 15 10:30 test.pdf";
        let entry = parse_list_line(line, "/").unwrap();

        assert_eq!(entry.name, "test.pdf");
        assert_eq!(entry.full_name, "/test.pdf");
        assert!(!entry.is_directory);
        assert_eq!(entry.length, 12345);
        assert!(entry.last_write_time.is_some());
    }

    #[test]
    fn test_parse_list_line_with_spaces() {
        let line = "-rw-r--r-- 1 user group 1024 Nov 15 10:30 my file name.txt";
        let entry = parse_list_line(line, "/").unwrap();

        assert_eq!(entry.name, "my file name.txt");
        assert!(!entry.is_directory);
        assert_eq!(entry.length, 1024);
    }

    #[test]
    fn test_parse_list_line_year_form() {
        let line = "-rw-r--r-- 1 user group 99 Mar  2 2023 old.log";
        let entry = parse_list_line(line, "/logs").unwrap();

        let ts = entry.last_write_time.unwrap();
        assert_eq!(ts.year(), 2023);
        assert_eq!(ts.month(), 3);
        assert_eq!(ts.day(), 2);
    }

    #[test]
    fn test_parse_list_line_invalid() {
        assert!(parse_list_line("invalid line", "/").is_none());
    }

    #[test]
    fn test_parse_list_line_skips_dot_entries() {
        let line = "drwxr-xr-x 2 user group 4096 Nov 15 10:30 ..";
        assert!(parse_list_line(line, "/").is_none());
    }
}
