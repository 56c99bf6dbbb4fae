use anyhow::Result;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

/// Remote protocol selection. SFTP and SCP share the SSH security model,
/// FTP and WebDAV the TLS one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Protocol {
    Sftp,
    Scp,
    Ftp,
    Webdav,
}

impl Protocol {
    /// True for the protocols carried over an SSH connection.
    pub fn is_ssh(self) -> bool {
        matches!(self, Protocol::Sftp | Protocol::Scp)
    }

    pub fn from_scheme(scheme: &str) -> Option<Self> {
        match scheme.to_ascii_lowercase().as_str() {
            "sftp" => Some(Protocol::Sftp),
            "scp" => Some(Protocol::Scp),
            "ftp" | "ftps" => Some(Protocol::Ftp),
            "dav" | "davs" | "webdav" | "http" | "https" => Some(Protocol::Webdav),
            _ => None,
        }
    }
}

/// Transport security mode. Meaningful for FTP (`None|Implicit|Explicit`)
/// and WebDAV (`None|Implicit`); the SSH protocols are secure inherently.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Secure {
    #[default]
    None,
    Implicit,
    Explicit,
}

/// Connection attributes as read from a config file or the CLI.
///
/// This is the raw attribute bag; `ConnectParams::configure` turns it into
/// the normalized per-protocol option set. Field semantics follow the
/// fixed application order: `server_url` first, `protocol` second, named
/// attributes last (named attributes override whatever the URL implied).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub server_url: Option<String>,
    pub protocol: Option<Protocol>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub fingerprint: Option<String>,
    pub accept_any: Option<bool>,
    pub private_key_path: Option<String>,
    #[serde(skip_serializing)]
    pub private_key_passphrase: Option<String>,
    pub timeout_ms: Option<i64>,
    pub secure: Option<Secure>,
    pub root_path: Option<String>,
    #[serde(default)]
    pub configured: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        if let Some(config_path) = Self::config_path() {
            if config_path.exists() {
                let content = fs::read_to_string(config_path)?;
                let config: Config = serde_json::from_str(&content)?;
                return Ok(config);
            }
        }
        Ok(Self::default())
    }

    pub fn save(&self) -> Result<()> {
        if let Some(config_path) = Self::config_path() {
            if let Some(parent) = config_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string_pretty(self)?;
            fs::write(config_path, content)?;
        }
        Ok(())
    }

    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "unifs", "unifs")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    pub fn is_configured(&self) -> bool {
        self.configured
            && self.host.as_deref().map_or(false, |h| !h.is_empty())
            && self.username.as_deref().map_or(false, |u| !u.is_empty())
    }

    pub fn interactive_setup(&mut self) -> Result<()> {
        println!("\nunifs first-time setup");
        println!("----------------------\n");

        print!("Host: ");
        io::stdout().flush()?;
        let mut host = String::new();
        io::stdin().read_line(&mut host)?;
        self.host = Some(host.trim().to_string());

        print!("Username: ");
        io::stdout().flush()?;
        let mut username = String::new();
        io::stdin().read_line(&mut username)?;
        self.username = Some(username.trim().to_string());

        self.password = Some(rpassword::prompt_password("Password: ").unwrap_or_default());

        print!("Protocol (1=SFTP, 2=SCP, 3=FTP, 4=WebDAV) [default: 1]: ");
        io::stdout().flush()?;
        let mut choice = String::new();
        io::stdin().read_line(&mut choice)?;
        self.protocol = Some(match choice.trim() {
            "2" => Protocol::Scp,
            "3" => Protocol::Ftp,
            "4" => Protocol::Webdav,
            _ => Protocol::Sftp,
        });

        print!("Accept any host key / certificate? (y/N): ");
        io::stdout().flush()?;
        let mut accept = String::new();
        io::stdin().read_line(&mut accept)?;
        self.accept_any = Some(accept.trim().eq_ignore_ascii_case("y"));

        if self.accept_any != Some(true) {
            print!("Expected fingerprint: ");
            io::stdout().flush()?;
            let mut fp = String::new();
            io::stdin().read_line(&mut fp)?;
            let fp = fp.trim();
            if !fp.is_empty() {
                self.fingerprint = Some(fp.to_string());
            }
        }

        self.configured = true;

        println!("\nConfiguration saved to: {:?}", Self::config_path());
        println!("Reconfigure any time with: unifs config\n");

        self.save()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.host, None);
        assert_eq!(config.username, None);
        assert_eq!(config.password, None);
        assert_eq!(config.protocol, None);
        assert!(!config.configured);
    }

    #[test]
    fn test_protocol_serialization() {
        let sftp_json = serde_json::to_string(&Protocol::Sftp).unwrap();
        let dav_json = serde_json::to_string(&Protocol::Webdav).unwrap();

        assert_eq!(sftp_json, "\"Sftp\"");
        assert_eq!(dav_json, "\"Webdav\"");

        let decoded: Protocol = serde_json::from_str(&sftp_json).unwrap();
        assert_eq!(decoded, Protocol::Sftp);
    }

    #[test]
    fn test_protocol_from_scheme() {
        assert_eq!(Protocol::from_scheme("sftp"), Some(Protocol::Sftp));
        assert_eq!(Protocol::from_scheme("SCP"), Some(Protocol::Scp));
        assert_eq!(Protocol::from_scheme("ftps"), Some(Protocol::Ftp));
        assert_eq!(Protocol::from_scheme("davs"), Some(Protocol::Webdav));
        assert_eq!(Protocol::from_scheme("gopher"), None);
    }

    #[test]
    fn test_config_serialization_skips_secrets() {
        let config = Config {
            host: Some("10.0.0.1".to_string()),
            username: Some("testuser".to_string()),
            password: Some("testpass".to_string()),
            private_key_passphrase: Some("keypass".to_string()),
            protocol: Some(Protocol::Ftp),
            configured: true,
            ..Config::default()
        };

        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("10.0.0.1"));
        assert!(json.contains("testuser"));
        assert!(!json.contains("testpass"));
        assert!(!json.contains("keypass"));

        let decoded: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.host.as_deref(), Some("10.0.0.1"));
        assert_eq!(decoded.password, None);
        assert_eq!(decoded.protocol, Some(Protocol::Ftp));
    }

    #[test]
    fn test_is_configured() {
        let mut config = Config::default();
        assert!(!config.is_configured());

        config.host = Some("192.168.1.1".to_string());
        assert!(!config.is_configured());

        config.username = Some("user".to_string());
        assert!(!config.is_configured());

        config.configured = true;
        assert!(config.is_configured());

        config.host = Some(String::new());
        assert!(!config.is_configured());
    }
}
