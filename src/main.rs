#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::cast_precision_loss
)]

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod config;
mod error;
mod fs;
mod params;
mod registry;
mod session;
mod stream;
mod transport;
mod utils;

use config::{Config, Protocol, Secure};
use fs::{FsItem, RemoteFs};
use params::ConnectParams;
use session::FsSession;
use utils::glob_match;

/// Prompts for a password when the config carries none.
fn ensure_password(config: &mut Config) -> Result<()> {
    if config.password.is_none() {
        let password = rpassword::prompt_password("Password: ")?;
        config.password = Some(password);
    }
    Ok(())
}

fn parse_protocol(s: &str) -> Result<Protocol> {
    Protocol::from_scheme(s).ok_or_else(|| anyhow!("unknown protocol: {}", s))
}

fn parse_secure(s: &str) -> Result<Secure> {
    match s.to_ascii_lowercase().as_str() {
        "none" => Ok(Secure::None),
        "implicit" => Ok(Secure::Implicit),
        "explicit" => Ok(Secure::Explicit),
        other => Err(anyhow!("unknown security mode: {}", other)),
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a remote directory
    Ls {
        /// Directory to list
        #[arg(default_value = "/")]
        path: String,

        /// Recurse into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// Show metadata for a remote entry
    Stat {
        path: String,
    },

    /// Create a remote directory
    Mkdir {
        path: String,
    },

    /// Delete a remote file or directory
    Rm {
        path: String,
    },

    /// Rename a remote entry within its directory
    Mv {
        path: String,
        new_name: String,
    },

    /// Upload local files to a remote directory
    Upload {
        /// Files to upload
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Destination directory on the server
        #[arg(short, long, default_value = "/")]
        dest: String,
    },

    /// Download remote files (supports wildcards)
    Download {
        /// Remote path or pattern
        path: String,

        /// Local destination directory
        #[arg(short, long, default_value = ".")]
        dest: PathBuf,
    },

    /// Configure connection settings
    Config {
        #[arg(long)]
        server_url: Option<String>,
        #[arg(long)]
        protocol: Option<String>,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        password: Option<String>,
        #[arg(long)]
        fingerprint: Option<String>,
        #[arg(long)]
        accept_any: Option<bool>,
        #[arg(long)]
        private_key: Option<String>,
        #[arg(long)]
        timeout_ms: Option<i64>,
        #[arg(long)]
        secure: Option<String>,
        #[arg(long)]
        root_path: Option<String>,
    },
}

async fn connect() -> Result<(RemoteFs, FsSession)> {
    let mut config = Config::load()?;
    if !config.is_configured() {
        config.interactive_setup()?;
    }
    ensure_password(&mut config)?;

    let params = ConnectParams::configure(&config);
    let remote = RemoteFs::new("default");
    let session = remote.start_session(params).await?;
    Ok((remote, session))
}

async fn navigate_dir(remote: &RemoteFs, session: &FsSession, path: &str) -> Result<fs::FsDirectory> {
    match remote.navigate(session, path).await? {
        FsItem::Directory(dir) => Ok(dir),
        FsItem::File(_) => Err(anyhow!("{} is a file, not a directory", path)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Ls { path, recursive } => {
            let (remote, mut session) = connect().await?;
            let dir = navigate_dir(&remote, &session, &path).await?;

            println!("Directories:");
            for name in remote.sub_directory_names(&dir, recursive).await? {
                println!("\t{}", name);
            }
            println!("Files:");
            for name in remote.file_names(&dir, recursive).await? {
                println!("\t{}", name);
            }
            session.close().await?;
        }
        Commands::Stat { path } => {
            let (remote, mut session) = connect().await?;
            let item = remote.navigate(&session, &path).await?;

            let kind = if item.is_directory() { "directory" } else { "file" };
            let size = human_bytes::human_bytes(remote.item_size(&item) as f64);
            println!("{:<12} {}", "path:", item.full_path());
            println!("{:<12} {}", "kind:", kind);
            println!("{:<12} {}", "size:", size);
            if let Some(modified) = remote.modification_timestamp(&item) {
                println!("{:<12} {}", "modified:", modified.format("%Y-%m-%d %H:%M:%S"));
            }
            session.close().await?;
        }
        Commands::Mkdir { path } => {
            let (remote, mut session) = connect().await?;
            let parent = utils::parent_path(&path);
            let parent = if parent.is_empty() { "/".to_string() } else { parent };
            let dir = navigate_dir(&remote, &session, &parent).await?;

            remote
                .create_directory(&dir, utils::base_name(&path))
                .await?;
            println!("Created {}", path);
            session.close().await?;
        }
        Commands::Rm { path } => {
            let (remote, mut session) = connect().await?;
            let item = remote.navigate(&session, &path).await?;
            remote.delete_item(&item).await?;
            println!("Deleted {}", path);
            session.close().await?;
        }
        Commands::Mv { path, new_name } => {
            let (remote, mut session) = connect().await?;
            let item = remote.navigate(&session, &path).await?;
            remote.rename_item(&item, &new_name).await?;
            println!("Renamed {} to {}", path, new_name);
            session.close().await?;
        }
        Commands::Upload { files, dest } => {
            let (remote, mut session) = connect().await?;
            let dir = navigate_dir(&remote, &session, &dest).await?;

            println!("Uploading {} files to {}", files.len(), dest);

            let mut successful = 0;
            let mut failed = 0;

            for file in files {
                if !file.exists() {
                    eprintln!("File not found: {:?}", file);
                    failed += 1;
                    continue;
                }

                let filename = file.file_name().and_then(|n| n.to_str()).unwrap_or("file");
                print!("Uploading {:?} ... ", file);

                match remote
                    .create_file_from_local(&dir, filename, &file, false)
                    .await
                {
                    Ok(_) => {
                        println!("ok");
                        successful += 1;
                    }
                    Err(e) => {
                        println!("failed: {}", e);
                        failed += 1;
                    }
                }
            }

            println!(
                "\nUpload complete: {} successful, {} failed",
                successful, failed
            );
            session.close().await?;
        }
        Commands::Download { path, dest } => {
            let (remote, mut session) = connect().await?;

            if path.contains('*') {
                let dir_path = {
                    let p = utils::parent_path(&path);
                    if p.is_empty() { "/".to_string() } else { p }
                };
                let pattern = utils::base_name(&path).to_string();

                let dir = navigate_dir(&remote, &session, &dir_path).await?;
                let matching: Vec<String> = remote
                    .file_names(&dir, false)
                    .await?
                    .filter(|name| glob_match(name, &pattern))
                    .collect();

                if matching.is_empty() {
                    println!("No files match pattern: {}", pattern);
                } else {
                    println!("Downloading {} files matching '{}'", matching.len(), pattern);
                    for name in matching {
                        let remote_path = utils::combine_remote(&dir_path, &name);
                        download_one(&remote, &session, &remote_path, &dest.join(&name)).await?;
                    }
                }
            } else {
                let filename = utils::base_name(&path).to_string();
                download_one(&remote, &session, &path, &dest.join(filename)).await?;
            }
            session.close().await?;
        }
        Commands::Config {
            server_url,
            protocol,
            host,
            port,
            username,
            password,
            fingerprint,
            accept_any,
            private_key,
            timeout_ms,
            secure,
            root_path,
        } => {
            let mut config = Config::load()?;

            let no_flags = server_url.is_none()
                && protocol.is_none()
                && host.is_none()
                && port.is_none()
                && username.is_none()
                && password.is_none()
                && fingerprint.is_none()
                && accept_any.is_none()
                && private_key.is_none()
                && timeout_ms.is_none()
                && secure.is_none()
                && root_path.is_none();

            if no_flags {
                config.interactive_setup()?;
            } else {
                if let Some(v) = server_url {
                    config.server_url = Some(v);
                }
                if let Some(v) = protocol {
                    config.protocol = Some(parse_protocol(&v)?);
                }
                if let Some(v) = host {
                    config.host = Some(v);
                }
                if let Some(v) = port {
                    config.port = Some(v);
                }
                if let Some(v) = username {
                    config.username = Some(v);
                }
                if let Some(v) = password {
                    config.password = Some(v);
                }
                if let Some(v) = fingerprint {
                    config.fingerprint = Some(v);
                }
                if let Some(v) = accept_any {
                    config.accept_any = Some(v);
                }
                if let Some(v) = private_key {
                    config.private_key_path = Some(v);
                }
                if let Some(v) = timeout_ms {
                    config.timeout_ms = Some(v);
                }
                if let Some(v) = secure {
                    config.secure = Some(parse_secure(&v)?);
                }
                if let Some(v) = root_path {
                    config.root_path = Some(v);
                }
                config.configured = true;

                config.save()?;
                println!("Configuration saved successfully!");
            }
        }
    }

    Ok(())
}

async fn download_one(
    remote: &RemoteFs,
    session: &FsSession,
    remote_path: &str,
    local_path: &std::path::Path,
) -> Result<()> {
    let item = remote.navigate(session, remote_path).await?;
    let file = item
        .as_file()
        .ok_or_else(|| anyhow!("{} is a directory", remote_path))?;

    println!("Downloading {} to {:?}", remote_path, local_path);

    let mut stream = remote.open_stream(file, None);
    let content = stream.read_to_end().await?;
    stream.close().await?;

    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(local_path, content).await?;
    Ok(())
}
