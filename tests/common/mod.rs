//! Shared test fixtures: an in-memory transport standing in for a remote
//! endpoint, plus a factory that records whether a connection was opened.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use unifs::config::Protocol;
use unifs::error::{FsError, FsResult};
use unifs::params::ConnectParams;
use unifs::transport::{ListOptions, RemoteInfo, Transport, TransportFactory};
use unifs::utils;

/// Remote endpoint contents shared between a test and its transports.
#[derive(Default)]
pub struct RemoteState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    pub fail_next_remove: AtomicBool,
}

pub type SharedState = Arc<Mutex<RemoteState>>;

pub fn state_with(dirs: &[&str], files: &[(&str, &[u8])]) -> SharedState {
    let mut state = RemoteState::default();
    for dir in dirs {
        state.dirs.insert((*dir).to_string());
    }
    for (path, content) in files {
        state.files.insert((*path).to_string(), content.to_vec());
    }
    Arc::new(Mutex::new(state))
}

/// Connect parameters that pass session validation.
pub fn valid_params() -> ConnectParams {
    let mut params = ConnectParams::new(Protocol::Sftp);
    params.host = "fake.example.com".to_string();
    params.username = "tester".to_string();
    params.set_accept_any(true);
    params
}

fn norm(path: &str) -> String {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

fn fixed_mtime() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

fn info(full: &str, is_directory: bool, length: u64) -> RemoteInfo {
    let name = {
        let base = utils::base_name(full);
        if base.is_empty() {
            "/".to_string()
        } else {
            base.to_string()
        }
    };
    RemoteInfo {
        full_name: full.to_string(),
        name,
        is_directory,
        length,
        last_write_time: Some(fixed_mtime()),
    }
}

pub struct FakeTransport {
    state: SharedState,
    close_count: Arc<AtomicUsize>,
}

#[async_trait]
impl Transport for FakeTransport {
    async fn stat(&mut self, path: &str) -> FsResult<RemoteInfo> {
        let path = norm(path);
        let state = self.state.lock().unwrap();
        if path == "/" || state.dirs.contains(&path) {
            return Ok(info(&path, true, 0));
        }
        if let Some(content) = state.files.get(&path) {
            return Ok(info(&path, false, content.len() as u64));
        }
        Err(FsError::NotFound(path))
    }

    async fn create_directory(&mut self, path: &str) -> FsResult<()> {
        let path = norm(path);
        let mut state = self.state.lock().unwrap();
        if state.dirs.contains(&path) || state.files.contains_key(&path) {
            return Err(FsError::transport("create directory", "already exists"));
        }
        state.dirs.insert(path);
        Ok(())
    }

    async fn put_file(&mut self, local: &Path, remote: &str, remove_source: bool) -> FsResult<()> {
        let content = std::fs::read(local)?;
        self.state
            .lock()
            .unwrap()
            .files
            .insert(norm(remote), content);
        if remove_source {
            std::fs::remove_file(local)?;
        }
        Ok(())
    }

    async fn get_file(&mut self, remote: &str, local: &Path) -> FsResult<()> {
        let remote = norm(remote);
        let state = self.state.lock().unwrap();
        let content = state
            .files
            .get(&remote)
            .ok_or_else(|| FsError::NotFound(remote.clone()))?;
        std::fs::write(local, content)?;
        Ok(())
    }

    async fn remove(&mut self, path: &str) -> FsResult<()> {
        let path = norm(path);
        let mut state = self.state.lock().unwrap();
        if state.fail_next_remove.swap(false, Ordering::SeqCst) {
            return Err(FsError::transport("remove", "simulated engine failure"));
        }
        if state.files.remove(&path).is_some() {
            return Ok(());
        }
        if state.dirs.remove(&path) {
            let prefix = format!("{}/", path);
            state.files.retain(|k, _| !k.starts_with(&prefix));
            state.dirs.retain(|k| !k.starts_with(&prefix));
            return Ok(());
        }
        Err(FsError::NotFound(path))
    }

    async fn list(&mut self, path: &str, options: ListOptions) -> FsResult<Vec<RemoteInfo>> {
        let dir = norm(path);
        let prefix = if dir == "/" {
            "/".to_string()
        } else {
            format!("{}/", dir)
        };
        let in_scope = |candidate: &str| {
            candidate.starts_with(&prefix)
                && (options.recursive || !candidate[prefix.len()..].contains('/'))
        };

        let state = self.state.lock().unwrap();
        let mut result = Vec::new();
        if options.include_directories {
            for d in state.dirs.iter().filter(|d| d.as_str() != dir) {
                if in_scope(d) {
                    result.push(info(d, true, 0));
                }
            }
        }
        for (f, content) in &state.files {
            if in_scope(f) {
                result.push(info(f, false, content.len() as u64));
            }
        }
        Ok(result)
    }

    async fn rename(&mut self, old: &str, new: &str) -> FsResult<()> {
        let old = norm(old);
        let new = norm(new);
        let mut state = self.state.lock().unwrap();
        if let Some(content) = state.files.remove(&old) {
            state.files.insert(new, content);
            return Ok(());
        }
        if state.dirs.remove(&old) {
            state.dirs.insert(new.clone());
            let old_prefix = format!("{}/", old);
            let moved: Vec<(String, Vec<u8>)> = state
                .files
                .iter()
                .filter(|(k, _)| k.starts_with(&old_prefix))
                .map(|(k, v)| (k.replacen(&old, &new, 1), v.clone()))
                .collect();
            state.files.retain(|k, _| !k.starts_with(&old_prefix));
            state.files.extend(moved);
            return Ok(());
        }
        Err(FsError::NotFound(old))
    }

    async fn close(&mut self) -> FsResult<()> {
        self.close_count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Opens `FakeTransport`s over a shared state and records every open.
pub struct FakeFactory {
    state: SharedState,
    pub open_count: Arc<AtomicUsize>,
    pub close_count: Arc<AtomicUsize>,
}

impl FakeFactory {
    pub fn new(state: SharedState) -> Self {
        Self {
            state,
            open_count: Arc::new(AtomicUsize::new(0)),
            close_count: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl TransportFactory for FakeFactory {
    async fn open(&self, _params: &ConnectParams) -> FsResult<Box<dyn Transport>> {
        self.open_count.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeTransport {
            state: self.state.clone(),
            close_count: self.close_count.clone(),
        }))
    }
}
