use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::fs::RemoteFs;

/// Registry of named file system instances.
///
/// An explicit object handed to whoever needs lookups, not process-wide
/// state: multiple configurations coexist and tear down deterministically
/// with the registry value itself.
#[derive(Default)]
pub struct FsRegistry {
    instances: RwLock<HashMap<String, Arc<RemoteFs>>>,
}

impl FsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers under the instance's own name, replacing any previous
    /// holder of that name.
    pub fn register(&self, fs: RemoteFs) -> Arc<RemoteFs> {
        let fs = Arc::new(fs);
        self.instances
            .write()
            .unwrap()
            .insert(fs.name().to_string(), fs.clone());
        fs
    }

    pub fn get(&self, name: &str) -> Option<Arc<RemoteFs>> {
        self.instances.read().unwrap().get(name).cloned()
    }

    pub fn unregister(&self, name: &str) -> Option<Arc<RemoteFs>> {
        self.instances.write().unwrap().remove(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.instances.read().unwrap().keys().cloned().collect()
    }

    pub fn clear(&self) {
        self.instances.write().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_get() {
        let registry = FsRegistry::new();
        registry.register(RemoteFs::new("sftp-prod"));

        assert!(registry.get("sftp-prod").is_some());
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_register_replaces_same_name() {
        let registry = FsRegistry::new();
        let first = registry.register(RemoteFs::new("fs"));
        let second = registry.register(RemoteFs::new("fs"));

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&registry.get("fs").unwrap(), &second));
    }

    #[test]
    fn test_unregister() {
        let registry = FsRegistry::new();
        registry.register(RemoteFs::new("fs"));

        assert!(registry.unregister("fs").is_some());
        assert!(registry.get("fs").is_none());
        assert!(registry.unregister("fs").is_none());
    }

    #[test]
    fn test_independent_registries() {
        let a = FsRegistry::new();
        let b = FsRegistry::new();
        a.register(RemoteFs::new("fs"));

        assert!(a.get("fs").is_some());
        assert!(b.get("fs").is_none());
    }
}
