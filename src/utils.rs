// Remote path arithmetic and wildcard helpers, extracted for testing

/// Joins a remote base path and an entry name with a single `/`.
pub fn combine_remote(base: &str, name: &str) -> String {
    let base = base.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        format!("/{}", name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Full path minus its last segment. Empty result means the item sits at
/// the root.
pub fn parent_path(full: &str) -> String {
    let trimmed = full.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => String::new(),
    }
}

/// Last segment of a remote path.
pub fn base_name(full: &str) -> &str {
    let trimmed = full.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

pub fn glob_match(filename: &str, pattern: &str) -> bool {
    if pattern == "*" {
        return true;
    }

    if let Some(ext) = pattern.strip_prefix("*.") {
        filename.ends_with(&format!(".{}", ext))
    } else if let Some(prefix) = pattern.strip_suffix('*') {
        filename.starts_with(prefix)
    } else if let Some(suffix) = pattern.strip_prefix('*') {
        filename.ends_with(suffix)
    } else {
        filename == pattern
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combine_remote() {
        assert_eq!(combine_remote("/pub", "file.txt"), "/pub/file.txt");
        assert_eq!(combine_remote("/pub/", "file.txt"), "/pub/file.txt");
        assert_eq!(combine_remote("/", "file.txt"), "/file.txt");
        assert_eq!(combine_remote("", "file.txt"), "/file.txt");
        assert_eq!(combine_remote("/a/b", "c"), "/a/b/c");
    }

    #[test]
    fn test_parent_path() {
        assert_eq!(parent_path("/a/b/c"), "/a/b");
        assert_eq!(parent_path("/a/b/c/"), "/a/b");
        assert_eq!(parent_path("/file.txt"), "/");
        assert_eq!(parent_path("file.txt"), "");
        assert_eq!(parent_path("/"), "");
    }

    #[test]
    fn test_parent_path_name_longer_than_parent() {
        // The split point is the separator, not any length arithmetic
        assert_eq!(parent_path("/d/really-long-name.bin"), "/d");
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name("/a/b/c"), "c");
        assert_eq!(base_name("/a/b/c/"), "c");
        assert_eq!(base_name("file.txt"), "file.txt");
        assert_eq!(base_name("/file.txt"), "file.txt");
    }

    #[test]
    fn test_glob_match_wildcard() {
        assert!(glob_match("anything.txt", "*"));
        assert!(glob_match("", "*"));
    }

    #[test]
    fn test_glob_match_extension() {
        assert!(glob_match("file.txt", "*.txt"));
        assert!(glob_match("archive.tar.gz", "*.gz"));
        assert!(!glob_match("file.txt", "*.pdf"));
        assert!(!glob_match("file", "*.txt"));
    }

    #[test]
    fn test_glob_match_prefix_and_suffix() {
        assert!(glob_match("test_file.txt", "test*"));
        assert!(!glob_match("file_test.txt", "test*"));
        assert!(glob_match("file_test", "*test"));
        assert!(!glob_match("test_file", "*test"));
    }

    #[test]
    fn test_glob_match_exact() {
        assert!(glob_match("exact.txt", "exact.txt"));
        assert!(!glob_match("exact.txt", "other.txt"));
    }
}
