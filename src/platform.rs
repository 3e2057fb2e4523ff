use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    Unknown,
}

pub fn detect() -> Platform {
    match std::env::consts::OS {
        "macos" => Platform::MacOS,
        "linux" => Platform::Linux,
        "windows" => Platform::Windows,
        _ => Platform::Unknown,
    }
}

pub fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}

/// Sandbox container of the App Store client.
pub fn appstore_container() -> Option<PathBuf> {
    home_dir().map(|h| h.join("Library/Containers/com.apple.appstore/Data"))
}

/// Directory holding Cache.db and fsCachedData inside a container.
pub fn cache_dir_in(container: &std::path::Path) -> PathBuf {
    container.join("Library/Caches/com.apple.appstore")
}
