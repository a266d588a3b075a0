//! Path utilities for Muse data directories and engine detection.

use std::path::{Path, PathBuf};

/// Get the Muse data directory (~/.muse/).
pub fn muse_data_dir() -> PathBuf {
    dirs::home_dir()
        .expect("Could not determine home directory")
        .join(".muse")
}

/// Get the models directory (~/.muse/models/).
pub fn models_dir() -> PathBuf {
    muse_data_dir().join("models")
}

/// Get the bin directory (~/.muse/bin/).
pub fn bin_dir() -> PathBuf {
    muse_data_dir().join("bin")
}

/// Get the cache directory (~/.muse/cache/).
pub fn cache_dir() -> PathBuf {
    muse_data_dir().join("cache")
}

/// Name of the llama-server binary on this platform.
pub fn server_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "llama-server.exe"
    } else {
        "llama-server"
    }
}

/// Directories checked (in order) when no explicit executable is configured.
pub fn known_server_dirs() -> Vec<PathBuf> {
    let mut dirs = vec![bin_dir()];
    if let Some(home) = dirs::home_dir() {
        dirs.push(home.join("llama.cpp").join("build").join("bin"));
    }
    dirs.push(PathBuf::from("/usr/local/bin"));
    dirs.push(PathBuf::from("/opt/homebrew/bin"));
    dirs
}

/// Look for the llama-server binary in the known install locations.
pub fn detect_server_binary() -> Option<PathBuf> {
    let name = server_binary_name();
    known_server_dirs()
        .into_iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Look for the llama-server binary on `PATH`.
pub fn find_server_on_path() -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    let name = server_binary_name();
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

/// Pick the most recently modified .gguf model under a directory.
pub fn detect_model(dir: &Path) -> Option<PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    let mut models: Vec<(std::time::SystemTime, PathBuf)> = entries
        .flatten()
        .filter(|e| {
            e.path()
                .extension()
                .map(|ext| ext.eq_ignore_ascii_case("gguf"))
                .unwrap_or(false)
        })
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((modified, e.path()))
        })
        .collect();
    models.sort_by(|a, b| b.0.cmp(&a.0));
    models.into_iter().next().map(|(_, path)| path)
}

/// Ensure the Muse data directories exist.
pub fn ensure_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(muse_data_dir())?;
    std::fs::create_dir_all(models_dir())?;
    std::fs::create_dir_all(bin_dir())?;
    std::fs::create_dir_all(cache_dir())?;
    Ok(())
}
