//! Info command - show detected binaries, models, and directories.

use muse_llama::paths;

pub(crate) fn run() -> miette::Result<()> {
    println!("Muse Local AI Assistance");
    println!("========================");
    println!();
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("Directories:");
    println!("  data:   {}", paths::muse_data_dir().display());
    println!("  models: {}", paths::models_dir().display());
    println!("  cache:  {}", paths::cache_dir().display());
    println!();

    println!("Detection:");
    match paths::detect_server_binary().or_else(paths::find_server_on_path) {
        Some(path) => println!("  llama-server: {}", path.display()),
        None => println!("  llama-server: not found (set MUSE_LLAMA_SERVER)"),
    }
    match paths::detect_model(&paths::models_dir()) {
        Some(path) => println!("  model:        {}", path.display()),
        None => println!(
            "  model:        no .gguf under {} (set MUSE_MODEL)",
            paths::models_dir().display()
        ),
    }
    println!();

    println!("Environment:");
    println!("  MUSE_LLAMA_SERVER  explicit server binary");
    println!("  MUSE_MODEL         explicit .gguf model");
    println!(
        "  MUSE_PORT          server port (default {})",
        muse_llama::DEFAULT_PORT
    );
    println!("  MUSE_CACHE_DIR     persistent cache directory");
    println!("  MUSE_CACHE         \"0\" disables response caching");

    Ok(())
}
