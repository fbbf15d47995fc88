//! `tollgate config`: configuration management commands.

use tollgate_config::AppConfig;

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if config.api_key.is_some() {
        config.api_key = Some("[redacted]".into());
    }
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", AppConfig::config_path().display());
    println!("{toml_str}");
    Ok(())
}

pub async fn init(force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();
    if path.exists() && !force {
        println!("Config already exists at {}", path.display());
        println!("Use --force to overwrite it with the defaults.");
        return Ok(());
    }

    std::fs::create_dir_all(AppConfig::config_dir())?;
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    println!("Set TOLLGATE_API_KEY (or ANTHROPIC_API_KEY), or add `api_key` to the file.");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}
