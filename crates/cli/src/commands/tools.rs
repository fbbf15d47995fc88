//! `tollgate tools`: list the tools the agent can call.

use tollgate_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = tollgate_tools::default_registry(config.scratch_dir())?;

    println!("Tollgate tools ({} registered)", registry.len());
    for (category, tools) in registry.by_category() {
        println!();
        println!("  [{category}]");
        for tool in tools {
            let marker = if tool.requires_confirmation { " (needs approval)" } else { "" };
            println!("    {}{marker}", tool.name);
            println!("        {}", tool.description);
        }
    }
    println!();
    println!("  Scratch space: {}", config.scratch_dir().display());
    Ok(())
}
