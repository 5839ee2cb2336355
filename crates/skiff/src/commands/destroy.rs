use colored::Colorize;
use skiff_core::Environment;

pub async fn handle(env: &Environment) -> anyhow::Result<()> {
    println!("destroying environment {}...", env.name().cyan());
    env.destroy().await?;
    println!("{} {} destroyed", "✓".green(), env.name().cyan());
    Ok(())
}
