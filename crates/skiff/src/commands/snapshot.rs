use colored::Colorize;
use skiff_core::Environment;

pub async fn handle(env: &Environment, name: Option<&str>) -> anyhow::Result<()> {
    let snapshot_name = env.snapshot(name).await?;
    println!(
        "{} snapshot {} created from {}",
        "✓".green(),
        snapshot_name.cyan(),
        env.name().cyan()
    );
    Ok(())
}
