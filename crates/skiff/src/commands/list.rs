use colored::Colorize;
use skiff_core::Environment;

pub async fn handle(env: &Environment) -> anyhow::Result<()> {
    let instances = env.list().await?;
    if instances.is_empty() {
        println!("no instances visible in the project");
        return Ok(());
    }

    for instance in instances {
        println!(
            "{}  {}  {}",
            instance.name.cyan(),
            instance.status,
            instance.networks.join(", ")
        );
    }
    Ok(())
}
