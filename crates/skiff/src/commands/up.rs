use colored::Colorize;
use skiff_core::Environment;

pub async fn handle(env: &Environment) -> anyhow::Result<()> {
    match env.find().await? {
        Some(instance) => {
            println!(
                "{} environment {} already exists ({})",
                "✓".green(),
                env.name().cyan(),
                instance.status
            );
        }
        None => {
            println!("building environment {}...", env.name().cyan());
            env.build().await?;
        }
    }

    match env.ip().await? {
        Some(ip) => println!(
            "{} {} is ready at {}",
            "✓".green(),
            env.name().cyan(),
            ip.bold()
        ),
        None => println!(
            "{} {} is up but has no public address yet",
            "!".yellow(),
            env.name().cyan()
        ),
    }

    Ok(())
}
