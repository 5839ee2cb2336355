use skiff_core::Environment;

/// Prints the bare address so the output can feed scripts
/// (`ssh user@$(skiff ip)`).
pub async fn handle(env: &Environment) -> anyhow::Result<()> {
    match env.ip().await? {
        Some(ip) => {
            println!("{ip}");
            Ok(())
        }
        None => anyhow::bail!("environment `{}` has no public address yet", env.name()),
    }
}
