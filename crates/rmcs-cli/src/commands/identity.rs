use rmcs_config::BotConfig;
use rmcs_runtime::{IdentityStore, RobotClient};

pub(super) async fn cmd_identify(config: BotConfig, refresh: bool) -> rmcs_core::Result<()> {
    let client = RobotClient::new(config)?;
    if refresh {
        client.store().clear()?;
    }
    let robot_id = client.identify().await?;
    println!("{robot_id}");
    Ok(())
}

pub(super) fn cmd_forget(config: BotConfig) -> rmcs_core::Result<()> {
    let store = IdentityStore::new(&config.storage.directory)?;
    match store.load()? {
        Some(robot_id) => {
            store.clear()?;
            println!("Forgot robot id {robot_id} ({})", store.path().display());
        }
        None => println!("No robot id cached at {}", store.path().display()),
    }
    Ok(())
}
