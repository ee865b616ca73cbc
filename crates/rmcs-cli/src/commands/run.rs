use tracing::{info, warn};

use rmcs_config::BotConfig;
use rmcs_runtime::RobotClient;

pub(super) async fn cmd_run(config: BotConfig) -> rmcs_core::Result<()> {
    println!("🤖 rmcs-bot v{}", env!("CARGO_PKG_VERSION"));
    println!("   Server: {}", config.server.websocket);
    println!("   Identity: {}", config.server.http);
    println!("   Storage: {}", config.storage.directory.display());
    println!();

    let client = RobotClient::new(config)?;
    let handle = client.handle();

    {
        let handle = handle.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("interrupt received, shutting down");
                    handle.shutdown();
                }
                Err(e) => warn!(error = %e, "cannot listen for ctrl-c"),
            }
        });
    }

    let mut states = handle.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            info!(?state, "client state changed");
        }
    });

    client.run().await
}
