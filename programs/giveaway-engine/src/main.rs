use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use color_eyre::eyre::{Result, WrapErr};
use giveaway_engine::{
    config::BotConfig,
    messenger::Messenger,
    store::Store,
    telegram::{TelegramClient, Update},
    updates::{route, Reply},
    GiveawayEngine,
};
use tokio::time;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const RETRY_DELAY: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = BotConfig::load(config_path.as_deref()).wrap_err("loading configuration")?;
    let store = Store::connect(&config.database_url)
        .await
        .wrap_err_with(|| format!("opening database {}", config.database_url))?;
    let client = Arc::new(TelegramClient::new(&config.bot_token)?);
    let engine = GiveawayEngine::new(store, Arc::clone(&client), config.engine);
    let admins: Arc<[i64]> = Arc::from(config.admin_ids.as_slice());

    engine.resume_watchers().await?;
    info!(admins = admins.len(), "giveaway bot started");

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    let mut offset = None;
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("shutting down");
                break;
            }
            polled = client.get_updates(offset) => match polled {
                Ok(updates) => {
                    for update in updates {
                        offset = Some(update.update_id + 1);
                        tokio::spawn(handle(engine.clone(), Arc::clone(&client), Arc::clone(&admins), update));
                    }
                }
                Err(err) => {
                    warn!(?err, "polling for updates failed");
                    time::sleep(RETRY_DELAY).await;
                }
            },
        }
    }
    Ok(())
}

async fn handle(
    engine: GiveawayEngine<TelegramClient>,
    client: Arc<TelegramClient>,
    admins: Arc<[i64]>,
    update: Update,
) {
    let reply = match route(&engine, &admins, &update).await {
        Ok(Some(reply)) => reply,
        Ok(None) => return,
        Err(err) => {
            warn!(update_id = update.update_id, ?err, "failed to handle update");
            return;
        }
    };
    let sent = match &reply {
        Reply::Message { chat_id, text } => client.send_message(*chat_id, text, None).await.map(drop),
        Reply::CallbackAnswer {
            callback_query_id,
            text,
        } => client.answer_callback_query(callback_query_id, text).await,
    };
    if let Err(err) = sent {
        warn!(update_id = update.update_id, ?err, "failed to send reply");
    }
}
