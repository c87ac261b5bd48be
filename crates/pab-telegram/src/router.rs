use std::{future::Future, sync::Arc, time::Duration};

use anyhow::Context;
use teloxide::{prelude::*, types::AllowedUpdate, RequestError};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use pab_core::{
    audit::AuditLogger, config::Config, messaging::port::MessagingPort, moderation::Moderator,
    ports::CandidateStore, session::ModerationSession, skip_cache::SkipCache,
};

use crate::updates::incoming_from_update;
use crate::TelegramMessenger;

/// Pause before polling again after a failed `getUpdates`.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Headroom of the HTTP timeout over the long-poll timeout.
const HTTP_TIMEOUT_SLACK: Duration = Duration::from_secs(10);

pub async fn run_polling(cfg: Arc<Config>, store: Arc<dyn CandidateStore>) -> anyhow::Result<()> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(cfg.telegram_poll_timeout.saturating_add(HTTP_TIMEOUT_SLACK))
        .build()
        .context("telegram http client")?;
    let bot = Bot::with_client(cfg.telegram_token.clone(), client);

    let me = bot.get_me().await.context("getMe failed")?;
    tracing::info!(
        username = %me.username(),
        allowed_users = cfg.telegram_whitelist.len(),
        "authorized on account"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let mut moderator = Moderator::new(
        store,
        messenger,
        SkipCache::new(cfg.skip_ttl),
        cfg.telegram_whitelist.clone(),
    );
    if let Some(path) = &cfg.audit_log_path {
        tracing::info!(path = %path.display(), "audit log enabled");
        moderator = moderator.with_audit(AuditLogger::new(path.clone()));
    }

    moderator
        .register_commands()
        .await
        .context("unable to set commands")?;

    let cancel = CancellationToken::new();
    let sweeper = moderator
        .skip_cache()
        .spawn_sweeper(cfg.skip_sweep_interval, cancel.clone());

    let result = tokio::select! {
        res = poll_updates(&bot, &cfg, &moderator) => res,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            Ok(())
        }
    };

    cancel.cancel();
    let _ = sweeper.await;
    result
}

/// Long-poll `getUpdates` and feed each message to the moderator, one at a
/// time. Returns only when handling fails.
async fn poll_updates(bot: &Bot, cfg: &Config, moderator: &Moderator) -> anyhow::Result<()> {
    let timeout = u32::try_from(cfg.telegram_poll_timeout.as_secs()).unwrap_or(u32::MAX);
    let fetch = |offset: i32| {
        bot.get_updates()
            .offset(offset)
            .timeout(timeout)
            .allowed_updates(vec![AllowedUpdate::Message])
            .send()
    };
    poll_loop(fetch, moderator, POLL_RETRY_DELAY).await
}

/// `fetch(offset)` stands for one `getUpdates` call. Fetch errors are retried
/// after `retry_delay`; the offset moves past every update seen.
async fn poll_loop<F, Fut>(
    mut fetch: F,
    moderator: &Moderator,
    retry_delay: Duration,
) -> anyhow::Result<()>
where
    F: FnMut(i32) -> Fut,
    Fut: Future<Output = Result<Vec<Update>, RequestError>>,
{
    let mut session = ModerationSession::new();
    let mut offset: i32 = 0;

    loop {
        let updates = match fetch(offset).await {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "getUpdates failed, retrying");
                sleep(retry_delay).await;
                continue;
            }
        };

        for update in updates {
            offset = update.id + 1;
            let Some(incoming) = incoming_from_update(&update) else {
                tracing::debug!(update_id = update.id, "non-message update ignored");
                continue;
            };
            moderator
                .handle(&mut session, incoming)
                .await
                .with_context(|| format!("failed to handle update {}", update.id))?;
        }
    }
}
