//! Candidate selection and decision handling.

use std::{sync::Arc, time::Instant};

use crate::{
    audit::{AuditEvent, AuditLogger},
    commands::BotCommand,
    decision::{decision_keyboard, Decision},
    domain::{Candidate, ChatId, ModerationFlags},
    messaging::{
        port::MessagingPort,
        types::{Command, IncomingUpdate, Reply},
    },
    ports::CandidateStore,
    security::is_authorized,
    session::ModerationSession,
    skip_cache::SkipCache,
    Error, Result,
};

pub const GREETING: &str = "Hi!";
pub const HELP: &str = "I understand /getpost, /help and /status.";
pub const STATUS_OK: &str = "I'm ok.";
pub const UNKNOWN_COMMAND: &str = "I don't know that command";
pub const NO_POSTS: &str = "Нет доступных постов";
pub const APPROVED: &str = "Пост принят";
pub const REJECTED: &str = "Пост отклонен";
pub const SKIPPED: &str = "Пост пропущен";
pub const UNSUPPORTED: &str = "Кнопка не поддерживается";

fn error_text(err: &Error) -> String {
    format!("Произошла ошибка: {err}")
}

fn candidate_text(candidate: &Candidate) -> String {
    format!("Пост: {}\n{}", candidate.title, candidate.guid)
}

/// First candidate whose guid is not skipped at `now`.
pub fn select_candidate(
    candidates: Vec<Candidate>,
    skip: &SkipCache,
    now: Instant,
) -> Option<Candidate> {
    candidates
        .into_iter()
        .find(|c| !skip.contains_at(&c.guid, now))
}

/// Sequential handler for authorized operator updates.
pub struct Moderator {
    store: Arc<dyn CandidateStore>,
    messenger: Arc<dyn MessagingPort>,
    skip: SkipCache,
    allowed_users: Vec<i64>,
    audit: Option<AuditLogger>,
}

impl Moderator {
    pub fn new(
        store: Arc<dyn CandidateStore>,
        messenger: Arc<dyn MessagingPort>,
        skip: SkipCache,
        allowed_users: Vec<i64>,
    ) -> Self {
        Self {
            store,
            messenger,
            skip,
            allowed_users,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn skip_cache(&self) -> &SkipCache {
        &self.skip
    }

    pub async fn register_commands(&self) -> Result<()> {
        self.messenger.set_commands(&BotCommand::MENU).await
    }

    /// Handle one update to completion, reply included.
    ///
    /// Store failures are reported to the operator; only a failed send is
    /// returned as an error.
    pub async fn handle(
        &self,
        session: &mut ModerationSession,
        update: IncomingUpdate,
    ) -> Result<()> {
        self.handle_at(session, update, Instant::now()).await
    }

    pub async fn handle_at(
        &self,
        session: &mut ModerationSession,
        update: IncomingUpdate,
        now: Instant,
    ) -> Result<()> {
        let chat_id = update.chat_id();
        let user_id = update.user_id();

        if !is_authorized(user_id, &self.allowed_users) {
            tracing::warn!(
                chat_id = chat_id.0,
                user_id = ?user_id.map(|u| u.0),
                username = ?update.username(),
                "update from unknown user dropped"
            );
            self.audit(&update, AuditEvent::unauthorized);
            return Ok(());
        }

        let reply = match &update {
            IncomingUpdate::Command(cmd) => {
                tracing::info!(command = %cmd.name, "got command");
                self.on_command(session, &update, cmd, now).await
            }
            IncomingUpdate::Text(msg) => {
                tracing::info!(text = %msg.text, "got text");
                let decision = Decision::from_text(&msg.text);
                self.on_decision(session, &update, decision, now).await
            }
        };

        self.send(chat_id, &reply).await
    }

    async fn on_command(
        &self,
        session: &mut ModerationSession,
        update: &IncomingUpdate,
        cmd: &Command,
        now: Instant,
    ) -> Reply {
        match BotCommand::from_name(&cmd.name) {
            BotCommand::Start => Reply::text(GREETING),
            BotCommand::GetPost => self.fetch(session, update, now).await,
            BotCommand::Help => Reply::text(HELP),
            BotCommand::Status => Reply::text(self.status_text(session, now)),
            BotCommand::Unknown(_) => Reply::text(UNKNOWN_COMMAND),
        }
    }

    fn status_text(&self, session: &ModerationSession, now: Instant) -> String {
        let pending = session
            .current()
            .map(|c| c.title.as_str())
            .unwrap_or("none");
        format!(
            "{STATUS_OK}\nSkipped posts: {}\nAwaiting decision: {pending}",
            self.skip.len_at(now)
        )
    }

    async fn fetch(
        &self,
        session: &mut ModerationSession,
        update: &IncomingUpdate,
        now: Instant,
    ) -> Reply {
        let candidates = match self.store.pending_candidates().await {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(error = %e, "failed to query candidates");
                session.clear();
                self.audit(update, |uid, name| {
                    AuditEvent::failure(uid, name, None, &e.to_string())
                });
                return Reply::text(error_text(&e));
            }
        };

        let total = candidates.len();
        let Some(candidate) = select_candidate(candidates, &self.skip, now) else {
            tracing::info!(total, "no eligible candidates");
            session.clear();
            return Reply::text(NO_POSTS);
        };

        tracing::info!(guid = %candidate.guid, total, "candidate selected");
        self.audit(update, |uid, name| {
            AuditEvent::candidate("shown", uid, name, &candidate)
        });
        let reply = Reply::with_keyboard(candidate_text(&candidate), decision_keyboard());
        if let Some(prev) = session.replace(candidate) {
            tracing::debug!(previous = %prev.guid, "pending candidate replaced by a new fetch");
        }
        reply
    }

    async fn on_decision(
        &self,
        session: &mut ModerationSession,
        update: &IncomingUpdate,
        decision: Decision,
        now: Instant,
    ) -> Reply {
        // The slot is cleared whatever the outcome.
        let Some(candidate) = session.take() else {
            tracing::info!(decision = decision.as_str(), "no pending candidate");
            return Reply::text(UNSUPPORTED);
        };

        match decision {
            Decision::Approve => {
                let flags = ModerationFlags::APPROVED;
                self.write_flags(update, &candidate, decision, flags, APPROVED)
                    .await
            }
            Decision::Reject => {
                let flags = ModerationFlags::REJECTED;
                self.write_flags(update, &candidate, decision, flags, REJECTED)
                    .await
            }
            Decision::Skip => {
                self.skip.insert_at(&candidate.guid, now);
                tracing::info!(
                    guid = %candidate.guid,
                    ttl_secs = self.skip.ttl().as_secs(),
                    "candidate skipped"
                );
                self.audit(update, |uid, name| {
                    AuditEvent::candidate(decision.as_str(), uid, name, &candidate)
                });
                Reply::text(SKIPPED)
            }
            Decision::Unsupported => {
                tracing::info!(guid = %candidate.guid, "unsupported input, candidate dropped");
                Reply::text(UNSUPPORTED)
            }
        }
    }

    async fn write_flags(
        &self,
        update: &IncomingUpdate,
        candidate: &Candidate,
        decision: Decision,
        flags: ModerationFlags,
        done: &str,
    ) -> Reply {
        match self.store.update_flags(&candidate.record_id, flags).await {
            Ok(()) => {
                tracing::info!(
                    guid = %candidate.guid,
                    decision = decision.as_str(),
                    "decision stored"
                );
                self.audit(update, |uid, name| {
                    AuditEvent::candidate(decision.as_str(), uid, name, candidate)
                });
                Reply::text(done)
            }
            Err(e) => {
                tracing::error!(
                    guid = %candidate.guid,
                    decision = decision.as_str(),
                    error = %e,
                    "failed to store decision"
                );
                self.audit(update, |uid, name| {
                    AuditEvent::failure(uid, name, Some(candidate), &e.to_string())
                });
                Reply::text(error_text(&e))
            }
        }
    }

    async fn send(&self, chat_id: ChatId, reply: &Reply) -> Result<()> {
        match &reply.keyboard {
            Some(kb) => {
                self.messenger
                    .send_with_keyboard(chat_id, &reply.text, kb)
                    .await?
            }
            None => self.messenger.send_text(chat_id, &reply.text).await?,
        };
        Ok(())
    }

    fn audit(
        &self,
        update: &IncomingUpdate,
        build: impl FnOnce(Option<i64>, Option<&str>) -> AuditEvent,
    ) {
        let Some(log) = &self.audit else {
            return;
        };
        let event = build(update.user_id().map(|u| u.0), update.username());
        if let Err(e) = log.write(&event) {
            tracing::warn!(error = %e, path = %log.path().display(), "audit write failed");
        }
    }
}
