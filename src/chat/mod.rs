pub mod handlers;
mod render;

use std::sync::Arc;

use axum::Router;
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::{debug, error};

use crate::ingest::{IngestionError, IngestionPipeline};
use crate::ledger::CalorieLedger;
use crate::state::AppState;
use crate::users::repo_types::UserId;
use crate::users::services::ProfileError;

pub fn router() -> Router<AppState> {
    handlers::chat_routes()
}

/// Where a user is in a multi-message exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    #[default]
    Idle,
    /// `/target` was sent without a number; the next message should be one.
    AwaitingTargetValue,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Target(Option<String>),
    Timezone(Option<String>),
    Status,
    Unknown(String),
    Text(String),
}

impl Command {
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let Some(rest) = text.strip_prefix('/') else {
            return Self::Text(text.to_string());
        };
        let mut parts = rest.split_whitespace();
        let head = parts.next().unwrap_or_default();
        // Group chats address commands as /status@botname.
        let name = head.split('@').next().unwrap_or(head).to_ascii_lowercase();
        let arg = parts.next().map(str::to_string);
        match name.as_str() {
            "start" | "help" => Self::Start,
            "target" | "setcalories" => Self::Target(arg),
            "timezone" | "settz" => Self::Timezone(arg),
            "status" => Self::Status,
            _ => Self::Unknown(name),
        }
    }
}

/// Text front-end over the ledger and pipeline. Produces reply text only.
pub struct ChatRouter {
    ledger: Arc<CalorieLedger>,
    pipeline: Arc<IngestionPipeline>,
    states: DashMap<UserId, ChatState>,
}

impl ChatRouter {
    pub fn new(ledger: Arc<CalorieLedger>, pipeline: Arc<IngestionPipeline>) -> Self {
        Self {
            ledger,
            pipeline,
            states: DashMap::new(),
        }
    }

    pub fn state(&self, user_id: UserId) -> ChatState {
        self.states.get(&user_id).map(|s| *s).unwrap_or_default()
    }

    fn set_state(&self, user_id: UserId, state: ChatState) {
        match state {
            ChatState::Idle => {
                self.states.remove(&user_id);
            }
            other => {
                self.states.insert(user_id, other);
            }
        }
    }

    pub async fn handle_text(
        &self,
        user_id: UserId,
        text: &str,
        now_utc: OffsetDateTime,
    ) -> anyhow::Result<String> {
        let command = Command::parse(text);
        debug!(user_id, ?command, state = ?self.state(user_id), "chat message");

        if let (ChatState::AwaitingTargetValue, Command::Text(value)) = (self.state(user_id), &command) {
            return Ok(match self.try_set_target(user_id, value).await? {
                Some(reply) => {
                    self.set_state(user_id, ChatState::Idle);
                    reply
                }
                None => render::INVALID_TARGET.to_string(),
            });
        }

        self.set_state(user_id, ChatState::Idle);
        let reply = match command {
            Command::Start => {
                self.ledger.profile(user_id).await?;
                render::GREETING.to_string()
            }
            Command::Target(None) => {
                self.set_state(user_id, ChatState::AwaitingTargetValue);
                render::ASK_TARGET.to_string()
            }
            Command::Target(Some(value)) => self
                .try_set_target(user_id, &value)
                .await?
                .unwrap_or_else(|| render::INVALID_TARGET.to_string()),
            Command::Timezone(None) => render::TIMEZONE_USAGE.to_string(),
            Command::Timezone(Some(tz)) => match self.ledger.set_timezone(user_id, &tz).await {
                Ok(profile) => render::timezone_set(&profile),
                Err(ProfileError::InvalidTimezone(_)) => render::unknown_timezone(&tz),
                Err(e) => return Err(e.into()),
            },
            Command::Status => render::status(&self.ledger.daily_summary(user_id, now_utc).await?),
            Command::Unknown(name) => render::unknown_command(&name),
            Command::Text(_) => render::SEND_PHOTO.to_string(),
        };
        Ok(reply)
    }

    pub async fn handle_photo(
        &self,
        user_id: UserId,
        image: &[u8],
        now_utc: OffsetDateTime,
    ) -> anyhow::Result<String> {
        self.set_state(user_id, ChatState::Idle);

        let summary = self.ledger.daily_summary(user_id, now_utc).await?;
        if summary.calorie_target.is_none() {
            return Ok(render::TARGET_REQUIRED.to_string());
        }

        match self.pipeline.ingest(user_id, image, now_utc).await {
            Ok(ingested) => Ok(render::meal_card(&ingested)),
            Err(IngestionError::InvalidImage(_)) => Ok(render::RESHOOT.to_string()),
            Err(IngestionError::TransientFailure(_)) => Ok(render::BUSY.to_string()),
            Err(
                e @ (IngestionError::MalformedResponse(_)
                | IngestionError::ProviderRejected(_)
                | IngestionError::Validation(_)),
            ) => {
                error!(error = %e, user_id, "photo analysis failed");
                Ok(render::ANALYSIS_FAILED.to_string())
            }
            Err(e @ IngestionError::Ledger(_)) => Err(e.into()),
        }
    }

    /// `Ok(None)` when `raw` is not a positive integer.
    async fn try_set_target(&self, user_id: UserId, raw: &str) -> anyhow::Result<Option<String>> {
        let Ok(target) = raw.trim().parse::<i64>() else {
            return Ok(None);
        };
        match self.ledger.set_target(user_id, target).await {
            Ok(profile) => Ok(Some(render::target_set(&profile))),
            Err(ProfileError::InvalidTarget(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
