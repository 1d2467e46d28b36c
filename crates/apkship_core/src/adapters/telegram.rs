//! Telegram Bot API announcer.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::types::Announcement;
use super::Announcer;
use crate::config::NotifySettings;
use crate::orchestrator::{StageError, StageResult};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramAnnouncer {
    client: Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramAnnouncer {
    pub fn new(settings: &NotifySettings, bot_token: impl Into<String>, user_agent: &str) -> StageResult<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| StageError::http("building HTTP client", e.to_string()))?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.into(),
            chat_id: settings.chat_id.clone(),
        })
    }

    /// `sendMessage` body with an inline download button.
    pub fn message_payload(&self, announcement: &Announcement) -> Value {
        json!({
            "chat_id": self.chat_id,
            "text": announcement.text,
            "disable_web_page_preview": false,
            "reply_markup": {
                "inline_keyboard": [[
                    { "text": "Download Now", "url": announcement.url }
                ]]
            }
        })
    }
}

impl Announcer for TelegramAnnouncer {
    fn announce(&self, announcement: &Announcement) -> StageResult<()> {
        // The token is part of the path; keep it out of error messages.
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .client
            .post(&url)
            .json(&self.message_payload(announcement))
            .send()
            .map_err(|e| StageError::http("sending Telegram message", e.without_url().to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| StageError::http("reading Telegram response", e.without_url().to_string()))?;
        check_response(status.as_u16(), &body)?;

        tracing::info!(chat = %self.chat_id, version = %announcement.version, "announcement sent");
        Ok(())
    }
}

/// A reply only counts as delivered when it parses and says `ok: true`.
fn check_response(status: u16, body: &str) -> StageResult<()> {
    match serde_json::from_str::<ApiResponse>(body) {
        Ok(reply) if reply.ok => Ok(()),
        Ok(reply) => Err(StageError::http(
            "sending Telegram message",
            format!(
                "HTTP {}: {}",
                status,
                reply.description.unwrap_or_else(|| "ok=false".to_string())
            ),
        )),
        Err(e) => Err(StageError::http(
            "sending Telegram message",
            format!("HTTP {}: unreadable response ({})", status, e),
        )),
    }
}
