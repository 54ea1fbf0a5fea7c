//! Telegram `sendPhoto` transport.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, ClientBuilder};
use std::time::Duration;

use super::NotificationTransport;

const API_BASE: &str = "https://api.telegram.org";
const PHOTO_FILE_NAME: &str = "crop.jpg";

pub struct TelegramTransport {
    client: Client,
    url: String,
    chat_id: String,
}

impl TelegramTransport {
    pub fn new(bot_token: &str, chat_id: &str, timeout: Duration) -> Result<Self> {
        Self::from_builder(Client::builder().timeout(timeout), API_BASE, bot_token, chat_id)
    }

    fn from_builder(
        builder: ClientBuilder,
        api_base: &str,
        bot_token: &str,
        chat_id: &str,
    ) -> Result<Self> {
        if bot_token.trim().is_empty() || chat_id.trim().is_empty() {
            return Err(anyhow!("telegram bot token and chat id are required"));
        }
        let client = builder.build().context("build telegram http client")?;
        Ok(Self {
            client,
            url: format!(
                "{}/bot{}/sendPhoto",
                api_base.trim_end_matches('/'),
                bot_token.trim()
            ),
            chat_id: chat_id.trim().to_string(),
        })
    }
}

/// `sendPhoto` form: `chat_id`, `photo` (JPEG) and `caption`.
fn photo_form(chat_id: &str, image: &[u8], caption: &str) -> Result<Form> {
    let photo = Part::bytes(image.to_vec())
        .file_name(PHOTO_FILE_NAME)
        .mime_str("image/jpeg")?;
    Ok(Form::new()
        .text("chat_id", chat_id.to_string())
        .part("photo", photo)
        .text("caption", caption.to_string()))
}

impl NotificationTransport for TelegramTransport {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn deliver(&self, image: &[u8], caption: &str) -> Result<()> {
        let form = photo_form(&self.chat_id, image, caption)?;

        // reqwest errors embed the request URL, which carries the bot token.
        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .map_err(|e| anyhow!("telegram transport error: {}", e.without_url()))?;

        let status = response.status();
        let raw = response
            .text()
            .map_err(|e| anyhow!("read telegram response: {}", e.without_url()))?;
        if !status.is_success() {
            return Err(anyhow!(
                "telegram returned HTTP {}: {}",
                status.as_u16(),
                api_description(&raw)
            ));
        }
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| anyhow!("invalid telegram response: {}", e))?;
        if value.get("ok").and_then(|v| v.as_bool()) != Some(true) {
            return Err(anyhow!("telegram rejected photo: {}", api_description(&raw)));
        }
        Ok(())
    }
}

fn api_description(raw: &str) -> String {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()
        .and_then(|v| v.get("description").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| "no description".to_string())
}
