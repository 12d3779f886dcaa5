use chrono::Local;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use super::{log_at, Notifier, NotifyLevel};
use crate::error::BotError;
use crate::Result;

/// Discord rejects message content above this many characters
const MAX_CONTENT_LEN: usize = 2000;

enum Outgoing {
    Text(String),
    Image(Vec<u8>),
}

/// Posts notifications to a Discord webhook from a background task
///
/// `notify` only pushes onto an unbounded queue. The task drains whatever
/// has queued up and posts it as one message, so bursts of log lines cost
/// a single request. Dropping every clone of the notifier ends the task
/// after the queue is flushed.
#[derive(Clone)]
pub struct DiscordNotifier {
    sender: UnboundedSender<Outgoing>,
}

impl DiscordNotifier {
    /// Start the delivery task; must be called inside a Tokio runtime
    pub fn spawn(webhook_url: impl Into<String>) -> Result<(Self, JoinHandle<()>)> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(BotError::Http)?;

        let (sender, receiver) = unbounded_channel();
        let handle = tokio::spawn(deliver(client, webhook_url.into(), receiver));

        Ok((Self { sender }, handle))
    }
}

impl Notifier for DiscordNotifier {
    fn notify(&self, level: NotifyLevel, text: &str) {
        log_at(level, text);
        let line = format!("{} - {} - {}", Local::now().format("%H:%M:%S"), level, text);
        // A closed queue means shutdown is underway
        let _ = self.sender.send(Outgoing::Text(line));
    }

    fn notify_image(&self, image: Vec<u8>) {
        let _ = self.sender.send(Outgoing::Image(image));
    }
}

async fn deliver(client: Client, url: String, mut receiver: UnboundedReceiver<Outgoing>) {
    while let Some(first) = receiver.recv().await {
        let mut lines = Vec::new();
        let mut images = Vec::new();

        let mut next = Some(first);
        while let Some(item) = next {
            match item {
                Outgoing::Text(line) => lines.push(line),
                Outgoing::Image(bytes) => images.push(bytes),
            }
            next = receiver.try_recv().ok();
        }

        for chunk in chunk_lines(&lines, MAX_CONTENT_LEN) {
            if let Err(e) = post_message(&client, &url, &chunk).await {
                tracing::warn!("discord message not delivered: {}", e);
            }
        }
        for image in images {
            if let Err(e) = post_image(&client, &url, image).await {
                tracing::warn!("discord image not delivered: {}", e);
            }
        }
    }
}

/// Join lines into messages no longer than `limit` characters
fn chunk_lines(lines: &[String], limit: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in lines {
        let line: String = line.chars().take(limit).collect();
        let needed = if current.is_empty() {
            line.chars().count()
        } else {
            current.chars().count() + 1 + line.chars().count()
        };

        if needed > limit && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(&line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

async fn post_message(client: &Client, url: &str, content: &str) -> Result<()> {
    let response = client
        .post(url)
        .json(&json!({ "content": content }))
        .send()
        .await?;

    check_status(response).await
}

async fn post_image(client: &Client, url: &str, image: Vec<u8>) -> Result<()> {
    let part = Part::bytes(image)
        .file_name("chart.png")
        .mime_str("image/png")?;
    let form = Form::new().part("file", part);

    let response = client.post(url).multipart(form).send().await?;
    check_status(response).await
}

async fn check_status(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(BotError::from_status(status.as_u16(), body))
}
