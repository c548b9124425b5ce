use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sqlsage_config::BotConfig;
use sqlsage_pipeline::Orchestrator;

/// Telegram rejects messages longer than 4096 characters.
const MAX_MESSAGE_CHARS: usize = 3_500;

const WELCOME: &str = "Welcome! Enter your name to begin. (Eg : Arun K)";

const HELP: &str = "\
Ask me anything about the data in the database, in plain language.

/start - introduce yourself again
/forget - clear what I remember of our conversation
/help - show this message";

// ── Per-chat state ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum ChatState {
    AwaitingName,
    Chatting { name: String },
}

/// What the bot should do with one incoming text message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    Reply(String),
    Ask { name: String, question: String },
    Forget { name: Option<String> },
}

/// Display names and onboarding state, keyed by chat id.
#[derive(Debug, Default)]
pub struct Conversations {
    chats: HashMap<i64, ChatState>,
}

impl Conversations {
    pub fn route(&mut self, chat_id: i64, text: &str) -> Route {
        let line = normalize_telegram_command(text);
        if line.is_empty() {
            return Route::Reply(HELP.to_string());
        }

        match line.as_str() {
            "/start" => {
                self.chats.insert(chat_id, ChatState::AwaitingName);
                return Route::Reply(WELCOME.to_string());
            }
            "/help" => return Route::Reply(HELP.to_string()),
            "/forget" => {
                return Route::Forget {
                    name: self.name_of(chat_id).map(ToString::to_string),
                };
            }
            _ if line.starts_with('/') => {
                return Route::Reply("unknown command. use /help".to_string());
            }
            _ => {}
        }

        match self.chats.get(&chat_id) {
            Some(ChatState::AwaitingName) => {
                self.chats.insert(chat_id, ChatState::Chatting { name: line.clone() });
                Route::Reply(format!("Hello, {line}! Ask me a question about your data."))
            }
            Some(ChatState::Chatting { name }) => Route::Ask {
                name: name.clone(),
                question: line,
            },
            // Chats that never ran /start are answered anonymously.
            None => Route::Ask {
                name: "User".to_string(),
                question: line,
            },
        }
    }

    pub fn name_of(&self, chat_id: i64) -> Option<&str> {
        match self.chats.get(&chat_id)? {
            ChatState::Chatting { name } => Some(name),
            ChatState::AwaitingName => None,
        }
    }
}

/// Memory identity for a chat.
pub fn chat_identity(chat_id: i64) -> String {
    format!("telegram-{chat_id}")
}

pub fn format_reply(name: &str, answer: &str, prefix_display_name: bool) -> String {
    if prefix_display_name {
        format!("{name}, {answer}")
    } else {
        answer.to_string()
    }
}

// ── Long-poll loop ──────────────────────────────────────────────────────────

pub async fn start_bot(orchestrator: Arc<Orchestrator>, bot: &BotConfig) -> Result<()> {
    let token = std::env::var(&bot.telegram_token_env)
        .map_err(|_| anyhow::anyhow!("{} is not set", bot.telegram_token_env))?;
    if token.trim().is_empty() {
        bail!("{} is empty", bot.telegram_token_env);
    }

    let client = Client::new();
    let base_url = format!("https://api.telegram.org/bot{}", token.trim());
    let mut offset: i64 = 0;
    let mut conversations = Conversations::default();
    let prefix = bot.prefix_display_name;

    info!(bot = %bot.name, "telegram transport listening for updates");

    loop {
        let updates = match fetch_updates(&client, &base_url, offset).await {
            Ok(updates) => updates,
            Err(err) => {
                if err.to_string().contains("409") {
                    warn!("another bot instance is polling; waiting 15s");
                    tokio::time::sleep(Duration::from_secs(15)).await;
                } else {
                    warn!(%err, "getUpdates failed; retrying in 5s");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                continue;
            }
        };

        for update in updates {
            offset = update.update_id + 1;

            let Some(message) = update.message else {
                continue;
            };
            let chat_id = message.chat.id;
            let Some(text) = message.text else {
                debug!(chat_id, "ignoring non-text message");
                let _ = send_message(&client, &base_url, chat_id, "Please send your question as text.").await;
                continue;
            };

            match conversations.route(chat_id, &text) {
                Route::Reply(reply) => send_chunked(&client, &base_url, chat_id, &reply).await,
                Route::Forget { name } => {
                    let forgotten = orchestrator.memory().forget(&chat_identity(chat_id)).await;
                    let reply = if forgotten {
                        "Done, our conversation so far is forgotten."
                    } else {
                        "There was nothing to forget."
                    };
                    let reply = match name {
                        Some(name) => format_reply(&name, reply, prefix),
                        None => reply.to_string(),
                    };
                    send_chunked(&client, &base_url, chat_id, &reply).await;
                }
                Route::Ask { name, question } => {
                    let orchestrator = Arc::clone(&orchestrator);
                    let client = client.clone();
                    let base_url = base_url.clone();
                    tokio::spawn(async move {
                        answer_in_chat(&orchestrator, &client, &base_url, chat_id, &name, &question, prefix)
                            .await;
                    });
                }
            }
        }

        tokio::time::sleep(Duration::from_millis(300)).await;
    }
}

async fn answer_in_chat(
    orchestrator: &Orchestrator,
    client: &Client,
    base_url: &str,
    chat_id: i64,
    name: &str,
    question: &str,
    prefix: bool,
) {
    // Telegram shows the indicator for ~5s after each call.
    let (cancel_typing_tx, mut cancel_typing_rx) = tokio::sync::oneshot::channel::<()>();
    {
        let client = client.clone();
        let base_url = base_url.to_string();
        tokio::spawn(async move {
            let _ = send_chat_action(&client, &base_url, chat_id, "typing").await;
            let mut interval = tokio::time::interval(Duration::from_secs(4));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = &mut cancel_typing_rx => break,
                    _ = interval.tick() => {
                        let _ = send_chat_action(&client, &base_url, chat_id, "typing").await;
                    }
                }
            }
        });
    }

    let reply = match orchestrator.answer(question, &chat_identity(chat_id)).await {
        Ok(answer) => format_reply(name, &answer.text, prefix),
        Err(err) => format_reply(name, &err.user_message(), prefix),
    };
    let _ = cancel_typing_tx.send(());

    send_chunked(client, base_url, chat_id, &reply).await;
}

async fn send_chunked(client: &Client, base_url: &str, chat_id: i64, text: &str) {
    for chunk in chunk_message(text, MAX_MESSAGE_CHARS) {
        if let Err(err) = send_message(client, base_url, chat_id, &chunk).await {
            warn!(chat_id, %err, "sendMessage failed");
        }
    }
}

// ── Bot API calls ───────────────────────────────────────────────────────────

async fn fetch_updates(client: &Client, base_url: &str, offset: i64) -> Result<Vec<TelegramUpdate>> {
    let url = format!("{base_url}/getUpdates");
    let response = client
        .get(url)
        .query(&[("timeout", "25"), ("offset", &offset.to_string())])
        .send()
        .await?
        .error_for_status()?;

    let payload: TelegramResponse<Vec<TelegramUpdate>> = response.json().await?;
    if !payload.ok {
        let description = payload
            .description
            .unwrap_or_else(|| "telegram getUpdates failed".to_string());
        bail!(description);
    }

    Ok(payload.result.unwrap_or_default())
}

async fn send_message(client: &Client, base_url: &str, chat_id: i64, text: &str) -> Result<()> {
    let url = format!("{base_url}/sendMessage");
    let body = SendMessageRequest {
        chat_id,
        text,
        disable_web_page_preview: true,
    };

    let response = client.post(url).json(&body).send().await?.error_for_status()?;
    let payload: TelegramResponse<serde_json::Value> = response.json().await?;
    if !payload.ok {
        let description = payload
            .description
            .unwrap_or_else(|| "telegram sendMessage failed".to_string());
        bail!(description);
    }

    Ok(())
}

/// Best effort; a failed typing indicator is never reported.
async fn send_chat_action(client: &Client, base_url: &str, chat_id: i64, action: &str) -> Result<()> {
    let url = format!("{base_url}/sendChatAction");
    let body = serde_json::json!({ "chat_id": chat_id, "action": action });
    let _ = client.post(url).json(&body).send().await;
    Ok(())
}

fn normalize_telegram_command(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with('/') {
        return trimmed.to_string();
    }

    let mut parts = trimmed.splitn(2, char::is_whitespace);
    let command = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or("").trim();
    let command = command.split_once('@').map(|(base, _)| base).unwrap_or(command);

    if rest.is_empty() {
        command.to_string()
    } else {
        format!("{command} {rest}")
    }
}

/// Split on line boundaries; a single line longer than `max_chars` is split
/// on character boundaries.
fn chunk_message(text: &str, max_chars: usize) -> Vec<String> {
    if text.chars().count() <= max_chars {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    let mut push_line = |line: &str, chunks: &mut Vec<String>| {
        let line_len = line.chars().count() + 1;
        if current_len > 0 && current_len + line_len > max_chars {
            chunks.push(current.trim_end().to_string());
            current.clear();
            current_len = 0;
        }
        current.push_str(line);
        current.push('\n');
        current_len += line_len;
    };

    for line in text.lines() {
        if line.chars().count() < max_chars {
            push_line(line, &mut chunks);
            continue;
        }
        let chars: Vec<char> = line.chars().collect();
        for piece in chars.chunks(max_chars - 1) {
            push_line(&piece.iter().collect::<String>(), &mut chunks);
        }
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim_end().to_string());
    }
    if chunks.is_empty() {
        chunks.push(text.to_string());
    }
    chunks
}

#[derive(Debug, Deserialize)]
struct TelegramResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramUpdate {
    update_id: i64,
    message: Option<TelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct TelegramMessage {
    chat: TelegramChat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TelegramChat {
    id: i64,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    disable_web_page_preview: bool,
}
