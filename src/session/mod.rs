// Session module
// Platform-neutral message events and the in-process conversation history


use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Chat platform a message arrived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Discord,
    Twitch,
    Console,
}

impl Platform {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::Discord => "discord",
            Self::Twitch => "twitch",
            Self::Console => "console",
        }
    }
}

impl fmt::Display for Platform {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "discord" => Ok(Self::Discord),
            "twitch" => Ok(Self::Twitch),
            "console" => Ok(Self::Console),
            other => Err(format!("unknown platform '{}'", other)),
        }
    }
}

/// An inbound chat message, normalized by its connector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub platform: Platform,
    pub author: String,
    pub channel: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl MessageEvent {
    #[inline]
    pub fn new(
        platform: Platform,
        author: impl Into<String>,
        channel: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            author: author.into(),
            channel: channel.into(),
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    #[inline]
    pub fn is_command(&self, prefix: &str) -> bool {
        self.text.trim_start().starts_with(prefix)
    }

    /// Worth keeping in long-term memory: has content and is not a command
    #[inline]
    pub fn is_memory_worthy(&self, command_prefix: &str) -> bool {
        !self.text.trim().is_empty() && !self.is_command(command_prefix)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    #[inline]
    pub fn as_str(&self) -> &'static str {
        match *self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message in the short-term history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub author: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatTurn {
    /// Single-line rendering used in prompt context
    #[inline]
    pub fn render(&self) -> String {
        format!("{}: {}", self.author, self.text)
    }
}

/// Author/channel pairs kept before the least recently active one is dropped
pub const MAX_TRACKED_CONVERSATIONS: usize = 1024;
pub const MAX_TRACKED_CHANNELS: usize = 256;

/// Turn queues of bounded length under a bounded number of keys
#[derive(Debug)]
struct TurnLog<K> {
    capacity: usize,
    max_keys: usize,
    clock: u64,
    // last write tick and turns, oldest first
    entries: HashMap<K, (u64, VecDeque<ChatTurn>)>,
}

impl<K: Eq + Hash + Clone> TurnLog<K> {
    fn new(capacity: usize, max_keys: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            max_keys: max_keys.max(1),
            clock: 0,
            entries: HashMap::new(),
        }
    }

    fn push(&mut self, key: K, turn: ChatTurn) {
        self.clock += 1;

        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_keys {
            let stale = self
                .entries
                .iter()
                .min_by_key(|(_, (touched, _))| *touched)
                .map(|(key, _)| key.clone());
            if let Some(stale) = stale {
                self.entries.remove(&stale);
            }
        }

        let (touched, turns) = self.entries.entry(key).or_default();
        *touched = self.clock;
        turns.push_back(turn);
        while turns.len() > self.capacity {
            turns.pop_front();
        }
    }

    fn get(&self, key: &K) -> Option<&VecDeque<ChatTurn>> {
        self.entries.get(key).map(|(_, turns)| turns)
    }

    fn remove(&mut self, key: &K) {
        self.entries.remove(key);
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Bounded in-process history, per author/channel pair and per channel.
///
/// Both the turns per key and the number of keys are capped; the key written
/// to least recently is forgotten first. Lost on restart; long-term memory
/// lives in the vector store.
#[derive(Debug)]
pub struct SessionHistory {
    conversations: Mutex<TurnLog<(String, String)>>,
    channels: Mutex<TurnLog<String>>,
}

impl SessionHistory {
    #[inline]
    pub fn new(conversation_capacity: usize, channel_capacity: usize) -> Self {
        Self::with_key_limits(
            conversation_capacity,
            channel_capacity,
            MAX_TRACKED_CONVERSATIONS,
            MAX_TRACKED_CHANNELS,
        )
    }

    #[inline]
    pub fn with_key_limits(
        conversation_capacity: usize,
        channel_capacity: usize,
        max_conversations: usize,
        max_channels: usize,
    ) -> Self {
        Self {
            conversations: Mutex::new(TurnLog::new(conversation_capacity, max_conversations)),
            channels: Mutex::new(TurnLog::new(channel_capacity, max_channels)),
        }
    }

    /// Record an inbound message in its conversation and channel
    #[inline]
    pub fn record_message(&self, event: &MessageEvent) {
        let turn = ChatTurn {
            author: event.author.clone(),
            role: Role::User,
            text: event.text.clone(),
            timestamp: event.timestamp,
        };
        self.push_conversation(&event.author, &event.channel, turn.clone());
        self.push_channel(&event.channel, turn);
    }

    /// Record the bot's reply to `event`
    #[inline]
    pub fn record_reply(&self, event: &MessageEvent, bot_name: &str, reply: &str) {
        let turn = ChatTurn {
            author: bot_name.to_string(),
            role: Role::Assistant,
            text: reply.to_string(),
            timestamp: Utc::now(),
        };
        self.push_conversation(&event.author, &event.channel, turn.clone());
        self.push_channel(&event.channel, turn);
    }

    /// Turns between `author` and the bot in `channel`, oldest first
    #[inline]
    pub fn conversation(&self, author: &str, channel: &str) -> Vec<ChatTurn> {
        let conversations = self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        conversations
            .get(&(author.to_string(), channel.to_string()))
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Recent channel messages not part of `author`'s own conversation, oldest first
    #[inline]
    pub fn channel_context(&self, channel: &str, author: &str) -> Vec<ChatTurn> {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(&channel.to_string())
            .map(|turns| {
                turns
                    .iter()
                    .filter(|turn| turn.role == Role::User && turn.author != author)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    #[inline]
    pub fn clear_conversation(&self, author: &str, channel: &str) {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(author.to_string(), channel.to_string()));
    }

    /// Number of conversations and channels currently held
    #[inline]
    pub fn tracked(&self) -> (usize, usize) {
        let conversations = self
            .conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len();
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner).len();
        (conversations, channels)
    }

    fn push_conversation(&self, author: &str, channel: &str, turn: ChatTurn) {
        self.conversations
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((author.to_string(), channel.to_string()), turn);
    }

    fn push_channel(&self, channel: &str, turn: ChatTurn) {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(channel.to_string(), turn);
    }
}
