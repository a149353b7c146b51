use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;

/// The functional category a module fulfills. Routing uses roles, not
/// concrete module identities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    Asr,
    Chat,
    Llm,
    Tts,
    Frontend,
    Plugin,
    /// Pseudo-role used only when the controller itself synthesizes messages.
    Controller,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Asr => "ASR",
            Role::Chat => "Chat",
            Role::Llm => "LLM",
            Role::Tts => "TTS",
            Role::Frontend => "Frontend",
            Role::Plugin => "Plugin",
            Role::Controller => "Controller",
        }
    }

    /// Roles a module may be registered under. `Controller` is excluded:
    /// registering a module under it is an `InvalidRole` error (see §4.2).
    pub fn registrable() -> [Role; 6] {
        [
            Role::Asr,
            Role::Chat,
            Role::Llm,
            Role::Tts,
            Role::Frontend,
            Role::Plugin,
        ]
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a message's payload carries content (`Data`) or the message is
/// itself the content (`Signal`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Signal,
    Data,
}

/// A borrowed reference to the module that emitted a message: role plus
/// display name, never a strong ownership edge back to the module instance
/// (see DESIGN.md on breaking the module/message/controller reference cycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRef {
    pub role: Role,
    pub name: String,
}

impl MessageRef {
    pub fn new(role: Role, name: impl Into<String>) -> Self {
        Self {
            role,
            name: name.into(),
        }
    }

    /// The pseudo-source used when the controller synthesizes a message on
    /// behalf of an external stimulus (e.g. the synthetic `api` injection).
    pub fn controller() -> Self {
        Self::new(Role::Controller, "controller")
    }
}

impl std::fmt::Display for MessageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<{} {}>", self.role, self.name)
    }
}

/// A record that `module_name` consumed a message, at `time` (wall clock
/// seconds). Introspection only — never a delivery acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedBy {
    pub module_name: String,
    pub time: i64,
}

/// Per-token duration annotation used by `TtsAlignedAudio`.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignEntry {
    pub token: String,
    pub duration: f64,
}

/// Probability-like distribution over the closed label set. The core does
/// not require normalization.
pub type Emotion = std::collections::BTreeMap<String, f64>;

pub fn neutral_emotion() -> Emotion {
    let mut e = Emotion::new();
    for label in ["like", "disgust", "anger", "happy", "sad", "neutral"] {
        e.insert(label.to_string(), 0.0);
    }
    e.insert("neutral".to_string(), 1.0);
    e
}

/// The fixed catalog of message shapes (§3). Each variant fixes its own
/// payload schema, kind and destination set — see `Message::destinations`.
#[derive(Debug, Clone)]
pub enum Payload {
    AsrActivated,
    AsrMessage {
        speaker_name: String,
        message: String,
    },
    ChatMessage {
        user: String,
        content: String,
    },
    LlmMessage {
        content: String,
        id: String,
        emotion: Emotion,
    },
    LlmEos,
    TtsAlignedAudio {
        id: String,
        audio_data: Vec<u8>,
        align_data: Vec<AlignEntry>,
    },
    AudioFinished,
    SongInfo {
        song_id: String,
        song_path: String,
        subtitle_path: String,
    },
    ReadyToSing {
        song_id: String,
    },
    FinishedSinging,
}

impl Payload {
    pub fn name(&self) -> &'static str {
        match self {
            Payload::AsrActivated => "ASRActivated",
            Payload::AsrMessage { .. } => "ASRMessage",
            Payload::ChatMessage { .. } => "ChatMessage",
            Payload::LlmMessage { .. } => "LLMMessage",
            Payload::LlmEos => "LLMEOS",
            Payload::TtsAlignedAudio { .. } => "TTSAlignedAudio",
            Payload::AudioFinished => "AudioFinished",
            Payload::SongInfo { .. } => "SongInfo",
            Payload::ReadyToSing { .. } => "ReadyToSing",
            Payload::FinishedSinging => "FinishedSinging",
        }
    }

    pub fn kind(&self) -> Kind {
        match self {
            Payload::AsrActivated
            | Payload::LlmEos
            | Payload::AudioFinished
            | Payload::FinishedSinging
            | Payload::ReadyToSing { .. } => Kind::Signal,
            _ => Kind::Data,
        }
    }

    /// The fixed destination role set for this message shape (§3 catalog).
    pub fn destinations(&self) -> &'static [Role] {
        use Role::*;
        match self {
            Payload::AsrActivated => &[Tts, Frontend, Llm],
            Payload::AsrMessage { .. } => &[Llm, Frontend],
            Payload::ChatMessage { .. } => &[Llm, Frontend],
            Payload::LlmMessage { .. } => &[Frontend, Tts],
            Payload::LlmEos => &[Frontend, Tts],
            Payload::TtsAlignedAudio { .. } => &[Frontend],
            Payload::AudioFinished => &[Llm],
            Payload::SongInfo { .. } => &[Frontend, Llm],
            Payload::ReadyToSing { .. } => &[Frontend],
            Payload::FinishedSinging => &[Llm],
        }
    }

    /// Field-wise string representation for the `get_messages` introspection
    /// payload (`{key, value}` pairs). Bytes are summarized by length rather
    /// than dumped in full.
    pub fn fields(&self) -> Vec<(String, String)> {
        match self {
            Payload::AsrActivated | Payload::LlmEos | Payload::AudioFinished | Payload::FinishedSinging => {
                vec![]
            }
            Payload::AsrMessage { speaker_name, message } => vec![
                ("speaker_name".into(), speaker_name.clone()),
                ("message".into(), message.clone()),
            ],
            Payload::ChatMessage { user, content } => {
                vec![("user".into(), user.clone()), ("content".into(), content.clone())]
            }
            Payload::LlmMessage { content, id, emotion } => vec![
                ("content".into(), content.clone()),
                ("id".into(), id.clone()),
                ("emotion".into(), format!("{:?}", emotion)),
            ],
            Payload::TtsAlignedAudio { id, audio_data, align_data } => vec![
                ("id".into(), id.clone()),
                ("audio_data".into(), format!("<{} bytes>", audio_data.len())),
                ("align_data".into(), format!("{:?}", align_data)),
            ],
            Payload::SongInfo { song_id, song_path, subtitle_path } => vec![
                ("song_id".into(), song_id.clone()),
                ("song_path".into(), song_path.clone()),
                ("subtitle_path".into(), subtitle_path.clone()),
            ],
            Payload::ReadyToSing { song_id } => vec![("song_id".into(), song_id.clone())],
        }
    }
}

struct MessageInner {
    payload: Payload,
    source: MessageRef,
    created_at: Instant,
    send_time: i64,
    observed_by: Mutex<Vec<ObservedBy>>,
}

/// An immutable envelope carrying a typed payload, a source reference, and
/// a destination role set. Cheaply `Clone`able — all clones share the same
/// identity and the same growing `observed_by` list, mirroring the shared
/// object semantics of the original message plane (a single message handed
/// to several queues, not copied per recipient).
#[derive(Clone)]
pub struct Message(Arc<MessageInner>);

impl Message {
    pub fn new(payload: Payload, source: MessageRef) -> Self {
        Self(Arc::new(MessageInner {
            payload,
            source,
            created_at: Instant::now(),
            send_time: Utc::now().timestamp(),
            observed_by: Mutex::new(Vec::new()),
        }))
    }

    pub fn payload(&self) -> &Payload {
        &self.0.payload
    }

    pub fn name(&self) -> &'static str {
        self.0.payload.name()
    }

    pub fn kind(&self) -> Kind {
        self.0.payload.kind()
    }

    pub fn destinations(&self) -> &'static [Role] {
        self.0.payload.destinations()
    }

    pub fn source(&self) -> &MessageRef {
        &self.0.source
    }

    pub fn created_at(&self) -> Instant {
        self.0.created_at
    }

    pub fn send_time(&self) -> i64 {
        self.0.send_time
    }

    /// Record that `module_name` consumed this message. Advisory only.
    pub fn record_observation(&self, module_name: impl Into<String>) {
        self.0.observed_by.lock().push(ObservedBy {
            module_name: module_name.into(),
            time: Utc::now().timestamp(),
        });
    }

    pub fn observed_by(&self) -> Vec<ObservedBy> {
        self.0.observed_by.lock().clone()
    }

    /// Identity comparison: two clones of the same message are `eq`, two
    /// independently constructed messages never are, even with identical
    /// payloads.
    pub fn is_same(&self, other: &Message) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("name", &self.name())
            .field("source", &self.source())
            .field("destinations", &self.destinations())
            .finish()
    }
}
