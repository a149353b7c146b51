//! The generation backend contract (§4.3 "Generator control flow"):
//! model as a task producing `(sentence, emotion)` pairs into a channel,
//! cancellable via a token observed at every await point in the producer —
//! not as an ad-hoc iterator that also sends to a queue (§9 Design Notes).

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::message::{neutral_emotion, Emotion};

/// One turn of conversation history, independent of which module role
/// produced it — chat and ASR turns both fold into the same `User` role,
/// per `swarmclone/modules.py`'s `_add_chat_history`/`_add_asr_history`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryTurn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: HistoryRole::Assistant,
            content: content.into(),
        }
    }
}

/// Splits streamed (or, for a non-streaming backend, complete) text into
/// sentences on the punctuation boundaries named by §4.3: `。？！～.?!~\n\r`.
/// The boundary character stays attached to the sentence it closes.
pub fn split_sentences(text: &str) -> Vec<String> {
    const BOUNDARIES: &[char] = &['。', '?', '？', '!', '！', '~', '～', '.', '\n', '\r'];
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if BOUNDARIES.contains(&ch) {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

/// A generation backend: given conversation history, produces a lazy
/// sequence of `(sentence, emotion)` pairs into the returned channel.
/// Implementations own their production task and must stop promptly when
/// `cancel` fires, dropping any partial sentence in progress.
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    fn start(&self, history: Vec<HistoryTurn>, cancel: CancellationToken) -> mpsc::Receiver<(String, Emotion)>;
}

/// Trivial reference generator: turns the latest user turn into a canned
/// acknowledgement, split the same way a real streaming backend's output
/// would be, with a small per-sentence delay so cancellation has a window
/// to land mid-stream in tests. Grounded in `swarmclone/modules.py`'s
/// `LLMDummy`.
#[derive(Default)]
pub struct DummyGenerator {
    pub sentence_delay: Duration,
}

impl Generator for DummyGenerator {
    fn name(&self) -> &str {
        "DummyGenerator"
    }

    fn start(&self, history: Vec<HistoryTurn>, cancel: CancellationToken) -> mpsc::Receiver<(String, Emotion)> {
        let (tx, rx) = mpsc::channel(8);
        let delay = self.sentence_delay;
        let last_user = history
            .iter()
            .rev()
            .find(|t| t.role == HistoryRole::User)
            .map(|t| t.content.clone())
            .unwrap_or_else(|| "hello".to_string());
        tokio::spawn(async move {
            let reply = format!("I heard you say {last_user}. That's interesting! Tell me more.");
            for sentence in split_sentences(&reply) {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = sleep(delay) => {}
                }
                if tx.send((sentence, neutral_emotion())).await.is_err() {
                    return;
                }
            }
        });
        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_mixed_ascii_and_cjk_punctuation() {
        let sentences = split_sentences("Hello there! 你好。 What now?");
        assert_eq!(sentences, vec!["Hello there!", "你好。", "What now?"]);
    }

    #[test]
    fn trailing_text_without_boundary_is_kept() {
        let sentences = split_sentences("no boundary here");
        assert_eq!(sentences, vec!["no boundary here"]);
    }

    #[test]
    fn empty_segments_are_dropped() {
        let sentences = split_sentences("one.. two");
        assert_eq!(sentences, vec!["one.", ".", "two"]);
    }

    #[tokio::test]
    async fn dummy_generator_emits_then_closes() {
        let gen = DummyGenerator::default();
        let mut rx = gen.start(vec![HistoryTurn::user("ping")], CancellationToken::new());
        let mut count = 0;
        while rx.recv().await.is_some() {
            count += 1;
        }
        assert!(count > 0);
    }

    #[tokio::test]
    async fn cancellation_stops_the_stream() {
        let gen = DummyGenerator {
            sentence_delay: Duration::from_millis(50),
        };
        let cancel = CancellationToken::new();
        let mut rx = gen.start(vec![HistoryTurn::user("ping")], cancel.clone());
        cancel.cancel();
        assert!(rx.recv().await.is_none());
    }
}
