//! Typed constructors for the closed message catalog (§3).
//!
//! Each function fixes a `Payload` variant and hands it to [`Message::new`]
//! alongside its source. Kept as free functions rather than inherent
//! constructors on `Payload` so call sites read `catalog::llm_message(...)`
//! close to how `swarmclone/messages.py` reads `LLMMessage(...)`.

use super::types::{AlignEntry, Emotion, Message, MessageRef, Payload};

pub fn asr_activated(source: MessageRef) -> Message {
    Message::new(Payload::AsrActivated, source)
}

pub fn asr_message(source: MessageRef, speaker_name: impl Into<String>, message: impl Into<String>) -> Message {
    Message::new(
        Payload::AsrMessage {
            speaker_name: speaker_name.into(),
            message: message.into(),
        },
        source,
    )
}

pub fn chat_message(source: MessageRef, user: impl Into<String>, content: impl Into<String>) -> Message {
    Message::new(
        Payload::ChatMessage {
            user: user.into(),
            content: content.into(),
        },
        source,
    )
}

pub fn llm_message(
    source: MessageRef,
    content: impl Into<String>,
    id: impl Into<String>,
    emotion: Emotion,
) -> Message {
    Message::new(
        Payload::LlmMessage {
            content: content.into(),
            id: id.into(),
            emotion,
        },
        source,
    )
}

pub fn llm_eos(source: MessageRef) -> Message {
    Message::new(Payload::LlmEos, source)
}

pub fn tts_aligned_audio(
    source: MessageRef,
    id: impl Into<String>,
    audio_data: Vec<u8>,
    align_data: Vec<AlignEntry>,
) -> Message {
    Message::new(
        Payload::TtsAlignedAudio {
            id: id.into(),
            audio_data,
            align_data,
        },
        source,
    )
}

pub fn audio_finished(source: MessageRef) -> Message {
    Message::new(Payload::AudioFinished, source)
}

pub fn song_info(
    source: MessageRef,
    song_id: impl Into<String>,
    song_path: impl Into<String>,
    subtitle_path: impl Into<String>,
) -> Message {
    Message::new(
        Payload::SongInfo {
            song_id: song_id.into(),
            song_path: song_path.into(),
            subtitle_path: subtitle_path.into(),
        },
        source,
    )
}

pub fn ready_to_sing(source: MessageRef, song_id: impl Into<String>) -> Message {
    Message::new(
        Payload::ReadyToSing {
            song_id: song_id.into(),
        },
        source,
    )
}

pub fn finished_singing(source: MessageRef) -> Message {
    Message::new(Payload::FinishedSinging, source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::types::Role;

    #[test]
    fn asr_message_carries_fields_and_destinations() {
        let src = MessageRef::new(Role::Asr, "asr-main");
        let m = asr_message(src, "alice", "hello there");
        assert_eq!(m.name(), "ASRMessage");
        assert_eq!(m.destinations(), &[Role::Llm, Role::Frontend]);
        let fields = m.payload().fields();
        assert!(fields.contains(&("speaker_name".to_string(), "alice".to_string())));
    }

    #[test]
    fn song_info_round_trips_through_fields() {
        let src = MessageRef::new(Role::Llm, "llm-main");
        let m = song_info(src, "song-1", "/songs/1.mp3", "/songs/1.srt");
        let fields = m.payload().fields();
        assert_eq!(fields.len(), 3);
    }
}
