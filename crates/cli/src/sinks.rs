//! Flashcard delivery to a JSON-lines deck with media files alongside.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use subclip_engine::{EngineError, FlashcardSink, NoteDraft, NoteMedia, Result};
use tracing::info;

/// Appends one JSON object per note to `deck`, writing the screenshot and
/// audio into `media_dir` under their attachment filenames.
pub struct JsonLinesDeck {
    deck: PathBuf,
    media_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonLinesDeck {
    pub fn new(deck: impl Into<PathBuf>, media_dir: impl Into<PathBuf>) -> Self {
        Self {
            deck: deck.into(),
            media_dir: media_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    fn write_media(&self, media: &NoteMedia) -> Result<()> {
        fs::create_dir_all(&self.media_dir).map_err(|err| delivery(&self.media_dir, err))?;
        let path = self.media_dir.join(&media.filename);
        fs::write(&path, &media.bytes).map_err(|err| delivery(&path, err))
    }
}

impl FlashcardSink for JsonLinesDeck {
    fn deliver(&self, note: &NoteDraft) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        for media in note.image.iter().chain(note.audio.iter()) {
            self.write_media(media)?;
        }

        let mut line = serde_json::to_string(note).map_err(|err| EngineError::FlashcardDelivery {
            reason: format!("serialize note: {err}"),
        })?;
        line.push('\n');

        if let Some(parent) = self.deck.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| delivery(parent, err))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.deck)
            .and_then(|mut file| file.write_all(line.as_bytes()))
            .map_err(|err| delivery(&self.deck, err))?;

        info!(deck = %self.deck.display(), term = %note.term, "note appended");
        Ok(())
    }
}

fn delivery(path: &Path, err: std::io::Error) -> EngineError {
    EngineError::FlashcardDelivery {
        reason: format!("{}: {err}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use subclip_engine::{FlashcardSink, NoteDraft, NoteMedia, TimeWindow};

    use super::JsonLinesDeck;

    fn draft(term: &str, audio: Option<NoteMedia>) -> NoteDraft {
        NoteDraft {
            term: term.to_string(),
            definition: "house".to_string(),
            sentence: format!("mi <b>{term}</b>"),
            translation: "my house".to_string(),
            source: "ep01.mkv".to_string(),
            media_id: "ep01".to_string(),
            audio_window: TimeWindow { start: 1.0, end: 3.0 },
            tags: vec!["spanish".to_string()],
            image: None,
            audio,
        }
    }

    #[test]
    fn appends_one_line_per_note_and_writes_media() {
        let dir = tempfile::tempdir().expect("tempdir");
        let deck = JsonLinesDeck::new(
            dir.path().join("deck/notes.jsonl"),
            dir.path().join("media"),
        );

        let audio = NoteMedia {
            filename: "ep01_1000-3000.webm".to_string(),
            mime_type: "audio/webm".to_string(),
            bytes: vec![1, 2, 3],
        };
        deck.deliver(&draft("casa", Some(audio))).expect("first note");
        deck.deliver(&draft("perro", None)).expect("second note");

        let lines = fs::read_to_string(dir.path().join("deck/notes.jsonl")).expect("deck");
        let notes: Vec<serde_json::Value> = lines
            .lines()
            .map(|line| serde_json::from_str(line).expect("json line"))
            .collect();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0]["term"], "casa");
        assert_eq!(notes[0]["audio"]["filename"], "ep01_1000-3000.webm");
        assert!(notes[0]["audio"].get("bytes").is_none());
        assert_eq!(notes[1]["audio"], serde_json::Value::Null);

        let media = fs::read(dir.path().join("media/ep01_1000-3000.webm")).expect("audio file");
        assert_eq!(media, vec![1, 2, 3]);
    }

    #[test]
    fn unwritable_deck_is_a_delivery_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        // The deck path is an existing directory.
        let deck = JsonLinesDeck::new(dir.path(), dir.path().join("media"));
        assert!(deck.deliver(&draft("casa", None)).is_err());
    }
}
