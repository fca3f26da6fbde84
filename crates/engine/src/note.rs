use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cue::TimedCue;
use crate::error::Result;
use crate::surface::Screenshot;
use crate::time::{TimeWindow, seconds_to_millis};

/// User input for one flashcard. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoteRequest {
    pub term: Option<String>,
    pub definition: Option<String>,
    /// Overrides the primary track's active line.
    pub sentence: Option<String>,
    /// Overrides the secondary track's active line.
    pub translation: Option<String>,
    pub tags: Vec<String>,
    pub attach_audio: bool,
}

impl Default for NoteRequest {
    fn default() -> Self {
        Self {
            term: None,
            definition: None,
            sentence: None,
            translation: None,
            tags: Vec::new(),
            attach_audio: true,
        }
    }
}

/// Playback state a note is assembled from.
#[derive(Debug, Clone, PartialEq)]
pub struct NoteContext {
    pub media_id: String,
    pub media_title: Option<String>,
    pub current_time: f64,
    pub duration: f64,
    pub primary_cue: Option<TimedCue>,
    pub primary_offset: f64,
    pub secondary_cue: Option<TimedCue>,
    pub fallback_padding: f64,
}

/// Attachment carried with a note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteMedia {
    pub filename: String,
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

/// Note payload handed to a [`FlashcardSink`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteDraft {
    pub term: String,
    pub definition: String,
    /// Sentence with every occurrence of the term wrapped in `<b>`.
    pub sentence: String,
    pub translation: String,
    pub source: String,
    pub media_id: String,
    pub audio_window: TimeWindow,
    pub tags: Vec<String>,
    pub image: Option<NoteMedia>,
    pub audio: Option<NoteMedia>,
}

/// Destination for finished notes, e.g. a spaced-repetition deck.
pub trait FlashcardSink: Send + Sync {
    fn deliver(&self, note: &NoteDraft) -> Result<()>;
}

/// Builds a note from the request, the playback context and an optional
/// screenshot. Missing pieces become empty fields.
pub fn build_note(
    request: &NoteRequest,
    context: &NoteContext,
    screenshot: Option<&Screenshot>,
) -> NoteDraft {
    let term = request.term.clone().unwrap_or_default();
    let sentence = request
        .sentence
        .clone()
        .or_else(|| context.primary_cue.as_ref().map(|cue| cue.text.clone()))
        .unwrap_or_default();
    let translation = request
        .translation
        .clone()
        .or_else(|| context.secondary_cue.as_ref().map(|cue| cue.text.clone()))
        .unwrap_or_default();
    let audio_window = audio_window(context);

    let image = screenshot.map(|shot| NoteMedia {
        filename: attachment_filename(&context.media_id, &audio_window, "png"),
        mime_type: "image/png".to_string(),
        bytes: shot.png.to_vec(),
    });

    debug!(
        term = %term,
        has_image = image.is_some(),
        start = audio_window.start,
        end = audio_window.end,
        "note assembled"
    );
    NoteDraft {
        sentence: highlight_term(&sentence, &term),
        term,
        definition: request.definition.clone().unwrap_or_default(),
        translation,
        source: context
            .media_title
            .clone()
            .unwrap_or_else(|| context.media_id.clone()),
        media_id: context.media_id.clone(),
        audio_window,
        tags: request.tags.clone(),
        image,
        audio: None,
    }
}

/// Wraps every case-insensitive literal occurrence of `term` in `<b>…</b>`,
/// keeping the sentence's casing.
///
/// # Example
/// ```
/// use subclip_engine::note::highlight_term;
///
/// assert_eq!(
///     highlight_term("Hola, hola amigo", "hola"),
///     "<b>Hola</b>, <b>hola</b> amigo"
/// );
/// assert_eq!(highlight_term("a+b", "a+b"), "<b>a+b</b>");
/// ```
pub fn highlight_term(sentence: &str, term: &str) -> String {
    if term.trim().is_empty() {
        return sentence.to_string();
    }
    match RegexBuilder::new(&regex::escape(term))
        .case_insensitive(true)
        .build()
    {
        Ok(pattern) => pattern.replace_all(sentence, "<b>$0</b>").into_owned(),
        Err(error) => {
            debug!(%error, "term highlight skipped");
            sentence.to_string()
        }
    }
}

/// Window recorded for the note's audio: the active cue, else a padded span
/// around the playhead. Clamped to the media.
pub fn audio_window(context: &NoteContext) -> TimeWindow {
    match &context.primary_cue {
        Some(cue) => TimeWindow {
            start: cue.start + context.primary_offset,
            end: cue.end + context.primary_offset,
        }
        .clamped(context.duration),
        None => TimeWindow::around(
            context.current_time,
            context.fallback_padding,
            context.duration,
        ),
    }
}

/// `<media>_<start_ms>-<end_ms>.<ext>`, with path-unsafe characters replaced.
pub fn attachment_filename(media_id: &str, window: &TimeWindow, extension: &str) -> String {
    let stem: String = media_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
                ch
            } else {
                '_'
            }
        })
        .collect();
    format!(
        "{stem}_{}-{}.{extension}",
        seconds_to_millis(window.start),
        seconds_to_millis(window.end)
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{
        NoteContext, NoteRequest, attachment_filename, audio_window, build_note, highlight_term,
    };
    use crate::cue::TimedCue;
    use crate::surface::Screenshot;
    use crate::time::TimeWindow;

    fn context(primary: Option<TimedCue>) -> NoteContext {
        NoteContext {
            media_id: "ep01.mkv".to_string(),
            media_title: Some("Episode 1".to_string()),
            current_time: 1.0,
            duration: 10.0,
            primary_cue: primary,
            primary_offset: 0.5,
            secondary_cue: Some(TimedCue {
                index: 0,
                start: 0.0,
                end: 2.0,
                text: "The cat sleeps".to_string(),
            }),
            fallback_padding: 2.0,
        }
    }

    fn primary() -> TimedCue {
        TimedCue {
            index: 3,
            start: 1.0,
            end: 3.0,
            text: "El gato duerme. EL GATO.".to_string(),
        }
    }

    #[test]
    fn highlight_wraps_every_match_and_keeps_casing() {
        assert_eq!(
            highlight_term("El gato duerme. EL GATO.", "gato"),
            "El <b>gato</b> duerme. EL <b>GATO</b>."
        );
    }

    #[test]
    fn highlight_treats_term_as_literal() {
        assert_eq!(highlight_term("what? yes.", "?"), "what<b>?</b> yes.");
        assert_eq!(highlight_term("no match", "(x"), "no match");
    }

    #[test]
    fn empty_term_leaves_sentence_untouched() {
        assert_eq!(highlight_term("El gato", ""), "El gato");
        assert_eq!(highlight_term("El gato", "   "), "El gato");
    }

    #[test]
    fn audio_window_uses_offset_cue_bounds() {
        assert_eq!(
            audio_window(&context(Some(primary()))),
            TimeWindow { start: 1.5, end: 3.5 }
        );
    }

    #[test]
    fn audio_window_falls_back_to_clamped_padding() {
        assert_eq!(
            audio_window(&context(None)),
            TimeWindow { start: 0.0, end: 3.0 }
        );
    }

    #[test]
    fn build_note_falls_back_to_active_cues_and_tolerates_missing_term() {
        let draft = build_note(&NoteRequest::default(), &context(Some(primary())), None);
        assert_eq!(draft.term, "");
        assert_eq!(draft.sentence, "El gato duerme. EL GATO.");
        assert_eq!(draft.translation, "The cat sleeps");
        assert_eq!(draft.source, "Episode 1");
        assert!(draft.image.is_none());
        assert!(draft.audio.is_none());
    }

    #[test]
    fn build_note_prefers_overrides_and_attaches_screenshot() {
        let request = NoteRequest {
            term: Some("perro".to_string()),
            definition: Some("dog".to_string()),
            sentence: Some("Un perro".to_string()),
            translation: Some("A dog".to_string()),
            tags: vec!["immersion".to_string()],
            attach_audio: false,
        };
        let shot = Screenshot {
            at_seconds: 1.0,
            width: 1,
            height: 1,
            png: Arc::from(vec![9u8, 9]),
        };

        let draft = build_note(&request, &context(Some(primary())), Some(&shot));

        assert_eq!(draft.sentence, "Un <b>perro</b>");
        assert_eq!(draft.translation, "A dog");
        assert_eq!(draft.definition, "dog");
        let image = draft.image.expect("image attached");
        assert_eq!(image.filename, "ep01.mkv_1500-3500.png");
        assert_eq!(image.bytes, vec![9, 9]);
    }

    #[test]
    fn attachment_filename_replaces_path_separators() {
        let window = TimeWindow {
            start: 0.25,
            end: 2.0,
        };
        assert_eq!(
            attachment_filename("shows/a b", &window, "webm"),
            "shows_a_b_250-2000.webm"
        );
    }
}
