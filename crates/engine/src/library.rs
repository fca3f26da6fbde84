use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{Event, Notification};
use crate::capture::{CaptureMode, RecordedMedia};
use crate::error::{EngineError, Result};
use crate::surface::EncodingFormat;

/// Recorded segment kept in the clip library.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedClip {
    pub id: Uuid,
    pub kind: CaptureMode,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub mime_type: String,
    pub owner_video_id: Option<String>,
    /// Stored next to the metadata, never inside it.
    #[serde(skip)]
    pub media: Vec<u8>,
}

impl CapturedClip {
    /// Assembles a clip from a finished recording with a fresh id.
    pub fn from_recording(recording: RecordedMedia) -> Self {
        let title = if recording.target.filename.trim().is_empty() {
            format!("{} clip", recording.mode)
        } else {
            recording.target.filename.clone()
        };
        Self {
            id: Uuid::new_v4(),
            kind: recording.mode,
            title,
            created_at: Utc::now(),
            duration_seconds: recording.duration_seconds,
            mime_type: recording.format.mime_type,
            owner_video_id: recording.owner_video_id,
            media: recording.bytes,
        }
    }

    pub fn summary(&self) -> ClipSummary {
        ClipSummary {
            id: self.id,
            kind: self.kind,
            title: self.title.clone(),
            created_at: self.created_at,
            duration_seconds: self.duration_seconds,
            mime_type: self.mime_type.clone(),
            owner_video_id: self.owner_video_id.clone(),
            size_bytes: self.media.len(),
        }
    }

    fn extension(&self) -> &'static str {
        EncodingFormat::new(self.mime_type.as_str()).extension()
    }
}

/// Clip metadata without the media bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClipSummary {
    pub id: Uuid,
    pub kind: CaptureMode,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub mime_type: String,
    pub owner_video_id: Option<String>,
    pub size_bytes: usize,
}

/// Durable storage for captured clips.
pub trait ClipStore {
    fn save(&mut self, clip: &CapturedClip) -> Result<()>;

    /// Lists clips, optionally only those recorded from `owner_video_id`.
    fn list(&self, owner_video_id: Option<&str>) -> Result<Vec<CapturedClip>>;

    /// Deletes a clip. Unknown ids fail with [`EngineError::ClipNotFound`].
    fn delete(&mut self, id: Uuid) -> Result<()>;
}

/// Stores each clip as `<id>.json` metadata plus `<id>.<ext>` media.
#[derive(Debug, Clone)]
pub struct FsClipStore {
    root: PathBuf,
}

impl FsClipStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn metadata_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }

    fn media_path(&self, id: Uuid, extension: &str) -> PathBuf {
        self.root.join(format!("{id}.{extension}"))
    }

    fn read_clip(&self, metadata_path: &Path) -> Result<CapturedClip> {
        let raw = fs::read(metadata_path).map_err(|source| EngineError::StoreIo {
            context: "failed to read clip metadata",
            path: metadata_path.to_path_buf(),
            source,
        })?;
        let mut clip: CapturedClip =
            serde_json::from_slice(&raw).map_err(|source| EngineError::StoreSerialization {
                path: metadata_path.to_path_buf(),
                source,
            })?;
        let media_path = self.media_path(clip.id, clip.extension());
        clip.media = fs::read(&media_path).map_err(|source| EngineError::StoreIo {
            context: "failed to read clip media",
            path: media_path,
            source,
        })?;
        Ok(clip)
    }
}

impl ClipStore for FsClipStore {
    fn save(&mut self, clip: &CapturedClip) -> Result<()> {
        fs::create_dir_all(&self.root).map_err(|source| EngineError::StoreIo {
            context: "failed to create clip directory",
            path: self.root.clone(),
            source,
        })?;

        let media_path = self.media_path(clip.id, clip.extension());
        fs::write(&media_path, &clip.media).map_err(|source| EngineError::StoreIo {
            context: "failed to write clip media",
            path: media_path.clone(),
            source,
        })?;

        let metadata_path = self.metadata_path(clip.id);
        let metadata =
            serde_json::to_vec_pretty(clip).map_err(|source| EngineError::StoreSerialization {
                path: metadata_path.clone(),
                source,
            })?;
        fs::write(&metadata_path, metadata).map_err(|source| EngineError::StoreIo {
            context: "failed to write clip metadata",
            path: metadata_path,
            source,
        })?;

        debug!(clip = %clip.id, path = %media_path.display(), "clip stored");
        Ok(())
    }

    fn list(&self, owner_video_id: Option<&str>) -> Result<Vec<CapturedClip>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(EngineError::StoreIo {
                    context: "failed to list clip directory",
                    path: self.root.clone(),
                    source,
                });
            }
        };

        let mut clips = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| EngineError::StoreIo {
                context: "failed to read clip directory entry",
                path: self.root.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let clip = self.read_clip(&path)?;
            if owner_video_id.is_none_or(|owner| clip.owner_video_id.as_deref() == Some(owner)) {
                clips.push(clip);
            }
        }
        clips.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(clips)
    }

    fn delete(&mut self, id: Uuid) -> Result<()> {
        let metadata_path = self.metadata_path(id);
        let clip = match self.read_clip(&metadata_path) {
            Ok(clip) => clip,
            Err(EngineError::StoreIo { source, .. }) if source.kind() == ErrorKind::NotFound => {
                return Err(EngineError::ClipNotFound { id });
            }
            Err(error) => return Err(error),
        };

        let media_path = self.media_path(id, clip.extension());
        fs::remove_file(&metadata_path).map_err(|source| EngineError::StoreIo {
            context: "failed to remove clip metadata",
            path: metadata_path,
            source,
        })?;
        match fs::remove_file(&media_path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EngineError::StoreIo {
                context: "failed to remove clip media",
                path: media_path,
                source,
            }),
        }
    }
}

/// In-memory preview of a clip's media, released at most once.
#[derive(Debug, Clone)]
pub struct PreviewHandle {
    clip_id: Uuid,
    bytes: Arc<Mutex<Option<Arc<[u8]>>>>,
}

impl PreviewHandle {
    pub fn new(clip_id: Uuid, bytes: Arc<[u8]>) -> Self {
        Self {
            clip_id,
            bytes: Arc::new(Mutex::new(Some(bytes))),
        }
    }

    pub fn clip_id(&self) -> Uuid {
        self.clip_id
    }

    /// Current bytes, or `None` once released.
    pub fn bytes(&self) -> Option<Arc<[u8]>> {
        match self.bytes.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Drops the bytes. Only the first caller across all clones gets `true`.
    pub fn release(&self) -> bool {
        let released = match self.bytes.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        released.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.bytes().is_none()
    }
}

/// Clips of the current video plus their preview handles.
pub struct ClipLibrary {
    store: Box<dyn ClipStore + Send>,
    owner_video_id: Option<String>,
    clips: Vec<CapturedClip>,
    previews: HashMap<Uuid, PreviewHandle>,
    hidden: HashSet<Uuid>,
}

impl std::fmt::Debug for ClipLibrary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipLibrary")
            .field("owner_video_id", &self.owner_video_id)
            .field("clips", &self.clips.len())
            .field("hidden", &self.hidden)
            .finish_non_exhaustive()
    }
}

impl ClipLibrary {
    pub fn new(store: Box<dyn ClipStore + Send>) -> Self {
        Self {
            store,
            owner_video_id: None,
            clips: Vec::new(),
            previews: HashMap::new(),
            hidden: HashSet::new(),
        }
    }

    pub fn owner_video_id(&self) -> Option<&str> {
        self.owner_video_id.as_deref()
    }

    pub fn preview(&self, id: Uuid) -> Option<&PreviewHandle> {
        self.previews.get(&id)
    }

    /// Visible clips in creation order.
    pub fn list(&self) -> Vec<ClipSummary> {
        self.clips
            .iter()
            .filter(|clip| !self.hidden.contains(&clip.id))
            .map(CapturedClip::summary)
            .collect()
    }

    /// Releases every preview of the previous video and loads the clips of
    /// `owner_video_id`.
    pub fn switch_owner(&mut self, owner_video_id: Option<String>) -> Vec<Event> {
        let mut events = self.release_all();
        self.clips.clear();
        self.hidden.clear();
        self.owner_video_id = owner_video_id;

        match self.store.list(self.owner_video_id.as_deref()) {
            Ok(clips) => {
                for clip in &clips {
                    self.previews.insert(
                        clip.id,
                        PreviewHandle::new(clip.id, Arc::from(clip.media.as_slice())),
                    );
                }
                self.clips = clips;
            }
            Err(error) => {
                warn!(owner = ?self.owner_video_id, %error, "failed to list clips");
                events.push(Event::Notification(Notification::from_error(&error)));
            }
        }
        events.push(Event::ClipsListed(self.list()));
        events
    }

    /// Persists a new clip and makes it visible.
    ///
    /// A store failure keeps the clip in memory for this session and reports
    /// the error.
    pub fn add(&mut self, clip: CapturedClip) -> Vec<Event> {
        let mut events = Vec::new();
        if let Err(error) = self.store.save(&clip) {
            warn!(clip = %clip.id, %error, "clip was not persisted");
            events.push(Event::Notification(Notification::from_error(&error)));
        }

        info!(
            clip = %clip.id,
            kind = %clip.kind,
            duration_seconds = clip.duration_seconds,
            bytes = clip.media.len(),
            "clip captured"
        );
        self.previews.insert(
            clip.id,
            PreviewHandle::new(clip.id, Arc::from(clip.media.as_slice())),
        );
        events.insert(0, Event::ClipCaptured(clip.summary()));
        self.clips.push(clip);
        events
    }

    /// Deletes a clip from the store, then from memory.
    ///
    /// The preview is released only after the store confirms. On failure the
    /// clip stays hidden and its preview stays alive so a retry can finish.
    pub fn delete(&mut self, id: Uuid) -> Vec<Event> {
        if !self.clips.iter().any(|clip| clip.id == id) {
            let error = EngineError::ClipNotFound { id };
            debug!(clip = %id, "delete ignored for unknown clip");
            return vec![Event::Notification(Notification::from_error(&error))];
        }

        if let Err(error) = self.store.delete(id) {
            warn!(clip = %id, %error, "clip delete failed; hiding clip");
            self.hidden.insert(id);
            return vec![Event::Notification(Notification::from_error(&error))];
        }

        self.clips.retain(|clip| clip.id != id);
        self.hidden.remove(&id);
        let mut events = vec![Event::ClipDeleted { id }];
        if let Some(preview) = self.previews.remove(&id) {
            if preview.release() {
                events.push(Event::PreviewReleased { id });
            }
        }
        events
    }

    fn release_all(&mut self) -> Vec<Event> {
        let mut released: Vec<Uuid> = self
            .previews
            .drain()
            .filter_map(|(id, preview)| preview.release().then_some(id))
            .collect();
        released.sort();
        released
            .into_iter()
            .map(|id| Event::PreviewReleased { id })
            .collect()
    }
}
