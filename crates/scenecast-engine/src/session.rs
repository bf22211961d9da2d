use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use scenecast_contracts::events::{EventWriter, SessionEvent};
use scenecast_contracts::gallery::{render_gallery, Gallery, GeneratedImage};
use scenecast_contracts::prompt::{plan_generation, AspectRatio, GenerationRequest, DEFAULT_PROMPT};
use scenecast_contracts::slots::{ReferenceImage, ReferenceStore, Slot};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::client::ImageProvider;
use crate::uploads::{load_reference_image, preview, Preview};

pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";
pub const GALLERY_FILE_NAME: &str = "gallery.html";

/// Result of one submit: what was asked for and what to show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub mode: &'static str,
    pub gallery: Gallery,
}

impl Submission {
    pub fn is_error(&self) -> bool {
        matches!(self.gallery, Gallery::Error { .. })
    }
}

/// Everything the page holds for its lifetime: slots, prompt, aspect
/// ratio and the provider that submit calls.
pub struct Session {
    store: ReferenceStore,
    prompt: String,
    aspect_ratio: AspectRatio,
    provider: Box<dyn ImageProvider>,
    events: Option<EventWriter>,
}

impl Session {
    pub fn new(provider: Box<dyn ImageProvider>) -> Self {
        Self {
            store: ReferenceStore::new(),
            prompt: DEFAULT_PROMPT.to_string(),
            aspect_ratio: AspectRatio::default(),
            provider,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self.emit(SessionEvent::SessionStarted {
            provider: self.provider.name().to_string(),
        });
        self
    }

    pub fn store(&self) -> &ReferenceStore {
        &self.store
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn aspect_ratio(&self) -> AspectRatio {
        self.aspect_ratio
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.aspect_ratio = aspect_ratio;
    }

    /// Loads `path` into `slot`. On failure the slot keeps its previous
    /// value and the error is returned for display.
    pub fn upload(&mut self, slot: Slot, path: &Path) -> Result<Preview> {
        let image = match load_reference_image(path) {
            Ok(image) => image,
            Err(err) => {
                warn!(slot = %slot, path = %path.display(), "reference image load failed: {err:#}");
                self.emit(SessionEvent::SlotLoadFailed {
                    slot,
                    path: path.display().to_string(),
                });
                return Err(err);
            }
        };
        Ok(self.load(slot, image))
    }

    pub fn load(&mut self, slot: Slot, image: ReferenceImage) -> Preview {
        let shown = preview(&image);
        let replaced = self.store.load(slot, image).is_some();
        info!(slot = %slot, replaced, "reference image loaded");
        self.emit(SessionEvent::SlotLoaded {
            slot,
            file_name: shown.file_name.clone(),
            mime_type: shown.mime_type.clone(),
            size_bytes: shown.size_bytes,
            replaced,
        });
        shown
    }

    pub fn remove(&mut self, slot: Slot) -> Option<ReferenceImage> {
        let removed = self.store.remove(slot);
        if removed.is_some() {
            self.emit(SessionEvent::SlotRemoved { slot });
        }
        removed
    }

    pub fn set_included(&mut self, slot: Slot, included: bool) -> Result<()> {
        self.store.set_included(slot, included)?;
        self.emit(SessionEvent::SlotIncluded { slot, included });
        Ok(())
    }

    pub fn preview(&self, slot: Slot) -> Option<Preview> {
        self.store.get(slot).map(preview)
    }

    /// The request a submit would send right now.
    pub fn plan(&self) -> GenerationRequest {
        plan_generation(self.store.selection(), &self.prompt, self.aspect_ratio)
    }

    /// Runs one generation. Failures are caught here and turned into an
    /// error gallery, so the caller can always submit again.
    ///
    /// `&mut self` keeps a second request from starting while the provider
    /// call is outstanding; the session is usable again once this returns.
    pub fn submit(&mut self) -> Result<Submission> {
        if self.prompt.trim().is_empty() {
            return Ok(Submission {
                mode: "none",
                gallery: Gallery::error("Please enter a prompt."),
            });
        }

        let request = self.plan();
        let mode = request.mode();
        self.emit(SessionEvent::GenerationStarted {
            mode,
            aspect_ratio: self.aspect_ratio,
            references: reference_slots(&request),
        });

        let outcome = self.provider.generate(&request);

        let gallery = match outcome {
            Ok(images) => {
                let gallery = render_gallery(Some(images.as_slice()));
                info!(mode, returned = images.len(), shown = gallery.items().len(), "generation finished");
                self.emit(SessionEvent::GenerationFinished {
                    mode,
                    returned: images.len(),
                    shown: gallery.items().len(),
                });
                gallery
            }
            Err(err) => {
                let message = user_facing_message(&err);
                error!(mode, "generation failed: {message}");
                self.emit(SessionEvent::GenerationFailed {
                    mode,
                    error: message.clone(),
                });
                Gallery::error(format!("Error: {message}"))
            }
        };

        Ok(Submission { mode, gallery })
    }

    fn emit(&self, event: SessionEvent) {
        let Some(events) = self.events.as_ref() else {
            return;
        };
        if let Err(err) = events.emit(&event) {
            warn!(event = event.kind(), "failed to record event: {err:#}");
        }
    }
}

pub fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4())
}

/// The error chain as one line, or a generic message when it has none.
pub fn user_facing_message(err: &anyhow::Error) -> String {
    let mut parts: Vec<String> = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() || parts.last().map(|last| last == trimmed).unwrap_or(false) {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return UNKNOWN_ERROR_MESSAGE.to_string();
    }
    parts.join(": ")
}

/// Writes each shown image under its download name.
pub fn save_gallery_images(gallery: &Gallery, out_dir: &Path) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let mut written = Vec::new();
    for item in gallery.items() {
        let bytes = BASE64
            .decode(item.data.as_bytes())
            .with_context(|| format!("{} is not valid base64", item.download_name))?;
        let path = out_dir.join(&item.download_name);
        fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

pub fn write_gallery_html(gallery: &Gallery, out_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(GALLERY_FILE_NAME);
    fs::write(&path, gallery.to_html())
        .with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn reference_slots(request: &GenerationRequest) -> Vec<Slot> {
    match request {
        GenerationRequest::Composition { images, .. } => {
            images.iter().map(|entry| entry.slot).collect()
        }
        GenerationRequest::TextToImage { .. } => Vec::new(),
    }
}

/// Test fixture: a provider that answers every request with no images.
/// Exported for the cli crate's tests.
#[doc(hidden)]
pub struct NoopProvider;

impl ImageProvider for NoopProvider {
    fn name(&self) -> &str {
        "noop"
    }

    fn generate(&self, _request: &GenerationRequest) -> Result<Vec<GeneratedImage>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::Result;
    use scenecast_contracts::events::EventWriter;
    use scenecast_contracts::gallery::{Gallery, GeneratedImage, NO_IMAGES_MESSAGE};
    use scenecast_contracts::prompt::{AspectRatio, GenerationRequest};
    use scenecast_contracts::slots::Slot;
    use serde_json::Value;

    use super::{
        save_gallery_images, user_facing_message, write_gallery_html, NoopProvider, Session,
        GALLERY_FILE_NAME, UNKNOWN_ERROR_MESSAGE,
    };
    use crate::client::{GenerationError, GoogleGenerationClient, ImageProvider};
    use crate::config::EngineConfig;

    type Responder = Box<dyn Fn() -> Result<Vec<GeneratedImage>> + Send + Sync>;

    struct RecordingProvider {
        requests: Arc<Mutex<Vec<GenerationRequest>>>,
        respond: Responder,
    }

    impl ImageProvider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedImage>> {
            self.requests
                .lock()
                .map_err(|_| anyhow::anyhow!("poisoned"))?
                .push(request.clone());
            (self.respond)()
        }
    }

    fn recording_session(respond: Responder) -> (Session, Arc<Mutex<Vec<GenerationRequest>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let provider = RecordingProvider {
            requests: Arc::clone(&requests),
            respond,
        };
        (Session::new(Box::new(provider)), requests)
    }

    fn write_png(dir: &Path, name: &str) -> Result<std::path::PathBuf> {
        let path = dir.join(name);
        let image = image::RgbImage::from_pixel(2, 2, image::Rgb([10, 200, 10]));
        image.save_with_format(&path, image::ImageFormat::Png)?;
        Ok(path)
    }

    #[test]
    fn single_character_submit_routes_to_composition() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let hero = write_png(temp.path(), "hero.png")?;
        let (mut session, requests) = recording_session(Box::new(|| {
            Ok(vec![GeneratedImage::new("Zm9v", "image/png")])
        }));

        session.upload(Slot::Character1, &hero)?;
        session.set_included(Slot::Character1, true)?;
        session.set_prompt("P");
        session.set_aspect_ratio(AspectRatio::Landscape);
        let submission = session.submit()?;

        assert_eq!(submission.mode, "composition");
        assert_eq!(
            submission.gallery.items()[0].download_name,
            "generated-image-1.png"
        );
        let recorded = requests.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
        match &recorded[0] {
            GenerationRequest::Composition { images, prompt } => {
                assert_eq!(images.len(), 1);
                assert_eq!(images[0].slot, Slot::Character1);
                assert_eq!(images[0].image.mime_type, "image/png");
                assert!(prompt.ends_with("The output image must have an aspect ratio of 16:9."));
            }
            other => panic!("expected composition, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn no_selection_requests_three_images() -> Result<()> {
        let (mut session, requests) = recording_session(Box::new(|| Ok(Vec::new())));
        session.set_prompt("a red fox in snow");
        let submission = session.submit()?;

        assert_eq!(submission.mode, "text_to_image");
        assert_eq!(
            submission.gallery,
            Gallery::Empty {
                message: NO_IMAGES_MESSAGE.to_string()
            }
        );
        let recorded = requests.lock().map_err(|_| anyhow::anyhow!("poisoned"))?;
        assert_eq!(
            recorded[0],
            GenerationRequest::TextToImage {
                prompt: "a red fox in snow".to_string(),
                count: 3,
                aspect_ratio: AspectRatio::Square,
                output_mime: "image/jpeg",
            }
        );
        Ok(())
    }

    #[test]
    fn failures_render_error_and_allow_retry() -> Result<()> {
        let (mut session, _requests) = recording_session(Box::new(|| {
            Err(GenerationError::NoImageProduced("I cannot depict that.".to_string()).into())
        }));
        let submission = session.submit()?;

        assert!(submission.is_error());
        assert_eq!(
            submission.gallery,
            Gallery::error("Error: I cannot depict that.")
        );
        let again = session.submit()?;
        assert!(again.is_error());
        Ok(())
    }

    #[test]
    fn failed_upload_keeps_previous_image() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let first = write_png(temp.path(), "first.png")?;
        let mut session = Session::new(Box::new(NoopProvider));

        session.upload(Slot::Background, &first)?;
        let before = session.store().get(Slot::Background).cloned();
        assert!(session
            .upload(Slot::Background, &temp.path().join("missing.png"))
            .is_err());
        assert_eq!(session.store().get(Slot::Background).cloned(), before);
        Ok(())
    }

    #[test]
    fn empty_prompt_is_refused_without_calling_provider() -> Result<()> {
        let (mut session, requests) = recording_session(Box::new(|| Ok(Vec::new())));
        session.set_prompt("   ");
        let submission = session.submit()?;
        assert!(submission.is_error());
        assert!(requests
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .is_empty());
        Ok(())
    }

    #[test]
    fn events_record_session_activity() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let bg = write_png(temp.path(), "bg.png")?;
        let mut session = Session::new(Box::new(NoopProvider))
            .with_events(EventWriter::new(&events_path, "session-test"));

        session.upload(Slot::Background, &bg)?;
        session.remove(Slot::Background);
        session.submit()?;

        let raw = fs::read_to_string(&events_path)?;
        let types: Vec<String> = raw
            .lines()
            .filter_map(|line| serde_json::from_str::<Value>(line).ok())
            .filter_map(|row| row.get("type").and_then(Value::as_str).map(str::to_string))
            .collect();
        assert_eq!(
            types,
            vec![
                "session_started",
                "slot_loaded",
                "slot_removed",
                "generation_started",
                "generation_finished",
            ]
        );
        assert!(!raw.contains("iVBOR"));
        Ok(())
    }

    #[test]
    fn gallery_files_use_download_names() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let results = vec![
            GeneratedImage::default(),
            GeneratedImage::new("aGVsbG8=", "image/jpeg"),
        ];
        let gallery = scenecast_contracts::gallery::render_gallery(Some(results.as_slice()));

        let written = save_gallery_images(&gallery, temp.path())?;
        assert_eq!(written, vec![temp.path().join("generated-image-2.jpeg")]);
        assert_eq!(fs::read(&written[0])?, b"hello");

        let html_path = write_gallery_html(&gallery, temp.path())?;
        assert_eq!(html_path, temp.path().join(GALLERY_FILE_NAME));
        assert!(fs::read_to_string(html_path)?.contains("generated-image-2.jpeg"));
        Ok(())
    }

    #[test]
    fn failed_requests_keep_the_api_key_out_of_outputs() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let events_path = temp.path().join("events.jsonl");
        let config = EngineConfig {
            api_key: Some("SUPERSECRETKEY123".to_string()),
            api_base: "http://127.0.0.1:1/v1beta".to_string(),
            request_timeout: Some(Duration::from_secs(5)),
            ..EngineConfig::default()
        };
        let client = GoogleGenerationClient::new(config)?;
        let mut session = Session::new(Box::new(client))
            .with_events(EventWriter::new(&events_path, "session-test"));
        session.set_prompt("a lighthouse");

        let submission = session.submit()?;
        let Gallery::Error { message } = &submission.gallery else {
            panic!("expected an error gallery, got {:?}", submission.gallery);
        };
        assert!(message.starts_with("Error: Imagen request failed"));
        assert!(!message.contains("SUPERSECRETKEY123"));

        let html = fs::read_to_string(write_gallery_html(&submission.gallery, temp.path())?)?;
        assert!(!html.contains("SUPERSECRETKEY123"));
        let events = fs::read_to_string(&events_path)?;
        assert!(events.contains("generation_failed"));
        assert!(!events.contains("SUPERSECRETKEY123"));
        Ok(())
    }

    #[test]
    fn error_messages_fall_back_when_blank() {
        let blank = anyhow::anyhow!("   ");
        assert_eq!(user_facing_message(&blank), UNKNOWN_ERROR_MESSAGE);

        let chained = anyhow::anyhow!("connection refused").context("Imagen request failed");
        assert_eq!(
            user_facing_message(&chained),
            "Imagen request failed: connection refused"
        );
    }
}
