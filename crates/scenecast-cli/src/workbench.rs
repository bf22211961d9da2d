use std::io::{BufRead, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::Result;
use scenecast_contracts::chat::{parse_command, Command, CHAT_HELP_COMMANDS};
use scenecast_contracts::gallery::Gallery;
use scenecast_contracts::prompt::{AspectRatio, GenerationRequest};
use scenecast_contracts::slots::Slot;
use scenecast_engine::session::{save_gallery_images, write_gallery_html};
use scenecast_engine::Session;
use tracing::warn;

/// The controls built for one slot at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotControl {
    pub slot: Slot,
    pub picker: String,
    pub remove: String,
    pub checkbox: Option<String>,
}

impl SlotControl {
    fn for_slot(slot: Slot) -> Self {
        Self {
            slot,
            picker: format!("/{} <path>", slot.id()),
            remove: format!("/remove {}", slot.id()),
            checkbox: slot
                .is_character()
                .then(|| format!("/include {id} | /exclude {id}", id = slot.id())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Interactive front end: slot controls, prompt, aspect ratio, submit and
/// a result area written to `out_dir`.
pub struct Workbench {
    session: Session,
    controls: Vec<SlotControl>,
    out_dir: PathBuf,
}

impl Workbench {
    pub fn new(session: Session, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            session,
            controls: Slot::ALL.into_iter().map(SlotControl::for_slot).collect(),
            out_dir: out_dir.into(),
        }
    }

    pub fn controls(&self) -> &[SlotControl] {
        &self.controls
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn run(&mut self, mut input: impl BufRead, out: &mut impl Write) -> Result<()> {
        writeln!(out, "Scenecast started. Type /help for commands.")?;
        self.render_controls(out)?;

        let mut line = String::new();
        loop {
            write!(out, "> ")?;
            out.flush()?;

            line.clear();
            let read = match input.read_line(&mut line) {
                Ok(read) => read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            };
            if read == 0 {
                break;
            }

            let command = parse_command(line.trim_end_matches(['\n', '\r']));
            if self.handle(command, out)? == Flow::Quit {
                break;
            }
        }
        Ok(())
    }

    pub fn handle(&mut self, command: Command, out: &mut impl Write) -> Result<Flow> {
        match command {
            Command::Noop => {}
            Command::Help => {
                writeln!(out, "Commands: {}", CHAT_HELP_COMMANDS.join("  "))?;
                writeln!(out, "Any other text replaces the prompt and generates.")?;
            }
            Command::Quit => return Ok(Flow::Quit),
            Command::Upload { slot, path } => self.upload(slot, Path::new(&path), out)?,
            Command::Remove(slot) => {
                if self.session.remove(slot).is_some() {
                    writeln!(out, "{} cleared.", slot.label())?;
                } else {
                    writeln!(out, "{} is already empty.", slot.label())?;
                }
            }
            Command::Include(slot) => self.toggle(slot, true, out)?,
            Command::Exclude(slot) => self.toggle(slot, false, out)?,
            Command::SetAspectRatio(ratio) => {
                self.session.set_aspect_ratio(ratio);
                writeln!(out, "Aspect ratio set to {ratio}")?;
            }
            Command::SetPrompt(prompt) => {
                self.session.set_prompt(prompt);
                writeln!(out, "Prompt updated.")?;
            }
            Command::Generate => self.submit(out)?,
            Command::PromptAndGenerate(prompt) => {
                self.session.set_prompt(prompt);
                self.submit(out)?;
            }
            Command::Status => self.render_status(out)?,
            Command::Invalid { message, .. } => writeln!(out, "{message}")?,
            Command::Unknown { command, .. } => {
                writeln!(out, "Unknown command /{command}. Type /help for commands.")?;
            }
        }
        Ok(Flow::Continue)
    }

    fn upload(&mut self, slot: Slot, path: &Path, out: &mut impl Write) -> Result<()> {
        match self.session.upload(slot, path) {
            Ok(preview) => {
                writeln!(out, "{}: {preview}", slot.label())?;
                if slot.is_character() && !self.session.store().is_included(slot) {
                    self.session.set_included(slot, true)?;
                    writeln!(out, "{} included in the next request.", slot.label())?;
                }
            }
            Err(err) => {
                writeln!(out, "Could not load {}: {err:#}", path.display())?;
            }
        }
        Ok(())
    }

    fn toggle(&mut self, slot: Slot, included: bool, out: &mut impl Write) -> Result<()> {
        match self.session.set_included(slot, included) {
            Ok(()) => {
                let state = if included { "included" } else { "excluded" };
                if included && self.session.store().get(slot).is_none() {
                    writeln!(out, "{} {state} (no image loaded yet).", slot.label())?;
                } else {
                    writeln!(out, "{} {state}.", slot.label())?;
                }
            }
            Err(err) => writeln!(out, "{err}")?,
        }
        Ok(())
    }

    fn submit(&mut self, out: &mut impl Write) -> Result<()> {
        if !self.session.prompt().trim().is_empty() {
            match self.session.plan() {
                GenerationRequest::Composition { images, .. } => {
                    writeln!(out, "Composing with {} reference image(s)...", images.len())?;
                }
                GenerationRequest::TextToImage { count, .. } => {
                    writeln!(out, "Generating {count} image(s) from text...")?;
                }
            }
        }

        let submission = match self.session.submit() {
            Ok(submission) => submission,
            Err(err) => {
                writeln!(out, "{err}")?;
                return Ok(());
            }
        };

        match &submission.gallery {
            Gallery::Images(items) if !items.is_empty() => {
                match save_gallery_images(&submission.gallery, &self.out_dir) {
                    Ok(paths) => {
                        for path in paths {
                            writeln!(out, "Saved {}", path.display())?;
                        }
                    }
                    Err(err) => {
                        warn!("failed to save generated images: {err:#}");
                        writeln!(out, "Could not save images: {err:#}")?;
                    }
                }
            }
            Gallery::Images(_) | Gallery::Empty { .. } => {
                writeln!(out, "{}", scenecast_contracts::gallery::NO_IMAGES_MESSAGE)?;
            }
            Gallery::Error { message } => writeln!(out, "{message}")?,
        }

        match write_gallery_html(&submission.gallery, &self.out_dir) {
            Ok(path) => writeln!(out, "Gallery: {}", path.display())?,
            Err(err) => writeln!(out, "Could not write gallery: {err:#}")?,
        }
        Ok(())
    }

    fn render_controls(&self, out: &mut impl Write) -> Result<()> {
        for control in &self.controls {
            let mut line = format!(
                "  {:<12} upload {}  remove {}",
                control.slot.label(),
                control.picker,
                control.remove
            );
            if let Some(checkbox) = &control.checkbox {
                line.push_str(&format!("  toggle {checkbox}"));
            }
            writeln!(out, "{line}")?;
        }
        let ratios = AspectRatio::ALL
            .iter()
            .map(|ratio| ratio.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "  Aspect ratio {} (one of {ratios})", self.session.aspect_ratio())?;
        writeln!(out, "  Prompt: {}", self.session.prompt())?;
        Ok(())
    }

    fn render_status(&self, out: &mut impl Write) -> Result<()> {
        let store = self.session.store();
        for control in &self.controls {
            let slot = control.slot;
            let checkbox = if !slot.is_character() {
                "   "
            } else if store.is_included(slot) {
                "[x]"
            } else {
                "[ ]"
            };
            let preview = self
                .session
                .preview(slot)
                .map(|preview| preview.to_string())
                .unwrap_or_else(|| "empty".to_string());
            writeln!(out, "{checkbox} {:<12} {preview}", slot.label())?;
        }
        writeln!(out, "Aspect ratio: {}", self.session.aspect_ratio())?;
        writeln!(out, "Prompt: {}", self.session.prompt())?;
        writeln!(
            out,
            "Next request: {}",
            self.session.plan().mode().replace('_', "-")
        )?;
        Ok(())
    }
}
