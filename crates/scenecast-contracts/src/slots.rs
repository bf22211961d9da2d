use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// One of the five fixed reference-image positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    #[serde(rename = "char1")]
    Character1,
    #[serde(rename = "char2")]
    Character2,
    #[serde(rename = "char3")]
    Character3,
    #[serde(rename = "char4")]
    Character4,
    #[serde(rename = "bg")]
    Background,
}

impl Slot {
    pub const ALL: [Slot; 5] = [
        Slot::Character1,
        Slot::Character2,
        Slot::Character3,
        Slot::Character4,
        Slot::Background,
    ];

    pub const CHARACTERS: [Slot; 4] = [
        Slot::Character1,
        Slot::Character2,
        Slot::Character3,
        Slot::Character4,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Self::Character1 => "char1",
            Self::Character2 => "char2",
            Self::Character3 => "char3",
            Self::Character4 => "char4",
            Self::Background => "bg",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Character1 => "Character 1",
            Self::Character2 => "Character 2",
            Self::Character3 => "Character 3",
            Self::Character4 => "Character 4",
            Self::Background => "Background",
        }
    }

    pub fn is_character(self) -> bool {
        !matches!(self, Self::Background)
    }

    fn index(self) -> usize {
        match self {
            Self::Character1 => 0,
            Self::Character2 => 1,
            Self::Character3 => 2,
            Self::Character4 => 3,
            Self::Background => 4,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Slot {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        Slot::ALL
            .into_iter()
            .find(|slot| slot.id() == normalized)
            .or(match normalized.as_str() {
                "background" => Some(Slot::Background),
                _ => None,
            })
            .ok_or_else(|| format!("Unknown slot '{raw}'. Expected one of char1..char4, bg."))
    }
}

/// A user-supplied reference picture, already base64 encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceImage {
    pub data: String,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl ReferenceImage {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            mime_type: mime_type.into(),
            file_name: None,
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }
}

/// A selection entry keeps the slot it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub slot: Slot,
    pub image: ReferenceImage,
}

/// In-memory store of reference images keyed by slot, plus the
/// per-character "include in request" checkboxes.
///
/// The checkbox state is independent of whether an image is present;
/// only [`ReferenceStore::remove`] couples the two by clearing both.
#[derive(Debug, Clone, Default)]
pub struct ReferenceStore {
    images: [Option<ReferenceImage>; 5],
    included: [bool; 4],
}

impl ReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `image` in `slot`, returning the image it replaced.
    pub fn load(&mut self, slot: Slot, image: ReferenceImage) -> Option<ReferenceImage> {
        self.images[slot.index()].replace(image)
    }

    pub fn remove(&mut self, slot: Slot) -> Option<ReferenceImage> {
        if slot.is_character() {
            self.included[slot.index()] = false;
        }
        self.images[slot.index()].take()
    }

    pub fn set_included(&mut self, slot: Slot, included: bool) -> anyhow::Result<()> {
        if !slot.is_character() {
            anyhow::bail!("The {} slot has no include checkbox.", slot.label());
        }
        self.included[slot.index()] = included;
        Ok(())
    }

    pub fn get(&self, slot: Slot) -> Option<&ReferenceImage> {
        self.images[slot.index()].as_ref()
    }

    pub fn is_included(&self, slot: Slot) -> bool {
        slot.is_character() && self.included[slot.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.images.iter().all(Option::is_none)
    }

    /// Ordered references for a request: background first whenever
    /// present, then each character slot that is both ticked and loaded.
    pub fn selection(&self) -> Vec<SelectedImage> {
        let mut selected = Vec::new();
        if let Some(image) = self.get(Slot::Background) {
            selected.push(SelectedImage {
                slot: Slot::Background,
                image: image.clone(),
            });
        }
        for slot in Slot::CHARACTERS {
            if !self.is_included(slot) {
                continue;
            }
            if let Some(image) = self.get(slot) {
                selected.push(SelectedImage {
                    slot,
                    image: image.clone(),
                });
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::{ReferenceImage, ReferenceStore, Slot};

    fn image(tag: &str) -> ReferenceImage {
        ReferenceImage::new(format!("{tag}-bytes"), "image/png")
    }

    fn slots(store: &ReferenceStore) -> Vec<Slot> {
        store.selection().into_iter().map(|entry| entry.slot).collect()
    }

    #[test]
    fn background_leads_selection_regardless_of_checkboxes() {
        let mut store = ReferenceStore::new();
        store.load(Slot::Character2, image("c2"));
        store.set_included(Slot::Character2, true).unwrap();
        store.load(Slot::Background, image("bg"));
        assert_eq!(slots(&store), vec![Slot::Background, Slot::Character2]);

        store.set_included(Slot::Character2, false).unwrap();
        assert_eq!(slots(&store), vec![Slot::Background]);
    }

    #[test]
    fn selection_has_no_background_when_slot_empty() {
        let mut store = ReferenceStore::new();
        store.load(Slot::Character1, image("c1"));
        store.set_included(Slot::Character1, true).unwrap();
        let selection = store.selection();
        assert_eq!(selection.len(), 1);
        assert_eq!(selection[0].slot, Slot::Character1);
    }

    #[test]
    fn character_requires_checkbox_and_image() {
        let mut store = ReferenceStore::new();
        store.load(Slot::Character1, image("c1"));
        store.set_included(Slot::Character2, true).unwrap();
        store.load(Slot::Character3, image("c3"));
        store.set_included(Slot::Character3, true).unwrap();
        store.load(Slot::Character4, image("c4"));
        store.set_included(Slot::Character4, true).unwrap();

        assert_eq!(slots(&store), vec![Slot::Character3, Slot::Character4]);
    }

    #[test]
    fn remove_clears_image_and_checkbox() {
        let mut store = ReferenceStore::new();
        store.load(Slot::Character1, image("c1"));
        store.set_included(Slot::Character1, true).unwrap();

        let removed = store.remove(Slot::Character1);
        assert_eq!(removed, Some(image("c1")));
        assert!(!store.is_included(Slot::Character1));
        assert!(store.selection().is_empty());

        store.load(Slot::Character1, image("again"));
        assert!(store.selection().is_empty());
    }

    #[test]
    fn checked_slot_without_image_is_excluded() {
        let mut store = ReferenceStore::new();
        store.set_included(Slot::Character1, true).unwrap();
        assert!(store.is_included(Slot::Character1));
        assert!(store.selection().is_empty());
    }

    #[test]
    fn reload_replaces_previous_image() {
        let mut store = ReferenceStore::new();
        assert_eq!(store.load(Slot::Background, image("first")), None);
        assert_eq!(
            store.load(Slot::Background, image("second")),
            Some(image("first"))
        );
        assert_eq!(store.get(Slot::Background), Some(&image("second")));
    }

    #[test]
    fn background_has_no_checkbox() {
        let mut store = ReferenceStore::new();
        assert!(store.set_included(Slot::Background, true).is_err());
        assert!(!store.is_included(Slot::Background));
    }

    #[test]
    fn slot_ids_round_trip_through_from_str() {
        for slot in Slot::ALL {
            assert_eq!(slot.id().parse::<Slot>(), Ok(slot));
        }
        assert_eq!("Background".parse::<Slot>(), Ok(Slot::Background));
        assert!("char5".parse::<Slot>().is_err());
    }
}
