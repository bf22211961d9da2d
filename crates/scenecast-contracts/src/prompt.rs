use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::slots::{SelectedImage, Slot};

pub const DEFAULT_PROMPT: &str = "Two friends sharing an umbrella on a rainy neon-lit street at night, \
cinematic lighting, shallow depth of field";

pub const TEXT_TO_IMAGE_COUNT: u32 = 3;
pub const TEXT_TO_IMAGE_OUTPUT_MIME: &str = "image/jpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[default]
    #[serde(rename = "1:1")]
    Square,
    #[serde(rename = "16:9")]
    Landscape,
    #[serde(rename = "9:16")]
    Portrait,
    #[serde(rename = "4:3")]
    Standard,
    #[serde(rename = "3:4")]
    StandardPortrait,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Standard,
        AspectRatio::StandardPortrait,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Square => "1:1",
            Self::Landscape => "16:9",
            Self::Portrait => "9:16",
            Self::Standard => "4:3",
            Self::StandardPortrait => "3:4",
        }
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AspectRatio {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        AspectRatio::ALL
            .into_iter()
            .find(|ratio| ratio.as_str() == trimmed)
            .ok_or_else(|| {
                let allowed = AspectRatio::ALL
                    .iter()
                    .map(|ratio| ratio.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("Unsupported aspect ratio '{raw}'. Expected one of {allowed}.")
            })
    }
}

/// The two mutually exclusive request shapes sent to the image service.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    /// Edit/combine the supplied references according to `prompt`.
    Composition {
        images: Vec<SelectedImage>,
        prompt: String,
    },
    /// Pure prompt-driven generation.
    TextToImage {
        prompt: String,
        count: u32,
        aspect_ratio: AspectRatio,
        output_mime: &'static str,
    },
}

impl GenerationRequest {
    pub fn mode(&self) -> &'static str {
        match self {
            Self::Composition { .. } => "composition",
            Self::TextToImage { .. } => "text_to_image",
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            Self::Composition { prompt, .. } | Self::TextToImage { prompt, .. } => prompt,
        }
    }
}

pub fn compose_prompt(
    selection: &[SelectedImage],
    user_prompt: &str,
    aspect_ratio: AspectRatio,
) -> String {
    if selection.is_empty() {
        return user_prompt.to_string();
    }

    let has_background = selection
        .first()
        .map(|entry| entry.slot == Slot::Background)
        .unwrap_or(false);
    let num_characters = if has_background {
        selection.len() - 1
    } else {
        selection.len()
    };

    let mut instructions: Vec<String> = Vec::new();
    if has_background {
        instructions.push(
            "Use the first image as the background scenery only. Remove any people who appear in it."
                .to_string(),
        );
    }
    if num_characters > 0 {
        let noun = if num_characters == 1 {
            "character"
        } else {
            "characters"
        };
        let images = if num_characters == 1 { "image" } else { "images" };
        if has_background {
            instructions.push(format!(
                "Integrate the {num_characters} {noun} from the remaining {images} into this scene."
            ));
        } else {
            instructions.push(format!(
                "Combine the {num_characters} {noun} from the provided {images} into a single cohesive scene."
            ));
        }
        instructions.push(
            "Each character must appear exactly once: do not duplicate any character and do not omit any."
                .to_string(),
        );
    }

    let mut prompt = instructions.join(" ");
    prompt.push_str("\n\n");
    prompt.push_str(&format!("The creative brief: \"{user_prompt}\""));
    prompt.push_str(&format!(
        " The output image must have an aspect ratio of {aspect_ratio}."
    ));
    prompt
}

/// Chooses composition mode when any reference is selected, otherwise
/// text-to-image with a fixed image count and JPEG output.
pub fn plan_generation(
    selection: Vec<SelectedImage>,
    user_prompt: &str,
    aspect_ratio: AspectRatio,
) -> GenerationRequest {
    if selection.is_empty() {
        return GenerationRequest::TextToImage {
            prompt: user_prompt.to_string(),
            count: TEXT_TO_IMAGE_COUNT,
            aspect_ratio,
            output_mime: TEXT_TO_IMAGE_OUTPUT_MIME,
        };
    }

    let prompt = compose_prompt(&selection, user_prompt, aspect_ratio);
    GenerationRequest::Composition {
        images: selection,
        prompt,
    }
}
