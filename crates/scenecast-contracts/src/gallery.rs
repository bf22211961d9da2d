pub const NO_IMAGES_MESSAGE: &str = "No images were generated. Try a different prompt.";
const DEFAULT_EXTENSION: &str = "jpeg";

/// One image returned by the service. Either field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeneratedImage {
    pub data: Option<String>,
    pub mime_type: Option<String>,
}

impl GeneratedImage {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            data: Some(data.into()),
            mime_type: Some(mime_type.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GalleryItem {
    pub index: usize,
    pub alt: String,
    pub mime_type: String,
    pub data: String,
    pub download_name: String,
}

impl GalleryItem {
    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gallery {
    Empty { message: String },
    Images(Vec<GalleryItem>),
    Error { message: String },
}

impl Gallery {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn items(&self) -> &[GalleryItem] {
        match self {
            Self::Images(items) => items,
            _ => &[],
        }
    }

    pub fn to_html(&self) -> String {
        let body = match self {
            Self::Empty { message } => {
                format!("<p class=\"empty\">{}</p>", escape_html(message))
            }
            Self::Error { message } => {
                format!("<p class=\"error\">{}</p>", escape_html(message))
            }
            Self::Images(items) => items
                .iter()
                .map(|item| {
                    format!(
                        "<figure class=\"item\">\
<img src=\"{src}\" alt=\"{alt}\">\
<figcaption><a href=\"{src}\" download=\"{name}\">Download {name}</a></figcaption>\
</figure>",
                        src = item.data_url(),
                        alt = escape_html(&item.alt),
                        name = escape_html(&item.download_name),
                    )
                })
                .collect::<Vec<_>>()
                .join("\n"),
        };

        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
<title>Scenecast gallery</title>\n<style>\n{GALLERY_CSS}\n</style>\n</head>\n<body>\n\
<main class=\"gallery\">\n{body}\n</main>\n</body>\n</html>\n"
        )
    }
}

const GALLERY_CSS: &str = "body { font-family: sans-serif; background: #111; color: #eee; }
.gallery { display: flex; flex-wrap: wrap; gap: 16px; padding: 16px; }
.item img { max-width: 480px; display: block; border-radius: 6px; }
.item a { color: #8cf; }
.empty { color: #aaa; }
.error { color: #f66; border: 1px solid #f66; padding: 8px 12px; border-radius: 6px; }";

/// Builds the gallery for a result list. Entries without image bytes are
/// skipped but keep their 1-based position for names and alt text.
pub fn render_gallery(results: Option<&[GeneratedImage]>) -> Gallery {
    let Some(results) = results.filter(|results| !results.is_empty()) else {
        return Gallery::Empty {
            message: NO_IMAGES_MESSAGE.to_string(),
        };
    };

    let items = results
        .iter()
        .enumerate()
        .filter_map(|(position, result)| {
            let data = result.data.as_deref().filter(|data| !data.is_empty())?;
            let index = position + 1;
            let mime_type = result
                .mime_type
                .clone()
                .unwrap_or_else(|| format!("image/{DEFAULT_EXTENSION}"));
            let extension = extension_for_mime(result.mime_type.as_deref());
            Some(GalleryItem {
                index,
                alt: format!("Generated image {index}"),
                mime_type,
                data: data.to_string(),
                download_name: format!("generated-image-{index}.{extension}"),
            })
        })
        .collect();

    Gallery::Images(items)
}

/// File extension from a MIME subtype, `jpeg` when there is none.
pub fn extension_for_mime(mime_type: Option<&str>) -> &str {
    mime_type
        .and_then(|mime| mime.split_once('/'))
        .map(|(_, subtype)| subtype.split(';').next().unwrap_or_default().trim())
        .filter(|subtype| !subtype.is_empty())
        .unwrap_or(DEFAULT_EXTENSION)
}

fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
