//! Entry preview classification.
//!
//! This is data, not logic: a fixed extension → preview-kind table. The
//! extractor returns raw bytes; turning those bytes into a rendered preview
//! (syntax highlighting, EXIF, OOXML rendering, ...) is left to the
//! consumer.

/// The preview kind a consumer should use to render an entry's bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewKind {
    /// Plain text: markup, config, or otherwise unrecognized source.
    Text,
    /// Recognized source/code file.
    Code,
    Image,
    Video,
    Audio,
    Pdf,
    Document,
    Spreadsheet,
    Presentation,
    Font,
    /// No known preview representation.
    Unsupported,
}

const IMAGE_EXTS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "svg", "webp", "bmp", "ico", "avif",
];
const VIDEO_EXTS: &[&str] = &[
    "mp4", "webm", "mov", "avi", "mkv", "flv", "wmv", "m4v", "3gp", "3g2", "mpg", "mpeg", "ogg",
];
const AUDIO_EXTS: &[&str] = &[
    "mp3", "wav", "flac", "aac", "m4a", "opus", "wma", "aiff", "aif", "mid", "midi",
];
const PDF_EXTS: &[&str] = &["pdf"];
const DOCUMENT_EXTS: &[&str] = &["docx", "doc", "odt", "rtf", "pages"];
const SPREADSHEET_EXTS: &[&str] = &["xlsx", "xls", "ods", "csv", "tsv", "numbers"];
const PRESENTATION_EXTS: &[&str] = &["pptx", "ppt", "odp", "key"];
const FONT_EXTS: &[&str] = &["woff", "woff2", "ttf", "otf", "eot"];

/// Recognized source/markup/config extensions that get the richer "code"
/// treatment rather than plain text. Not exhaustive by design — anything
/// not on this list and not otherwise classified falls back to `Text` if it
/// looks like text, or `Unsupported` otherwise; the engine itself never
/// needs to draw that line precisely since rendering is a consumer concern.
const CODE_EXTS: &[&str] = &[
    "rs", "toml", "json", "yaml", "yml", "js", "jsx", "ts", "tsx", "py", "go", "java", "kt", "c",
    "h", "cpp", "hpp", "cc", "cs", "rb", "php", "sh", "bash", "zsh", "sql", "html", "htm", "css",
    "scss", "less", "xml", "md", "markdown", "dockerfile", "makefile", "gradle", "swift", "lua",
    "vue", "svelte",
];

fn extension_of(path: &str) -> Option<String> {
    let base = path.rsplit('/').next().unwrap_or(path);
    base.rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

/// Classify an entry's path into a [`PreviewKind`] by extension.
pub fn classify(path: &str) -> PreviewKind {
    let Some(ext) = extension_of(path) else {
        return PreviewKind::Unsupported;
    };
    let ext = ext.as_str();

    if IMAGE_EXTS.contains(&ext) {
        PreviewKind::Image
    } else if VIDEO_EXTS.contains(&ext) {
        PreviewKind::Video
    } else if AUDIO_EXTS.contains(&ext) {
        PreviewKind::Audio
    } else if PDF_EXTS.contains(&ext) {
        PreviewKind::Pdf
    } else if DOCUMENT_EXTS.contains(&ext) {
        PreviewKind::Document
    } else if SPREADSHEET_EXTS.contains(&ext) {
        PreviewKind::Spreadsheet
    } else if PRESENTATION_EXTS.contains(&ext) {
        PreviewKind::Presentation
    } else if FONT_EXTS.contains(&ext) {
        PreviewKind::Font
    } else if CODE_EXTS.contains(&ext) {
        PreviewKind::Code
    } else {
        PreviewKind::Text
    }
}

/// Best-effort MIME type for an entry's path, used for
/// `ExtractionResult::Binary` and as the MediaGateway's default content
/// type. Falls back to `application/octet-stream`.
pub fn mime_for_extension(path: &str) -> &'static str {
    let Some(ext) = extension_of(path) else {
        return "application/octet-stream";
    };
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "ico" => "image/x-icon",
        "avif" => "image/avif",
        "mp4" | "m4v" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "avi" => "video/x-msvideo",
        "mkv" => "video/x-matroska",
        "mpg" | "mpeg" => "video/mpeg",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "flac" => "audio/flac",
        "aac" => "audio/aac",
        "m4a" => "audio/mp4",
        "opus" => "audio/opus",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        "json" => "application/json",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "text/javascript",
        "csv" => "text/csv",
        "txt" | "md" | "markdown" => "text/plain",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "otf" => "font/otf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_known_extensions() {
        assert_eq!(classify("photos/cat.PNG"), PreviewKind::Image);
        assert_eq!(classify("movie.mkv"), PreviewKind::Video);
        assert_eq!(classify("song.flac"), PreviewKind::Audio);
        assert_eq!(classify("report.pdf"), PreviewKind::Pdf);
        assert_eq!(classify("sheet.xlsx"), PreviewKind::Spreadsheet);
        assert_eq!(classify("deck.pptx"), PreviewKind::Presentation);
        assert_eq!(classify("glyphs.woff2"), PreviewKind::Font);
        assert_eq!(classify("src/main.rs"), PreviewKind::Code);
        assert_eq!(classify("README"), PreviewKind::Unsupported);
        assert_eq!(classify("notes.txt"), PreviewKind::Text);
    }

    #[test]
    fn mime_falls_back_to_octet_stream() {
        assert_eq!(mime_for_extension("archive.bin"), "application/octet-stream");
        assert_eq!(mime_for_extension("image.png"), "image/png");
    }
}
