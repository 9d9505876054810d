//! Fixed MIME-type → file-extension tables, one per media category.

use zapgate_engine::MediaKind;

/// Short path code used in retrievable URLs (`/uploads/{code}/{file}`).
pub fn category_code(kind: MediaKind) -> &'static str {
    match kind {
        MediaKind::Video => "v",
        MediaKind::Audio => "a",
        MediaKind::Image => "m",
        MediaKind::Document => "d",
    }
}

/// Storage directory name under the uploads root.
pub fn category_dir(kind: MediaKind) -> &'static str {
    kind.as_str()
}

/// Inverse of [`category_code`], for serving stored files.
pub fn kind_for_code(code: &str) -> Option<MediaKind> {
    match code {
        "v" => Some(MediaKind::Video),
        "a" => Some(MediaKind::Audio),
        "m" => Some(MediaKind::Image),
        "d" => Some(MediaKind::Document),
        _ => None,
    }
}

/// Resolve the file extension for a payload's declared mimetype.
pub fn extension_for(kind: MediaKind, mimetype: Option<&str>) -> &'static str {
    let mimetype = mimetype.unwrap_or("");
    match kind {
        MediaKind::Audio => {
            if mimetype.contains("ogg") {
                "ogg"
            } else {
                "mp3"
            }
        },
        MediaKind::Video => {
            if mimetype.contains("matroska") {
                "mkv"
            } else {
                "mp4"
            }
        },
        MediaKind::Image => {
            if mimetype.contains("png") {
                "png"
            } else if mimetype.contains("gif") {
                "gif"
            } else {
                "jpg"
            }
        },
        MediaKind::Document => document_extension(mimetype),
    }
}

fn document_extension(mimetype: &str) -> &'static str {
    // The mimetype may carry parameters (`; codecs=...`); match on the base.
    let base = mimetype.split(';').next().unwrap_or(mimetype).trim();
    match base {
        "application/pdf" => "pdf",
        "application/msword" => "doc",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => "docx",
        "application/vnd.ms-excel" => "xls",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => "xlsx",
        "application/vnd.ms-powerpoint" => "ppt",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation" => "pptx",
        "application/vnd.oasis.opendocument.text" => "odt",
        "application/vnd.oasis.opendocument.spreadsheet" => "ods",
        "application/rtf" => "rtf",
        "application/json" => "json",
        "application/xml" | "text/xml" => "xml",
        "application/zip" => "zip",
        "text/plain" => "txt",
        "text/csv" => "csv",
        _ => "bin",
    }
}

/// Content type for serving a stored file back, derived from its extension.
pub fn content_type_for_extension(ext: &str) -> &'static str {
    match ext {
        "ogg" => "audio/ogg",
        "mp3" => "audio/mpeg",
        "mp4" => "video/mp4",
        "mkv" => "video/x-matroska",
        "jpg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "odt" => "application/vnd.oasis.opendocument.text",
        "ods" => "application/vnd.oasis.opendocument.spreadsheet",
        "rtf" => "application/rtf",
        "json" => "application/json",
        "xml" => "application/xml",
        "zip" => "application/zip",
        "txt" => "text/plain",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}
