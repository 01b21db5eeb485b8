//! File extension to `Content-Type` lookup.
//!
//! Common types, after
//! https://developer.mozilla.org/en-US/docs/Web/HTTP/Basics_of_HTTP/MIME_types/Common_types

/// Fallback type for unknown or missing extensions.
pub const TEXT_PLAIN: &str = "text/plain";

/// Returns the MIME type for `filename` based on the text after its last `.`.
///
/// Unknown extensions, and names without any `.`, map to [`TEXT_PLAIN`].
///
/// # Examples
/// ```
/// use tiny_gateway::mime;
///
/// assert_eq!(mime::mime_type("/index.html"), "text/html");
/// assert_eq!(mime::mime_type("logo.SVG"), "image/svg+xml");
/// assert_eq!(mime::mime_type("README"), "text/plain");
/// ```
pub fn mime_type(filename: &str) -> &'static str {
    let Some((_, ext)) = filename.rsplit_once('.') else {
        return TEXT_PLAIN;
    };

    // Extensions are short; anything longer than the buffer is unknown anyway.
    let mut buf = [0u8; 8];
    if ext.len() > buf.len() {
        return TEXT_PLAIN;
    }
    let lower = &mut buf[..ext.len()];
    lower.copy_from_slice(ext.as_bytes());
    lower.make_ascii_lowercase();

    match &*lower {
        b"aac" => "audio/aac",
        b"abw" => "application/x-abiword",
        b"arc" => "application/x-freearc",
        b"avi" => "video/x-msvideo",
        b"azw" => "application/vnd.amazon.ebook",
        b"bin" => "application/octet-stream",
        b"bmp" => "image/bmp",
        b"bz" => "application/x-bzip",
        b"bz2" => "application/x-bzip2",
        b"cda" => "application/x-cdf",
        b"csh" => "application/x-csh",
        b"css" => "text/css",
        b"csv" => "text/csv",
        b"doc" => "application/msword",
        b"docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        b"eot" => "application/vnd.ms-fontobject",
        b"epub" => "application/epub+zip",
        b"gz" => "application/gzip",
        b"gif" => "image/gif",
        b"htm" | b"html" => "text/html",
        b"ico" => "image/vnd.microsoft.icon",
        b"ics" => "text/calendar",
        b"jar" => "application/java-archive",
        b"jpeg" | b"jpg" => "image/jpeg",
        b"js" | b"mjs" => "text/javascript",
        b"json" => "application/json",
        b"jsonld" => "application/ld+json",
        b"mid" | b"midi" => "audio/midi",
        b"mp3" => "audio/mpeg",
        b"mp4" => "video/mp4",
        b"mpeg" => "video/mpeg",
        b"mpkg" => "application/vnd.apple.installer+xml",
        b"odp" => "application/vnd.oasis.opendocument.presentation",
        b"ods" => "application/vnd.oasis.opendocument.spreadsheet",
        b"odt" => "application/vnd.oasis.opendocument.text",
        b"oga" => "audio/ogg",
        b"ogv" => "video/ogg",
        b"ogx" => "application/ogg",
        b"opus" => "audio/opus",
        b"otf" => "font/otf",
        b"png" => "image/png",
        b"pdf" => "application/pdf",
        b"php" => "application/x-httpd-php",
        b"ppt" => "application/vnd.ms-powerpoint",
        b"pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        b"rar" => "application/vnd.rar",
        b"rtf" => "application/rtf",
        b"sh" => "application/x-sh",
        b"svg" => "image/svg+xml",
        b"swf" => "application/x-shockwave-flash",
        b"tar" => "application/x-tar",
        b"tif" | b"tiff" => "image/tiff",
        b"ts" => "video/mp2t",
        b"ttf" => "font/ttf",
        b"txt" => TEXT_PLAIN,
        b"vsd" => "application/vnd.visio",
        b"wav" => "audio/wav",
        b"wasm" => "application/wasm",
        b"weba" => "audio/webm",
        b"webm" => "video/webm",
        b"webp" => "image/webp",
        b"woff" => "font/woff",
        b"woff2" => "font/woff2",
        b"xhtml" => "application/xhtml+xml",
        b"xls" => "application/vnd.ms-excel",
        b"xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        b"xml" => "application/xml",
        b"xul" => "application/vnd.mozilla.xul+xml",
        b"zip" => "application/zip",
        b"7z" => "application/x-7z-compressed",
        _ => TEXT_PLAIN,
    }
}
