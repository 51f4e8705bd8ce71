//! MIME detection and text decoding helpers.

/// Extensions mime_guess maps poorly (or not at all) for our purposes.
const SOURCE_MIME_BY_EXT: &[(&str, &str)] = &[
    ("rs", "text/x-rust"),
    ("py", "text/x-python"),
    ("go", "text/x-go"),
    ("java", "text/x-java"),
    ("js", "text/javascript"),
    ("mjs", "text/javascript"),
    ("cjs", "text/javascript"),
    ("jsx", "text/jsx"),
    ("ts", "application/typescript"),
    ("mts", "application/typescript"),
    ("tsx", "text/tsx"),
    ("md", "text/markdown"),
    ("markdown", "text/markdown"),
    ("mdx", "text/markdown"),
    ("rst", "text/x-rst"),
    ("toml", "text/toml"),
    ("yml", "text/yaml"),
    ("yaml", "text/yaml"),
    ("json", "application/json"),
    ("sh", "text/x-shellscript"),
];

fn extension_of(path: &str) -> Option<&str> {
    let name = path.rsplit(['/', '\\']).next()?;
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// Best-effort MIME type from a path or URL, defaulting to octet-stream.
pub fn mime_from_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or(path);
    if let Some(ext) = extension_of(path) {
        let lower = ext.to_lowercase();
        if let Some((_, mime)) = SOURCE_MIME_BY_EXT.iter().find(|(e, _)| *e == lower) {
            return (*mime).to_string();
        }
    }
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// MIME type from content bytes with a path fallback.
pub fn sniff_mime(bytes: &[u8], path_hint: &str) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    mime_from_path(path_hint)
}

/// Heuristic binary detection: any NUL byte in the leading window.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.iter().take(8192).any(|&b| b == 0)
}

/// True for MIME types the text pipeline may accept.
pub fn is_text_mime(mime: &str) -> bool {
    let mime = mime.split(';').next().unwrap_or(mime).trim();
    mime.starts_with("text/")
        || matches!(
            mime,
            "application/json"
                | "application/javascript"
                | "application/typescript"
                | "application/xml"
                | "application/xhtml+xml"
                | "application/x-sh"
                | "application/toml"
                | "application/yaml"
        )
        || mime.ends_with("+json")
        || mime.ends_with("+xml")
}

/// Split a Content-Type header into `(mime, charset)`.
pub fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let mime = parts.next().unwrap_or("").trim().to_lowercase();
    let charset = parts
        .filter_map(|p| p.trim().strip_prefix("charset="))
        .map(|c| c.trim_matches('"').to_lowercase())
        .next();
    (mime, charset)
}

/// Decode bytes to text honoring the declared charset.
///
/// UTF-8 (lossy) is the default; latin-1 family charsets are mapped
/// byte-for-byte so nothing is lost.
pub fn decode_text(bytes: &[u8], charset: Option<&str>) -> String {
    match charset.map(str::to_lowercase).as_deref() {
        Some("iso-8859-1") | Some("latin1") | Some("latin-1") | Some("windows-1252") => {
            bytes.iter().map(|&b| b as char).collect()
        }
        _ => String::from_utf8_lossy(bytes).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_extensions_win_over_guess() {
        assert_eq!(mime_from_path("src/lib.rs"), "text/x-rust");
        assert_eq!(mime_from_path("https://e.com/app.ts?v=1"), "application/typescript");
        assert_eq!(mime_from_path("README.md"), "text/markdown");
        assert_eq!(mime_from_path("index.html"), "text/html");
        assert_eq!(mime_from_path("noext"), "application/octet-stream");
    }

    #[test]
    fn content_type_parsing() {
        let (mime, charset) = parse_content_type("text/html; charset=UTF-8");
        assert_eq!(mime, "text/html");
        assert_eq!(charset.as_deref(), Some("utf-8"));
        let (mime, charset) = parse_content_type("application/json");
        assert_eq!(mime, "application/json");
        assert!(charset.is_none());
    }

    #[test]
    fn binary_detection() {
        assert!(is_binary(b"\x00\x01\x02"));
        assert!(!is_binary("plain text".as_bytes()));
    }

    #[test]
    fn latin1_decoding() {
        let bytes = [0x63u8, 0x61, 0x66, 0xe9];
        assert_eq!(decode_text(&bytes, Some("iso-8859-1")), "caf\u{e9}");
        assert_eq!(decode_text("caf\u{e9}".as_bytes(), None), "caf\u{e9}");
    }
}
