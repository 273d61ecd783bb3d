use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use regex::Regex;
use std::sync::LazyLock;

use crate::EmbedError;

pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

static URL_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(['"]?)([^'")]+?)(['"]?)\s*\)"#).expect("valid regex")
});

/// Look up a MIME type from the extension of a URL's path.
///
/// Query strings and fragments are ignored. Returns `None` for extensions
/// outside the table so callers can fall back to a declared content type.
pub fn get_mime_type(url: &str) -> Option<&'static str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let file_name = path.rsplit('/').next().unwrap_or(path);
    let (_, extension) = file_name.rsplit_once('.')?;

    let mime = match extension.to_ascii_lowercase().as_str() {
        "woff" => "application/font-woff",
        "woff2" => "application/font-woff",
        "ttf" => "application/font-truetype",
        "otf" => "application/font-opentype",
        "eot" => "application/vnd.ms-fontobject",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "css" => "text/css",
        _ => return None,
    };
    Some(mime)
}

/// Assemble a base64 data URL from an encoded payload.
pub fn make_data_url(content: &str, mime_type: &str) -> String {
    format!("data:{mime_type};base64,{content}")
}

/// Payload portion of a data URL (everything after the first comma).
pub fn data_url_content(data_url: &str) -> &str {
    data_url
        .split_once(',')
        .map(|(_, content)| content)
        .unwrap_or("")
}

pub fn is_data_url(url: &str) -> bool {
    url.trim_start()
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

pub fn encode_base64(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

pub fn decode_base64(content: &str) -> Result<Vec<u8>, EmbedError> {
    BASE64
        .decode(content.trim())
        .map_err(|e| EmbedError::Decode(e.to_string()))
}

/// A `url(...)` occurrence found in CSS text.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlReference {
    /// Exact matched text, e.g. `url("fonts/a.woff2")`
    pub matched: String,
    /// Reference with quotes removed, e.g. `fonts/a.woff2`
    pub url: String,
}

/// Distinct non-data `url(...)` references in source order.
pub fn parse_url_references(css_text: &str) -> Vec<UrlReference> {
    let mut references: Vec<UrlReference> = Vec::new();

    for captures in URL_REFERENCE.captures_iter(css_text) {
        let url = captures[2].trim();
        if url.is_empty() || is_data_url(url) {
            continue;
        }
        if references.iter().any(|r| r.matched == captures[0]) {
            continue;
        }
        references.push(UrlReference {
            matched: captures[0].to_string(),
            url: url.to_string(),
        });
    }

    references
}

/// Whether a declaration value carries a `url()` source at all.
///
/// Already-inlined `data:` sources count, so fonts embedded while inlining a
/// remote sheet are still collected.
pub fn should_embed(value: &str) -> bool {
    URL_REFERENCE.is_match(value)
}

/// Replace every `url(...)` whose exact text has an entry in `replacements`.
///
/// Runs as a single pass over the original text, so the result does not
/// depend on the order in which replacements were produced.
pub fn rewrite_url_references(
    css_text: &str,
    replacements: &std::collections::HashMap<String, String>,
) -> String {
    if replacements.is_empty() {
        return css_text.to_string();
    }

    URL_REFERENCE
        .replace_all(css_text, |captures: &regex::Captures<'_>| {
            replacements
                .get(&captures[0])
                .cloned()
                .unwrap_or_else(|| captures[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_get_mime_type() {
        assert_eq!(get_mime_type("https://a.test/f.woff2"), Some("application/font-woff"));
        assert_eq!(get_mime_type("https://a.test/f.TTF?v=3"), Some("application/font-truetype"));
        assert_eq!(get_mime_type("img/photo.jpeg#top"), Some("image/jpeg"));
        assert_eq!(get_mime_type("https://a.test/download"), None);
        assert_eq!(get_mime_type("https://a.test/archive.zip"), None);
    }

    #[test]
    fn test_data_url_helpers() {
        let url = make_data_url("AAEC", "image/png");
        assert_eq!(url, "data:image/png;base64,AAEC");
        assert_eq!(data_url_content(&url), "AAEC");
        assert_eq!(data_url_content("not a data url"), "");
        assert!(is_data_url("DATA:text/plain,hi"));
        assert!(!is_data_url("https://a.test/x.png"));
    }

    #[test]
    fn test_base64_round_trip() {
        let payload: Vec<u8> = (0..=255u8).chain([0, 0, 255]).collect();
        let encoded = encode_base64(&payload);
        assert_eq!(decode_base64(&encoded).unwrap(), payload);
        assert!(decode_base64("%%%").is_err());
    }

    #[test]
    fn test_parse_url_references_skips_data_and_duplicates() {
        let css = r#"src: url("a.woff2") format("woff2"), url(a.woff2), url('b.ttf'), url(data:font/woff;base64,AA), url("a.woff2");"#;
        let refs = parse_url_references(css);
        let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["a.woff2", "a.woff2", "b.ttf"]);
        assert_eq!(refs[0].matched, r#"url("a.woff2")"#);
        assert_eq!(refs[1].matched, "url(a.woff2)");
    }

    #[test]
    fn test_parse_url_references_allows_inner_whitespace() {
        let refs = parse_url_references("src: url( \"a.woff\" ), url(\tb.ttf )");
        let urls: Vec<&str> = refs.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, vec!["a.woff", "b.ttf"]);
        assert_eq!(refs[0].matched, "url( \"a.woff\" )");

        let mut replacements = HashMap::new();
        replacements.insert(refs[0].matched.clone(), "url(data:font/woff;base64,AA==)".to_string());
        assert_eq!(
            rewrite_url_references("src: url( \"a.woff\" )", &replacements),
            "src: url(data:font/woff;base64,AA==)"
        );
    }

    #[test]
    fn test_should_embed() {
        assert!(should_embed("url(font.woff) format('woff')"));
        assert!(should_embed("url(data:font/woff;base64,AAAA)"));
        assert!(!should_embed("local(Arial)"));
    }

    #[test]
    fn test_rewrite_url_references_is_order_independent() {
        let css = "a{background:url(one.png)} b{background:url(two.png)} c{background:url(one.png)}";
        let mut replacements = HashMap::new();
        replacements.insert("url(two.png)".to_string(), "url(data:image/png;base64,Mg==)".to_string());
        replacements.insert("url(one.png)".to_string(), "url(data:image/png;base64,MQ==)".to_string());

        let rewritten = rewrite_url_references(css, &replacements);
        assert_eq!(
            rewritten,
            "a{background:url(data:image/png;base64,MQ==)} b{background:url(data:image/png;base64,Mg==)} c{background:url(data:image/png;base64,MQ==)}"
        );
    }
}
