//! Google Drive link handling.
//!
//! Drive serves small files directly from `uc?id=<id>`. Larger files first
//! return an HTML "can't scan for viruses" page whose download link has to be
//! scraped before the real transfer can start.

use std::sync::OnceLock;

use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use regex::Regex;

use crate::error::{FetchError, Result};

const DRIVE_HOSTS: [&str; 2] = ["drive.google.com", "docs.google.com"];

/// Direct download endpoint for a Drive file id.
pub fn download_url(file_id: &str) -> String {
    format!("https://drive.google.com/uc?id={}", file_id)
}

/// A Drive URL broken into the pieces the fetcher needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveLink {
    pub file_id: Option<String>,
    /// Already points at the `uc` download endpoint
    pub is_download_link: bool,
}

/// Inspect a URL. Returns `None` for non-Drive hosts.
pub fn parse_link(url: &str) -> Option<DriveLink> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    if !DRIVE_HOSTS.contains(&host) {
        return None;
    }

    let path = parsed.path();
    let is_download_link = path.ends_with("/uc");

    let file_id = parsed
        .query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
        .or_else(|| {
            file_path_pattern()
                .captures(path)
                .map(|caps| caps[1].to_string())
        });

    Some(DriveLink {
        file_id,
        is_download_link,
    })
}

/// The URL to request for a Drive link, or `None` when the URL should be
/// fetched as-is.
///
/// Shared-file links only resolve when `fuzzy` is set.
pub fn resolve_download_url(url: &str, fuzzy: bool) -> Option<String> {
    let link = parse_link(url)?;
    if link.is_download_link {
        return None;
    }
    match link.file_id {
        Some(id) if fuzzy => Some(download_url(&id)),
        _ => None,
    }
}

fn file_path_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^/file(?:/u/[0-9]+)?/d/([^/]+)(?:/(?:edit|view))?/?$")
            .expect("valid drive path pattern")
    })
}

/// Scrape the follow-up download URL from a Drive confirmation page.
pub fn confirmation_url(html: &str) -> Result<String> {
    static HREF: OnceLock<Regex> = OnceLock::new();
    static FORM: OnceLock<Regex> = OnceLock::new();
    static HIDDEN: OnceLock<Regex> = OnceLock::new();
    static DOWNLOAD_URL: OnceLock<Regex> = OnceLock::new();
    static ERROR: OnceLock<Regex> = OnceLock::new();

    let href = HREF.get_or_init(|| {
        Regex::new(r#"href="(/uc\?export=download[^"]+)"#).expect("valid href pattern")
    });
    if let Some(caps) = href.captures(html) {
        return Ok(format!("https://docs.google.com{}", &caps[1]).replace("&amp;", "&"));
    }

    let form = FORM.get_or_init(|| {
        Regex::new(r#"(?s)<form[^>]*id="download-form"[^>]*action="([^"]+)"[^>]*>(.*?)</form>"#)
            .expect("valid form pattern")
    });
    if let Some(caps) = form.captures(html) {
        let action = caps[1].replace("&amp;", "&");
        let hidden = HIDDEN.get_or_init(|| {
            Regex::new(r#"<input[^>]*type="hidden"[^>]*name="([^"]+)"[^>]*value="([^"]*)""#)
                .expect("valid hidden input pattern")
        });
        let query: Vec<String> = hidden
            .captures_iter(&caps[2])
            .map(|input| {
                format!(
                    "{}={}",
                    utf8_percent_encode(&input[1], NON_ALPHANUMERIC),
                    utf8_percent_encode(&input[2], NON_ALPHANUMERIC)
                )
            })
            .collect();
        return Ok(if query.is_empty() {
            action
        } else {
            format!("{}?{}", action, query.join("&"))
        });
    }

    let download_url = DOWNLOAD_URL.get_or_init(|| {
        Regex::new(r#""downloadUrl":"([^"]+)"#).expect("valid downloadUrl pattern")
    });
    if let Some(caps) = download_url.captures(html) {
        return Ok(caps[1].replace("\\u003d", "=").replace("\\u0026", "&"));
    }

    let error = ERROR.get_or_init(|| {
        Regex::new(r#"<p class="uc-error-subcaption">(.*?)</p>"#).expect("valid error pattern")
    });
    if let Some(caps) = error.captures(html) {
        return Err(FetchError::DriveRetrieval(caps[1].to_string()));
    }

    Err(FetchError::DriveRetrieval(
        "cannot retrieve the public link of the file; it may need to be shared with \
         'Anyone with the link', or it has had too many accesses"
            .to_string(),
    ))
}

/// File name announced in a `Content-Disposition` header.
pub fn content_disposition_filename(header: &str) -> Option<String> {
    static EXTENDED: OnceLock<Regex> = OnceLock::new();
    static PLAIN: OnceLock<Regex> = OnceLock::new();

    let extended = EXTENDED.get_or_init(|| {
        Regex::new(r"(?i)filename\*=UTF-8''([^;]+)").expect("valid extended filename pattern")
    });
    if let Some(caps) = extended.captures(header) {
        return percent_decode_str(caps[1].trim())
            .decode_utf8()
            .ok()
            .map(|name| name.into_owned());
    }

    let plain = PLAIN.get_or_init(|| {
        Regex::new(r#"(?i)filename="?([^";]+)"?"#).expect("valid filename pattern")
    });
    plain
        .captures(header)
        .map(|caps| caps[1].trim().to_string())
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shared_file_link() {
        let link = parse_link("https://drive.google.com/file/d/1AbC_dEf/view?usp=sharing").unwrap();
        assert_eq!(link.file_id.as_deref(), Some("1AbC_dEf"));
        assert!(!link.is_download_link);

        let link = parse_link("https://drive.google.com/file/u/0/d/XYZ/edit").unwrap();
        assert_eq!(link.file_id.as_deref(), Some("XYZ"));
    }

    #[test]
    fn test_parse_query_id_link() {
        let link = parse_link("https://drive.google.com/uc?id=123&export=download").unwrap();
        assert_eq!(link.file_id.as_deref(), Some("123"));
        assert!(link.is_download_link);

        let link = parse_link("https://drive.google.com/open?id=456").unwrap();
        assert_eq!(link.file_id.as_deref(), Some("456"));
    }

    #[test]
    fn test_non_drive_host() {
        assert!(parse_link("https://example.com/file/d/1/view").is_none());
        assert!(parse_link("not a url").is_none());
    }

    #[test]
    fn test_resolve_requires_fuzzy_for_shared_links() {
        let url = "https://drive.google.com/file/d/1AbC/view";
        assert_eq!(resolve_download_url(url, false), None);
        assert_eq!(
            resolve_download_url(url, true).as_deref(),
            Some("https://drive.google.com/uc?id=1AbC")
        );
        assert_eq!(
            resolve_download_url("https://drive.google.com/uc?id=1AbC", true),
            None
        );
    }

    #[test]
    fn test_confirmation_href() {
        let html = r#"<a id="uc-download-link" href="/uc?export=download&amp;confirm=t&amp;id=1AbC">Download anyway</a>"#;
        assert_eq!(
            confirmation_url(html).unwrap(),
            "https://docs.google.com/uc?export=download&confirm=t&id=1AbC"
        );
    }

    #[test]
    fn test_confirmation_form() {
        let html = r#"<form id="download-form" action="https://drive.usercontent.google.com/download" method="get">
            <input type="hidden" name="id" value="1AbC">
            <input type="hidden" name="export" value="download">
            <input type="hidden" name="confirm" value="t">
            </form>"#;
        assert_eq!(
            confirmation_url(html).unwrap(),
            "https://drive.usercontent.google.com/download?id=1AbC&export=download&confirm=t"
        );
    }

    #[test]
    fn test_confirmation_embedded_download_url() {
        let html = r#"{"downloadUrl":"https://doc-0.googleusercontent.com/x?a=1&b=2"}"#;
        assert_eq!(
            confirmation_url(html).unwrap(),
            "https://doc-0.googleusercontent.com/x?a=1&b=2"
        );
    }

    #[test]
    fn test_confirmation_error_caption() {
        let html = r#"<p class="uc-error-subcaption">Too many users have viewed or downloaded this file recently.</p>"#;
        match confirmation_url(html) {
            Err(FetchError::DriveRetrieval(msg)) => assert!(msg.starts_with("Too many users")),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(confirmation_url("<html></html>").is_err());
    }

    #[test]
    fn test_content_disposition_filename() {
        assert_eq!(
            content_disposition_filename(r#"attachment; filename="data.zip""#).as_deref(),
            Some("data.zip")
        );
        assert_eq!(
            content_disposition_filename(
                r#"attachment; filename="fallback.zip"; filename*=UTF-8''na%C3%AFve%20set.zip"#
            )
            .as_deref(),
            Some("naïve set.zip")
        );
        assert_eq!(content_disposition_filename("inline"), None);
    }
}
