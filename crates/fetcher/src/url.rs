//! URL helpers: GitHub blob links and file names derived from URLs.

use std::borrow::Cow;

/// Marker of a Google Drive "shared file" link. Links containing it always
/// go through fuzzy file-id resolution.
pub const DRIVE_FILE_LINK: &str = "https://drive.google.com/file/d/";

/// Rewrite a GitHub "blob" page link to its raw-content equivalent.
///
/// `https://github.com/org/repo/blob/main/data.zip` becomes
/// `https://raw.githubusercontent.com/org/repo/main/data.zip`. Anything that
/// is not a GitHub blob link is returned untouched.
pub fn github_raw_url(url: &str) -> Cow<'_, str> {
    if url.starts_with("https://github.com/") && url.contains("blob") {
        Cow::Owned(
            url.replace("github.com", "raw.githubusercontent.com")
                .replace("blob/", ""),
        )
    } else {
        Cow::Borrowed(url)
    }
}

/// Whether the URL is a Google Drive shared-file link.
pub fn is_drive_file_link(url: &str) -> bool {
    url.contains(DRIVE_FILE_LINK)
}

/// Last path segment of a URL, ignoring query string and fragment.
///
/// Returns `None` when the URL ends with a slash or has no path.
pub fn url_basename(url: &str) -> Option<String> {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    let path = match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path)?,
        None => without_query,
    };
    path.rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_blob_rewritten() {
        assert_eq!(
            github_raw_url("https://github.com/org/repo/blob/main/data.zip"),
            "https://raw.githubusercontent.com/org/repo/main/data.zip"
        );
    }

    #[test]
    fn test_non_matching_urls_pass_through() {
        for url in [
            "https://example.com/blob/main/data.zip",
            "http://github.com/org/repo/blob/main/data.zip",
            "https://github.com/org/repo/releases/download/v1/data.zip",
            "not a url",
            "",
        ] {
            assert!(matches!(github_raw_url(url), Cow::Borrowed(_)));
            assert_eq!(github_raw_url(url), url);
        }
    }

    #[test]
    fn test_drive_link_detection() {
        assert!(is_drive_file_link(
            "https://drive.google.com/file/d/1abc/view?usp=sharing"
        ));
        assert!(!is_drive_file_link("https://drive.google.com/uc?id=1abc"));
    }

    #[test]
    fn test_url_basename() {
        assert_eq!(
            url_basename("https://host/a/b/data.tar.gz?token=1#frag").as_deref(),
            Some("data.tar.gz")
        );
        assert_eq!(url_basename("https://host/dir/"), None);
        assert_eq!(url_basename("https://host"), None);
        assert_eq!(url_basename("relative/file.zip").as_deref(), Some("file.zip"));
    }
}
