use url::Url;

/// Resolves a raw href captured from the listing DOM (or an iframe `src`)
/// against the page it was found on.
///
/// Protocol-relative hrefs (`//host/path`) always resolve to `https:`,
/// matching how the source site serves its image and bridge links. An empty
/// or unparsable href resolves to `None`; the caller records the skip.
pub fn resolve_href(base: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.is_empty() {
        return None;
    }

    if let Some(rest) = href.strip_prefix("//") {
        return Url::parse(&format!("https://{rest}"))
            .ok()
            .map(|u| u.to_string());
    }

    let base = Url::parse(base).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}
