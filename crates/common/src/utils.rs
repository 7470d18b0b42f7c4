use url::Url;

/// Extract domain from URL
pub fn extract_domain(url: &str) -> anyhow::Result<String> {
    Url::parse(url)?
        .host_str()
        .map(|h| h.to_string())
        .ok_or_else(|| anyhow::anyhow!("No host in URL"))
}

/// Return `url` with query parameter `name` set to `value`, replacing any
/// existing occurrences and keeping the other parameters in order.
pub fn with_query_param(url: &str, name: &str, value: &str) -> anyhow::Result<String> {
    let mut parsed = Url::parse(url)?;
    let retained: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(k, _)| k != name)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut pairs = parsed.query_pairs_mut();
        pairs.clear();
        for (k, v) in &retained {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(name, value);
    }

    Ok(parsed.into())
}

/// Read query parameter `name` from `url`, if present
pub fn query_param(url: &str, name: &str) -> Option<String> {
    Url::parse(url)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Resolve a possibly relative link against the page it was found on
pub fn absolutize(base: &str, href: &str) -> Option<String> {
    let base = Url::parse(base).ok()?;
    base.join(href.trim()).ok().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("https://example.com/path").unwrap(),
            "example.com"
        );
        assert_eq!(
            extract_domain("http://sub.example.com:8080/path").unwrap(),
            "sub.example.com"
        );
    }

    #[test]
    fn test_with_query_param_appends() {
        assert_eq!(
            with_query_param("https://jobs.test/search?q=rust", "page", "2").unwrap(),
            "https://jobs.test/search?q=rust&page=2"
        );
    }

    #[test]
    fn test_with_query_param_replaces() {
        assert_eq!(
            with_query_param("https://jobs.test/search?page=1&q=rust", "page", "2").unwrap(),
            "https://jobs.test/search?q=rust&page=2"
        );
    }

    #[test]
    fn test_query_param() {
        assert_eq!(
            query_param("https://jobs.test/?page=4", "page"),
            Some("4".to_string())
        );
        assert_eq!(query_param("https://jobs.test/", "page"), None);
        assert_eq!(query_param("not a url", "page"), None);
    }

    #[test]
    fn test_absolutize() {
        assert_eq!(
            absolutize("https://jobs.test/search?q=x", "/jobs/42").as_deref(),
            Some("https://jobs.test/jobs/42")
        );
        assert_eq!(
            absolutize("https://jobs.test/", "https://other.test/a").as_deref(),
            Some("https://other.test/a")
        );
    }
}
