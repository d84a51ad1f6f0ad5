//! Domain names: validating what users add, and finding which monitored domain a URL belongs to.

use super::{
    error::{SiteError, SiteResult},
    storage::entities::{SiteRecord, Sites},
};

/// Trims and lowercases user input.
pub fn normalize(domain: &str) -> String {
    domain.trim().to_lowercase()
}

/// Accepts `[a-z0-9.-]+` followed by a final all-letter label of at least two characters, e.g.
/// `news.example.co.uk`. Input is expected to be normalized already.
pub fn validate(domain: &str) -> SiteResult<()> {
    let Some((head, tld)) = domain.rsplit_once('.') else {
        return Err(SiteError::Validation(domain.to_string()));
    };
    let head_ok = !head.is_empty()
        && head
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '-');
    let tld_ok = tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_lowercase());
    if head_ok && tld_ok {
        Ok(())
    } else {
        Err(SiteError::Validation(domain.to_string()))
    }
}

/// First monitored domain contained in `url`, in domain order. Plain substring matching, so
/// `notyoutube.com` resolves to `youtube.com`.
pub fn resolve<'a>(url: &str, sites: &'a Sites) -> Option<(&'a str, &'a SiteRecord)> {
    sites
        .iter()
        .find(|(domain, _)| url.contains(domain.as_str()))
        .map(|(domain, record)| (domain.as_str(), record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sites(domains: &[&str]) -> Sites {
        domains
            .iter()
            .map(|d| (d.to_string(), SiteRecord::new(*d, 1000, "2024-03-10".into())))
            .collect()
    }

    #[test]
    fn validation() {
        for good in ["x.com", "new.example.com", "my-site.io", "123.ab", "a.b.c.org"] {
            assert!(validate(good).is_ok(), "{good}");
        }
        for bad in [
            "bad domain!",
            "example",
            "example.c",
            ".com",
            "example.c0m",
            "Example.com",
            "",
        ] {
            assert!(
                matches!(validate(bad), Err(SiteError::Validation(_))),
                "{bad}"
            );
        }
        assert!(validate(&normalize("  YouTube.COM ")).is_ok());
    }

    #[test]
    fn resolution_is_substring_first_match() {
        let sites = sites(&["netflix.com", "youtube.com"]);
        assert_eq!(
            resolve("https://www.youtube.com/watch?v=1", &sites).map(|v| v.0),
            Some("youtube.com")
        );
        assert_eq!(
            resolve("https://notyoutube.com/", &sites).map(|v| v.0),
            Some("youtube.com")
        );
        assert!(resolve("https://example.org/", &sites).is_none());
        assert!(resolve("https://YOUTUBE.COM/", &sites).is_none());
    }

    #[test]
    fn ambiguous_urls_resolve_deterministically() {
        let sites = sites(&["youtube.com", "tube.com"]);
        assert_eq!(
            resolve("https://www.youtube.com/", &sites).map(|v| v.0),
            Some("tube.com")
        );
    }
}
