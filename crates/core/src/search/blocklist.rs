use url::Url;

/// Hosts whose listings are never accepted, matched on the host or any subdomain.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostBlocklist {
    domains: Vec<String>,
}

impl HostBlocklist {
    pub fn new<I, S>(domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let domains = domains
            .into_iter()
            .map(|domain| domain.as_ref().trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|domain| !domain.is_empty())
            .collect();
        Self { domains }
    }

    pub fn is_empty(&self) -> bool {
        self.domains.is_empty()
    }

    pub fn is_blocked_host(&self, host: &str) -> bool {
        let host = host.trim_end_matches('.').to_ascii_lowercase();
        self.domains.iter().any(|domain| {
            host == *domain
                || host.strip_suffix(domain.as_str()).is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    /// `false` for URLs without a host; those are rejected elsewhere.
    pub fn is_blocked_url(&self, url: &str) -> bool {
        listing_host(url).is_some_and(|host| self.is_blocked_host(&host))
    }
}

/// Host of an absolute http(s) URL.
pub fn listing_host(raw: &str) -> Option<String> {
    let parsed = Url::parse(raw.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    parsed.host_str().map(str::to_ascii_lowercase)
}
