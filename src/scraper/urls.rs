//! URL normalization, scope checks and pattern filtering.

use globset::{Glob, GlobMatcher};
use regex::Regex;
use tracing::warn;
use url::Url;

use crate::models::{ScopeMode, ScraperOptions};

/// Exclusions applied when the caller supplies none: archived and
/// localized doc trees plus repository boilerplate files.
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "*/archive/*",
    "*/archived/*",
    "*/deprecated/*",
    "*/_sources/*",
    "*CHANGELOG*",
    "*changelog*",
    "*LICENSE*",
    "*license*",
    "*CODE_OF_CONDUCT*",
    "*CONTRIBUTING*",
    r"/\/(zh|zh-cn|zh-tw|ja|ko|es|es-es|pt|pt-br|fr|de|it|ru|tr|pl|id|vi|nl|uk|ar|fa|he|th)(\/|$)/",
];

/// Normalization knobs used for `visited`-set identity.
#[derive(Debug, Clone, Copy)]
pub struct NormalizeOptions {
    /// Lowercase the whole normalized form.
    pub ignore_case: bool,
    pub remove_hash: bool,
    pub remove_trailing_slash: bool,
    pub remove_query: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            ignore_case: true,
            remove_hash: true,
            remove_trailing_slash: true,
            remove_query: false,
        }
    }
}

/// Canonical form of a URL for dedup purposes. Unparseable input is
/// returned trimmed so it still gets a stable identity.
pub fn normalize_url(url: &str, opts: &NormalizeOptions) -> String {
    let Ok(mut parsed) = Url::parse(url.trim()) else {
        return url.trim().to_string();
    };
    if opts.remove_hash {
        parsed.set_fragment(None);
    }
    if opts.remove_query {
        parsed.set_query(None);
    }
    let mut out = parsed.to_string();
    if opts.remove_trailing_slash {
        // Keep the root slash: https://host/ stays as-is.
        if out.ends_with('/') && parsed.path() != "/" {
            out.pop();
        }
    }
    if opts.ignore_case {
        out = out.to_lowercase();
    }
    out
}

/// Registrable domain approximated as the last two host labels.
fn registrable_domain(host: &str) -> String {
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

/// Directory prefix of a base path: everything up to the last `/`.
fn directory_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..=idx],
        None => "/",
    }
}

/// Scope reachability check.
pub fn is_in_scope(base: &Url, url: &Url, scope: ScopeMode) -> bool {
    let (Some(base_host), Some(url_host)) = (base.host_str(), url.host_str()) else {
        return false;
    };
    match scope {
        ScopeMode::Subpages => {
            base.scheme() == url.scheme()
                && base_host.eq_ignore_ascii_case(url_host)
                && base.port_or_known_default() == url.port_or_known_default()
                && url.path().starts_with(directory_of(base.path()))
        }
        ScopeMode::Hostname => base_host.eq_ignore_ascii_case(url_host),
        ScopeMode::Domain => {
            registrable_domain(&base_host.to_lowercase())
                == registrable_domain(&url_host.to_lowercase())
        }
    }
}

enum Matcher {
    Regex(Regex),
    Glob(GlobMatcher),
}

impl Matcher {
    /// `/…/`-wrapped entries are regex, anything else a glob.
    fn parse(pattern: &str) -> Option<Self> {
        if let Some(body) = pattern
            .strip_prefix('/')
            .and_then(|p| p.strip_suffix('/'))
            .filter(|b| !b.is_empty())
        {
            match Regex::new(body) {
                Ok(re) => return Some(Self::Regex(re)),
                Err(e) => {
                    warn!(pattern, %e, "invalid regex pattern, ignoring");
                    return None;
                }
            }
        }
        match Glob::new(pattern) {
            Ok(glob) => Some(Self::Glob(glob.compile_matcher())),
            Err(e) => {
                warn!(pattern, %e, "invalid glob pattern, ignoring");
                None
            }
        }
    }

    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Self::Regex(re) => re.is_match(candidate),
            Self::Glob(glob) => glob.is_match(candidate),
        }
    }
}

/// Compiled include/exclude sets for one scrape.
pub struct UrlPatternFilter {
    includes: Vec<Matcher>,
    excludes: Vec<Matcher>,
}

impl UrlPatternFilter {
    /// Build from scrape options. Without user excludes the built-in
    /// defaults apply; includes default to match-everything.
    pub fn from_options(options: &ScraperOptions) -> Self {
        let includes = options
            .include_patterns
            .as_deref()
            .unwrap_or_default()
            .iter()
            .filter_map(|p| Matcher::parse(p))
            .collect();
        let excludes = match options.exclude_patterns.as_deref() {
            Some(user) => user.iter().filter_map(|p| Matcher::parse(p)).collect(),
            None => DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .filter_map(|p| Matcher::parse(p))
                .collect(),
        };
        Self { includes, excludes }
    }

    /// Candidate strings a pattern may match against: the full URL, the
    /// path, and for `file://` also the basename.
    fn candidates(url: &Url) -> Vec<String> {
        let mut candidates = vec![url.to_string(), url.path().to_string()];
        if url.scheme() == "file" {
            if let Some(name) = url.path().rsplit('/').next() {
                if !name.is_empty() {
                    candidates.push(name.to_string());
                }
            }
        }
        candidates
    }

    /// Exclude wins; with no includes everything else is allowed.
    pub fn allows(&self, url: &Url) -> bool {
        let candidates = Self::candidates(url);
        if self
            .excludes
            .iter()
            .any(|m| candidates.iter().any(|c| m.is_match(c)))
        {
            return false;
        }
        if self.includes.is_empty() {
            return true;
        }
        self.includes
            .iter()
            .any(|m| candidates.iter().any(|c| m.is_match(c)))
    }
}

/// Combined decision: scope first, then patterns.
pub fn should_process_url(
    url: &Url,
    base: &Url,
    options: &ScraperOptions,
    filter: &UrlPatternFilter,
) -> bool {
    if !is_in_scope(base, url, options.scope) {
        return false;
    }
    filter.allows(url)
}
