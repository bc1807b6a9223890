//! Canonicalization of external identifiers into stable matching keys.
//!
//! Everything here is a pure function over strings: no I/O, no state.
//! These keys feed the identifier index and the entity resolver, so any
//! change to a normalization rule silently re-partitions the whole graph.
//! Normalized forms are used for *matching only*; display fields always
//! store the raw value.

use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use regex::Regex;

// Compile-once patterns via OnceLock.
fn linkedin_slug_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"linkedin\.com/in/([^/?#]+)").unwrap())
}

fn github_path_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"github\.com/([^/?#\s]+)").unwrap())
}

fn github_owner_repo_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"github\.com[/:]([^/?#\s]+)/([^/?#\s]+)").unwrap())
}

/// Legal/marketing suffixes stripped when matching company names.
const COMPANY_SUFFIXES: &[&str] = &[
    "labs", "lab", "inc", "llc", "ltd", "corp", "corporation", "limited",
    "network", "protocol", "technologies", "tech", "group", "foundation",
    "ventures", "capital", "crypto",
];

/// GitHub path segments that are site features, not usernames.
const GITHUB_SENTINEL_PATHS: &[&str] = &[
    "orgs", "organizations", "repos", "settings", "tab", "overview", "from",
    "explore", "features", "topics", "sponsors", "marketplace", "search",
    "login", "about", "pricing", "contact",
];

/// Email domains treated as personal rather than work addresses.
pub const PERSONAL_EMAIL_DOMAINS: &[&str] = &[
    "gmail.com", "yahoo.com", "hotmail.com", "outlook.com", "icloud.com",
    "protonmail.com", "proton.me", "aol.com", "me.com", "live.com",
];

/// Jaccard similarity above which two person names are treated as the same.
pub const NAME_SIMILARITY_THRESHOLD: f64 = 0.8;

/// Jaccard similarity above which two company names are fuzzy-equal.
pub const COMPANY_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Normalize a LinkedIn profile URL to its canonical matching form.
///
/// `https://www.LinkedIn.com/in/Ada-Lovelace/?src=x` → `linkedin.com/in/ada-lovelace`.
/// Percent-encoded slugs are decoded so `%c3%a1lvaro` and its unencoded twin
/// normalize identically. Returns `None` when the URL has no `/in/<slug>`
/// component (company pages, feed URLs, garbage).
pub fn normalize_linkedin_url(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let lowered = url.to_lowercase();
    let decoded = percent_decode_str(&lowered)
        .decode_utf8()
        .map(|c| c.into_owned())
        .unwrap_or(lowered);

    let mut rest = decoded.as_str();
    rest = rest.strip_prefix("https://").unwrap_or(rest);
    rest = rest.strip_prefix("http://").unwrap_or(rest);
    rest = rest.strip_prefix("www.").unwrap_or(rest);
    let rest = rest.trim_end_matches('/');

    let captures = linkedin_slug_re().captures(rest)?;
    let slug = captures.get(1)?.as_str();
    if slug.is_empty() {
        return None;
    }

    Some(format!("linkedin.com/in/{slug}"))
}

/// Lowercase and trim an email address; `None` when structurally invalid.
pub fn normalize_email(email: &str) -> Option<String> {
    let email = email.trim().to_lowercase();
    if !validate_email(&email) {
        return None;
    }
    Some(email)
}

/// Minimal structural validation: one `@`, dot in the domain part.
pub fn validate_email(email: &str) -> bool {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.'),
        None => false,
    }
}

/// Classify an email as `personal` or `work` by its domain.
pub fn infer_email_type(email: &str) -> &'static str {
    let domain = email.rsplit('@').next().unwrap_or("").to_lowercase();
    if PERSONAL_EMAIL_DOMAINS.contains(&domain.as_str()) {
        "personal"
    } else {
        "work"
    }
}

/// Normalize a company name for matching: lowercase, strip one trailing
/// legal suffix, drop punctuation, collapse whitespace.
///
/// Matching only; the stored `company_name` keeps its raw form.
pub fn normalize_company_name(name: &str) -> String {
    let mut name = name.trim().to_lowercase();

    // Strip a single trailing suffix token ("Aave Labs" → "aave"), including
    // a trailing period ("Corp.").
    if let Some(last_space) = name.rfind(' ') {
        let tail = name[last_space + 1..].trim_end_matches('.');
        if COMPANY_SUFFIXES.contains(&tail) {
            name.truncate(last_space);
        }
    }

    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Alphanumeric-collapsed form used for fuzzy joins: `"Uniswap Labs!"` → `"uniswaplabs"`.
pub fn normalize_alphanum(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric())
        .collect::<String>()
        .to_lowercase()
}

/// A company name is storable when it is non-empty, at least 3 chars, and
/// not a bare legal suffix ("Labs", "Inc.").
pub fn is_valid_company_name(name: &str) -> bool {
    let trimmed = name.trim();
    if trimmed.len() < 3 {
        return false;
    }
    let lowered = trimmed.trim_end_matches('.').to_lowercase();
    if COMPANY_SUFFIXES.contains(&lowered.as_str()) {
        return false;
    }
    !normalize_company_name(trimmed).is_empty()
}

/// Extract a GitHub username from a profile URL, rejecting sentinel paths.
pub fn extract_github_username(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() {
        return None;
    }

    let lowered = url.to_lowercase();
    let captures = github_path_re().captures(&lowered)?;
    let username = captures.get(1)?.as_str();

    if username.is_empty() || GITHUB_SENTINEL_PATHS.contains(&username) {
        return None;
    }

    Some(username.to_string())
}

/// Extract a GitHub organization slug from a free-text VC-portfolio field.
///
/// These fields mix real URLs with prose ("No official organization found")
/// and long research notes. Only strings that actually contain
/// `github.com/<slug>` are accepted; anything over 200 chars is a text blob.
pub fn extract_github_org(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.len() > 200 {
        return None;
    }
    if !value.to_lowercase().contains("github.com/") {
        return None;
    }
    extract_github_username(value)
}

/// Extract `(owner, repo)` from a GitHub repository URL.
pub fn extract_owner_repo(repo_url: &str) -> Option<(String, String)> {
    // The sentinel check rejects site-feature paths before the split
    let owner = extract_github_username(repo_url)?;
    let lowered = repo_url.trim().to_lowercase();
    let captures = github_owner_repo_re().captures(&lowered)?;
    let repo = captures.get(2)?.as_str().trim_end_matches(".git");
    if repo.is_empty() {
        return None;
    }
    Some((owner, repo.to_string()))
}

/// Jaccard similarity over the character sets of two lowercased,
/// space-stripped names. Coarse, but cheap and order-insensitive; thresholds
/// live in [`NAME_SIMILARITY_THRESHOLD`] / [`COMPANY_SIMILARITY_THRESHOLD`].
pub fn name_similarity(a: &str, b: &str) -> f64 {
    let set_a: std::collections::HashSet<char> =
        a.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    let set_b: std::collections::HashSet<char> =
        b.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();

    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f64 / union as f64
}

/// Edit-distance similarity for short strings where character-set Jaccard is
/// too forgiving (anagram names).
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(&a.to_lowercase(), &b.to_lowercase())
}

/// Fuzzy company-name equality for merge candidacy: Jaccard at the company
/// threshold over the normalized forms, with an edit-distance floor so
/// anagram collisions don't merge.
pub fn company_names_fuzzy_equal(a: &str, b: &str) -> bool {
    let norm_a = normalize_company_name(a);
    let norm_b = normalize_company_name(b);
    if norm_a.is_empty() || norm_b.is_empty() {
        return false;
    }
    if norm_a == norm_b {
        return true;
    }
    name_similarity(&norm_a, &norm_b) >= COMPANY_SIMILARITY_THRESHOLD
        && edit_similarity(&norm_a, &norm_b) >= 0.7
}

/// Placeholder domain for companies whose real domain is unknown.
/// Unique per normalized name; upgraded in place when a real domain arrives.
pub fn placeholder_domain(company_name: &str) -> String {
    let slug: String = normalize_alphanum(company_name).chars().take(50).collect();
    format!("{slug}.placeholder")
}

/// Whether a stored domain is a synthetic placeholder.
pub fn is_placeholder_domain(domain: &str) -> bool {
    domain.ends_with(".placeholder")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_linkedin_url_basic() {
        assert_eq!(
            normalize_linkedin_url("https://www.linkedin.com/in/john-smith/"),
            Some("linkedin.com/in/john-smith".to_string())
        );
    }

    #[test]
    fn test_normalize_linkedin_url_no_scheme() {
        assert_eq!(
            normalize_linkedin_url("linkedin.com/in/ada-lovelace"),
            Some("linkedin.com/in/ada-lovelace".to_string())
        );
    }

    #[test]
    fn test_normalize_linkedin_url_strips_query_and_tail() {
        assert_eq!(
            normalize_linkedin_url("https://linkedin.com/in/ada-lovelace/details/experience?src=x"),
            Some("linkedin.com/in/ada-lovelace".to_string())
        );
    }

    #[test]
    fn test_normalize_linkedin_url_decodes_percent_encoding() {
        let encoded = normalize_linkedin_url("linkedin.com/in/%c3%a1lvaro-g-68840515b");
        let plain = normalize_linkedin_url("linkedin.com/in/álvaro-g-68840515b");
        assert_eq!(encoded, plain);
        assert_eq!(encoded, Some("linkedin.com/in/álvaro-g-68840515b".to_string()));
    }

    #[test]
    fn test_normalize_linkedin_url_rejects_non_profile() {
        assert_eq!(normalize_linkedin_url("https://linkedin.com/company/acme"), None);
        assert_eq!(normalize_linkedin_url(""), None);
        assert_eq!(normalize_linkedin_url("https://example.com/in/foo"), None);
    }

    #[test]
    fn test_normalize_linkedin_url_idempotent() {
        let once = normalize_linkedin_url("https://www.linkedin.com/in/Ada-Lovelace/").unwrap();
        let twice = normalize_linkedin_url(&once).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_email() {
        assert_eq!(
            normalize_email("  John.Smith@Company.COM "),
            Some("john.smith@company.com".to_string())
        );
        assert_eq!(normalize_email("not-an-email"), None);
        assert_eq!(normalize_email("user@nodot"), None);
        assert_eq!(normalize_email(""), None);
    }

    #[test]
    fn test_infer_email_type() {
        assert_eq!(infer_email_type("ada@gmail.com"), "personal");
        assert_eq!(infer_email_type("ada@ae.com"), "work");
    }

    #[test]
    fn test_normalize_company_name_strips_suffix() {
        assert_eq!(normalize_company_name("Uniswap Labs"), "uniswap");
        assert_eq!(normalize_company_name("Aave Labs"), "aave");
        assert_eq!(normalize_company_name("Acme Corp."), "acme");
        assert_eq!(normalize_company_name("Polygon Technologies"), "polygon");
    }

    #[test]
    fn test_normalize_company_name_punctuation_and_spaces() {
        assert_eq!(normalize_company_name("  0x  Labs "), "0x");
        assert_eq!(normalize_company_name("A&B   Systems"), "a b systems");
    }

    #[test]
    fn test_normalize_alphanum() {
        assert_eq!(normalize_alphanum("Uniswap Labs!"), "uniswaplabs");
    }

    #[test]
    fn test_is_valid_company_name_rejects_bare_suffix() {
        assert!(!is_valid_company_name("Labs"));
        assert!(!is_valid_company_name("Inc."));
        assert!(!is_valid_company_name("ab"));
        assert!(!is_valid_company_name("  "));
        assert!(is_valid_company_name("Uniswap Labs"));
    }

    #[test]
    fn test_extract_github_username() {
        assert_eq!(
            extract_github_username("https://github.com/0age"),
            Some("0age".to_string())
        );
        assert_eq!(
            extract_github_username("github.com/transmissions11/solmate"),
            Some("transmissions11".to_string())
        );
        assert_eq!(extract_github_username("https://github.com/orgs/uniswap"), None);
        assert_eq!(extract_github_username("https://github.com/explore"), None);
        assert_eq!(extract_github_username("https://gitlab.com/someone"), None);
    }

    #[test]
    fn test_extract_github_org_rejects_prose() {
        assert_eq!(extract_github_org("No official organization found"), None);
        let blob = format!("github.com/x {}", "a".repeat(250));
        assert_eq!(extract_github_org(&blob), None);
        assert_eq!(
            extract_github_org("https://github.com/Uniswap"),
            Some("uniswap".to_string())
        );
    }

    #[test]
    fn test_extract_owner_repo() {
        assert_eq!(
            extract_owner_repo("https://github.com/Uniswap/v3-core"),
            Some(("uniswap".to_string(), "v3-core".to_string()))
        );
        assert_eq!(
            extract_owner_repo("https://github.com/foo/bar.git"),
            Some(("foo".to_string(), "bar".to_string()))
        );
        assert_eq!(extract_owner_repo("https://github.com/solo"), None);
    }

    #[test]
    fn test_name_similarity() {
        assert!(name_similarity("Ada Lovelace", "ada lovelace") > 0.99);
        assert!(name_similarity("Ada Lovelace", "Ada  Lovelace ") > 0.99);
        assert!(name_similarity("Ada Lovelace", "Grace Hopper") < NAME_SIMILARITY_THRESHOLD);
        assert_eq!(name_similarity("", "anything"), 0.0);
    }

    #[test]
    fn test_company_names_fuzzy_equal() {
        assert!(company_names_fuzzy_equal("Uniswap Labs", "Uniswap"));
        assert!(company_names_fuzzy_equal("MakerDAO", "Maker-DAO"));
        assert!(!company_names_fuzzy_equal("Aave", "Compound"));
        assert!(!company_names_fuzzy_equal("", "Aave"));
    }

    #[test]
    fn test_placeholder_domain() {
        assert_eq!(placeholder_domain("Analytical Engines"), "analyticalengines.placeholder");
        assert!(is_placeholder_domain("analyticalengines.placeholder"));
        assert!(!is_placeholder_domain("uniswap.org"));
    }
}
