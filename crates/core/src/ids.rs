#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const ID_ALPHABET: &[u8] = b"0123456789bcdfghjklmnpqrstvwxz";
const ID_SEQUENCE_SPAN: u64 = 1000;

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Base against which relative document identifiers are resolved.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BaseUri(String);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum BaseUriError {
    #[error("base uri must not be empty")]
    Empty,
    #[error("base uri must be an absolute http(s) uri")]
    NotAbsolute,
    #[error("base uri must not carry a query or fragment")]
    QueryOrFragment,
}

impl BaseUri {
    pub fn try_new(value: impl Into<String>) -> Result<Self, BaseUriError> {
        let mut value = value.into().trim().to_string();
        if value.is_empty() {
            return Err(BaseUriError::Empty);
        }
        if !(value.starts_with("http://") || value.starts_with("https://")) {
            return Err(BaseUriError::NotAbsolute);
        }
        if value.contains('?') || value.contains('#') {
            return Err(BaseUriError::QueryOrFragment);
        }
        if !value.ends_with('/') {
            value.push('/');
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(&self, id: &str) -> String {
        if is_absolute(id) {
            return id.to_string();
        }
        format!("{}{}", self.0, id.trim_start_matches('/'))
    }

    /// Returns the part of `iri` below this base, if it lives there.
    pub fn relativize<'a>(&self, iri: &'a str) -> Option<&'a str> {
        iri.strip_prefix(self.0.as_str())
    }
}

pub fn is_absolute(iri: &str) -> bool {
    let Some((scheme, _)) = iri.split_once(':') else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '+' | '-' | '.'))
}

/// Path component of an absolute `scheme://host/path` IRI; relative input is returned as-is.
pub fn path_of(iri: &str) -> &str {
    if !is_absolute(iri) {
        return iri;
    }
    let Some((_, rest)) = iri.split_once("://") else {
        return iri;
    };
    match rest.find('/') {
        Some(index) => &rest[index..],
        None => "/",
    }
}

/// Mints a short system id from the wall clock and a process-wide sequence.
pub fn generate_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| u64::try_from(duration.as_millis()).unwrap_or(u64::MAX / ID_SEQUENCE_SPAN))
        .unwrap_or_default();
    let sequence = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed) % ID_SEQUENCE_SPAN;
    encode_id(millis.saturating_mul(ID_SEQUENCE_SPAN).saturating_add(sequence))
}

fn encode_id(mut value: u64) -> String {
    let radix = ID_ALPHABET.len() as u64;
    let mut out = Vec::new();
    loop {
        out.push(ID_ALPHABET[(value % radix) as usize]);
        value /= radix;
        if value == 0 {
            break;
        }
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn base_uri_is_normalized_with_trailing_slash() {
        let base = BaseUri::try_new("https://id.example.org").unwrap();
        assert_eq!(base.as_str(), "https://id.example.org/");
        assert_eq!(BaseUri::try_new("").unwrap_err(), BaseUriError::Empty);
        assert_eq!(
            BaseUri::try_new("/relative/").unwrap_err(),
            BaseUriError::NotAbsolute
        );
    }

    #[test]
    fn resolve_and_relativize() {
        let base = BaseUri::try_new("https://id.example.org/").unwrap();
        assert_eq!(base.resolve("/abc"), "https://id.example.org/abc");
        assert_eq!(base.resolve("abc#it"), "https://id.example.org/abc#it");
        assert_eq!(base.resolve("http://other.org/x"), "http://other.org/x");
        assert_eq!(base.relativize("https://id.example.org/abc"), Some("abc"));
        assert_eq!(base.relativize("http://other.org/x"), None);
    }

    #[test]
    fn path_of_strips_scheme_and_host() {
        assert_eq!(path_of("https://id.example.org/bib/1"), "/bib/1");
        assert_eq!(path_of("https://id.example.org"), "/");
        assert_eq!(path_of("/bib/1"), "/bib/1");
        assert!(!is_absolute("/bib/1"));
        assert!(is_absolute("urn:isbn:123"));
    }

    #[test]
    fn generated_ids_are_unique_and_url_safe() {
        let ids: BTreeSet<String> = (0..500).map(|_| generate_id()).collect();
        assert_eq!(ids.len(), 500);
        assert!(ids.iter().all(|id| id.bytes().all(|b| ID_ALPHABET.contains(&b))));
    }
}
