//! Unified request parameters.
//!
//! # Responsibilities
//! - Merge query-string parameters (base) with body parameters (overlay)
//! - Decode the body lazily, at most once per instance
//! - Expose the result as an immutable map
//!
//! # Design Decisions
//! - Overlay entries overwrite base entries with the same key (body wins)
//! - Body tokens are split on `&` then on the first `=`; tokens without `=`
//!   are dropped and body values are not percent-decoded
//! - Equality, hashing and display use the realized map, never the raw inputs

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use axum::body::Bytes;
use axum::http::{header, HeaderMap};
use percent_encoding::percent_decode_str;
use serde::{Serialize, Serializer};

/// Character encodings understood for request bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Charset {
    #[default]
    Utf8,
    /// ISO-8859-1; also used for US-ASCII.
    Latin1,
}

impl Charset {
    /// Resolve a charset label, case-insensitively.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Charset::Utf8),
            "iso-8859-1" | "iso8859-1" | "latin1" | "us-ascii" | "ascii" => Some(Charset::Latin1),
            _ => None,
        }
    }

    /// Charset declared by a request's `Content-Type`, if recognised.
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let content_type = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
        content_type
            .split(';')
            .skip(1)
            .filter_map(|param| param.split_once('='))
            .find(|(name, _)| name.trim().eq_ignore_ascii_case("charset"))
            .and_then(|(_, value)| Charset::from_label(value))
    }

    fn decode(self, bytes: &[u8]) -> String {
        match self {
            Charset::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Charset::Latin1 => bytes.iter().map(|&b| b as char).collect(),
        }
    }
}

#[derive(Clone)]
enum Source {
    Realized,
    Body {
        content: Bytes,
        charset: Charset,
        base: HashMap<String, String>,
    },
}

/// Immutable parameter view over query string and body.
#[derive(Clone)]
pub struct HttpParams {
    source: Source,
    realized: OnceLock<HashMap<String, String>>,
}

impl HttpParams {
    /// Wrap an already-final parameter map.
    pub fn from_map(params: HashMap<String, String>) -> Self {
        Self {
            source: Source::Realized,
            realized: OnceLock::from(params),
        }
    }

    /// Wrap a raw body to be parsed on first access.
    ///
    /// `charset` defaults to UTF-8 and `base` to an empty map.
    pub fn new(
        content: Bytes,
        charset: Option<Charset>,
        base: Option<HashMap<String, String>>,
    ) -> Self {
        Self {
            source: Source::Body {
                content,
                charset: charset.unwrap_or_default(),
                base: base.unwrap_or_default(),
            },
            realized: OnceLock::new(),
        }
    }

    /// The merged parameter map.
    pub fn params(&self) -> &HashMap<String, String> {
        self.realized.get_or_init(|| match &self.source {
            Source::Body {
                content,
                charset,
                base,
            } => parse_params(&charset.decode(content), base),
            // from_map always initialises the cell
            Source::Realized => HashMap::new(),
        })
    }

    /// Value of one parameter.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.params().get(name).map(String::as_str)
    }

    /// Whether the body has been decoded yet.
    pub fn is_realized(&self) -> bool {
        self.realized.get().is_some()
    }

    fn sorted(&self) -> Vec<(&String, &String)> {
        let mut entries: Vec<_> = self.params().iter().collect();
        entries.sort();
        entries
    }
}

/// Split `text` on `&`, then each token on its first `=`, inserting the
/// pairs over a copy of `base`.
pub fn parse_params(text: &str, base: &HashMap<String, String>) -> HashMap<String, String> {
    let mut result = base.clone();
    for token in text.split('&') {
        if let Some((key, value)) = token.split_once('=') {
            result.insert(key.to_string(), value.to_string());
        }
    }
    result
}

/// Base parameters of a raw request target.
///
/// The query part (after the first `?`) is URL-decoded as a whole and then
/// parsed like a body. A target without `?` has no base parameters.
pub fn query_params(target: &str) -> HashMap<String, String> {
    match target.split_once('?') {
        None => HashMap::new(),
        Some((_, query)) => {
            let query = query.replace('+', " ");
            let decoded = percent_decode_str(&query).decode_utf8_lossy();
            parse_params(&decoded, &HashMap::new())
        }
    }
}

impl PartialEq for HttpParams {
    fn eq(&self, other: &Self) -> bool {
        self.params() == other.params()
    }
}

impl Eq for HttpParams {}

impl PartialEq<HashMap<String, String>> for HttpParams {
    fn eq(&self, other: &HashMap<String, String>) -> bool {
        self.params() == other
    }
}

impl Hash for HttpParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sorted().hash(state);
    }
}

impl fmt::Display for HttpParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, value)) in self.sorted().into_iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        write!(f, "}}")
    }
}

impl fmt::Debug for HttpParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.sorted()).finish()
    }
}

impl Serialize for HttpParams {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.params().serialize(serializer)
    }
}
