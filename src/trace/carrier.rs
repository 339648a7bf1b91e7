//! Carrier construction and the extraction fallback policy.

use std::collections::HashMap;
use std::str::FromStr;

use http::{HeaderMap, HeaderName, HeaderValue};
use opentelemetry::propagation::{Extractor, Injector};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;

use crate::error::ExtractError;

/// String-keyed map carrying a trace context, derived from request headers.
///
/// Keys are canonicalized to lower-case, dash-separated names. Gateway-style
/// inputs (`HTTP_TRACEPARENT`) are accepted through [`Carrier::from_pairs`],
/// which also strips the `http-` transport prefix.
#[derive(Clone, Debug, Default)]
pub struct Carrier {
    entries: HashMap<String, String>,
    /// Names whose values could not be read as strings.
    unreadable: Vec<String>,
}

impl Carrier {
    /// Build a carrier from an HTTP header map. Header names are already
    /// canonical; values that are not valid strings are remembered so
    /// extraction can reject the carrier if they matter.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let mut carrier = Self::default();
        for (name, value) in headers {
            match value.to_str() {
                Ok(value) => {
                    carrier
                        .entries
                        .insert(name.as_str().to_owned(), value.to_owned());
                }
                Err(_) => carrier.unreadable.push(name.as_str().to_owned()),
            }
        }
        carrier
    }

    /// Build a carrier from raw key/value pairs, normalizing keys the way
    /// CGI-style gateways mangle them: lower-case, `_` becomes `-`, and a
    /// leading `http-` transport prefix is dropped.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut carrier = Self::default();
        for (key, value) in pairs {
            carrier
                .entries
                .insert(normalize_key(key.as_ref()), value.into());
        }
        carrier
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Try to extract a parent trace context through the globally installed
    /// propagator.
    ///
    /// Returns `Ok(None)` when the carrier holds no propagation fields at
    /// all; errors classify carriers that hold propagation fields which are
    /// unreadable or do not decode to a valid span context. Callers recover
    /// from every failure by starting a root span.
    pub fn extract(&self) -> Result<Option<Context>, ExtractError> {
        opentelemetry::global::get_text_map_propagator(|propagator| {
            if propagator
                .fields()
                .any(|field| self.unreadable.iter().any(|name| name == field))
            {
                return Err(ExtractError::InvalidCarrier);
            }
            if !propagator
                .fields()
                .any(|field| self.entries.contains_key(field))
            {
                return Ok(None);
            }

            let context = propagator.extract(self);
            if context.span().span_context().is_valid() {
                Ok(Some(context))
            } else {
                Err(ExtractError::SpanContextCorrupted)
            }
        })
    }
}

impl Extractor for Carrier {
    fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }
}

fn normalize_key(key: &str) -> String {
    let key = key.to_ascii_lowercase().replace('_', "-");
    match key.strip_prefix("http-") {
        Some(stripped) => stripped.to_owned(),
        None => key,
    }
}

/// Writes propagation fields into an outgoing header map.
pub struct HeaderInjector<'a>(pub &'a mut HeaderMap);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        if let (Ok(name), Ok(value)) = (HeaderName::from_str(key), HeaderValue::from_str(&value)) {
            self.0.insert(name, value);
        }
    }
}
