//! The parsed request model: method, target, headers, body.

use std::fmt;

use bytes::Bytes;

use crate::grammar;

/// Request method. Unknown methods fail the parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Options,
    Trace,
    Connect,
    Patch,
}

impl Method {
    pub fn from_bytes(s: &[u8]) -> Option<Method> {
        match s {
            b"GET" => Some(Method::Get),
            b"HEAD" => Some(Method::Head),
            b"POST" => Some(Method::Post),
            b"PUT" => Some(Method::Put),
            b"DELETE" => Some(Method::Delete),
            b"OPTIONS" => Some(Method::Options),
            b"TRACE" => Some(Method::Trace),
            b"CONNECT" => Some(Method::Connect),
            b"PATCH" => Some(Method::Patch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Options => "OPTIONS",
            Method::Trace => "TRACE",
            Method::Connect => "CONNECT",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The request target. Paths are stored percent-decoded; queries are
/// validated but stored raw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestTarget {
    /// A target beginning with `/`: path plus optional query.
    Origin { path: String, query: String },
    /// An absolute-URI target (`scheme://authority/path?query`).
    Absolute {
        scheme: String,
        authority: String,
        path: String,
        query: String,
    },
}

impl RequestTarget {
    pub(crate) fn parse(s: &[u8]) -> Option<RequestTarget> {
        if s.first() == Some(&b'/') {
            return match s.iter().position(|&b| b == b'?') {
                None => Some(RequestTarget::Origin {
                    path: grammar::decode_absolute_path(s)?,
                    query: String::new(),
                }),
                Some(pos) => {
                    let path = grammar::decode_absolute_path(&s[..pos])?;
                    let query = &s[pos + 1..];
                    if !grammar::is_valid_query(query) {
                        return None;
                    }
                    Some(RequestTarget::Origin {
                        path,
                        query: String::from_utf8(query.to_vec()).ok()?,
                    })
                }
            };
        }
        Self::parse_absolute(s)
    }

    /// absolute-form: `scheme "://" authority [path] ["?" query]`.
    fn parse_absolute(s: &[u8]) -> Option<RequestTarget> {
        let scheme_end = s.windows(3).position(|w| w == b"://")?;
        let scheme = &s[..scheme_end];
        if scheme.is_empty() || !scheme[0].is_ascii_alphabetic() {
            return None;
        }
        if !scheme
            .iter()
            .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.')
        {
            return None;
        }

        let rest = &s[scheme_end + 3..];
        let auth_end = rest
            .iter()
            .position(|&b| b == b'/' || b == b'?')
            .unwrap_or(rest.len());
        let authority = &rest[..auth_end];
        if authority.is_empty() {
            return None;
        }
        if !authority
            .iter()
            .all(|&b| grammar::is_absolute_path_char(b) && b != b'/')
        {
            return None;
        }

        let rest = &rest[auth_end..];
        let (raw_path, raw_query) = match rest.iter().position(|&b| b == b'?') {
            Some(pos) => (&rest[..pos], &rest[pos + 1..]),
            None => (rest, &rest[rest.len()..]),
        };
        let path = grammar::decode_absolute_path(raw_path)?;
        if !grammar::is_valid_query(raw_query) {
            return None;
        }

        Some(RequestTarget::Absolute {
            scheme: String::from_utf8(scheme.to_vec()).ok()?,
            authority: String::from_utf8(authority.to_vec()).ok()?,
            path,
            query: String::from_utf8(raw_query.to_vec()).ok()?,
        })
    }
}

/// Header fields. Names compare case-insensitively but are stored
/// verbatim; insertion order is preserved for iteration only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    pub fn insert(&mut self, name: String, value: String) {
        self.entries.push((name, value));
    }

    /// First value whose field-name matches `name` case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }
}

/// A fully parsed request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    pub target: RequestTarget,
    /// The version token, retained verbatim.
    pub version: String,
    pub headers: Headers,
    /// Present iff a `Content-Length` header with a value `> 0` was seen.
    pub body: Option<Bytes>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_methods_round_trip() {
        for name in [
            "GET", "HEAD", "POST", "PUT", "DELETE", "OPTIONS", "TRACE", "CONNECT", "PATCH",
        ] {
            let method = Method::from_bytes(name.as_bytes()).unwrap();
            assert_eq!(method.as_str(), name);
        }
    }

    #[test]
    fn unknown_method_rejected() {
        assert_eq!(Method::from_bytes(b"FOO"), None);
        assert_eq!(Method::from_bytes(b"get"), None);
        assert_eq!(Method::from_bytes(b""), None);
    }

    #[test]
    fn origin_form_without_query() {
        assert_eq!(
            RequestTarget::parse(b"/a/b"),
            Some(RequestTarget::Origin {
                path: "/a/b".into(),
                query: String::new(),
            })
        );
    }

    #[test]
    fn origin_form_with_query() {
        assert_eq!(
            RequestTarget::parse(b"/p?x=1&y=2"),
            Some(RequestTarget::Origin {
                path: "/p".into(),
                query: "x=1&y=2".into(),
            })
        );
    }

    #[test]
    fn origin_form_decodes_path() {
        assert_eq!(
            RequestTarget::parse(b"/hello%20world"),
            Some(RequestTarget::Origin {
                path: "/hello world".into(),
                query: String::new(),
            })
        );
    }

    #[test]
    fn origin_form_rejects_bad_escape() {
        assert_eq!(RequestTarget::parse(b"/bad%zz"), None);
        assert_eq!(RequestTarget::parse(b"/p?bad%2"), None);
    }

    #[test]
    fn absolute_form() {
        assert_eq!(
            RequestTarget::parse(b"http://example.com/p?q=1"),
            Some(RequestTarget::Absolute {
                scheme: "http".into(),
                authority: "example.com".into(),
                path: "/p".into(),
                query: "q=1".into(),
            })
        );
    }

    #[test]
    fn absolute_form_bare_authority() {
        assert_eq!(
            RequestTarget::parse(b"http://example.com:8080"),
            Some(RequestTarget::Absolute {
                scheme: "http".into(),
                authority: "example.com:8080".into(),
                path: String::new(),
                query: String::new(),
            })
        );
    }

    #[test]
    fn absolute_form_rejects_junk() {
        assert_eq!(RequestTarget::parse(b"example.com"), None);
        assert_eq!(RequestTarget::parse(b"1http://x/"), None);
        assert_eq!(RequestTarget::parse(b"http://"), None);
        assert_eq!(RequestTarget::parse(b"*"), None);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = Headers::default();
        headers.insert("Content-Length".into(), "5".into());
        assert_eq!(headers.get("content-length"), Some("5"));
        assert_eq!(headers.get("CONTENT-LENGTH"), Some("5"));
        assert_eq!(headers.get("Host"), None);
        // stored verbatim
        assert_eq!(headers.iter().next(), Some(("Content-Length", "5")));
    }
}
