//! End-to-end parse properties: serialize→parse identity, chunk-boundary
//! invariance, and pipelined leftovers.

use ringlet_http::{Feed, Method, Request, RequestParser, RequestTarget};

/// Render a request back to wire format. Queries and paths in these
/// fixtures avoid characters that percent-decoding would rewrite.
fn serialize(request: &Request) -> String {
    let target = match &request.target {
        RequestTarget::Origin { path, query } if query.is_empty() => path.clone(),
        RequestTarget::Origin { path, query } => format!("{path}?{query}"),
        RequestTarget::Absolute {
            scheme,
            authority,
            path,
            query,
        } => {
            let mut out = format!("{scheme}://{authority}{path}");
            if !query.is_empty() {
                out.push('?');
                out.push_str(query);
            }
            out
        }
    };

    let mut wire = format!("{} {} {}\r\n", request.method, target, request.version);
    for (name, value) in request.headers.iter() {
        wire.push_str(&format!("{name}: {value}\r\n"));
    }
    wire.push_str("\r\n");
    if let Some(body) = &request.body {
        wire.push_str(std::str::from_utf8(body).unwrap());
    }
    wire
}

fn parse_whole(wire: &str) -> (Request, bytes::Bytes) {
    match RequestParser::new().feed(wire.as_bytes().to_vec()) {
        Feed::Complete { request, leftover } => (request, leftover),
        other => panic!("expected Complete, got {other:?}"),
    }
}

fn fixtures() -> Vec<Request> {
    let mut simple = Request {
        method: Method::Get,
        target: RequestTarget::Origin {
            path: "/".into(),
            query: String::new(),
        },
        version: "HTTP/1.1".into(),
        headers: Default::default(),
        body: None,
    };
    simple.headers.insert("Host".into(), "example.com".into());

    let mut with_query = Request {
        method: Method::Delete,
        target: RequestTarget::Origin {
            path: "/items/42".into(),
            query: "force=true&cascade=no".into(),
        },
        version: "HTTP/1.1".into(),
        headers: Default::default(),
        body: None,
    };
    with_query.headers.insert("Host".into(), "h".into());
    with_query.headers.insert("Accept".into(), "text/html".into());

    let mut with_body = Request {
        method: Method::Post,
        target: RequestTarget::Origin {
            path: "/submit".into(),
            query: String::new(),
        },
        version: "HTTP/1.1".into(),
        headers: Default::default(),
        body: Some(bytes::Bytes::from_static(b"name=value")),
    };
    with_body.headers.insert("Host".into(), "h".into());
    with_body
        .headers
        .insert("Content-Length".into(), "10".into());

    let mut absolute = Request {
        method: Method::Options,
        target: RequestTarget::Absolute {
            scheme: "http".into(),
            authority: "proxy.example:3128".into(),
            path: "/upstream".into(),
            query: "v=1".into(),
        },
        version: "HTTP/1.1".into(),
        headers: Default::default(),
        body: None,
    };
    absolute.headers.insert("Host".into(), "proxy.example".into());

    vec![simple, with_query, with_body, absolute]
}

#[test]
fn parse_of_serialize_is_identity() {
    for request in fixtures() {
        let wire = serialize(&request);
        let (parsed, leftover) = parse_whole(&wire);
        assert_eq!(parsed, request, "round trip failed for {wire:?}");
        assert!(leftover.is_empty());
    }
}

#[test]
fn chunking_never_changes_the_result() {
    for request in fixtures() {
        let wire = serialize(&request);
        let (reference, _) = parse_whole(&wire);

        // Every split position of the wire bytes into two chunks.
        for split in 0..=wire.len() {
            let mut parser = RequestParser::new();
            let mut outcome = None;
            for chunk in [&wire[..split], &wire[split..]] {
                match parser.feed(chunk.as_bytes().to_vec()) {
                    Feed::NeedMore => continue,
                    Feed::Complete { request, .. } => {
                        outcome = Some(request);
                        break;
                    }
                    Feed::Failed => panic!("split at {split} failed for {wire:?}"),
                }
            }
            assert_eq!(outcome.expect("incomplete"), reference, "split at {split}");
        }
    }
}

#[test]
fn consumed_plus_leftover_equals_input() {
    let first = "POST /a HTTP/1.1\r\nHost: h\r\nContent-Length: 3\r\n\r\nabc";
    let second = "GET /b HTTP/1.1\r\nHost: h\r\n\r\n";
    let wire = format!("{first}{second}");

    let (request_a, leftover) = parse_whole(&wire);
    assert_eq!(request_a.method, Method::Post);
    assert_eq!(request_a.body.as_deref(), Some(b"abc".as_slice()));
    // Everything the first parse did not consume is the second request.
    assert_eq!(&leftover[..], second.as_bytes());

    let mut parser = RequestParser::new();
    match parser.feed(leftover) {
        Feed::Complete { request, leftover } => {
            assert_eq!(request.method, Method::Get);
            assert_eq!(
                request.target,
                RequestTarget::Origin {
                    path: "/b".into(),
                    query: String::new(),
                }
            );
            assert!(leftover.is_empty());
        }
        other => panic!("second request did not parse: {other:?}"),
    }
}

#[test]
fn trailing_bytes_survive_verbatim() {
    let wire = "GET / HTTP/1.1\r\nHost: h\r\n\r\n\x00\x01binary tail";
    let mut parser = RequestParser::new();
    match parser.feed(wire.as_bytes().to_vec()) {
        Feed::Complete { leftover, .. } => {
            assert_eq!(&leftover[..], b"\x00\x01binary tail");
        }
        other => panic!("unexpected {other:?}"),
    }
}
