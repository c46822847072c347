//! Feed a pipelined byte stream through the parser, chunk by chunk.

use std::collections::VecDeque;

use ringlet_http::{Feed, RequestParser};

fn main() {
    let wire = concat!(
        "POST /login HTTP/1.1\r\n",
        "Host: example.com\r\n",
        "Content-Length: 12\r\n",
        "\r\n",
        "user=a&pw=b!",
        "GET /dashboard?tab=2 HTTP/1.1\r\n",
        "Host: example.com\r\n",
        "\r\n",
    );

    // Simulate small socket reads.
    let mut pending: VecDeque<Vec<u8>> = wire.as_bytes().chunks(7).map(<[u8]>::to_vec).collect();

    let mut parser = RequestParser::new();
    while let Some(chunk) = pending.pop_front() {
        match parser.feed(chunk) {
            Feed::NeedMore => continue,
            Feed::Complete { request, leftover } => {
                println!("{} {:?} {}", request.method, request.target, request.version);
                for (name, value) in request.headers.iter() {
                    println!("  {name}: {value}");
                }
                if let Some(body) = &request.body {
                    println!("  body: {:?}", String::from_utf8_lossy(body));
                }
                // The leftover starts the next message.
                if !leftover.is_empty() {
                    pending.push_front(leftover.to_vec());
                }
                parser = RequestParser::new();
            }
            Feed::Failed => {
                println!("malformed request");
                break;
            }
        }
    }
}
