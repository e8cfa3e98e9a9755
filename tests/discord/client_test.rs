//! Channel history parsing and the REST client against a scripted server.

use std::sync::{Arc, Mutex};

use mcrelay::discord::{ChatTransport, DiscordClient, DiscordError, MessagePage};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const HISTORY: &str = r#"[
  {
    "id": "1003",
    "content": "second",
    "author": {"id": "42", "username": "alex", "global_name": "Alex"},
    "attachments": [{"id": "9", "filename": "cat.png"}],
    "referenced_message": {
      "id": "1001",
      "content": "first",
      "author": {"id": "43", "username": "steve", "global_name": null},
      "attachments": []
    }
  },
  {"id": "1004", "content": "relayed", "author": {"id": "7", "username": "relay", "bot": true}},
  {"id": "1002", "content": "hello", "author": {"id": "43", "username": "steve"}},
  {"id": "1005", "content": "mine", "author": {"id": "99", "username": "me"}}
]"#;

#[test]
fn page_is_sorted_and_filtered() {
    let page = MessagePage::parse(HISTORY, Some("99")).expect("parse");
    assert_eq!(page.newest_id, Some(1005));

    let ids: Vec<u64> = page.messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![1002, 1003]);

    let reply = &page.messages[1];
    assert_eq!(reply.author, "Alex");
    assert!(reply.has_attachments);
    let quote = reply.reference.as_ref().expect("reference");
    assert_eq!(quote.author.as_deref(), Some("steve"));
    assert_eq!(quote.content, "first");
    assert!(!quote.has_attachments);
}

#[test]
fn empty_page_has_no_cursor() {
    let page = MessagePage::parse("[]", None).expect("parse");
    assert!(page.messages.is_empty());
    assert_eq!(page.newest_id, None);
}

#[test]
fn non_array_payload_is_a_parse_error() {
    let err = MessagePage::parse(r#"{"message": "401: Unauthorized"}"#, None)
        .expect_err("object is not a page");
    assert!(matches!(err, DiscordError::Parse(_)));
}

#[test]
fn bad_api_base_is_rejected() {
    let err = DiscordClient::new("not a url", 1, "token").expect_err("invalid url");
    assert!(matches!(err, DiscordError::Url(_)));
}

#[test]
fn debug_output_hides_token() {
    let client = DiscordClient::new("http://127.0.0.1:1/api", 5, "secret-token").expect("client");
    let debug = format!("{client:?}");
    assert!(!debug.contains("secret-token"));
    assert_eq!(client.channel_id(), 5);
}

/// A request as the fake server saw it.
#[derive(Debug, Clone)]
struct Seen {
    request_line: String,
    authorization: Option<String>,
    body: String,
}

type Log = Arc<Mutex<Vec<Seen>>>;

/// Serve `responses` in order, one connection each, recording requests.
async fn scripted(responses: Vec<(&'static str, String)>) -> (String, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let log: Log = Arc::default();
    let seen = Arc::clone(&log);

    tokio::spawn(async move {
        for (status, body) in responses {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            if let Some(request) = read_request(&mut socket).await {
                seen.lock().expect("log lock").push(request);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
        }
    });

    (format!("http://{addr}/api/v10"), log)
}

async fn read_request(socket: &mut TcpStream) -> Option<Seen> {
    let mut raw = Vec::new();
    let mut buf = [0_u8; 2048];
    loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            break;
        }
        raw.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&raw).into_owned();
        if let Some((head, body)) = text.split_once("\r\n\r\n") {
            let length = head
                .lines()
                .find_map(|l| l.to_ascii_lowercase().strip_prefix("content-length:").map(|v| v.trim().to_owned()))
                .and_then(|v| v.parse::<usize>().ok())
                .unwrap_or(0);
            if body.len() >= length {
                break;
            }
        }
    }

    let text = String::from_utf8_lossy(&raw).into_owned();
    let (head, body) = text.split_once("\r\n\r\n")?;
    let mut lines = head.lines();
    let request_line = lines.next()?.to_owned();
    let authorization = lines.find_map(|l| {
        l.split_once(':')
            .filter(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            .map(|(_, value)| value.trim().to_owned())
    });
    Some(Seen {
        request_line,
        authorization,
        body: body.to_owned(),
    })
}

fn ok(body: &str) -> (&'static str, String) {
    ("200 OK", body.to_owned())
}

#[tokio::test]
async fn first_poll_primes_the_cursor() {
    let (base, log) = scripted(vec![
        ok(r#"{"id": "99", "username": "relay", "bot": true}"#),
        ok(r#"[{"id": "500", "content": "old", "author": {"id": "1", "username": "a"}}]"#),
        ok(r#"[{"id": "501", "content": "new", "author": {"id": "1", "username": "a"}}]"#),
    ])
    .await;

    let client = DiscordClient::new(&base, 77, "tok")
        .expect("client")
        .identify()
        .await
        .expect("identify");

    assert!(client.fetch_new().await.expect("prime").is_empty());
    let fresh = client.fetch_new().await.expect("poll");
    assert_eq!(fresh.len(), 1);
    assert_eq!(fresh[0].content, "new");

    let seen = log.lock().expect("log lock").clone();
    assert_eq!(seen[0].request_line, "GET /api/v10/users/@me HTTP/1.1");
    assert_eq!(seen[0].authorization.as_deref(), Some("Bot tok"));
    assert_eq!(
        seen[1].request_line,
        "GET /api/v10/channels/77/messages?limit=1 HTTP/1.1"
    );
    assert_eq!(
        seen[2].request_line,
        "GET /api/v10/channels/77/messages?after=500&limit=100 HTTP/1.1"
    );
}

#[tokio::test]
async fn empty_channel_starts_from_zero() {
    let (base, log) = scripted(vec![ok("[]"), ok("[]")]).await;
    let client = DiscordClient::new(&base, 8, "tok").expect("client");

    assert!(client.fetch_new().await.expect("prime").is_empty());
    assert!(client.fetch_new().await.expect("poll").is_empty());
    let seen = log.lock().expect("log lock").clone();
    assert_eq!(
        seen[1].request_line,
        "GET /api/v10/channels/8/messages?after=0&limit=100 HTTP/1.1"
    );
}

#[tokio::test]
async fn long_posts_are_split_and_mentions_disabled() {
    let (base, log) = scripted(vec![ok("{}"), ok("{}")]).await;
    let client = DiscordClient::new(&base, 3, "tok").expect("client");

    let text = format!("{}\n{}", "a".repeat(1500), "b".repeat(1500));
    client.send(&text).await.expect("send");

    let seen = log.lock().expect("log lock").clone();
    assert_eq!(seen.len(), 2);
    for request in &seen {
        assert_eq!(request.request_line, "POST /api/v10/channels/3/messages HTTP/1.1");
        let body: serde_json::Value = serde_json::from_str(&request.body).expect("json body");
        assert_eq!(body["allowed_mentions"]["parse"], serde_json::json!([]));
    }
    let first: serde_json::Value = serde_json::from_str(&seen[0].body).expect("json body");
    assert_eq!(first["content"].as_str(), Some("a".repeat(1500).as_str()));
}

#[tokio::test]
async fn blank_posts_are_skipped() {
    let client = DiscordClient::new("http://127.0.0.1:1/api", 3, "tok").expect("client");
    client.send("   ").await.expect("nothing to send");
}

#[tokio::test]
async fn rate_limited_post_is_retried() {
    let (base, log) = scripted(vec![
        (
            "429 Too Many Requests",
            r#"{"message": "You are being rate limited.", "retry_after": 0.01, "global": false}"#.to_owned(),
        ),
        ok("{}"),
    ])
    .await;
    let client = DiscordClient::new(&base, 3, "tok").expect("client");

    client.send("# Server started.").await.expect("send after retry");
    assert_eq!(log.lock().expect("log lock").len(), 2);
}

#[tokio::test]
async fn error_status_carries_shortened_body() {
    let body = format!("{{\"message\": \"{}\"}}", "x".repeat(400));
    let (base, _log) = scripted(vec![("403 Forbidden", body)]).await;
    let client = DiscordClient::new(&base, 3, "tok").expect("client");

    let err = client.send("hello").await.expect_err("forbidden");
    match err {
        DiscordError::HttpStatus { status, body } => {
            assert_eq!(status, 403);
            assert!(body.ends_with("...[truncated]"));
            assert!(body.chars().count() < 300);
        }
        other => panic!("expected http status error, got: {other}"),
    }
}
