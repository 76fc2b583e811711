//! The real HTTP client against a scripted local server.
//!
//! Each scripted entry answers exactly one connection, either with a canned
//! response or by hanging up after reading the request. Every reply carries
//! `Connection: close`, so the accepted-connection count equals the number
//! of requests the client sent.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use govspend_core::config::{RetryConfig, TransportConfig};
use govspend_core::data::{
    FetchError, GeoRow, GeoSpendFetcher, RecordingSleeper, ResilientHttpClient, Transport,
};

/// One scripted exchange.
enum Exchange {
    Reply {
        status: u16,
        retry_after: Option<&'static str>,
        body: &'static str,
    },
    HangUp,
}

fn reply(status: u16, body: &'static str) -> Exchange {
    Exchange::Reply {
        status,
        retry_after: None,
        body,
    }
}

/// Serve `script` one connection at a time. The handle yields the number of
/// connections accepted.
fn serve(script: Vec<Exchange>) -> (String, JoinHandle<usize>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let base_url = format!("http://{}", listener.local_addr().unwrap());

    let handle = std::thread::spawn(move || {
        let mut accepted = 0;
        for exchange in script {
            let (stream, _) = listener.accept().unwrap();
            accepted += 1;
            let mut reader = BufReader::new(stream);
            read_request(&mut reader);
            let mut stream = reader.into_inner();

            match exchange {
                Exchange::HangUp => drop(stream),
                Exchange::Reply {
                    status,
                    retry_after,
                    body,
                } => {
                    let mut head = format!(
                        "HTTP/1.1 {status} Scripted\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                        body.len()
                    );
                    if let Some(hint) = retry_after {
                        head.push_str(&format!("Retry-After: {hint}\r\n"));
                    }
                    head.push_str("\r\n");
                    stream.write_all(head.as_bytes()).unwrap();
                    stream.write_all(body.as_bytes()).unwrap();
                    stream.flush().unwrap();
                }
            }
        }
        accepted
    });

    (base_url, handle)
}

/// Consume the request head and any body so closing the socket is clean.
fn read_request(reader: &mut impl BufRead) {
    let mut content_length = 0usize;
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 {
            return;
        }
        let line = line.trim_end();
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.eq_ignore_ascii_case("content-length") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }
    }
    let mut body = vec![0u8; content_length];
    let _ = reader.read_exact(&mut body);
}

fn transport_config(max_retries: u32) -> TransportConfig {
    TransportConfig {
        max_retries,
        timeout_secs: 5,
        ..TransportConfig::default()
    }
}

fn client(max_retries: u32, sleeper: Arc<RecordingSleeper>) -> ResilientHttpClient {
    ResilientHttpClient::with_sleeper(&transport_config(max_retries), sleeper).unwrap()
}

#[test]
fn forcelisted_status_is_retried_then_last_reply_returned() {
    let (base, server) = serve(vec![
        reply(503, "busy"),
        reply(503, "busy"),
        reply(503, "busy"),
        reply(503, "still busy"),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let answer = client(3, sleeper.clone()).get_json(&base).unwrap();

    assert_eq!(answer.status, 503);
    assert_eq!(answer.body, "still busy");
    assert_eq!(server.join().unwrap(), 4);
    assert_eq!(
        sleeper.recorded(),
        vec![
            Duration::from_secs_f64(0.8),
            Duration::from_secs_f64(1.6),
            Duration::from_secs_f64(3.2),
        ]
    );
}

#[test]
fn rate_limit_hint_paces_transport_retry() {
    let (base, server) = serve(vec![
        Exchange::Reply {
            status: 429,
            retry_after: Some("2"),
            body: "slow down",
        },
        reply(200, r#"{"results": []}"#),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let answer = client(5, sleeper.clone()).get_json(&base).unwrap();

    assert_eq!(answer.status, 200);
    assert_eq!(server.join().unwrap(), 2);
    assert_eq!(sleeper.recorded(), vec![Duration::from_secs(2)]);
}

#[test]
fn zero_retries_sends_exactly_one_request() {
    let (base, server) = serve(vec![reply(503, "busy")]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let answer = client(0, sleeper.clone()).get_json(&base).unwrap();

    assert_eq!(answer.status, 503);
    assert_eq!(server.join().unwrap(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[test]
fn hang_up_is_a_connection_fault() {
    let (base, server) = serve(vec![Exchange::HangUp]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let err = client(0, sleeper).get_json(&base).unwrap_err();

    assert!(err.is_connection_fault(), "classified as {err:?}");
    assert_eq!(server.join().unwrap(), 1);
}

#[test]
fn transport_retries_hang_ups() {
    let (base, server) = serve(vec![
        Exchange::HangUp,
        reply(200, r#"{"results": []}"#),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());

    let answer = client(2, sleeper.clone()).get_json(&base).unwrap();

    assert_eq!(answer.status, 200);
    assert_eq!(server.join().unwrap(), 2);
    assert_eq!(sleeper.recorded(), vec![Duration::from_secs_f64(0.8)]);
}

fn no_jitter(max_attempts: u32) -> RetryConfig {
    RetryConfig {
        max_attempts,
        base_sleep_secs: 1.5,
        rate_limit_jitter_secs: 0.0,
        status_jitter_secs: 0.0,
        connection_jitter_secs: 0.0,
    }
}

#[test]
fn fetch_retries_dropped_connections_until_exhausted() {
    let (base, server) = serve((0..6).map(|_| Exchange::HangUp).collect());
    let sleeper = Arc::new(RecordingSleeper::new());
    let transport = Arc::new(client(0, sleeper.clone()));
    let fetcher = GeoSpendFetcher::new(transport, sleeper.clone(), &base, no_jitter(6));

    let err = fetcher.fetch("Beta", 2020).unwrap_err();

    match err {
        FetchError::Exhausted { attempts, .. } => assert_eq!(attempts, 6),
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(server.join().unwrap(), 6);
    assert_eq!(
        sleeper.recorded(),
        (1..=5u32)
            .map(|n| Duration::from_secs_f64(1.5 * f64::from(n)))
            .collect::<Vec<_>>()
    );
}

#[test]
fn fetch_recovers_after_dropped_connection() {
    let (base, server) = serve(vec![
        Exchange::HangUp,
        reply(
            200,
            r#"{"results": [{"shape_code": "CA", "aggregated_amount": 100.0}]}"#,
        ),
    ]);
    let sleeper = Arc::new(RecordingSleeper::new());
    let transport = Arc::new(client(0, sleeper.clone()));
    let fetcher = GeoSpendFetcher::new(transport, sleeper.clone(), &base, no_jitter(6));

    let rows = fetcher.fetch("Beta", 2020).unwrap();

    assert_eq!(rows, vec![GeoRow::new("CA", 100.0)]);
    assert_eq!(server.join().unwrap(), 2);
    assert_eq!(sleeper.recorded(), vec![Duration::from_secs_f64(1.5)]);
}
