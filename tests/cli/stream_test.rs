//! Tests for bounded line reading and record parsing.

use claude_relay::cli::{BoundedLineReader, StreamError, StreamParser, StreamRecord};
use tokio::io::AsyncWriteExt;

#[tokio::test]
async fn reader_reassembles_lines_across_writes() {
    let (reader, mut writer) = tokio::io::duplex(16);

    tokio::spawn(async move {
        writer.write_all(b"{\"type\":\"res").await.unwrap();
        writer.write_all(b"ult\"}\n{\"type\"").await.unwrap();
        writer.write_all(b":\"system\"}\n").await.unwrap();
        drop(writer);
    });

    let mut lines = BoundedLineReader::with_chunk_size(reader, 5);
    assert_eq!(
        lines.next_line().await.unwrap().as_deref(),
        Some(r#"{"type":"result"}"#)
    );
    assert_eq!(
        lines.next_line().await.unwrap().as_deref(),
        Some(r#"{"type":"system"}"#)
    );
    assert!(lines.next_line().await.unwrap().is_none());
    assert!(lines.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn reader_buffer_stays_bounded_under_flood() {
    let (reader, mut writer) = tokio::io::duplex(4096);

    tokio::spawn(async move {
        let line = format!("{{\"type\":\"system\",\"pad\":\"{}\"}}\n", "x".repeat(100));
        for _ in 0..2000 {
            writer.write_all(line.as_bytes()).await.unwrap();
        }
        drop(writer);
    });

    let mut lines = BoundedLineReader::with_chunk_size(reader, 1024);
    let mut count = 0;
    while let Some(line) = lines.next_line().await.unwrap() {
        assert!(line.ends_with('}'));
        assert!(lines.buffered() < 1024 + 200);
        count += 1;
    }
    assert_eq!(count, 2000);
}

#[test]
fn parse_line_invalid_json() {
    match StreamParser::parse_line("not valid json at all").unwrap_err() {
        StreamError::ParseError { input, reason: _ } => {
            assert_eq!(input, "not valid json at all");
        }
        other => panic!("Expected ParseError, got {other:?}"),
    }
}

#[test]
fn parse_line_replacement_characters() {
    let line = String::from_utf8_lossy(b"{\"type\":\"assistant\",\"content\":[{\"type\":\"text\",\"text\":\"a\xffb\"}]}")
        .into_owned();
    let parsed = StreamParser::parse_line(&line).unwrap();
    match parsed.record {
        Some(StreamRecord::Assistant(assistant)) => {
            assert_eq!(assistant.texts(), vec!["a\u{FFFD}b"]);
        }
        other => panic!("Expected assistant record, got {other:?}"),
    }
}

#[test]
fn parse_line_unknown_event_type() {
    let parsed = StreamParser::parse_line(r#"{"type":"future_event_type","data":"something"}"#)
        .unwrap();
    assert_eq!(parsed.kind, "future_event_type");
    assert_eq!(parsed.record, Some(StreamRecord::Unknown));
    assert_eq!(parsed.raw["data"], "something");
}

#[tokio::test]
async fn reader_handles_scripted_reads() {
    let mock = tokio_test::io::Builder::new()
        .read(b"{\"type\":\"sys")
        .read(b"tem\"}\n\n")
        .read(b"{\"type\":\"result\"}\npartial")
        .build();

    let mut lines = BoundedLineReader::new(mock);
    assert_eq!(
        lines.next_line().await.unwrap().as_deref(),
        Some(r#"{"type":"system"}"#)
    );
    assert_eq!(lines.next_line().await.unwrap().as_deref(), Some(""));
    assert_eq!(
        lines.next_line().await.unwrap().as_deref(),
        Some(r#"{"type":"result"}"#)
    );
    assert!(lines.next_line().await.unwrap().is_none());
}

#[tokio::test]
async fn reader_surfaces_read_errors() {
    let mock = tokio_test::io::Builder::new()
        .read(b"{\"type\":\"system\"}\n")
        .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed"))
        .build();

    let mut lines = BoundedLineReader::new(mock);
    assert!(lines.next_line().await.unwrap().is_some());
    let err = lines.next_line().await.unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}
