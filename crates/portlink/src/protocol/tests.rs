// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use std::io::{Read, Write};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use super::*;
use crate::carrier::{MARIAH_ACK, MARIAH_HEADER};
use crate::stream::mock::MockStream;
use crate::stream::TwoWayStream;

fn registry() -> Arc<CarrierRegistry> {
    Arc::new(CarrierRegistry::with_defaults())
}

/// Handshake a writer and a reader over an in-memory pair.
fn connect(route: Route, name: &str) -> (Protocol, Protocol) {
    let registry = registry();
    let (a, b) = MockStream::pair();
    let name = name.to_string();
    let reader_registry = Arc::clone(&registry);
    let reader = thread::spawn(move || {
        let mut p = Protocol::new(Box::new(b), reader_registry);
        p.open_name(&name).map(|()| p)
    });
    let mut writer = Protocol::new(Box::new(a), registry);
    writer.open_route(route).unwrap();
    let reader = reader.join().unwrap().unwrap();
    (writer, reader)
}

#[test]
fn test_tcp_message_with_ack() {
    let (mut writer, mut reader) = connect(Route::new("/writer", "/reader", "tcp"), "/reader");
    assert_eq!(writer.phase(), ProtocolPhase::Established);
    assert_eq!(reader.phase(), ProtocolPhase::Established);
    assert_eq!(reader.route().from_name(), "/writer");
    assert_eq!(reader.route().to_name(), "/reader");
    assert_eq!(reader.carrier_name(), Some("tcp"));

    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_text("hello")));
        let msg = reader.begin_read().unwrap();
        assert_eq!(reader.phase(), ProtocolPhase::Reading);
        assert_eq!(msg.payload(), b"hello");
        assert!(!msg.reply_requested());
        reader.end_read().unwrap();
        assert!(sent.join().unwrap().unwrap().is_none());
    });
    assert!(writer.is_ok());
    assert!(reader.is_ok());
}

#[test]
fn test_tcp_reply() {
    let (mut writer, mut reader) = connect(Route::new("/client", "/server", "tcp"), "/server");
    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_text("ping").with_reply()));
        let msg = reader.begin_read().unwrap();
        assert!(msg.reply_requested());
        assert!(reader.will_reply());
        reader.reply(&SizedWriter::from_text("pong")).unwrap();
        reader.end_read().unwrap();
        let reply = sent.join().unwrap().unwrap().unwrap();
        assert_eq!(reply.payload(), b"pong");
    });
}

#[test]
fn test_end_read_sends_empty_reply_when_requested() {
    let (mut writer, mut reader) = connect(Route::new("/client", "/server", "fast_tcp"), "/server");
    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_text("ping").with_reply()));
        reader.begin_read().unwrap();
        reader.end_read().unwrap();
        let reply = sent.join().unwrap().unwrap().unwrap();
        assert!(reply.payload().is_empty());
    });
}

#[test]
fn test_admin_flag_crosses_the_index_frame() {
    for carrier in ["tcp", "tcp+send.zlib"] {
        let (mut writer, mut reader) = connect(Route::new("/w", "/r", carrier), "/r");
        thread::scope(|s| {
            let sent = s.spawn(|| {
                writer.write(&SizedWriter::from_text("publisherUpdate").with_admin())?;
                writer.write(&SizedWriter::from_text("data"))
            });
            let msg = reader.begin_read().unwrap();
            assert!(msg.is_admin(), "{}", carrier);
            assert_eq!(msg.payload(), b"publisherUpdate");
            reader.end_read().unwrap();

            let msg = reader.begin_read().unwrap();
            assert!(!msg.is_admin(), "{}", carrier);
            reader.end_read().unwrap();
            assert!(sent.join().unwrap().is_ok());
        });
    }
}

#[test]
fn test_unknown_carrier_closes() {
    let (a, _b) = MockStream::pair();
    let mut p = Protocol::new(Box::new(a), registry());
    let err = p.open_route(Route::new("/a", "/b", "carrier_pigeon")).unwrap_err();
    assert!(matches!(err, ProtocolError::UnknownCarrier(ref n) if n == "carrier_pigeon"));
    assert_eq!(p.phase(), ProtocolPhase::Closed);
    assert!(!p.is_ok());
}

#[test]
fn test_modifier_cannot_be_base_carrier() {
    let (a, _b) = MockStream::pair();
    let mut p = Protocol::new(Box::new(a), registry());
    let err = p.open_route(Route::new("/a", "/b", "zlib")).unwrap_err();
    assert!(matches!(err, ProtocolError::Unsupported(_)));
}

#[test]
fn test_unrecognized_header_is_reported() {
    let (a, mut b) = MockStream::pair();
    b.write_all(b"GET / HTTP/1.0\r\n\r\n").unwrap();
    let mut p = Protocol::new(Box::new(a), registry());
    let err = p.open_name("/reader").unwrap_err();
    assert!(matches!(err, ProtocolError::HeaderNotRecognized(h) if &h == b"GET / HT"));
    assert_eq!(p.phase(), ProtocolPhase::Closed);

    let mut text = String::new();
    b.read_to_string(&mut text).unwrap();
    assert!(text.starts_with("* Error. Protocol not found."));
}

#[test]
fn test_text_carrier_from_raw_peer() {
    let (a, mut b) = MockStream::pair();
    b.write_all(b"CONNECT /typist\r\nhello there\r\n").unwrap();

    let mut p = Protocol::new(Box::new(a), registry());
    p.open_name("/reader").unwrap();
    assert_eq!(p.route().from_name(), "/typist");
    assert_eq!(p.carrier_name(), Some("text"));

    let mut msg = p.begin_read().unwrap();
    assert!(msg.is_text_mode());
    assert_eq!(msg.expect_text(), "hello there");
    p.end_read().unwrap();

    let mut greeting = [0u8; 16];
    b.read_exact(&mut greeting).unwrap();
    assert_eq!(&greeting, b"Welcome /typist\r");
}

#[test]
fn test_text_ack_round_trip() {
    let (mut writer, mut reader) = connect(Route::new("/w", "/r", "text_ack"), "/r");
    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_text("line one\n")));
        let mut msg = reader.begin_read().unwrap();
        assert_eq!(msg.expect_text(), "line one");
        reader.end_read().unwrap();
        assert!(sent.join().unwrap().is_ok());
    });
}

#[test]
fn test_text_rejects_multiline_payload() {
    let (mut writer, _reader) = connect(Route::new("/w", "/r", "text"), "/r");
    let err = writer.write(&SizedWriter::from_text("one\ntwo")).unwrap_err();
    assert!(matches!(err, ProtocolError::BadFrame(_)));
    assert!(!writer.is_ok());
}

#[test]
fn test_mariah_handshake_and_ack() {
    let (mut writer, mut reader) = connect(Route::new("/m1", "/m2", "mariah"), "/m2");
    assert_eq!(reader.carrier_name(), Some("mariah"));
    assert_eq!(reader.route().from_name(), "/m1");
    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_bytes(vec![1, 2, 3, 4])));
        let msg = reader.begin_read().unwrap();
        assert_eq!(msg.payload(), &[1, 2, 3, 4]);
        reader.end_read().unwrap();
        assert!(sent.join().unwrap().is_ok());
    });
}

#[test]
fn test_mariah_missing_ack_fails() {
    let (a, mut peer) = MockStream::pair();
    let raw_peer = thread::spawn(move || {
        let mut header = [0u8; 8];
        peer.read_exact(&mut header).unwrap();
        assert_eq!(header, MARIAH_HEADER);
        let mut name = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            peer.read_exact(&mut byte).unwrap();
            if byte[0] == b'\n' {
                break;
            }
            name.push(byte[0]);
        }
        assert_eq!(name, b"/m1");
        peer.write_all(MARIAH_ACK).unwrap();

        let mut len = [0u8; 4];
        peer.read_exact(&mut len).unwrap();
        let mut payload = vec![0u8; u32::from_le_bytes(len) as usize];
        peer.read_exact(&mut payload).unwrap();
        // Swallow the message and hang up without acknowledging.
        peer.close();
        payload
    });

    let mut writer = Protocol::new(Box::new(a), registry());
    writer.open_route(Route::new("/m1", "/m2", "mariah")).unwrap();
    let err = writer.write(&SizedWriter::from_text("data")).unwrap_err();
    assert!(matches!(err, ProtocolError::AckMismatch { ref got, .. } if got.is_empty()));
    assert!(!writer.is_ok());
    assert_eq!(raw_peer.join().unwrap(), b"data");
}

#[test]
fn test_mariah_handshake_requires_ack_literal() {
    let (a, mut peer) = MockStream::pair();
    let raw_peer = thread::spawn(move || {
        let mut buf = [0u8; 12];
        peer.read_exact(&mut buf).unwrap();
        peer.write_all(b"nope, not a mariah ack").unwrap();
    });
    let mut writer = Protocol::new(Box::new(a), registry());
    let err = writer.open_route(Route::new("/m1", "/m2", "mariah")).unwrap_err();
    assert!(matches!(err, ProtocolError::HandshakeFailed { .. }));
    assert_eq!(writer.phase(), ProtocolPhase::Closed);
    raw_peer.join().unwrap();
}

#[test]
fn test_zlib_delegates() {
    let (mut writer, mut reader) =
        connect(Route::new("/w", "/r", "tcp+send.zlib+recv.zlib"), "/r");
    assert_eq!(reader.route().from_name(), "/w");
    assert!(reader.route().carrier_name().contains("+recv.zlib"));
    assert_eq!(reader.recv_delegate().unwrap().map(|c| c.name()), Some("zlib"));
    assert_eq!(writer.send_delegate().unwrap().map(|c| c.name()), Some("zlib"));

    let payload = vec![7u8; 2048];
    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_bytes(payload.clone())));
        let msg = reader.begin_read().unwrap();
        assert_eq!(msg.payload(), payload.as_slice());
        reader.end_read().unwrap();
        assert!(sent.join().unwrap().is_ok());
    });
}

#[test]
fn test_one_sided_zlib_is_paired() {
    for carrier in ["tcp+send.zlib", "tcp+recv.zlib"] {
        let (mut writer, mut reader) = connect(Route::new("/w", "/r", carrier), "/r");
        assert!(writer.route().carrier_name().contains("+send.zlib"));
        assert!(writer.route().carrier_name().contains("+recv.zlib"));
        assert_eq!(writer.send_delegate().unwrap().map(|c| c.name()), Some("zlib"));
        assert_eq!(reader.recv_delegate().unwrap().map(|c| c.name()), Some("zlib"));

        let payload = vec![3u8; 4096];
        thread::scope(|s| {
            let sent = s.spawn(|| writer.write(&SizedWriter::from_bytes(payload.clone())));
            let msg = reader.begin_read().unwrap();
            assert_eq!(msg.payload(), payload.as_slice(), "{}", carrier);
            reader.end_read().unwrap();
            assert!(sent.join().unwrap().is_ok());
        });
    }
}

#[test]
fn test_mismatched_modifiers_are_rejected() {
    let (a, _b) = MockStream::pair();
    let mut p = Protocol::new(Box::new(a), registry());
    let err = p
        .open_route(Route::new("/w", "/r", "tcp+send.zlib+recv.bogus"))
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Unsupported(_)));
    assert_eq!(p.phase(), ProtocolPhase::Closed);
}

#[test]
fn test_missing_delegate_is_sticky() {
    let (_writer, mut reader) = connect(Route::new("/w", "/r", "tcp+recv.bogus"), "/r");
    let err = reader.begin_read().unwrap_err();
    assert!(matches!(err, ProtocolError::DelegateFailed(ref n) if n == "bogus"));
    assert!(!reader.is_ok());
    assert_eq!(reader.phase(), ProtocolPhase::Closed);
    assert!(matches!(
        reader.recv_delegate(),
        Err(ProtocolError::DelegateFailed(_))
    ));
}

#[test]
fn test_no_delegate_means_none() {
    let (mut writer, mut reader) = connect(Route::new("/w", "/r", "tcp"), "/r");
    assert!(reader.recv_delegate().unwrap().is_none());
    assert!(writer.send_delegate().unwrap().is_none());
}

#[test]
fn test_illegal_orderings_are_rejected() {
    let (a, _b) = MockStream::pair();
    let mut p = Protocol::new(Box::new(a), registry());
    assert!(matches!(
        p.begin_read(),
        Err(ProtocolError::IllegalTransition {
            from: ProtocolPhase::Idle,
            ..
        })
    ));
    assert!(matches!(
        p.write(&SizedWriter::from_text("x")),
        Err(ProtocolError::IllegalTransition { .. })
    ));

    let (_writer, mut reader) = connect(Route::new("/w", "/r", "tcp"), "/r");
    assert!(reader.reply(&SizedWriter::new()).is_err());
    assert!(reader.end_read().is_err());
    assert!(reader.open_name("/again").is_err());
}

#[test]
fn test_closed_is_terminal() {
    let (mut writer, _reader) = connect(Route::new("/w", "/r", "tcp"), "/r");
    writer.close();
    writer.close();
    assert_eq!(writer.phase(), ProtocolPhase::Closed);
    assert!(writer.write(&SizedWriter::from_text("late")).is_err());
    assert!(writer.open_route(Route::new("/w", "/r", "tcp")).is_err());
}

#[test]
fn test_interrupt_from_other_thread_releases_read() {
    let (writer, mut reader) = connect(Route::new("/w", "/r", "tcp"), "/r");
    let interrupter = reader.interrupter().unwrap();
    let blocked = thread::spawn(move || {
        let result = reader.begin_read();
        (result.is_err(), reader.is_ok())
    });
    thread::sleep(Duration::from_millis(50));
    interrupter.interrupt();
    let (failed, ok) = blocked.join().unwrap();
    assert!(failed);
    assert!(!ok);
    drop(writer);
}

#[test]
fn test_peer_close_ends_read() {
    let (mut writer, mut reader) = connect(Route::new("/w", "/r", "fast_tcp"), "/r");
    writer.close();
    assert!(matches!(reader.begin_read(), Err(ProtocolError::Closed)));
    assert_eq!(reader.phase(), ProtocolPhase::Established);
    assert!(!reader.is_ok());
}

#[test]
fn test_rename_keeps_stream() {
    let (mut writer, mut reader) = connect(Route::new("/w", "/r", "fast_tcp"), "/r");
    let mut route = reader.route().clone();
    route.set_to_name("/renamed");
    reader.rename(route);
    assert_eq!(reader.route().to_name(), "/renamed");

    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_text("still here")));
        let msg = reader.begin_read().unwrap();
        assert_eq!(msg.route().to_name(), "/renamed");
        reader.end_read().unwrap();
        assert!(sent.join().unwrap().is_ok());
    });
}

#[test]
fn test_tcpros_handshake() {
    let (mut writer, mut reader) = connect(
        Route::new("/talker", "/listener", "tcpros+topic./chatter+type.std_msgs/String"),
        "/listener",
    );
    assert_eq!(reader.carrier_name(), Some("tcpros"));
    assert_eq!(reader.route().from_name(), "/talker");

    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_text("hi ros")));
        let msg = reader.begin_read().unwrap();
        assert_eq!(msg.payload(), b"hi ros");
        reader.end_read().unwrap();
        assert!(sent.join().unwrap().is_ok());
    });
}

#[test]
fn test_name_ser_request_reply() {
    let (mut writer, mut reader) = connect(Route::new("/anon", "/root", "name_ser"), "/root");
    assert_eq!(reader.carrier_name(), Some("name_ser"));
    thread::scope(|s| {
        let sent = s.spawn(|| writer.write(&SizedWriter::from_text("query /foo").with_reply()));
        let mut msg = reader.begin_read().unwrap();
        assert!(msg.reply_requested());
        assert_eq!(msg.expect_text(), "query /foo");
        reader
            .reply(&SizedWriter::from_text(
                "registration name /foo ip 10.0.0.2 port 10002 type tcp\n*** end of message\n",
            ))
            .unwrap();
        reader.end_read().unwrap();
        let reply = sent.join().unwrap().unwrap().unwrap();
        assert_eq!(
            reply.payload(),
            b"registration name /foo ip 10.0.0.2 port 10002 type tcp\n"
        );
    });
}

#[test]
fn test_set_timeout_applies() {
    let (a, _b) = MockStream::pair();
    let mut p = Protocol::with_config(
        Box::new(a),
        registry(),
        ProtocolConfig::default().with_timeout(Duration::from_secs(1)),
    );
    assert!(p.set_timeout(None).is_ok());
    assert!(p.interrupter().is_ok());
    p.close();
    assert!(p.set_timeout(None).is_err());
}

#[test]
fn test_stream_trait_object_is_used() {
    let (a, _b) = MockStream::pair();
    let boxed: Box<dyn TwoWayStream> = Box::new(a);
    let p = Protocol::new(boxed, registry());
    assert_eq!(p.phase(), ProtocolPhase::Idle);
    assert!(p.is_ok());
}
