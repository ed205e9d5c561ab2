//! Integration tests for the QPACK encoder.
//! Covers table reuse, sensitive headers, capacity changes and decoder
//! stream feedback through the public API.

mod common;

use bytes::BytesMut;
use quicd_qpack_encoder::{
    DecoderInstruction, Encoder, EncoderConfig, EncoderInstruction, Error, FieldPolicy,
    FnHandler, HeaderField,
};

use common::{init_tracing, MirrorDecoder};

fn plain_config() -> EncoderConfig {
    EncoderConfig {
        huffman: false,
        ..Default::default()
    }
}

fn encoder_with(capacity: usize, max_blocked_streams: usize) -> Encoder<Vec<EncoderInstruction>> {
    let config = EncoderConfig {
        max_blocked_streams,
        ..plain_config()
    };
    let mut encoder = Encoder::with_config(Vec::new(), config).unwrap();
    encoder.set_capacity(capacity).unwrap();
    encoder
}

fn drain(encoder: &mut Encoder<Vec<EncoderInstruction>>) -> Vec<EncoderInstruction> {
    std::mem::take(encoder.handler_mut())
}

#[test]
fn test_repeated_static_field_is_indexed() {
    init_tracing();
    let mut encoder = encoder_with(4096, 10);
    drain(&mut encoder);

    let method = [HeaderField::new(":method", "GET")];
    let first = encoder.encode(1, &method).unwrap();
    let second = encoder.encode(1, &method).unwrap();

    assert_eq!(&first[..], &[0x00, 0x00, 0xD1]);
    assert_eq!(first, second);
    assert!(drain(&mut encoder).is_empty());
}

#[test]
fn test_repeated_field_reuses_dynamic_entry() {
    let mut encoder = encoder_with(4096, 10);
    let mut decoder = MirrorDecoder::new(4096);
    let fields = [HeaderField::new("x-session", "abcdef")];

    let first = encoder.encode(1, &fields).unwrap();
    decoder.apply_all(&drain(&mut encoder));
    assert_eq!(decoder.decode(&first).0, fields);
    assert_eq!(decoder.insert_count(), 1);

    let second = encoder.encode(1, &fields).unwrap();
    assert!(drain(&mut encoder).is_empty(), "no new Duplicate or Insert");
    let (decoded, required_insert_count) = decoder.decode(&second);
    assert_eq!(decoded, fields);
    assert_eq!(required_insert_count, 1);
}

#[test]
fn test_set_cookie_never_enters_table() {
    let mut encoder = encoder_with(4096, 10);
    let mut decoder = MirrorDecoder::new(4096);
    drain(&mut encoder);

    for i in 0..20 {
        let fields = [HeaderField::new("set-cookie", format!("id={}", i % 3))];
        let encoded = encoder.encode(i, &fields).unwrap();
        assert!(drain(&mut encoder).is_empty());

        // Literal with static name reference, N bit set
        assert_eq!(encoded[2] & 0xF0, 0x70);
        assert_eq!(decoder.decode(&encoded).0, fields);
    }
    assert_eq!(encoder.table().insert_count(), 0);
}

#[test]
fn test_insert_declines_when_out_of_space() {
    let mut encoder = encoder_with(100, 10);
    drain(&mut encoder);

    assert!(encoder.insert(HeaderField::new("x-a", "1")));
    let field = HeaderField::new("x-large", "0123456789012345678901234567890");
    assert!(field.size() > encoder.table().get_space());

    assert!(!encoder.insert(field));
    assert_eq!(drain(&mut encoder).len(), 1);
    assert_eq!(encoder.table().insert_count(), 1);
}

#[test]
fn test_stream_cancellation() {
    let mut encoder = encoder_with(4096, 10);
    encoder.insert(HeaderField::new("x-a", "1"));
    encoder.insert(HeaderField::new("x-b", "2"));

    assert_eq!(
        encoder.stream_cancellation(8),
        Err(Error::UnknownStream { stream_id: 8 })
    );

    encoder.encode(8, &[HeaderField::new("x-a", "1")]).unwrap();
    encoder.encode(8, &[HeaderField::new("x-b", "2")]).unwrap();
    assert_eq!(encoder.outstanding_sections(8), 2);
    assert_eq!(encoder.blocked_streams(), 2);

    encoder.stream_cancellation(8).unwrap();
    assert_eq!(encoder.outstanding_sections(8), 0);
    assert_eq!(encoder.blocked_streams(), 0);
    assert!(encoder.table().iter().all(|e| e.reference_count() == 0));

    assert!(encoder.section_acknowledgement(8).is_err());
}

#[test]
fn test_cancellation_returns_blocked_budget() {
    let mut encoder = encoder_with(4096, 1);
    encoder.insert(HeaderField::new("x-a", "1"));

    encoder.encode(0, &[HeaderField::new("x-a", "1")]).unwrap();
    assert_eq!(encoder.blocked_streams(), 1);

    // Budget exhausted: the next stream cannot reference the entry
    let encoded = encoder.encode(4, &[HeaderField::new("x-a", "1")]).unwrap();
    assert_eq!(encoded[0], 0x00);

    encoder.stream_cancellation(0).unwrap();
    let encoded = encoder.encode(4, &[HeaderField::new("x-a", "1")]).unwrap();
    assert_eq!(&encoded[..], &[0x02, 0x00, 0x80]);
    assert_eq!(encoder.blocked_streams(), 1);
}

#[test]
fn test_capacity_shrink_waits_for_references() {
    let mut encoder = encoder_with(200, 10);
    drain(&mut encoder);
    encoder.insert(HeaderField::new("x-a", "1"));
    encoder.insert(HeaderField::new("x-b", "2"));
    encoder
        .encode(0, &[HeaderField::new("x-a", "1"), HeaderField::new("x-b", "2")])
        .unwrap();
    drain(&mut encoder);

    encoder.set_capacity(40).unwrap();
    assert_eq!(encoder.table().used_space(), 72);
    assert_eq!(encoder.table().capacity(), 200);
    assert_eq!(encoder.table().pending_capacity(), Some(40));
    assert!(drain(&mut encoder).is_empty());

    encoder.section_acknowledgement(0).unwrap();
    assert_eq!(
        drain(&mut encoder),
        vec![EncoderInstruction::SetCapacity { capacity: 40 }]
    );
    assert_eq!(encoder.table().capacity(), 40);
    assert!(encoder.table().used_space() <= encoder.table().capacity());
}

#[test]
fn test_insert_count_increment_overrun_leaves_state() {
    let mut encoder = encoder_with(4096, 10);
    encoder.insert(HeaderField::new("x-a", "1"));
    encoder.insert(HeaderField::new("x-b", "2"));
    encoder.insert_count_increment(1).unwrap();

    let err = encoder.insert_count_increment(2).unwrap_err();
    assert_eq!(
        err,
        Error::InsertCountOverrun {
            known: 1,
            increment: 2,
            insert_count: 2
        }
    );
    assert!(err.is_connection_error());
    assert_eq!(err.error_code(), 0x0202);
    assert_eq!(encoder.known_insert_count(), 1);
}

#[test]
fn test_decoder_stream_bytes() {
    let mut encoder = encoder_with(4096, 10);
    encoder.insert(HeaderField::new("x-a", "1"));
    encoder.insert(HeaderField::new("x-b", "2"));
    encoder.encode(0, &[HeaderField::new("x-a", "1")]).unwrap();
    encoder.encode(4, &[HeaderField::new("x-b", "2")]).unwrap();
    assert_eq!(encoder.blocked_streams(), 2);

    let mut feedback = BytesMut::new();
    DecoderInstruction::InsertCountIncrement { increment: 1 }.encode(&mut feedback);
    DecoderInstruction::SectionAck { stream_id: 4 }.encode(&mut feedback);
    DecoderInstruction::StreamCancel { stream_id: 0 }.encode(&mut feedback);

    let consumed = encoder.process_decoder_stream(&feedback).unwrap();
    assert_eq!(consumed, feedback.len());
    assert_eq!(encoder.known_insert_count(), 2);
    assert_eq!(encoder.blocked_streams(), 0);
    assert_eq!(encoder.outstanding_sections(0), 0);
    assert_eq!(encoder.outstanding_sections(4), 0);
}

#[test]
fn test_decoder_stream_partial_instruction() {
    let mut encoder = encoder_with(4096, 10);
    for i in 0..70 {
        encoder.insert(HeaderField::new(format!("x-{}", i), "v"));
    }

    let mut feedback = BytesMut::new();
    DecoderInstruction::InsertCountIncrement { increment: 70 }.encode(&mut feedback);
    assert_eq!(feedback.len(), 2);

    assert_eq!(encoder.process_decoder_stream(&feedback[..1]).unwrap(), 0);
    assert_eq!(encoder.known_insert_count(), 0);
    assert_eq!(encoder.process_decoder_stream(&feedback).unwrap(), 2);
    assert_eq!(encoder.known_insert_count(), 70);
}

#[test]
fn test_decoder_stream_zero_increment() {
    let mut encoder = encoder_with(4096, 10);
    let err = encoder.process_decoder_stream(&[0x00]).unwrap_err();
    assert_eq!(err, Error::ZeroIncrement);
}

#[test]
fn test_draining_entry_is_duplicated() {
    // 25% of 400 is 100 bytes; every entry below takes 36
    let mut encoder = encoder_with(400, 10);
    let mut decoder = MirrorDecoder::new(4096);

    let pinned = HeaderField::new("x-a", "1");
    encoder.insert(pinned.clone());
    // Keep x-a referenced so it cannot be evicted
    encoder.encode(0, &[pinned.clone()]).unwrap();
    for name in ["x-b", "x-c", "x-d", "x-e", "x-f", "x-g", "x-h", "x-i"] {
        assert!(encoder.insert(HeaderField::new(name, "2")));
    }
    decoder.apply_all(&drain(&mut encoder));
    assert_eq!(encoder.table().get_space(), 76);
    assert!(!encoder.table().can_reference(0));
    assert!(encoder.table().contains(0));

    let encoded = encoder.encode(4, &[pinned.clone()]).unwrap();
    let instructions = drain(&mut encoder);
    assert_eq!(instructions, vec![EncoderInstruction::Duplicate { index: 8 }]);
    decoder.apply_all(&instructions);

    let (decoded, required_insert_count) = decoder.decode(&encoded);
    assert_eq!(decoded, vec![pinned]);
    assert_eq!(required_insert_count, 10);
}

#[test]
fn test_bytes_handler_and_closure_handler() {
    let mut encoder = Encoder::new(BytesMut::new(), 10);
    encoder.set_capacity(220).unwrap();
    assert_eq!(&encoder.handler()[..], &[0x3f, 0xbd, 0x01]);

    let mut seen = Vec::new();
    {
        let mut encoder = Encoder::new(FnHandler(|i: EncoderInstruction| seen.push(i)), 10);
        encoder.set_capacity(100).unwrap();
        encoder.insert(HeaderField::new("x-a", "1"));
    }
    assert_eq!(seen.len(), 2);
}

struct IndexNothing;

impl FieldPolicy for IndexNothing {
    fn should_index(&self, _: &HeaderField) -> bool {
        false
    }

    fn never_index(&self, _: &HeaderField) -> bool {
        true
    }

    fn should_huffman_encode(&self, _: &HeaderField) -> bool {
        false
    }
}

#[test]
fn test_custom_policy() {
    let mut encoder = Encoder::new(Vec::new(), 10).with_policy(IndexNothing);
    encoder.set_capacity(4096).unwrap();
    drain(&mut encoder);

    let encoded = encoder.encode(0, &[HeaderField::new("x-a", "1")]).unwrap();
    assert!(drain(&mut encoder).is_empty());
    assert_eq!(&encoded[..], &[0x00, 0x00, 0x33, b'x', b'-', b'a', 0x01, b'1']);
    assert!(!encoder.insert(HeaderField::new("x-a", "1")));
}

#[test]
fn test_static_only_config() {
    let mut encoder = Encoder::with_config(Vec::new(), EncoderConfig::static_only()).unwrap();
    assert!(encoder.set_capacity(1).is_err());

    let encoded = encoder
        .encode(0, &[HeaderField::new("x-a", "1"), HeaderField::new(":path", "/")])
        .unwrap();
    assert_eq!(&encoded[..2], &[0x00, 0x00]);
    assert!(encoder.handler().is_empty());
    assert_eq!(encoded[encoded.len() - 1], 0xC1);
}

#[test]
fn test_reset_of_static_only_stream() {
    let mut encoder = encoder_with(4096, 10);
    encoder.encode(1, &[HeaderField::new(":method", "GET")]).unwrap();
    assert_eq!(encoder.outstanding_sections(1), 1);

    // A decoder with a non-zero table capacity cancels every reset stream
    let mut feedback = BytesMut::new();
    DecoderInstruction::StreamCancel { stream_id: 1 }.encode(&mut feedback);
    assert_eq!(encoder.process_decoder_stream(&feedback).unwrap(), feedback.len());
    assert_eq!(encoder.outstanding_sections(1), 0);
}

#[test]
fn test_acknowledgements_interleaved_with_static_sections() {
    let mut encoder = encoder_with(4096, 10);
    let mut decoder = MirrorDecoder::new(4096);
    encoder.insert(HeaderField::new("x-a", "1"));
    encoder.insert(HeaderField::new("x-b", "2"));
    decoder.apply_all(&drain(&mut encoder));

    let sections = [
        vec![HeaderField::new(":method", "GET")],
        vec![HeaderField::new("x-a", "1")],
        vec![HeaderField::new(":path", "/")],
        vec![HeaderField::new("x-b", "2")],
    ];
    let mut feedback = BytesMut::new();
    for fields in &sections {
        let encoded = encoder.encode(0, fields).unwrap();
        let (decoded, required_insert_count) = decoder.decode(&encoded);
        assert_eq!(&decoded, fields);
        if required_insert_count > 0 {
            DecoderInstruction::SectionAck { stream_id: 0 }.encode(&mut feedback);
        }
    }
    assert_eq!(encoder.outstanding_sections(0), 4);
    assert_eq!(encoder.blocked_streams(), 2);

    encoder.process_decoder_stream(&feedback).unwrap();
    assert_eq!(encoder.known_insert_count(), 2);
    assert_eq!(encoder.outstanding_sections(0), 0);
    assert_eq!(encoder.blocked_streams(), 0);
    assert!(encoder.table().iter().all(|e| e.reference_count() == 0));
}
