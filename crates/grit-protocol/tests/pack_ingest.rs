//! End-to-end pack ingest tests.
//!
//! These build synthetic packs byte by byte (headers, zlib streams,
//! trailer) and run them through the parser and delta resolver against a
//! real on-disk object store.

use flate2::write::ZlibEncoder;
use flate2::Compression;
use grit_protocol::{PackParser, ProtocolError};
use grit_storage::{Commit, Object, ObjectId, ObjectStore, ObjectType, Signature, TreeEntry};
use sha1::{Digest, Sha1};
use std::io::Write;

fn store() -> (tempfile::TempDir, ObjectStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = ObjectStore::new(dir.path().join("objects"));
    (dir, store)
}

fn compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Pack record header: 3-bit tag, size varint with the shift starting
/// at 4.
fn record_header(tag: u8, mut size: usize) -> Vec<u8> {
    let mut out = Vec::new();
    let mut first = ((tag & 0x07) << 4) | (size & 0x0F) as u8;
    size >>= 4;
    if size > 0 {
        first |= 0x80;
    }
    out.push(first);
    while size > 0 {
        let mut byte = (size & 0x7F) as u8;
        size >>= 7;
        if size > 0 {
            byte |= 0x80;
        }
        out.push(byte);
    }
    out
}

/// Delta-stream size varint: 7 bits per byte, shift from 0.
fn delta_size(mut value: usize) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            out.push(byte | 0x80);
        } else {
            out.push(byte);
            return out;
        }
    }
}

fn delta_payload(base_size: usize, result_size: usize, instructions: &[u8]) -> Vec<u8> {
    let mut out = delta_size(base_size);
    out.extend_from_slice(&delta_size(result_size));
    out.extend_from_slice(instructions);
    out
}

fn undeltified_record(object_type: ObjectType, payload: &[u8]) -> Vec<u8> {
    let mut out = record_header(object_type.pack_type(), payload.len());
    out.extend_from_slice(&compress(payload));
    out
}

fn ref_delta_record(base: &ObjectId, delta: &[u8]) -> Vec<u8> {
    let mut out = record_header(7, delta.len());
    out.extend_from_slice(base.as_bytes());
    out.extend_from_slice(&compress(delta));
    out
}

fn ofs_delta_record(distance: u64, delta: &[u8]) -> Vec<u8> {
    assert!(distance < 128, "single-byte distances only in these tests");
    let mut out = record_header(6, delta.len());
    out.push(distance as u8);
    out.extend_from_slice(&compress(delta));
    out
}

fn finish_pack(records: &[Vec<u8>]) -> Vec<u8> {
    let mut pack = b"PACK".to_vec();
    pack.extend_from_slice(&2u32.to_be_bytes());
    pack.extend_from_slice(&(records.len() as u32).to_be_bytes());
    for record in records {
        pack.extend_from_slice(record);
    }
    let mut hasher = Sha1::new();
    hasher.update(&pack);
    let digest = hasher.finalize();
    pack.extend_from_slice(&digest);
    pack
}

fn read_blob(store: &ObjectStore, id: &ObjectId) -> Vec<u8> {
    let Object::Blob(data) = store.read(id).unwrap() else {
        panic!("{} is not a blob", id);
    };
    data.to_vec()
}

#[test]
fn ingest_undeltified_objects() {
    let (_dir, store) = store();
    let pack = finish_pack(&[
        undeltified_record(ObjectType::Blob, b""),
        undeltified_record(ObjectType::Blob, b"hello\n"),
    ]);

    let ids = PackParser::new(&pack).ingest(&store).unwrap();
    assert_eq!(ids.len(), 2);
    assert_eq!(ids[0].to_hex(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    assert_eq!(ids[1].to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
    assert_eq!(read_blob(&store, &ids[1]), b"hello\n");
}

#[test]
fn ingest_commit_tree_blob() {
    let (_dir, store) = store();
    let blob = Object::Blob(b"hi\n".to_vec().into());
    let tree = Object::Tree(vec![TreeEntry {
        mode: 0o100644,
        name: b"file.txt".to_vec(),
        id: blob.id(),
    }]);
    let signature = Signature {
        who: "A U Thor <au@example.com>".to_string(),
        time: 0,
        tz: "+0000".to_string(),
    };
    let commit = Object::Commit(Commit {
        tree: tree.id(),
        parents: vec![],
        author: signature.clone(),
        committer: signature,
        message: b"initial".to_vec(),
    });

    let pack = finish_pack(&[
        undeltified_record(ObjectType::Commit, &commit.payload()),
        undeltified_record(ObjectType::Tree, &tree.payload()),
        undeltified_record(ObjectType::Blob, &blob.payload()),
    ]);
    PackParser::new(&pack).ingest(&store).unwrap();

    let Object::Commit(loaded) = store.read(&commit.id()).unwrap() else {
        panic!("expected commit");
    };
    let Object::Tree(entries) = store.read(&loaded.tree).unwrap() else {
        panic!("expected tree");
    };
    assert_eq!(entries.len(), 1);
    assert_eq!(read_blob(&store, &entries[0].id), b"hi\n");
}

/// Delta that copies the whole base and appends one literal byte.
fn extend_by_one(base_len: usize, result: &[u8], literal: u8) -> Vec<u8> {
    let copy_len = result.len() - 1;
    let instructions = [0x90, copy_len as u8, 0x01, literal];
    delta_payload(base_len, result.len(), &instructions)
}

#[test]
fn ingest_delta_chain_in_arrival_order() {
    let (_dir, store) = store();
    let base = b"hello!";
    let id_base = ObjectId::hash_object(ObjectType::Blob, base);
    let id_one = ObjectId::hash_object(ObjectType::Blob, b"hello!?");
    let id_two = ObjectId::hash_object(ObjectType::Blob, b"hello!?!");

    let pack = finish_pack(&[
        undeltified_record(ObjectType::Blob, base),
        ref_delta_record(&id_base, &extend_by_one(6, b"hello!?", b'?')),
        ref_delta_record(&id_one, &extend_by_one(7, b"hello!?!", b'!')),
    ]);
    let ids = PackParser::new(&pack).ingest(&store).unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(read_blob(&store, &id_one), b"hello!?");
    assert_eq!(read_blob(&store, &id_two), b"hello!?!");
}

#[test]
fn ingest_delta_chain_reversed_needs_extra_passes() {
    let (_dir, store) = store();
    let base = b"hello!";
    let id_base = ObjectId::hash_object(ObjectType::Blob, base);
    let id_one = ObjectId::hash_object(ObjectType::Blob, b"hello!?");
    let id_two = ObjectId::hash_object(ObjectType::Blob, b"hello!?!");

    // The dependent delta arrives before its base delta.
    let pack = finish_pack(&[
        undeltified_record(ObjectType::Blob, base),
        ref_delta_record(&id_one, &extend_by_one(7, b"hello!?!", b'!')),
        ref_delta_record(&id_base, &extend_by_one(6, b"hello!?", b'?')),
    ]);
    let ids = PackParser::new(&pack).ingest(&store).unwrap();
    assert_eq!(ids.len(), 3);
    assert_eq!(read_blob(&store, &id_one), b"hello!?");
    assert_eq!(read_blob(&store, &id_two), b"hello!?!");
}

#[test]
fn ingest_delta_chain_order_independence() {
    // Both arrival orders must leave identical store contents.
    let runs: Vec<Vec<ObjectId>> = [false, true]
        .into_iter()
        .map(|reversed| {
            let (_dir, store) = store();
            let base = b"hello!";
            let id_base = ObjectId::hash_object(ObjectType::Blob, base);
            let id_one = ObjectId::hash_object(ObjectType::Blob, b"hello!?");

            let first = ref_delta_record(&id_base, &extend_by_one(6, b"hello!?", b'?'));
            let second = ref_delta_record(&id_one, &extend_by_one(7, b"hello!?!", b'!'));
            let records = if reversed {
                vec![undeltified_record(ObjectType::Blob, base), second, first]
            } else {
                vec![undeltified_record(ObjectType::Blob, base), first, second]
            };
            let mut ids = PackParser::new(&finish_pack(&records))
                .ingest(&store)
                .unwrap();
            ids.sort();
            ids
        })
        .collect();
    assert_eq!(runs[0], runs[1]);
}

#[test]
fn ingest_ofs_delta() {
    let (_dir, store) = store();
    let base = b"hello!";
    let base_record = undeltified_record(ObjectType::Blob, base);
    // The base record starts right after the 12-byte pack header; the
    // delta's distance is the base record's length.
    let distance = base_record.len() as u64;
    let pack = finish_pack(&[
        base_record,
        ofs_delta_record(distance, &extend_by_one(6, b"hello!?", b'?')),
    ]);

    let ids = PackParser::new(&pack).ingest(&store).unwrap();
    assert_eq!(ids.len(), 2);
    let id_one = ObjectId::hash_object(ObjectType::Blob, b"hello!?");
    assert_eq!(read_blob(&store, &id_one), b"hello!?");
}

#[test]
fn ingest_zero_size_copy_is_64k() {
    let (_dir, store) = store();
    let base = vec![0xAB; 0x10000];
    let id_base = ObjectId::hash_object(ObjectType::Blob, &base);

    // Copy with no selector bits decodes size 0, meaning 0x10000, then
    // one literal so the result differs from the base.
    let delta = delta_payload(0x10000, 0x10001, &[0x80, 0x01, b'Z']);
    let pack = finish_pack(&[
        undeltified_record(ObjectType::Blob, &base),
        ref_delta_record(&id_base, &delta),
    ]);
    PackParser::new(&pack).ingest(&store).unwrap();

    let mut expected = base.clone();
    expected.push(b'Z');
    let id = ObjectId::hash_object(ObjectType::Blob, &expected);
    let reconstructed = read_blob(&store, &id);
    assert_eq!(reconstructed.len(), 0x10001);
    assert_eq!(reconstructed, expected);
}

#[test]
fn ingest_unresolvable_delta_keeps_plain_objects() {
    let (_dir, store) = store();
    let survivor = b"survivor";
    let id_survivor = ObjectId::hash_object(ObjectType::Blob, survivor);
    let missing = ObjectId::from_bytes([0xEE; 20]);

    let pack = finish_pack(&[
        undeltified_record(ObjectType::Blob, survivor),
        ref_delta_record(&missing, &delta_payload(1, 1, &[0x01, b'x'])),
    ]);
    let result = PackParser::new(&pack).ingest(&store);
    assert!(matches!(result, Err(ProtocolError::UnresolvableDelta(_))));

    // The undeltified object was written through before the failure.
    assert!(store.exists(&id_survivor));
    assert_eq!(read_blob(&store, &id_survivor), survivor);
}

#[test]
fn ingest_delta_base_on_disk_does_not_count() {
    // Bases resolve only against objects from the same pack; a loose
    // object with the right name does not rescue a delta.
    let (_dir, store) = store();
    let base_id = store.write(ObjectType::Blob, b"hello!").unwrap();

    let pack = finish_pack(&[ref_delta_record(
        &base_id,
        &extend_by_one(6, b"hello!?", b'?'),
    )]);
    let result = PackParser::new(&pack).ingest(&store);
    assert!(matches!(result, Err(ProtocolError::UnresolvableDelta(_))));
}

#[test]
fn ingest_rejects_corrupt_trailer() {
    let (_dir, store) = store();
    let mut pack = finish_pack(&[undeltified_record(ObjectType::Blob, b"x")]);
    let last = pack.len() - 1;
    pack[last] ^= 0xFF;

    let result = PackParser::new(&pack).ingest(&store);
    assert!(matches!(result, Err(ProtocolError::MalformedPack(_))));
}

#[test]
fn ingest_rejects_reserved_type_tag() {
    let (_dir, store) = store();
    let mut record = record_header(5, 1);
    record.extend_from_slice(&compress(b"x"));
    let pack = finish_pack(&[record]);

    let result = PackParser::new(&pack).ingest(&store);
    assert!(matches!(result, Err(ProtocolError::Storage(_))));
}

#[test]
fn ingest_rejects_size_mismatch() {
    let (_dir, store) = store();
    // Header claims 3 bytes, stream inflates to 5.
    let mut record = record_header(3, 3);
    record.extend_from_slice(&compress(b"hello"));
    let pack = finish_pack(&[record]);

    let result = PackParser::new(&pack).ingest(&store);
    assert!(matches!(result, Err(ProtocolError::MalformedPack(_))));
}
