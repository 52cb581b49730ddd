//! Integration tests for the extraction and recovery drivers.

mod common;

use std::path::PathBuf;
use std::time::{Duration, UNIX_EPOCH};

use assert_fs::prelude::*;
use predicates::prelude::*;

use common::{DbxBuilder, TestMessage};
use dbxtract::export::extract::{extract_container, run_batch, ExtractOptions};
use dbxtract::model::filetime::Filetime;
use dbxtract::progress::{Event, LogSink, ProgressSink, Status};

const HELLO: &str = "Alice_Bob_Test.00000000.00000000.eml";

#[derive(Default)]
struct Recorder {
    events: Vec<Event>,
    dumps: Vec<String>,
}

impl Recorder {
    fn count(&self, status: Status) -> usize {
        self.events.iter().filter(|e| e.status == status).count()
    }
}

impl ProgressSink for Recorder {
    fn begin(&mut self, _label: &str, _total: u64) {}
    fn update(&mut self, _position: u64) {}
    fn event(&mut self, event: Event) {
        self.events.push(event);
    }
    fn finish(&mut self, _summary: &str) {}
    fn dump(&mut self, line: &str) {
        self.dumps.push(line.to_string());
    }
}

fn hello_container() -> Vec<u8> {
    DbxBuilder::new()
        .message(TestMessage::new("Test", b"Hello").from("Alice").to("Bob"))
        .message(TestMessage::new("Second", b"Another body").from("Carol"))
        .build()
}

fn setup(bytes: &[u8]) -> (assert_fs::TempDir, PathBuf, PathBuf) {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("Inbox.dbx");
    input.write_binary(bytes).unwrap();
    let out = temp.path().join("out").join("Inbox");
    (temp, input.path().to_path_buf(), out)
}

// ─── Normal mode ────────────────────────────────────────────────────

#[test]
fn test_extract_writes_messages() {
    let (temp, input, out) = setup(&hello_container());
    let mut sink = Recorder::default();
    let stats = extract_container(&input, &out, &ExtractOptions::default(), &mut sink).unwrap();

    assert_eq!(stats.extracted, 2);
    assert_eq!(sink.count(Status::Ok), 2);
    temp.child("out/Inbox").child(HELLO).assert("Hello");
    temp.child("out/Inbox")
        .child("Carol_(no_receiver)_Second.00000000.00000000.eml")
        .assert("Another body");
}

#[test]
fn test_rerun_leaves_unchanged_files() {
    let (_temp, input, out) = setup(&hello_container());
    let opts = ExtractOptions::default();
    extract_container(&input, &out, &opts, &mut Recorder::default()).unwrap();

    let stats = extract_container(&input, &out, &opts, &mut Recorder::default()).unwrap();
    assert_eq!(stats.extracted, 0);
    assert_eq!(stats.unchanged, 2);
}

#[test]
fn test_changed_file_is_rewritten() {
    let (temp, input, out) = setup(&hello_container());
    std::fs::create_dir_all(&out).unwrap();
    std::fs::write(out.join(HELLO), b"tampered with").unwrap();

    let stats =
        extract_container(&input, &out, &ExtractOptions::default(), &mut Recorder::default())
            .unwrap();
    assert_eq!(stats.extracted, 2);
    temp.child("out/Inbox").child(HELLO).assert("Hello");
}

#[test]
fn test_orphans_are_deleted_unless_kept() {
    let (temp, input, out) = setup(&hello_container());
    temp.child("out/Inbox").create_dir_all().unwrap();
    let stale = temp.child("out/Inbox/zz_stale.eml");
    stale.write_str("old").unwrap();
    let notes = temp.child("out/Inbox/notes.txt");
    notes.write_str("not a message").unwrap();

    let keep = ExtractOptions {
        keep_orphans: true,
        ..ExtractOptions::default()
    };
    let stats = extract_container(&input, &out, &keep, &mut Recorder::default()).unwrap();
    assert_eq!(stats.deleted, 0);
    stale.assert(predicate::path::exists());

    let mut sink = Recorder::default();
    let stats = extract_container(&input, &out, &ExtractOptions::default(), &mut sink).unwrap();
    assert_eq!(stats.deleted, 1);
    assert_eq!(sink.count(Status::Deleted), 1);
    stale.assert(predicate::path::missing());
    notes.assert(predicate::path::exists());
}

#[test]
fn test_switching_to_safe_mode_moves_files() {
    let built = DbxBuilder::new()
        .message(TestMessage::new("Test", b"Hello").from("Alice").to("Bob"))
        .build_with_offsets();
    let (temp, input, out) = setup(&built.bytes);
    extract_container(&input, &out, &ExtractOptions::default(), &mut Recorder::default())
        .unwrap();

    let mut safe = ExtractOptions::default();
    safe.naming.safe_mode = true;
    let mut sink = Recorder::default();
    let stats = extract_container(&input, &out, &safe, &mut sink).unwrap();

    assert_eq!(stats.moved, 1);
    assert_eq!(stats.extracted, 0);
    assert_eq!(stats.unchanged, 1);
    assert_eq!(sink.count(Status::Moved), 1);
    let safe_name = format!("{:08X}.eml", built.records[0]);
    temp.child("out/Inbox").child(&safe_name).assert("Hello");
    temp.child("out/Inbox")
        .child(HELLO)
        .assert(predicate::path::missing());
}

#[test]
fn test_blocked_move_fails_only_that_message() {
    let built = DbxBuilder::new()
        .message(TestMessage::new("Test", b"Hello").from("Alice").to("Bob"))
        .message(TestMessage::new("Second", b"Another body").from("Carol"))
        .build_with_offsets();
    let (temp, input, out) = setup(&built.bytes);
    extract_container(&input, &out, &ExtractOptions::default(), &mut Recorder::default())
        .unwrap();

    // A directory squats on the first message's safe-mode name.
    let blocked = format!("{:08X}.eml", built.records[0]);
    temp.child("out/Inbox").child(&blocked).create_dir_all().unwrap();

    let mut safe = ExtractOptions::default();
    safe.naming.safe_mode = true;
    let mut sink = Recorder::default();
    let stats = extract_container(&input, &out, &safe, &mut sink).unwrap();

    assert_eq!(stats.moved, 1);
    assert!(stats.failed >= 1);
    assert!(sink.count(Status::Error) >= 1);
    let carol = format!("{:08X}.eml", built.records[1]);
    temp.child("out/Inbox").child(&carol).assert("Another body");
    // The file that could not be moved is not deleted as an orphan.
    temp.child("out/Inbox").child(HELLO).assert("Hello");
}

#[test]
fn test_uppercase_extension_is_not_an_orphan() {
    let (temp, input, out) = setup(&hello_container());
    temp.child("out/Inbox").create_dir_all().unwrap();
    let mine = temp.child("out/Inbox/Notes.EML");
    mine.write_str("kept by the user").unwrap();

    let stats =
        extract_container(&input, &out, &ExtractOptions::default(), &mut Recorder::default())
            .unwrap();
    assert_eq!(stats.deleted, 0);
    mine.assert("kept by the user");
}

#[test]
fn test_damaged_index_warns_and_extracts_the_rest() {
    let bytes = DbxBuilder::new()
        .message(TestMessage::new("One", b"1"))
        .message(TestMessage::new("Two", b"2"))
        .cyclic()
        .build();
    let (_temp, input, out) = setup(&bytes);
    let mut sink = Recorder::default();
    let stats = extract_container(&input, &out, &ExtractOptions::default(), &mut sink).unwrap();

    assert_eq!(sink.count(Status::Warning), 1);
    assert_eq!(stats.extracted, 2);
}

#[test]
fn test_truncated_body_warns_and_is_written() {
    let body: Vec<u8> = (0..1500u32).map(|i| b'a' + (i % 26) as u8).collect();
    let built = DbxBuilder::new()
        .message(TestMessage::new("Long", &body))
        .build_with_offsets();
    let mut bytes = built.bytes;
    // Point the first block's next pointer past the end of the file.
    let first = built.first_blocks[0] as usize;
    bytes[first + 12..first + 16].copy_from_slice(&0x7FFF_FFF0u32.to_le_bytes());
    let (_temp, input, out) = setup(&bytes);

    let mut sink = Recorder::default();
    let stats = extract_container(&input, &out, &ExtractOptions::default(), &mut sink).unwrap();
    assert_eq!(sink.count(Status::Warning), 1);
    assert_eq!(stats.extracted, 1);
    let file = std::fs::read_dir(&out).unwrap().next().unwrap().unwrap();
    assert_eq!(std::fs::read(file.path()).unwrap(), &body[..0x200]);
}

#[test]
fn test_zero_length_messages() {
    let stub = TestMessage {
        subject: Some("Stub".into()),
        ..TestMessage::default()
    };
    let bytes = DbxBuilder::new().message(stub).build();
    let name = "(no_sender)_(no_receiver)_Stub.00000000.00000000.eml";

    let (temp, input, out) = setup(&bytes);
    let ignore = ExtractOptions {
        ignore_zero_length: true,
        ..ExtractOptions::default()
    };
    let stats = extract_container(&input, &out, &ignore, &mut Recorder::default()).unwrap();
    assert_eq!(stats.skipped, 1);
    temp.child("out/Inbox").child(name).assert(predicate::path::missing());

    extract_container(&input, &out, &ExtractOptions::default(), &mut Recorder::default())
        .unwrap();
    temp.child("out/Inbox").child(name).assert("");
}

#[test]
fn test_timestamps_follow_receive_time() {
    let when = Filetime::from_unix(1_000_000_000);
    let bytes = DbxBuilder::new()
        .message(TestMessage::new("Dated", b"x").received(when.0))
        .build();
    let (_temp, input, out) = setup(&bytes);
    extract_container(&input, &out, &ExtractOptions::default(), &mut Recorder::default())
        .unwrap();

    let file = std::fs::read_dir(&out).unwrap().next().unwrap().unwrap();
    let modified = file.metadata().unwrap().modified().unwrap();
    assert_eq!(modified, UNIX_EPOCH + Duration::from_secs(1_000_000_000));
}

#[test]
fn test_debug_dump_emits_json_lines() {
    let (_temp, input, out) = setup(&hello_container());
    let opts = ExtractOptions {
        debug_dump: true,
        ..ExtractOptions::default()
    };
    let mut sink = Recorder::default();
    extract_container(&input, &out, &opts, &mut sink).unwrap();

    assert_eq!(sink.dumps.len(), 2);
    let first: serde_json::Value = serde_json::from_str(&sink.dumps[0]).unwrap();
    assert_eq!(first["subject"], "Test");
    assert_eq!(first["filename"], HELLO);
}

// ─── Batches and recovery ───────────────────────────────────────────

#[test]
fn test_batch_over_directory_skips_folder_list() {
    let temp = assert_fs::TempDir::new().unwrap();
    let input = temp.child("store");
    input.create_dir_all().unwrap();
    input.child("Inbox.dbx").write_binary(&hello_container()).unwrap();
    input
        .child("Folders.dbx")
        .write_binary(&DbxBuilder::new().folder_list().build())
        .unwrap();
    input.child("readme.txt").write_str("ignored").unwrap();

    let out = temp.child("out");
    let mut sink = Recorder::default();
    let summary = run_batch(
        &[input.path().to_path_buf()],
        out.path(),
        &ExtractOptions::default(),
        false,
        &mut sink,
    );

    assert_eq!(summary.ok, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.stats.extracted, 2);
    assert_eq!(sink.count(Status::Error), 1);
    out.child("Inbox").child(HELLO).assert("Hello");
}

#[test]
fn test_batch_reports_missing_input() {
    let temp = assert_fs::TempDir::new().unwrap();
    let summary = run_batch(
        &[temp.path().join("nope.dbx")],
        temp.path(),
        &ExtractOptions::default(),
        false,
        &mut LogSink,
    );
    assert_eq!(summary.ok, 0);
    assert_eq!(summary.failed, 1);
}

#[test]
fn test_recover_writes_live_and_deleted() {
    let bytes = DbxBuilder::new()
        .message(TestMessage::new(
            "kept",
            b"From: Alice <a@example.com>\r\nTo: bob@example.com\r\nSubject: kept\r\n\r\nbody",
        ))
        .deleted(b"From: Carol <c@example.com>\r\nSubject: gone\r\n\r\nold")
        .build();
    let (temp, input, _) = setup(&bytes);
    let out = temp.child("recovered");

    let summary = run_batch(
        &[input],
        out.path(),
        &ExtractOptions::default(),
        true,
        &mut Recorder::default(),
    );
    assert_eq!(summary.ok, 1);
    assert_eq!(summary.stats.extracted, 2);

    let dir = out.child("Inbox");
    dir.child("Alice_bob@example.com_kept.00000000.00000000.eml")
        .assert(predicate::str::ends_with("body"));
    // The placeholder overwrote the start of the From header.
    dir.child("deleted_(no_sender)_(no_receiver)_gone.00000000.00000000.eml")
        .assert(predicate::str::starts_with("----: Carol"));
}
