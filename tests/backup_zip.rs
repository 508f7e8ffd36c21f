use std::fs::File;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use studygroupd::backup;
use studygroupd::store::local::{LocalStore, DB_FILE_NAME};
use studygroupd::store::{Store, StorePath};

fn temp_dir(prefix: &str) -> PathBuf {
    let p = std::env::temp_dir().join(format!(
        "{}-{}",
        prefix,
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos()
    ));
    std::fs::create_dir_all(&p).expect("create temp dir");
    p
}

#[tokio::test]
async fn zip_export_and_import_roundtrip() {
    let src = temp_dir("studygroup-backup-src");
    let dst = temp_dir("studygroup-backup-dst");
    let out_dir = temp_dir("studygroup-backup-out");

    {
        let store = LocalStore::open(&src).expect("open source store");
        store
            .set(
                &StorePath::parse("groups/g1").expect("path"),
                &serde_json::json!({ "name": "Algebra", "grade": "9", "subject": "Math", "teacherId": "t1" }),
            )
            .await
            .expect("seed");
    }

    let bundle_path = out_dir.join("store.sgbackup.zip");
    let export = backup::export_store_bundle(&src, &bundle_path).expect("export bundle");
    assert_eq!(export.bundle_format, backup::BUNDLE_FORMAT_V1);
    assert_eq!(export.entry_count, 2);
    assert_eq!(export.sha256.len(), 64);

    let f = File::open(&bundle_path).expect("open bundle");
    let mut archive = zip::ZipArchive::new(f).expect("open zip archive");
    let mut manifest = String::new();
    archive
        .by_name("manifest.json")
        .expect("manifest entry")
        .read_to_string(&mut manifest)
        .expect("read manifest");
    assert!(manifest.contains(backup::BUNDLE_FORMAT_V1));
    assert!(manifest.contains(&export.sha256));

    let import = backup::import_store_bundle(&bundle_path, &dst).expect("import bundle");
    assert_eq!(import.bundle_format_detected, backup::BUNDLE_FORMAT_V1);

    let restored = LocalStore::open(&dst).expect("open restored store");
    let name = restored
        .get(&StorePath::parse("groups/g1/name").expect("path"))
        .await
        .expect("read restored");
    assert_eq!(name, Some(serde_json::json!("Algebra")));

    let _ = std::fs::remove_dir_all(src);
    let _ = std::fs::remove_dir_all(dst);
    let _ = std::fs::remove_dir_all(out_dir);
}

#[test]
fn tampered_bundle_is_rejected() {
    let src = temp_dir("studygroup-backup-tamper-src");
    let dst = temp_dir("studygroup-backup-tamper-dst");
    std::fs::write(src.join(DB_FILE_NAME), b"original-bytes").expect("write db");
    let bundle = src.join("bundle.zip");
    backup::export_store_bundle(&src, &bundle).expect("export");

    // Rebuild the archive with the same manifest but different database bytes.
    let mut manifest = String::new();
    {
        let mut archive = zip::ZipArchive::new(File::open(&bundle).expect("open")).expect("zip");
        archive
            .by_name("manifest.json")
            .expect("manifest")
            .read_to_string(&mut manifest)
            .expect("read");
    }
    let tampered = src.join("tampered.zip");
    {
        let mut zip = zip::ZipWriter::new(File::create(&tampered).expect("create"));
        let opts = zip::write::FileOptions::default();
        zip.start_file("manifest.json", opts).expect("start");
        zip.write_all(manifest.as_bytes()).expect("write");
        zip.start_file("db/studygroup.sqlite3", opts).expect("start");
        zip.write_all(b"evil-bytes").expect("write");
        zip.finish().expect("finish");
    }

    let err = backup::import_store_bundle(&tampered, &dst).unwrap_err();
    assert!(err.to_string().contains("checksum mismatch"), "{}", err);
    assert!(!dst.join(DB_FILE_NAME).exists());

    let _ = std::fs::remove_dir_all(src);
    let _ = std::fs::remove_dir_all(dst);
}

#[test]
fn legacy_sqlite_import_is_supported() {
    let out_dir = temp_dir("studygroup-backup-legacy");
    let store_dir = temp_dir("studygroup-backup-legacy-dst");

    let legacy_file = out_dir.join("legacy.sqlite3");
    let bytes = b"legacy-sqlite-copy";
    std::fs::write(&legacy_file, bytes).expect("write legacy sqlite file");

    let import =
        backup::import_store_bundle(&legacy_file, &store_dir).expect("import legacy sqlite");
    assert_eq!(import.bundle_format_detected, backup::LEGACY_SQLITE_FORMAT);

    let restored = std::fs::read(store_dir.join(DB_FILE_NAME)).expect("read restored sqlite");
    assert_eq!(restored, bytes);

    let _ = std::fs::remove_dir_all(out_dir);
    let _ = std::fs::remove_dir_all(store_dir);
}

#[test]
fn export_without_store_fails() {
    let empty = temp_dir("studygroup-backup-empty");
    let err = backup::export_store_bundle(&empty, &empty.join("x.zip")).unwrap_err();
    assert!(err.to_string().contains("store database not found"));
    let _ = std::fs::remove_dir_all(empty);
}

#[test]
fn prepare_checks_bundle_without_touching_store() {
    let src = temp_dir("studygroup-backup-prepare-src");
    let dst = temp_dir("studygroup-backup-prepare-dst");
    std::fs::write(src.join(DB_FILE_NAME), b"db-bytes").expect("write db");
    let bundle = src.join("bundle.zip");
    backup::export_store_bundle(&src, &bundle).expect("export");

    let broken = src.join("broken.zip");
    std::fs::write(&broken, b"PK\x03\x04truncated").expect("write broken");
    assert!(backup::prepare_import(&broken).is_err());

    let prepared = backup::prepare_import(&bundle).expect("prepare");
    assert_eq!(prepared.bundle_format(), backup::BUNDLE_FORMAT_V1);
    assert!(!dst.join(DB_FILE_NAME).exists());
    prepared.install(&dst).expect("install");
    assert_eq!(
        std::fs::read(dst.join(DB_FILE_NAME)).expect("read"),
        b"db-bytes"
    );

    let _ = std::fs::remove_dir_all(src);
    let _ = std::fs::remove_dir_all(dst);
}
