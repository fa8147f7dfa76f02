use std::fs;
use std::path::Path;

use tempfile::tempdir;
use thesis_ledger::core::broker;
use thesis_ledger::core::config::Config;
use thesis_ledger::core::error::LedgerError;
use thesis_ledger::core::store::Store;
use thesis_ledger::core::time;
use thesis_ledger::plugins::files::{self, FileQuery};
use thesis_ledger::plugins::users::{self, NewUser};

fn store_in(dir: &Path) -> Store {
    Store::with_config(
        dir,
        Config {
            password_iterations: 1_000,
            ..Config::default()
        },
    )
    .unwrap()
}

fn write_source(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, bytes).unwrap();
    path
}

#[test]
fn register_copies_artifact_and_records_metadata() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let uploader = users::create_user(&store, NewUser::student("Amir", "pw")).unwrap();
    let src = write_source(tmp.path(), "Final Thesis.PDF", b"%PDF-1.7 thesis body");

    let id = files::register(&store, &src, "final draft", Some(uploader)).unwrap();
    let rec = files::get_file(&store, id).unwrap().unwrap();

    assert_eq!(rec.original_name, "Final Thesis.PDF");
    assert_eq!(rec.file_type, "pdf");
    assert_eq!(rec.description, "final draft");
    assert_eq!(rec.uploader_id, Some(uploader));
    assert_eq!(rec.size_bytes, 20);
    assert!(rec.registered_at.ends_with('Z'));
    assert!(rec.stored_path.starts_with("uploads/file_1_"));
    assert!(rec.stored_path.ends_with(".pdf"));
    assert_eq!(rec.sha256(), Some(files::hash_bytes(b"%PDF-1.7 thesis body").as_str()));

    let stored = files::artifact_path(&store, &rec);
    assert_eq!(fs::read(stored).unwrap(), b"%PDF-1.7 thesis body");
    assert!(src.exists());
}

#[test]
fn register_rejects_missing_source_and_bad_extension() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());

    let err = files::register(&store, &tmp.path().join("nope.pdf"), "", None).unwrap_err();
    assert!(matches!(err, LedgerError::NotFound(_)));

    let docx = write_source(tmp.path(), "notes.docx", b"PK");
    let err = files::register(&store, &docx, "", None).unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    let bare = write_source(tmp.path(), "README", b"x");
    let err = files::register(&store, &bare, "", None).unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    assert!(!store.document_path().exists());
}

#[test]
fn register_rejects_unknown_or_inactive_uploader_without_leaving_a_copy() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let u = users::create_user(&store, NewUser::student("Amir", "pw")).unwrap();
    users::set_active(&store, u, false).unwrap();
    let src = write_source(tmp.path(), "scan.jpg", b"\xFF\xD8\xFF");

    let err = files::register(&store, &src, "", Some(99)).unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));
    let err = files::register(&store, &src, "", Some(u)).unwrap_err();
    assert!(matches!(err, LedgerError::ValidationError(_)));

    assert!(files::list_files(&store).unwrap().is_empty());
    let copies = fs::read_dir(store.uploads_dir())
        .map(|entries| entries.count())
        .unwrap_or(0);
    assert_eq!(copies, 0);
}

#[test]
fn find_ands_all_filters() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let u = users::create_user(&store, NewUser::student("Amir", "pw")).unwrap();
    let a = write_source(tmp.path(), "Thesis_Final.pdf", b"a");
    let b = write_source(tmp.path(), "thesis-scan.jpeg", b"b");
    let c = write_source(tmp.path(), "proposal.pdf", b"c");
    files::register(&store, &a, "", Some(u)).unwrap();
    files::register(&store, &b, "", None).unwrap();
    files::register(&store, &c, "", Some(u)).unwrap();

    let names = |q: FileQuery| -> Vec<String> {
        files::find(&store, &q)
            .unwrap()
            .into_iter()
            .map(|f| f.original_name)
            .collect()
    };
    assert_eq!(names(FileQuery::default()).len(), 3);
    assert_eq!(
        names(FileQuery {
            name_contains: Some("THESIS".into()),
            ..Default::default()
        }),
        vec!["Thesis_Final.pdf", "thesis-scan.jpeg"]
    );
    assert_eq!(
        names(FileQuery {
            name_contains: Some("thesis".into()),
            uploader_id: Some(u),
            ..Default::default()
        }),
        vec!["Thesis_Final.pdf"]
    );
    assert_eq!(
        names(FileQuery {
            file_type: Some("pdf".into()),
            ..Default::default()
        }),
        vec!["Thesis_Final.pdf", "proposal.pdf"]
    );
}

#[test]
fn delete_removes_record_and_optionally_the_artifact() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let src = write_source(tmp.path(), "a.pdf", b"a");
    let keep = files::register(&store, &src, "", None).unwrap();
    let gone = files::register(&store, &src, "", None).unwrap();
    let keep_path = files::artifact_path(&store, &files::get_file(&store, keep).unwrap().unwrap());
    let gone_path = files::artifact_path(&store, &files::get_file(&store, gone).unwrap().unwrap());

    assert!(files::delete(&store, keep, false).unwrap());
    assert!(keep_path.exists());

    assert!(files::delete(&store, gone, true).unwrap());
    assert!(!gone_path.exists());

    assert!(!files::delete(&store, gone, true).unwrap());
    assert!(files::list_files(&store).unwrap().is_empty());
}

#[test]
fn delete_tolerates_an_already_missing_artifact() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let src = write_source(tmp.path(), "a.pdf", b"a");
    let id = files::register(&store, &src, "", None).unwrap();
    let path = files::artifact_path(&store, &files::get_file(&store, id).unwrap().unwrap());
    fs::remove_file(&path).unwrap();

    assert!(files::delete(&store, id, true).unwrap());
}

#[test]
fn verify_reports_missing_and_tampered_artifacts() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let a = write_source(tmp.path(), "a.pdf", b"original");
    let ok = files::register(&store, &a, "", None).unwrap();
    let tampered = files::register(&store, &a, "", None).unwrap();
    let missing = files::register(&store, &a, "", None).unwrap();
    assert!(files::verify_files(&store).unwrap().is_empty());

    let path_of = |id| files::artifact_path(&store, &files::get_file(&store, id).unwrap().unwrap());
    fs::write(path_of(tampered), b"forgery!").unwrap();
    fs::remove_file(path_of(missing)).unwrap();

    let failures = files::verify_files(&store).unwrap();
    assert_eq!(failures.len(), 2, "{failures:?}");
    assert!(failures[0].contains(&format!("file {}", tampered)));
    assert!(failures[0].contains("hash mismatch"));
    assert!(failures[1].contains(&format!("file {}", missing)));
    assert!(failures[1].contains("missing"));
    assert!(!failures.iter().any(|f| f.contains(&format!("file {}:", ok))));
}

#[cfg(unix)]
#[test]
fn failed_save_removes_the_copied_artifact() {
    use std::os::unix::fs::PermissionsExt;

    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let src = write_source(tmp.path(), "a.pdf", b"a");
    files::register(&store, &src, "", None).unwrap();

    // A read-only root blocks the document write; uploads/ stays writable.
    let root_perms = fs::metadata(tmp.path()).unwrap().permissions();
    fs::set_permissions(tmp.path(), fs::Permissions::from_mode(0o555)).unwrap();
    let marker = tmp.path().join(".writable");
    let root_is_readonly = fs::write(&marker, b"").is_err();

    let result = files::register(&store, &src, "", None);
    fs::set_permissions(tmp.path(), root_perms).unwrap();

    if root_is_readonly {
        assert!(result.is_err());
        let copies = fs::read_dir(store.uploads_dir()).unwrap().count();
        assert_eq!(copies, 1);
        assert_eq!(files::list_files(&store).unwrap().len(), 1);
    }
}

/// Every artifact name `register` could pick for file `id` within a few
/// seconds of now.
fn candidate_artifact_names(id: u64, ext: &str) -> Vec<String> {
    let now = time::now();
    (-2..=30)
        .map(|offset| {
            let stamp = time::compact_stamp(now + chrono::Duration::seconds(offset));
            format!("file_{}_{}.{}", id, stamp, ext)
        })
        .collect()
}

#[cfg(target_os = "linux")]
#[test]
fn failed_copy_leaves_no_artifact_behind() {
    let full = Path::new("/dev/full");
    if !full.exists() {
        return;
    }
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let src = write_source(tmp.path(), "thesis.pdf", b"%PDF-1.7 body");

    // Every name the copy could land on points at a device that rejects writes.
    fs::create_dir_all(store.uploads_dir()).unwrap();
    let names = candidate_artifact_names(1, "pdf");
    for name in &names {
        std::os::unix::fs::symlink(full, store.uploads_dir().join(name)).unwrap();
    }

    let err = files::register(&store, &src, "final", None).unwrap_err();
    assert!(matches!(err, LedgerError::IoError(_)), "{err:?}");

    let left = fs::read_dir(store.uploads_dir()).unwrap().count();
    assert_eq!(left, names.len() - 1, "the failed copy should be removed");
    assert!(files::list_files(&store).unwrap().is_empty());
    assert!(full.exists());
}

#[test]
fn delete_of_unknown_id_writes_nothing() {
    let tmp = tempdir().unwrap();
    let store = store_in(tmp.path());
    let src = write_source(tmp.path(), "a.pdf", b"a");
    files::register(&store, &src, "", None).unwrap();
    let before = fs::read(store.document_path()).unwrap();

    assert!(!files::delete(&store, 404, true).unwrap());

    assert_eq!(fs::read(store.document_path()).unwrap(), before);
    let events = broker::read_audit_log(&store).unwrap();
    let last = events.last().unwrap();
    assert_eq!((last.op.as_str(), last.status.as_str()), ("files.delete", "noop"));
}
