//! Export/pull workflow tests: hand a member out to the local filesystem,
//! edit the copy, and fold the edits back into the open session.

use gmad_rs::{GmadError, Session};
use std::time::Duration;
use tempfile::TempDir;

fn session_with_file(dir: &TempDir) -> Session {
    let mut session = Session::new(dir.path().join("export.gma")).unwrap();
    session.set_title("Export").unwrap();
    session.set_addon_type("model").unwrap();
    session
        .add_file("lua/autorun/hook.lua", b"-- v1".to_vec())
        .unwrap();
    session.save().unwrap();
    session
}

#[test]
fn test_export_is_tracked_and_exclusive() {
    let dir = TempDir::new().unwrap();
    let mut session = session_with_file(&dir);

    let out = dir.path().join("hook.lua");
    session.export_file("lua/autorun/hook.lua", Some(&out)).unwrap();
    assert_eq!(std::fs::read(&out).unwrap(), b"-- v1");

    assert_eq!(session.watched_files().len(), 1);
    assert_eq!(session.watched_files()[0].content_path(), "lua/autorun/hook.lua");
    assert!(session.is_export_linked(&out));

    // One export per entry.
    let other = dir.path().join("other.lua");
    assert!(matches!(
        session.export_file("lua/autorun/hook.lua", Some(&other)),
        Err(GmadError::AlreadyExported(_))
    ));
    session.close().unwrap();
}

#[test]
fn test_pull_folds_edits_back() {
    let dir = TempDir::new().unwrap();
    let mut session = session_with_file(&dir);

    let out = dir.path().join("hook.lua");
    session.export_file("lua/autorun/hook.lua", Some(&out)).unwrap();

    // Untouched export pulls as a no-op.
    session.pull("lua/autorun/hook.lua").unwrap();
    assert!(!session.is_modified());

    // Outrun coarse mtime resolution before editing the copy.
    std::thread::sleep(Duration::from_millis(1100));
    std::fs::write(&out, b"-- v2, edited outside").unwrap();
    assert!(session.has_pending_edits());

    session.pull("lua/autorun/hook.lua").unwrap();
    assert!(session.is_modified());
    assert_eq!(
        session.addon().get_file("lua/autorun/hook.lua").unwrap().content().unwrap(),
        b"-- v2, edited outside"
    );

    // Latched edit is consumed by the pull.
    assert!(!session.has_pending_edits());

    session.save().unwrap();
    session.close().unwrap();

    let reopened = Session::load(dir.path().join("export.gma"), true, false).unwrap();
    assert_eq!(reopened.read_all().unwrap()[0].1, b"-- v2, edited outside");
    reopened.close().unwrap();
}

#[test]
fn test_drop_export_removes_copy_and_watch() {
    let dir = TempDir::new().unwrap();
    let mut session = session_with_file(&dir);

    let out = dir.path().join("hook.lua");
    session.export_file("lua/autorun/hook.lua", Some(&out)).unwrap();
    session.drop_export("lua/autorun/hook.lua").unwrap();

    assert!(!out.exists());
    assert!(session.watched_files().is_empty());
    assert!(matches!(
        session.drop_export("lua/autorun/hook.lua"),
        Err(GmadError::NotFound(_))
    ));
    session.close().unwrap();
}

#[test]
fn test_pull_after_entry_removed_drops_watch() {
    let dir = TempDir::new().unwrap();
    let mut session = session_with_file(&dir);

    let out = dir.path().join("hook.lua");
    session.export_file("lua/autorun/hook.lua", Some(&out)).unwrap();
    session.remove_file("lua/autorun/hook.lua").unwrap();

    std::thread::sleep(Duration::from_millis(1100));
    std::fs::write(&out, b"-- orphaned edit").unwrap();

    assert!(matches!(
        session.pull("lua/autorun/hook.lua"),
        Err(GmadError::NotFound(_))
    ));
    assert!(session.watched_files().is_empty());
    assert!(!session.is_export_linked(&out));
    session.close().unwrap();
}

#[test]
fn test_pull_on_read_only_session() {
    let dir = TempDir::new().unwrap();
    let session = session_with_file(&dir);
    session.close().unwrap();

    let mut session = Session::load(dir.path().join("export.gma"), true, false).unwrap();
    assert!(matches!(
        session.pull("lua/autorun/hook.lua"),
        Err(GmadError::ReadOnly)
    ));
    session.close().unwrap();
}
