//! Tests for the sandboxed host backend.

use std::fs;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use super::{SandboxFs, probe_case_sensitivity};
use crate::backend::FileSystem;
use crate::backends::MemoryFs;
use crate::error::VfsError;

fn sandbox() -> (TempDir, SandboxFs) {
    let dir = tempfile::tempdir().unwrap();
    let fs = SandboxFs::new(dir.path(), true).unwrap();
    (dir, fs)
}

fn populated() -> (TempDir, SandboxFs) {
    let (dir, mut fs) = sandbox();
    fs.mkdir("/a/b").unwrap();
    fs.write_file("/a/b/c.txt", "hi").unwrap();
    fs.write_file("/a/top.txt", "top").unwrap();
    (dir, fs)
}

fn patterns(list: &[&str]) -> Vec<String> {
    list.iter().map(|p| p.to_string()).collect()
}

#[test]
fn test_open_requires_directory() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("plain.txt");
    fs::write(&file, "x").unwrap();

    assert!(matches!(SandboxFs::new(&file, true), Err(VfsError::NotADirectory(_))));
    assert!(matches!(
        SandboxFs::new(dir.path().join("missing"), true),
        Err(VfsError::NotFound(_))
    ));

    let fs = SandboxFs::new(dir.path(), false).unwrap();
    assert!(!fs.is_case_sensitive());
    assert_eq!(fs.root(), dir.path().canonicalize().unwrap());
}

#[test]
fn test_write_and_read() {
    let (dir, mut fs) = sandbox();
    fs.write_file("/hello.txt", "Hello, World!").unwrap();
    assert_eq!(fs.read_file("/hello.txt", "utf-8").unwrap(), "Hello, World!");
    assert_eq!(fs::read_to_string(dir.path().join("hello.txt")).unwrap(), "Hello, World!");

    let stat = fs.stat("hello.txt").unwrap();
    assert_eq!(stat.name, "hello.txt");
    assert_eq!(stat.size, 13);
    assert!(stat.is_file && !stat.is_directory);

    fs.write_file("/hello.txt", "bye").unwrap();
    assert_eq!(fs.read_file("/hello.txt", "utf8").unwrap(), "bye");
}

#[test]
fn test_file_errors() {
    let (_dir, mut fs) = populated();
    assert_eq!(
        fs.write_file("/missing/f.txt", "x").unwrap_err(),
        VfsError::NotFound("/missing".into())
    );
    assert_eq!(fs.write_file("/a", "x").unwrap_err(), VfsError::NotAFile("/a".into()));
    assert!(matches!(fs.write_file("/a/", "x"), Err(VfsError::NotAFile(_))));
    assert_eq!(fs.read_file("/a", "utf8").unwrap_err(), VfsError::NotAFile("/a".into()));
    assert_eq!(
        fs.read_file("/nope.txt", "utf8").unwrap_err(),
        VfsError::NotFound("/nope.txt".into())
    );
    assert!(matches!(
        fs.read_file("/a/top.txt", "ascii"),
        Err(VfsError::UnsupportedEncoding(_))
    ));
}

#[test]
fn test_mkdir() {
    let (dir, mut fs) = populated();
    fs.mkdir("/x/y/z").unwrap();
    fs.mkdir("/x/y/z").unwrap();
    assert!(dir.path().join("x/y/z").is_dir());
    assert_eq!(
        fs.mkdir("/a/top.txt/sub").unwrap_err(),
        VfsError::NotADirectory("/a/top.txt".into())
    );
}

#[test]
fn test_read_dir_shape() {
    let (_dir, mut fs) = sandbox();
    fs.write_file("/c.txt", "ccc").unwrap();
    fs.mkdir("/z").unwrap();
    fs.write_file("/a.txt", "a").unwrap();
    fs.mkdir("/b").unwrap();

    let entries = fs.read_dir("/").unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["b", "z", "a.txt", "c.txt"]);
    assert!(entries[0].is_directory && !entries[0].is_file);
    assert_eq!(entries[3].size, 3);

    assert_eq!(fs.read_dir("/c.txt").unwrap_err(), VfsError::NotADirectory("/c.txt".into()));
    assert_eq!(fs.read_dir("/none").unwrap_err(), VfsError::NotFound("/none".into()));
}

#[test]
fn test_delete() {
    let (dir, mut fs) = populated();
    fs.delete("/a/top.txt").unwrap();
    assert!(!fs.file_exists("/a/top.txt").unwrap());
    fs.delete("/a/b").unwrap();
    assert!(!fs.directory_exists("/a/b").unwrap());
    assert_eq!(fs.delete("/a/b").unwrap_err(), VfsError::NotFound("/a/b".into()));

    fs.write_file("/root.txt", "r").unwrap();
    fs.delete("/").unwrap();
    assert!(dir.path().is_dir());
    assert!(fs.read_dir("/").unwrap().is_empty());
}

#[test]
fn test_copy_directory_merges() {
    let (dir, mut fs) = populated();
    fs.mkdir("/dest/b").unwrap();
    fs.write_file("/dest/b/c.txt", "old").unwrap();
    fs.write_file("/dest/b/keep.txt", "keep").unwrap();

    fs.copy_path("/a", "/dest").unwrap();
    assert_eq!(fs.read_file("/dest/b/c.txt", "utf8").unwrap(), "hi");
    assert_eq!(fs.read_file("/dest/b/keep.txt", "utf8").unwrap(), "keep");
    assert_eq!(fs.read_file("/dest/top.txt", "utf8").unwrap(), "top");
    assert!(dir.path().join("a/b/c.txt").is_file());
}

#[test]
fn test_copy_into_own_subdirectory() {
    let (_dir, mut fs) = populated();
    fs.copy_path("/a", "/a/inner").unwrap();
    assert_eq!(fs.read_file("/a/inner/b/c.txt", "utf8").unwrap(), "hi");
    assert!(!fs.directory_exists("/a/inner/inner").unwrap());
}

#[test]
fn test_copy_onto_itself_keeps_content() {
    let (_dir, mut fs) = populated();
    fs.copy_path("/a/top.txt", "/a/top.txt").unwrap();
    fs.copy_path("/a/top.txt", "/a").unwrap();
    fs.copy_path("/a", "/a").unwrap();
    assert_eq!(fs.read_file("/a/top.txt", "utf8").unwrap(), "top");
    assert_eq!(fs.read_file("/a/b/c.txt", "utf8").unwrap(), "hi");
}

#[test]
fn test_file_copy_targets() {
    let (_dir, mut fs) = populated();
    fs.copy_path("/a/top.txt", "/fresh/").unwrap();
    assert_eq!(fs.read_file("/fresh/top.txt", "utf8").unwrap(), "top");
    fs.copy_path("/a/top.txt", "/deep/er/renamed.txt").unwrap();
    assert_eq!(fs.read_file("/deep/er/renamed.txt", "utf8").unwrap(), "top");
    fs.copy_path("/a/top.txt", "/a/b/c.txt").unwrap();
    assert_eq!(fs.read_file("/a/b/c.txt", "utf8").unwrap(), "top");
    assert!(matches!(
        fs.copy_path("/a/top.txt", "/a/b/c.txt/"),
        Err(VfsError::NotADirectory(_))
    ));
    assert!(matches!(fs.copy_path("/a/top.txt/", "/x"), Err(VfsError::NotFound(_))));
}

#[test]
fn test_move_directory() {
    let (_dir, mut fs) = populated();
    fs.move_path("/a", "/moved/z").unwrap();
    assert!(!fs.directory_exists("/a").unwrap());
    assert_eq!(fs.read_file("/moved/z/b/c.txt", "utf8").unwrap(), "hi");

    fs.mkdir("/target/b").unwrap();
    fs.write_file("/target/b/keep.txt", "keep").unwrap();
    fs.move_path("/moved/z", "/target").unwrap();
    assert!(!fs.directory_exists("/moved/z").unwrap());
    assert_eq!(fs.read_file("/target/b/c.txt", "utf8").unwrap(), "hi");
    assert_eq!(fs.read_file("/target/b/keep.txt", "utf8").unwrap(), "keep");
    assert_eq!(fs.read_file("/target/top.txt", "utf8").unwrap(), "top");
}

#[test]
fn test_move_errors() {
    let (_dir, mut fs) = populated();
    assert!(matches!(fs.move_path("/a", "/a/b/x"), Err(VfsError::InvalidArgument(_))));
    assert_eq!(
        fs.move_path("/a/b", "/a/top.txt").unwrap_err(),
        VfsError::NotADirectory("/a/top.txt".into())
    );
    assert_eq!(fs.move_path("/ghost", "/x").unwrap_err(), VfsError::NotFound("/ghost".into()));
    fs.move_path("/a", "/a").unwrap();
    assert!(fs.directory_exists("/a/b").unwrap());
}

#[test]
fn test_move_file() {
    let (dir, mut fs) = populated();
    fs.move_path("/a/top.txt", "/a/b").unwrap();
    assert!(!dir.path().join("a/top.txt").exists());
    assert_eq!(fs.read_file("/a/b/top.txt", "utf8").unwrap(), "top");
}

#[test]
fn test_file_onto_own_ancestor_is_rejected() {
    let (dir, mut fs) = sandbox();
    fs.mkdir("/d/x").unwrap();
    fs.write_file("/d/x/x", "payload").unwrap();
    fs.write_file("/d/x/other.txt", "keep me").unwrap();

    assert!(matches!(fs.move_path("/d/x/x", "/d"), Err(VfsError::InvalidArgument(_))));
    assert!(matches!(fs.copy_path("/d/x/x", "/d"), Err(VfsError::InvalidArgument(_))));

    assert_eq!(fs.read_file("/d/x/x", "utf8").unwrap(), "payload");
    assert_eq!(fs.read_file("/d/x/other.txt", "utf8").unwrap(), "keep me");
    assert_eq!(fs.glob(&patterns(&["/d/*/*"])).unwrap(), vec!["/d/x/other.txt", "/d/x/x"]);
    assert!(dir.path().join("d/x").is_dir());
}

#[test]
fn test_merge_into_ancestor_keeps_source() {
    let (_dir, mut fs) = sandbox();
    fs.mkdir("/p/q").unwrap();
    fs.write_file("/p/q/q", "inner").unwrap();
    fs.write_file("/p/q/keep.txt", "keep").unwrap();

    assert!(matches!(fs.copy_path("/p/q", "/p"), Err(VfsError::InvalidArgument(_))));
    assert!(matches!(fs.move_path("/p/q", "/p"), Err(VfsError::InvalidArgument(_))));
    assert_eq!(fs.read_file("/p/q/q", "utf8").unwrap(), "inner");
    assert_eq!(fs.read_file("/p/q/keep.txt", "utf8").unwrap(), "keep");
}

#[test]
fn test_copy_over_current_directory_resets_it() {
    let (_dir, mut fs) = populated();
    fs.mkdir("/w/top.txt").unwrap();
    fs.set_current_directory("/w/top.txt").unwrap();

    fs.copy_path("/a/top.txt", "/w").unwrap();
    assert_eq!(fs.read_file("/w/top.txt", "utf8").unwrap(), "top");
    assert_eq!(fs.current_directory().unwrap(), "/");
    assert_eq!(fs.read_file("a/top.txt", "utf8").unwrap(), "top");
}

#[test]
fn test_case_insensitive_matches_memory() {
    let dir = tempfile::tempdir().unwrap();
    let mut host = SandboxFs::new(dir.path(), false).unwrap();
    let mut memory = MemoryFs::new(false);

    for fs in [&mut host as &mut dyn FileSystem, &mut memory] {
        assert!(!fs.is_case_sensitive());
        fs.mkdir("/Docs").unwrap();
        fs.write_file("/Docs/A.txt", "x").unwrap();
    }
    assert!(dir.path().join("docs/a.txt").is_file());

    for fs in [&host as &dyn FileSystem, &memory] {
        assert_eq!(fs.realpath("/DOCS/A.txt").unwrap(), "/docs/a.txt");
        assert_eq!(fs.read_file("/docs/A.TXT", "utf8").unwrap(), "x");
        assert_eq!(fs.glob(&patterns(&["/Docs/*.TXT"])).unwrap(), vec!["/docs/a.txt"]);
    }
}

#[test]
fn test_current_directory() {
    let (_dir, mut fs) = populated();
    assert_eq!(fs.current_directory().unwrap(), "/");
    fs.set_current_directory("/a/b").unwrap();
    assert_eq!(fs.current_directory().unwrap(), "/a/b");
    assert_eq!(fs.read_file("c.txt", "utf8").unwrap(), "hi");
    assert_eq!(fs.realpath("../top.txt").unwrap(), "/a/top.txt");
    assert_eq!(fs.glob(&patterns(&["*.txt"])).unwrap(), vec!["/a/b/c.txt"]);
    assert_eq!(fs.glob(&patterns(&["../*.txt"])).unwrap(), vec!["/a/top.txt"]);
    assert!(matches!(fs.glob(&patterns(&["../../../*"])), Err(VfsError::SandboxViolation(_))));

    assert!(matches!(fs.set_current_directory("/a/top.txt"), Err(VfsError::NotADirectory(_))));
    assert!(matches!(fs.set_current_directory("/nope"), Err(VfsError::NotFound(_))));

    fs.delete("/a").unwrap();
    assert_eq!(fs.current_directory().unwrap(), "/");
}

#[test]
fn test_glob() {
    let (_dir, mut fs) = populated();
    fs.write_file("/a/notes.md", "n").unwrap();
    assert_eq!(
        fs.glob(&patterns(&["/a/*.txt", "/a/*/*.txt", "/a/b/c.txt"])).unwrap(),
        vec!["/a/top.txt", "/a/b/c.txt", "/a/b/c.txt"]
    );
    assert_eq!(fs.glob(&patterns(&["/a/*.{md,txt}"])).unwrap(), vec!["/a/notes.md", "/a/top.txt"]);
    assert!(fs.glob(&patterns(&["/a/*"])).unwrap().iter().all(|p| p != "/a/b"));
    assert!(matches!(fs.glob(&patterns(&["/a/{x"])), Err(VfsError::Pattern { .. })));
}

#[test]
fn test_dot_dot_cannot_escape() {
    let (_dir, mut fs) = populated();
    assert!(matches!(fs.read_file("../secret", "utf8"), Err(VfsError::SandboxViolation(_))));
    assert!(matches!(fs.write_file("/../x.txt", "x"), Err(VfsError::SandboxViolation(_))));
    assert!(matches!(fs.mkdir("/a/../../out"), Err(VfsError::SandboxViolation(_))));
    assert!(matches!(fs.copy_path("/a", "/../a"), Err(VfsError::SandboxViolation(_))));
    assert_eq!(fs.realpath("/a/../a/b").unwrap(), "/a/b");
}

#[cfg(unix)]
#[test]
fn test_symlink_to_prefixed_sibling_is_rejected() {
    let base = tempfile::tempdir().unwrap();
    let root = base.path().join("data");
    let sibling = base.path().join("data2");
    fs::create_dir(&root).unwrap();
    fs::create_dir(&sibling).unwrap();
    fs::write(sibling.join("secret.txt"), "secret").unwrap();
    std::os::unix::fs::symlink(&sibling, root.join("link")).unwrap();

    let mut fs = SandboxFs::new(&root, true).unwrap();
    assert!(matches!(
        fs.read_file("/link/secret.txt", "utf8"),
        Err(VfsError::SandboxViolation(_))
    ));
    assert!(matches!(
        fs.write_file("/link/planted.txt", "x"),
        Err(VfsError::SandboxViolation(_))
    ));
    assert!(matches!(fs.read_dir("/link"), Err(VfsError::SandboxViolation(_))));
    assert!(!sibling.join("planted.txt").exists());
    assert_eq!(fs.glob(&patterns(&["/*/*.txt"])).unwrap(), Vec::<String>::new());
}

#[test]
fn test_probe_matches_host() {
    let dir = tempfile::tempdir().unwrap();
    let sensitive = probe_case_sensitivity(dir.path()).unwrap();
    fs::write(dir.path().join("Probe.txt"), "x").unwrap();
    assert_eq!(sensitive, !dir.path().join("probe.txt").exists());
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
}
