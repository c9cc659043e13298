extern crate redo;

use std::io::{Read, Write};

struct TempDir(std::path::PathBuf);

impl TempDir {
    fn new<P: AsRef<std::path::Path>>(p: P) -> TempDir {
        std::fs::remove_dir_all(p.as_ref()).ok();
        assert!(std::fs::create_dir_all(p.as_ref()).is_ok());
        // canonicalize so every process involved sees one spelling of
        // the paths, symlinked temp directories included
        TempDir(p.as_ref().canonicalize().unwrap())
    }
    fn run(&self, exe: &str, args: &[&str], extra_env: &[(&str, &str)]) -> std::process::Output {
        let newpath = match std::env::var_os("PATH") {
            Some(paths) => {
                let mut new_paths = vec![location_of_executables()];
                for path in std::env::split_paths(&paths) {
                    new_paths.push(path);
                }
                std::env::join_paths(new_paths).unwrap()
            }
            None => std::env::join_paths(&[location_of_executables()]).unwrap(),
        };
        let mut cmd = std::process::Command::new(exe);
        cmd.args(args)
            .env("PATH", &newpath)
            .env("REDO_HOME", self.0.join(".redo-home"))
            .env_remove("REDO_SESSION")
            .env_remove("REDO_TARGET")
            .env_remove("REDO_PATH")
            .env_remove("REDO_DEPTH")
            .env_remove("REDO_KEEP_GOING")
            .env_remove("REDO_SHELL_ARGS")
            .current_dir(&self.0);
        for &(k, v) in extra_env {
            cmd.env(k, v);
        }
        let s = cmd.output().unwrap();
        println!("{} {:?} status: {:?}", exe, args, s.status);
        println!("  stdout: {}", String::from_utf8_lossy(&s.stdout));
        println!("  stderr: {}", String::from_utf8_lossy(&s.stderr));
        s
    }
    fn redo(&self, args: &[&str]) -> std::process::Output {
        self.run("redo", args, &[])
    }
    fn redo_ifchange(&self, args: &[&str]) -> std::process::Output {
        self.run("redo-ifchange", args, &[])
    }
    fn mkdir(&self, p: &str) {
        std::fs::create_dir_all(self.0.join(p)).unwrap();
    }
    fn add_file(&self, p: &str, contents: &[u8]) {
        let mut f = std::fs::File::create(self.0.join(p)).unwrap();
        f.write_all(contents).unwrap();
    }
    fn expect_file(&self, p: &str, contents: &[u8]) {
        let mut f = std::fs::File::open(self.0.join(p)).unwrap();
        let mut actual_contents = Vec::new();
        f.read_to_end(&mut actual_contents).unwrap();
        assert_eq!(
            std::str::from_utf8(actual_contents.as_slice()),
            std::str::from_utf8(contents)
        );
    }
    fn expect_no_file(&self, p: &str) {
        assert!(!self.0.join(p).exists());
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.0).ok();
    }
}

fn location_of_executables() -> std::path::PathBuf {
    // The key here is that this test executable is located in almost
    // the same place as the built binaries are located.
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // chop off exe name
    path.pop(); // chop off "deps"
    path
}

fn stderr_of(out: &std::process::Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

/// This test mostly confirms that we are in fact testing the redo
/// that we just compiled!
#[test]
fn redo_version() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    let out = tempdir.redo(&["--version"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains(redo::version::VERSION));
}

#[test]
fn builds_a_chain_and_skips_when_nothing_changed() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("a.do", b"echo hello > $3\necho ran >> a.log\n");
    tempdir.add_file("b.do", b"redo-ifchange a\ncat a > $3\necho ran >> b.log\n");
    assert!(tempdir.redo(&["b"]).status.success());
    tempdir.expect_file("a", b"hello\n");
    tempdir.expect_file("b", b"hello\n");
    tempdir.expect_file("a.log", b"ran\n");
    tempdir.expect_file("b.log", b"ran\n");
    assert!(tempdir.redo_ifchange(&["b"]).status.success());
    tempdir.expect_file("a.log", b"ran\n");
    tempdir.expect_file("b.log", b"ran\n");
}

#[test]
fn rebuilds_the_chain_when_a_script_changes() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("a.do", b"echo hello > $3\n");
    tempdir.add_file("b.do", b"redo-ifchange a\ncat a > $3\n");
    assert!(tempdir.redo(&["b"]).status.success());
    tempdir.expect_file("b", b"hello\n");
    tempdir.add_file("a.do", b"echo world > $3\n");
    assert!(tempdir.redo_ifchange(&["b"]).status.success());
    tempdir.expect_file("a", b"world\n");
    tempdir.expect_file("b", b"world\n");
}

#[test]
fn ifcreate_fires_when_the_watched_path_appears() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("c.do", b"echo ran >> c.log\nredo-ifcreate x\necho ok\n");
    assert!(tempdir.redo(&["c"]).status.success());
    tempdir.expect_file("c", b"ok\n");
    tempdir.expect_file("c.log", b"ran\n");
    // nothing changed, so nothing runs
    assert!(tempdir.redo_ifchange(&["c"]).status.success());
    tempdir.expect_file("c.log", b"ran\n");
    // creating the watched path makes c out of date again
    tempdir.add_file("x", b"here\n");
    let out = tempdir.redo_ifchange(&["c"]);
    tempdir.expect_file("c.log", b"ran\nran\n");
    // the re-run fails, since x now exists
    assert!(!out.status.success());
}

#[test]
fn always_reruns_on_every_invocation() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("d.do", b"redo-always\necho ran >> d.log\necho now > $3\n");
    assert!(tempdir.redo_ifchange(&["d"]).status.success());
    assert!(tempdir.redo_ifchange(&["d"]).status.success());
    tempdir.expect_file("d.log", b"ran\nran\n");
}

#[test]
fn writing_the_target_directly_is_an_error() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("e.do", b"echo oops > e\n");
    let out = tempdir.redo(&["e"]);
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("modified e directly"));
}

#[test]
fn shebang_line_selects_the_interpreter() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("f.do", b"#!/bin/sh\necho via-shebang > $3\n");
    assert!(tempdir.redo(&["f"]).status.success());
    tempdir.expect_file("f", b"via-shebang\n");
    // unchanged scripts do not run twice
    assert!(tempdir.redo_ifchange(&["f"]).status.success());
    tempdir.expect_file("f", b"via-shebang\n");
}

#[test]
fn no_output_makes_a_phony_target() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("g.do", b"echo ran >> g.log\n");
    assert!(tempdir.redo(&["g"]).status.success());
    tempdir.expect_no_file("g");
    // a phony target is still remembered as built
    assert!(tempdir.redo_ifchange(&["g"]).status.success());
    tempdir.expect_file("g.log", b"ran\n");
}

#[test]
fn empty_output_removes_a_previous_artifact() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("h.do", b"echo hi > $3\n");
    assert!(tempdir.redo(&["h"]).status.success());
    tempdir.expect_file("h", b"hi\n");
    tempdir.add_file("h.do", b"true\n");
    assert!(tempdir.redo_ifchange(&["h"]).status.success());
    tempdir.expect_no_file("h");
}

#[test]
fn stdout_plus_tmpfile_is_an_error() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("i.do", b"echo a > $3\necho b\n");
    let out = tempdir.redo(&["i"]);
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("wrote to stdout and created $3"));
}

#[test]
fn default_do_is_found_in_an_ancestor() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("default.ext.do", b"echo $2 > $3\n");
    tempdir.mkdir("sub/dir");
    assert!(tempdir.redo(&["sub/dir/thing.ext"]).status.success());
    tempdir.expect_file("sub/dir/thing.ext", b"sub/dir/thing\n");
}

#[test]
fn default_do_builds_the_default_target() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("default.do", b"echo anything > $3\n");
    assert!(tempdir.redo(&[]).status.success());
    tempdir.expect_file("all", b"anything\n");
}

#[test]
fn externally_modified_targets_are_not_clobbered() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("k.do", b"echo built > $3\n");
    assert!(tempdir.redo(&["k"]).status.success());
    tempdir.expect_file("k", b"built\n");
    tempdir.add_file("k", b"mine\n");
    let out = tempdir.redo_ifchange(&["k"]);
    assert!(out.status.success());
    assert!(stderr_of(&out).contains("modified outside"));
    tempdir.expect_file("k", b"mine\n");
}

#[test]
fn missing_do_file_is_an_error_for_redo() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    let out = tempdir.redo(&["nothing.xyz"]);
    assert!(!out.status.success());
    assert!(stderr_of(&out).contains("no .do file"));
}

#[test]
fn ifchange_accepts_a_plain_source_file() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("src.txt", b"data\n");
    assert!(tempdir.redo_ifchange(&["src.txt"]).status.success());
}

#[test]
fn editing_a_source_rebuilds_its_dependents() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("n.txt", b"one\n");
    tempdir.add_file("n.do", b"redo-ifchange n.txt\ncat n.txt > $3\n");
    assert!(tempdir.redo(&["n"]).status.success());
    tempdir.expect_file("n", b"one\n");
    assert!(tempdir.redo_ifchange(&["n"]).status.success());
    tempdir.expect_file("n", b"one\n");
    tempdir.add_file("n.txt", b"two\n");
    assert!(tempdir.redo_ifchange(&["n"]).status.success());
    tempdir.expect_file("n", b"two\n");
}

#[test]
fn ifcreate_on_an_existing_path_fails_the_build() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("exists.txt", b"x\n");
    tempdir.add_file("m.do", b"redo-ifcreate exists.txt\n");
    assert!(!tempdir.redo(&["m"]).status.success());
}

#[test]
fn helpers_refuse_to_run_outside_a_do_script() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    assert!(!tempdir.run("redo-always", &[], &[]).status.success());
    assert!(!tempdir.run("redo-ifcreate", &["nope"], &[]).status.success());
}

#[test]
fn a_failing_script_stops_later_siblings() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("bad.do", b"false\n");
    tempdir.add_file("good.do", b"echo ok > $3\n");
    let out = tempdir.redo(&["bad", "good"]);
    assert!(!out.status.success());
    tempdir.expect_no_file("good");
}

#[test]
fn keep_going_continues_past_failures() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("bad.do", b"false\n");
    tempdir.add_file("good.do", b"echo ok > $3\n");
    let out = tempdir.run("redo", &["bad", "good"], &[("REDO_KEEP_GOING", "1")]);
    assert!(!out.status.success());
    tempdir.expect_file("good", b"ok\n");
}

#[test]
fn a_script_may_produce_a_directory() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("q.do", b"mkdir $3\necho f > $3/inner\n");
    assert!(tempdir.redo(&["q"]).status.success());
    tempdir.expect_file("q/inner", b"f\n");
}

#[test]
fn clean_locks_removes_stale_lock_files() {
    let tempdir = TempDir::new(format!("tests/test-repositories/test-{}", line!()));
    tempdir.add_file("p.do", b"echo x > $3\n");
    assert!(tempdir.redo(&["p"]).status.success());
    let out = tempdir.redo(&["--clean-locks"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("removed"));
    for entry in std::fs::read_dir(tempdir.0.join(".redo-home")).unwrap() {
        let name = entry.unwrap().file_name().to_string_lossy().into_owned();
        assert!(!name.starts_with(".lck."));
    }
}
