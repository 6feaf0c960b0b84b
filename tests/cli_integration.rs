use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_fwpatch").to_string()
}

fn write_images(dir: &Path) -> (PathBuf, PathBuf) {
    let source: Vec<u8> = (0..20_000u32).map(|i| ((i * 7) % 253) as u8).collect();
    let mut target = source.clone();
    target[500..540].fill(0x42);
    target.extend_from_slice(b"version 2 trailer");
    let s = dir.join("fw_v1.bin");
    let t = dir.join("fw_v2.bin");
    std::fs::write(&s, source).unwrap();
    std::fs::write(&t, target).unwrap();
    (s, t)
}

fn search_best(source: &Path, target: &Path) -> (u8, u8) {
    let out = Command::new(bin())
        .args(["search", "--max-window-exp", "10"])
        .arg(source)
        .arg(target)
        .output()
        .unwrap();
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let text = String::from_utf8(out.stdout).unwrap();
    let mut parts = text.split_whitespace().map(|p| p.parse::<u8>().unwrap());
    let w = parts.next().unwrap();
    let l = parts.next().unwrap();
    assert!(parts.next().is_none(), "unexpected output: {text}");
    (w, l)
}

#[test]
fn cli_search_prints_best_pair() {
    let dir = tempdir().unwrap();
    let (source, target) = write_images(dir.path());
    let (w, l) = search_best(&source, &target);
    assert!((4..=10).contains(&w));
    assert!(l >= 3 && l < w);
}

#[test]
fn cli_search_debug_prints_table() {
    let dir = tempdir().unwrap();
    let (source, target) = write_images(dir.path());
    let out = Command::new(bin())
        .args(["search", "-d", "--max-window-sz2", "6", "--sequential"])
        .arg(&source)
        .arg(&target)
        .output()
        .unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("window_sz2"));
    assert!(text.contains("Best result -> window_sz2:"));
    // 1 + 2 + 3 rows for windows 4, 5 and 6.
    let rows = text.lines().filter(|l| l.starts_with("| ") && !l.contains("Patch Size")).count();
    assert_eq!(rows, 6);
}

#[test]
fn cli_search_with_no_viable_config_exits_6() {
    let dir = tempdir().unwrap();
    let source = dir.path().join("a.bin");
    let target = dir.path().join("b.bin");
    std::fs::write(&source, b"").unwrap();
    std::fs::write(&target, b"xyz").unwrap();
    let out = Command::new(bin())
        .arg("search")
        .arg(&source)
        .arg(&target)
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(6));
    assert!(out.stdout.is_empty());
}

#[test]
fn cli_build_apply_roundtrip() {
    let dir = tempdir().unwrap();
    let (source, target) = write_images(dir.path());
    let (w, l) = search_best(&source, &target);
    let patch = dir.path().join("patch.bin");
    let new_file = dir.path().join("new.bin");
    let log = dir.path().join("run.log");

    let st = Command::new(bin())
        .arg("--log-file")
        .arg(&log)
        .arg("build")
        .arg(&source)
        .arg(&target)
        .arg(&patch)
        .arg(&new_file)
        .args([w.to_string(), l.to_string(), "64K".to_string()])
        .status()
        .unwrap();
    assert!(st.success());
    let bytes = std::fs::read(&patch).unwrap();
    assert_eq!((bytes[16], bytes[17]), (w, l));
    assert_eq!(std::fs::read(&new_file).unwrap(), std::fs::read(&target).unwrap());
    let log_text = std::fs::read_to_string(&log).unwrap();
    assert!(log_text.contains("generated ok"), "{log_text}");

    let output = dir.path().join("out.bin");
    let st = Command::new(bin())
        .arg("apply")
        .arg(&source)
        .arg(&patch)
        .arg(&output)
        .status()
        .unwrap();
    assert!(st.success());
    assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&target).unwrap());
}

#[test]
fn cli_build_over_budget_exits_5() {
    let dir = tempdir().unwrap();
    let (source, target) = write_images(dir.path());
    let patch = dir.path().join("patch.bin");
    let out = Command::new(bin())
        .arg("build")
        .arg(&source)
        .arg(&target)
        .arg(&patch)
        .arg(dir.path().join("new.bin"))
        .args(["8", "4", "20"])
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(5));
    assert!(!patch.exists());
    assert!(String::from_utf8_lossy(&out.stderr).contains("budget"));
}

#[test]
fn cli_build_json_and_info() {
    let dir = tempdir().unwrap();
    let (source, target) = write_images(dir.path());
    let patch = dir.path().join("patch.bin");
    let out = Command::new(bin())
        .arg("--json")
        .arg("build")
        .arg(&source)
        .arg(&target)
        .arg(&patch)
        .arg(dir.path().join("new.bin"))
        .args(["9", "5", "1M"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(json["command"], "build");
    assert_eq!(json["window_exp"], 9);
    assert_eq!(json["lookahead_exp"], 5);
    assert_eq!(json["patch_size"], std::fs::metadata(&patch).unwrap().len());

    let out = Command::new(bin()).arg("info").arg(&patch).output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("BSDIFFHS"));
    assert!(text.contains("window_exp:    9"));
    assert!(text.contains("lookahead_exp: 5"));
}

#[test]
fn cli_apply_truncated_patch_exits_9() {
    let dir = tempdir().unwrap();
    let (source, _) = write_images(dir.path());
    let patch = dir.path().join("short.bin");
    std::fs::write(&patch, [0u8; 10]).unwrap();
    let out = Command::new(bin())
        .arg("apply")
        .arg(&source)
        .arg(&patch)
        .arg(dir.path().join("out.bin"))
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(9));
}

#[test]
fn cli_config_works() {
    let out = Command::new(bin()).arg("config").output().unwrap();
    assert!(out.status.success());
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.contains("GRID_SIZE=78"));
}
