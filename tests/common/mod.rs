#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use refscan::{analyze_str, Analysis, AnalyzerConfig};

fn snapshot_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("snapshots")
}

/// Compare a rendered report against `tests/snapshots/<name>`.
///
/// With `REFSCAN_UPDATE_SNAPSHOTS` set the snapshot is rewritten instead.
pub fn assert_snapshot(name: &str, actual: &str) {
    let path = snapshot_root().join(name);
    if std::env::var_os("REFSCAN_UPDATE_SNAPSHOTS").is_some() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create snapshot directory");
        }
        fs::write(&path, actual).expect("write snapshot");
        return;
    }

    let expected = fs::read_to_string(&path)
        .unwrap_or_else(|_| panic!("missing snapshot {}", path.display()))
        .replace("\r\n", "\n");
    let diff = report_diff(&expected, actual);
    assert!(
        diff.is_empty(),
        "report differs from {} (REFSCAN_UPDATE_SNAPSHOTS=1 regenerates it):\n{}",
        path.display(),
        diff.join("\n")
    );
}

/// Line-by-line differences between two reports, labelled with the bucket
/// header each line falls under.
fn report_diff(expected: &str, actual: &str) -> Vec<String> {
    let expected: Vec<&str> = expected.lines().collect();
    let actual: Vec<&str> = actual.lines().collect();
    let mut bucket = "(before first bucket)";
    let mut out = Vec::new();

    for idx in 0..expected.len().max(actual.len()) {
        let want = expected.get(idx).copied();
        let got = actual.get(idx).copied();
        if let Some(header) = want.filter(|l| l.starts_with("====")) {
            bucket = header;
        }
        if want != got {
            out.push(format!(
                "line {} in {bucket}\n  - {}\n  + {}",
                idx + 1,
                want.unwrap_or("<missing>"),
                got.unwrap_or("<missing>")
            ));
        }
    }
    out
}

/// Build a pointer-aware log line.
pub fn line(address: &str, delta: i64, state: &str, pointer: &str, tag: &str) -> String {
    format!("{address},{delta:+},1,obj.c,1,fn,{state},{pointer},{tag}")
}

/// Analyse `lines` joined into a log with the default configuration.
pub fn analyze(lines: &[String]) -> Analysis {
    analyze_str(&lines.join("\n"), AnalyzerConfig::new())
}
