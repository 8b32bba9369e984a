//! Schema-isolation lint.
//!
//! The database grants already stop the lending role from touching the
//! `hmda` schema; this test keeps the codebase honest too. Any SQL that
//! names an hmda table must live in the compliance service or the HMDA
//! handler, both of which run on the compliance pool.

use std::fs;
use std::path::{Path, PathBuf};

const ALLOWED: [&str; 2] = [
    "src/services/compliance/hmda.rs",
    "src/handlers/hmda.rs",
];

fn rust_sources(dir: &Path, out: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).expect("source tree readable") {
        let path = entry.expect("directory entry").path();
        if path.is_dir() {
            rust_sources(&path, out);
        } else if path.extension().map(|e| e == "rs").unwrap_or(false) {
            out.push(path);
        }
    }
}

#[test]
fn lending_code_never_names_hmda_tables() {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let mut sources = Vec::new();
    rust_sources(&root.join("src"), &mut sources);
    assert!(!sources.is_empty());

    let mut offenders = Vec::new();
    for path in sources {
        let relative = path
            .strip_prefix(&root)
            .expect("path under manifest dir")
            .to_string_lossy()
            .replace('\\', "/");
        if ALLOWED.contains(&relative.as_str()) {
            continue;
        }
        let contents = fs::read_to_string(&path).expect("source file readable");
        if contents.contains("hmda.demographics") || contents.contains("hmda.loan_data") {
            offenders.push(relative);
        }
    }

    assert!(
        offenders.is_empty(),
        "hmda tables referenced outside the compliance boundary: {:?}",
        offenders
    );
}
