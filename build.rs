use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

/// `AUDIT_` tokens in the sources that are not environment variables.
const NON_ENV_TOKENS: &[&str] = &["AUDIT_WARN", "AUDIT_ENV_ALLOWLIST"];

fn source_files(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut files = Vec::new();
    for path in entries.flatten().map(|entry| entry.path()) {
        if path.is_dir() {
            files.extend(source_files(&path));
        } else if path.extension().is_some_and(|ext| ext == "rs") {
            files.push(path);
        }
    }
    files
}

/// Env var names referenced by non-test code under `src/`.
fn audit_env_vars() -> BTreeSet<String> {
    let mut vars = BTreeSet::new();
    for file in source_files(Path::new("src")) {
        let Ok(content) = fs::read_to_string(&file) else {
            continue;
        };
        // Test modules mention made-up names on purpose.
        let body = content.split("#[cfg(test)]").next().unwrap_or_default();
        for (start, _) in body.match_indices("AUDIT_") {
            let token: String = body[start..]
                .chars()
                .take_while(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '_')
                .collect();
            if token.len() > "AUDIT_".len() && !NON_ENV_TOKENS.contains(&token.as_str()) {
                vars.insert(token);
            }
        }
    }
    vars
}

fn main() {
    let entries: String = audit_env_vars()
        .iter()
        .map(|var| format!("    \"{var}\",\n"))
        .collect();
    let generated =
        format!("pub const GENERATED_AUDIT_ENV_ALLOWLIST: &[&str] = &[\n{entries}];\n");
    let out_dir = env::var("OUT_DIR").expect("OUT_DIR is set by cargo");
    fs::write(Path::new(&out_dir).join("audit_env_allowlist.rs"), generated)
        .expect("failed to write AUDIT env allowlist");

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    println!(
        "cargo:rustc-env=BUILD_UUID={:x}-{:x}",
        now.as_secs(),
        now.subsec_nanos()
    );
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-changed=src");
}
