use std::process::Command;

/// Capture the trimmed stdout of a command, or None if it cannot run.
fn capture(program: &str, args: &[&str]) -> Option<String> {
    let output = Command::new(program).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8(output.stdout).ok()?;
    Some(text.trim().to_string())
}

fn main() {
    let commit_sha = capture("git", &["rev-parse", "--short", "HEAD"]);
    let build_date = capture("date", &["+%Y-%m-%d"]);
    let rustc_version = capture("rustc", &["--version"]).and_then(|line| {
        // "rustc 1.92.0 (abc 2026-01-01)" -> "1.92.0"
        line.strip_prefix("rustc ")?
            .split_whitespace()
            .next()
            .map(str::to_string)
    });

    let stamps = [
        ("JARMAP_COMMIT_SHA", commit_sha),
        ("JARMAP_BUILD_DATE", build_date),
        ("JARMAP_RUSTC_VERSION", rustc_version),
    ];
    for (key, value) in stamps {
        println!(
            "cargo:rustc-env={}={}",
            key,
            value.unwrap_or_else(|| "unknown".to_string())
        );
    }

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-env-changed=JARMAP_COMMIT_SHA");
}
