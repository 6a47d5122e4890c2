//! Build identification.
//!
//! The values behind `build_info()` are stamped by build.rs at compile
//! time; a build outside a git checkout (or without the stamping env)
//! reports each missing piece as "unknown".

/// One-line version banner for `--version`: package version, commit,
/// build date, and the rustc that produced the binary.
pub fn version() -> String {
    let info = build_info();
    format!(
        "jarmap {} ({} {}) rustc {}",
        env!("CARGO_PKG_VERSION"),
        info.commit,
        info.date,
        info.rustc,
    )
}

pub struct BuildInfo {
    pub commit: &'static str,
    pub date: &'static str,
    pub rustc: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        commit: option_env!("JARMAP_COMMIT_SHA").unwrap_or("unknown"),
        date: option_env!("JARMAP_BUILD_DATE").unwrap_or("unknown"),
        rustc: option_env!("JARMAP_RUSTC_VERSION").unwrap_or("unknown"),
    }
}
