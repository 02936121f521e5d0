//! Build metadata embedded by the build script.

/// Package version from Cargo.toml.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Git branch at build time, or "unknown" outside a git checkout.
pub const GIT_BRANCH: &str = match option_env!("VERGEN_GIT_BRANCH") {
    Some(branch) => branch,
    None => "unknown",
};

/// Git commit SHA at build time, or "unknown" outside a git checkout.
pub const GIT_SHA: &str = match option_env!("VERGEN_GIT_SHA") {
    Some(sha) => sha,
    None => "unknown",
};

/// Build timestamp, when vergen could provide one.
pub const BUILD_TIMESTAMP: Option<&str> = option_env!("VERGEN_BUILD_TIMESTAMP");

/// Version string for logs and `--version`: `{version}` when no git
/// metadata is available, otherwise `{version}+{branch}.{short sha}`
/// with a `.dirty` suffix for modified trees.
pub fn version_string() -> String {
    if GIT_SHA == "unknown" {
        return PKG_VERSION.to_string();
    }
    let dirty = if option_env!("VERGEN_GIT_DIRTY") == Some("true") {
        ".dirty"
    } else {
        ""
    };
    let short_sha = &GIT_SHA[..7.min(GIT_SHA.len())];
    format!("{PKG_VERSION}+{GIT_BRANCH}.{short_sha}{dirty}")
}
