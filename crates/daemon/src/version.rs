use std::fmt;

use serde::Serialize;

/// Build metadata baked in by build.rs
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub build_profile: &'static str,
    pub build_features: &'static str,
    pub build_timestamp: &'static str,
    pub build_target: &'static str,
    pub rust_version: &'static str,
    pub version: &'static str,
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        build_profile: env!("BUILD_PROFILE"),
        build_features: env!("BUILD_FEATURES"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        build_target: env!("BUILD_TARGET"),
        rust_version: env!("RUST_VERSION"),
        version: env!("REPO_VERSION"),
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "passd {} ({} build for {}, features: {}, built {} with {})",
            self.version,
            self.build_profile,
            self.build_target,
            self.build_features,
            self.build_timestamp,
            self.rust_version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_info_display() {
        let info = build_info();
        assert!(!info.version.is_empty());
        assert!(info.to_string().starts_with("passd "));
    }
}
