//! SDK locator collaborator.
//!
//! Given an API family, returns include paths and a version, as a pure
//! function of the environment. The header parser never probes the
//! environment itself; the pipeline calls this once per family and passes
//! the result down as pre-resolved include paths.

use std::path::PathBuf;

use crate::model::ApiFamily;

/// Discovered SDK paths for one API family.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SdkPaths {
    pub include_dirs: Vec<PathBuf>,
    pub version: Option<String>,
}

/// Locate the SDK for a family from the process environment.
pub fn locate(api: ApiFamily) -> SdkPaths {
    locate_with(api, |name| std::env::var(name).ok())
}

/// Environment-injectable variant, the actual implementation.
pub fn locate_with(api: ApiFamily, env: impl Fn(&str) -> Option<String>) -> SdkPaths {
    let mut paths = SdkPaths::default();
    match api {
        ApiFamily::DirectX => {
            if let Some(dir) = env("CAPGEN_WINSDK_INCLUDE") {
                paths.include_dirs.push(PathBuf::from(dir));
            } else if let Some(root) = env("WindowsSdkDir") {
                let version = env("WindowsSDKVersion")
                    .map(|v| v.trim_end_matches('\\').to_string());
                if let Some(v) = &version {
                    paths
                        .include_dirs
                        .push(PathBuf::from(&root).join("Include").join(v).join("um"));
                    paths
                        .include_dirs
                        .push(PathBuf::from(&root).join("Include").join(v).join("shared"));
                }
                paths.version = version;
            }
        }
        ApiFamily::Vulkan => {
            if let Some(root) = env("VULKAN_SDK") {
                paths.include_dirs.push(PathBuf::from(root).join("include"));
            }
        }
        ApiFamily::OpenGl => {
            if let Some(dir) = env("CAPGEN_GL_INCLUDE") {
                paths.include_dirs.push(PathBuf::from(dir));
            }
        }
        ApiFamily::OpenCl => {
            if let Some(dir) = env("CAPGEN_OPENCL_INCLUDE") {
                paths.include_dirs.push(PathBuf::from(dir));
            }
        }
        ApiFamily::LevelZero => {
            if let Some(dir) = env("CAPGEN_LEVELZERO_INCLUDE") {
                paths.include_dirs.push(PathBuf::from(dir));
            } else if let Some(root) = env("LEVEL_ZERO_ROOT") {
                paths.include_dirs.push(PathBuf::from(root).join("include"));
            }
        }
    }
    paths
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn directx_prefers_explicit_override() {
        let paths = locate_with(ApiFamily::DirectX, |name| match name {
            "CAPGEN_WINSDK_INCLUDE" => Some("/sdk/include".to_string()),
            "WindowsSdkDir" => Some("/ignored".to_string()),
            _ => None,
        });
        assert_eq!(paths.include_dirs, vec![PathBuf::from("/sdk/include")]);
    }

    #[test]
    fn directx_derives_um_and_shared_from_sdk_root() {
        let paths = locate_with(ApiFamily::DirectX, |name| match name {
            "WindowsSdkDir" => Some("/winsdk".to_string()),
            "WindowsSDKVersion" => Some("10.0.22000.0\\".to_string()),
            _ => None,
        });
        assert_eq!(paths.version.as_deref(), Some("10.0.22000.0"));
        assert_eq!(paths.include_dirs.len(), 2);
        assert!(paths.include_dirs[0].ends_with("Include/10.0.22000.0/um"));
    }

    #[test]
    fn empty_environment_yields_empty_paths() {
        let paths = locate_with(ApiFamily::Vulkan, |_| None);
        assert_eq!(paths, SdkPaths::default());
    }

    #[test]
    fn level_zero_falls_back_to_root() {
        let paths = locate_with(ApiFamily::LevelZero, |name| match name {
            "LEVEL_ZERO_ROOT" => Some("/l0".to_string()),
            _ => None,
        });
        assert_eq!(paths.include_dirs, vec![PathBuf::from("/l0/include")]);
    }
}
