//! Launch resolution for the sidecar worker binary.
//!
//! Decides which executable to run, from filesystem probes only; nothing
//! here starts a process. Packaged installs must ship the binary and fail
//! fast when it is missing. Development checkouts probe build outputs and
//! fall back to `cargo run`, the slow path.

use std::env;
use std::path::PathBuf;

use super::client::SidecarError;

/// Platform-specific file name of the sidecar worker binary.
pub const SIDECAR_BINARY: &str = if cfg!(windows) {
    "the-search-thing-sidecar.exe"
} else {
    "the-search-thing-sidecar"
};

/// A resolved command line for spawning the sidecar.
///
/// Immutable once resolved; a fresh spec is resolved for every process
/// start so a binary built mid-session is picked up on restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub command: PathBuf,
    pub args: Vec<String>,
}

#[derive(Debug, Clone)]
enum ResolveMode {
    /// Packaged install: the binary must exist under `<resources>/sidecar`.
    Packaged { resources_dir: PathBuf },
    /// Development checkout rooted at `repo_root`.
    Development { repo_root: PathBuf },
    /// Explicit command, bypassing all probing. Used by tests and embedders.
    Fixed(LaunchSpec),
}

/// Resolves the sidecar launch spec from the environment and filesystem.
#[derive(Debug, Clone)]
pub struct LaunchResolver {
    mode: ResolveMode,
}

impl LaunchResolver {
    /// Pick the mode from the environment.
    ///
    /// `SIDECAR_RESOURCES_DIR` set means a packaged install and points at
    /// the bundled resources directory. Otherwise this is a development
    /// run rooted at `SIDECAR_REPO_ROOT`, or the current directory when
    /// that is unset too.
    pub fn from_env() -> Self {
        if let Some(dir) = env::var_os("SIDECAR_RESOURCES_DIR") {
            return Self::packaged(PathBuf::from(dir));
        }
        let repo_root = env::var_os("SIDECAR_REPO_ROOT")
            .map(PathBuf::from)
            .or_else(|| env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        Self::development(repo_root)
    }

    pub fn packaged(resources_dir: impl Into<PathBuf>) -> Self {
        Self {
            mode: ResolveMode::Packaged {
                resources_dir: resources_dir.into(),
            },
        }
    }

    pub fn development(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            mode: ResolveMode::Development {
                repo_root: repo_root.into(),
            },
        }
    }

    pub fn fixed(command: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            mode: ResolveMode::Fixed(LaunchSpec {
                command: command.into(),
                args,
            }),
        }
    }

    /// Resolve the launch spec. First match wins.
    ///
    /// # Errors
    ///
    /// `SidecarError::LaunchNotFound` when a packaged install is missing
    /// its bundled binary. A packaged app never falls back to development
    /// probing.
    pub fn resolve(&self) -> Result<LaunchSpec, SidecarError> {
        match &self.mode {
            ResolveMode::Packaged { resources_dir } => {
                let binary = resources_dir.join("sidecar").join(SIDECAR_BINARY);
                if binary.is_file() {
                    Ok(LaunchSpec {
                        command: binary,
                        args: Vec::new(),
                    })
                } else {
                    Err(SidecarError::LaunchNotFound { path: binary })
                }
            }
            ResolveMode::Development { repo_root } => {
                let candidates = [
                    repo_root.join("target").join("debug").join(SIDECAR_BINARY),
                    repo_root.join("target").join("release").join(SIDECAR_BINARY),
                    repo_root
                        .join("client")
                        .join("resources")
                        .join("sidecar")
                        .join(SIDECAR_BINARY),
                ];
                for candidate in candidates {
                    if candidate.is_file() {
                        return Ok(LaunchSpec {
                            command: candidate,
                            args: Vec::new(),
                        });
                    }
                }
                // No built binary anywhere: build and run from source.
                Ok(LaunchSpec {
                    command: PathBuf::from("cargo"),
                    args: vec![
                        "run".to_string(),
                        "--quiet".to_string(),
                        "--manifest-path".to_string(),
                        repo_root.join("Cargo.toml").to_string_lossy().into_owned(),
                        "--bin".to_string(),
                        "the-search-thing-sidecar".to_string(),
                    ],
                })
            }
            ResolveMode::Fixed(spec) => Ok(spec.clone()),
        }
    }
}
