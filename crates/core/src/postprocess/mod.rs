//! Post-process: stage, format, hash, publish.
//!
//! Artifacts are written to a staging directory inside the output root,
//! optionally run through the configured formatter (failures degrade to a
//! warning), hashed, and only files whose content actually changed are
//! renamed into the live tree, preserving build-system timestamps for the
//! rest. A machine-readable manifest records every live file with its hash
//! and provenance; `--check` compares against it without touching the live
//! tree. The staging directory is removed on every exit path, including
//! cancellation, because it is a scoped temp dir.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use capgen_common::{content_hash, DiagnosticSink, Phase};

use crate::emit::Artifact;
use crate::model::ApiFamily;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const DIAGNOSTICS_FILE: &str = "diagnostics.json";

/// An artifact plus its provenance, as handed over by the emit phase.
#[derive(Debug, Clone)]
pub struct EmittedFile {
    pub artifact: Artifact,
    pub emitter: String,
    pub api: ApiFamily,
    pub registry_version: String,
}

#[derive(Debug, Clone, Default)]
pub struct PostProcessOptions {
    pub output_root: PathBuf,
    /// Run the formatter over staged files.
    pub format: bool,
    /// Formatter executable; discovered on PATH.
    pub formatter: Option<String>,
    /// Compare only; never touch the live tree.
    pub check: bool,
}

#[derive(Debug, Error)]
pub enum PostProcessError {
    #[error("cannot prepare output root `{path}`: {source}")]
    OutputRoot {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot write `{path}`: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("two emitters produced the same path `{path}` ({first} and {second})")]
    DuplicatePath {
        path: String,
        first: String,
        second: String,
    },
}

/// One manifest record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub path: String,
    pub hash: String,
    pub emitter: String,
    pub api: String,
    pub registry_version: String,
}

/// The machine-readable output manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub files: Vec<ManifestEntry>,
}

impl Manifest {
    pub fn load(root: &Path) -> Option<Self> {
        let text = fs::read_to_string(root.join(MANIFEST_FILE)).ok()?;
        serde_json::from_str(&text).ok()
    }

    fn hash_of(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.hash.as_str())
    }
}

/// Post-process outcome.
#[derive(Debug, Default)]
pub struct PostProcessReport {
    pub written: Vec<String>,
    pub unchanged: Vec<String>,
    /// Paths whose content differs from the live tree (`--check` mode).
    pub drift: Vec<String>,
    pub manifest: Manifest,
}

/// Run the post-process phase over all emitted files.
pub fn run(
    mut files: Vec<EmittedFile>,
    options: &PostProcessOptions,
    sink: &DiagnosticSink,
) -> Result<PostProcessReport, PostProcessError> {
    // Stable output order regardless of emitter scheduling.
    files.sort_by(|a, b| a.artifact.path.cmp(&b.artifact.path));
    for pair in files.windows(2) {
        if pair[0].artifact.path == pair[1].artifact.path {
            return Err(PostProcessError::DuplicatePath {
                path: pair[0].artifact.path.clone(),
                first: pair[0].emitter.clone(),
                second: pair[1].emitter.clone(),
            });
        }
    }

    fs::create_dir_all(&options.output_root).map_err(|source| PostProcessError::OutputRoot {
        path: options.output_root.clone(),
        source,
    })?;
    let staging = tempfile::Builder::new()
        .prefix(".staging-")
        .tempdir_in(&options.output_root)
        .map_err(|source| PostProcessError::OutputRoot {
            path: options.output_root.clone(),
            source,
        })?;

    // Stage everything first.
    for file in &files {
        let path = staging.path().join(&file.artifact.path);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| PostProcessError::Write {
                path: path.clone(),
                source,
            })?;
        }
        fs::write(&path, &file.artifact.text).map_err(|source| PostProcessError::Write {
            path: path.clone(),
            source,
        })?;
    }

    // Format in place; failure is non-fatal by design.
    if options.format {
        format_staged(&files, staging.path(), options, sink);
    }

    let previous = Manifest::load(&options.output_root).unwrap_or_default();
    let mut report = PostProcessReport::default();

    for file in &files {
        let logical = &file.artifact.path;
        let staged_path = staging.path().join(logical);
        let text = fs::read_to_string(&staged_path).map_err(|source| PostProcessError::Write {
            path: staged_path.clone(),
            source,
        })?;
        let hash = content_hash(&text);

        let live_path = options.output_root.join(logical);
        let live_hash = previous
            .hash_of(logical)
            .map(str::to_string)
            .or_else(|| fs::read_to_string(&live_path).ok().map(|t| content_hash(&t)));

        // A stale manifest can claim a hash for a file the user deleted;
        // existence is part of "unchanged".
        let changed = live_hash.as_deref() != Some(hash.as_str()) || !live_path.exists();
        if changed {
            if options.check {
                if let Ok(live_text) = fs::read_to_string(&live_path) {
                    let diff = similar::TextDiff::from_lines(&live_text, &text)
                        .unified_diff()
                        .to_string();
                    let preview: String =
                        diff.lines().take(20).collect::<Vec<_>>().join("\n");
                    sink.warn(Phase::PostProcess, format!("`{logical}` drifted:\n{preview}"));
                } else {
                    sink.warn(Phase::PostProcess, format!("`{logical}` is missing"));
                }
                report.drift.push(logical.clone());
            } else {
                if let Some(parent) = live_path.parent() {
                    fs::create_dir_all(parent).map_err(|source| PostProcessError::Write {
                        path: live_path.clone(),
                        source,
                    })?;
                }
                fs::rename(&staged_path, &live_path).map_err(|source| {
                    PostProcessError::Write {
                        path: live_path.clone(),
                        source,
                    }
                })?;
                report.written.push(logical.clone());
            }
        } else {
            // Hash matches the live tree: leave the file untouched so
            // build-system timestamps survive.
            report.unchanged.push(logical.clone());
        }

        report.manifest.files.push(ManifestEntry {
            path: logical.clone(),
            hash,
            emitter: file.emitter.clone(),
            api: file.api.dir_name().to_string(),
            registry_version: file.registry_version.clone(),
        });
    }

    report_stale_files(&report.manifest, options, sink);

    if !options.check {
        let manifest_path = options.output_root.join(MANIFEST_FILE);
        let text = serde_json::to_string_pretty(&report.manifest)
            .unwrap_or_else(|_| "{}".to_string());
        fs::write(&manifest_path, text).map_err(|source| PostProcessError::Write {
            path: manifest_path,
            source,
        })?;

        let diagnostics_path = options.output_root.join(DIAGNOSTICS_FILE);
        fs::write(&diagnostics_path, sink.render_json()).map_err(|source| {
            PostProcessError::Write {
                path: diagnostics_path,
                source,
            }
        })?;
    }

    Ok(report)
}

/// Warn about files in the live tree that no emitter produced. They are
/// never deleted; leftovers from renamed emitters or removed API families
/// are the user's to clean up, but silence would hide them forever.
fn report_stale_files(manifest: &Manifest, options: &PostProcessOptions, sink: &DiagnosticSink) {
    let known: std::collections::BTreeSet<&str> =
        manifest.files.iter().map(|e| e.path.as_str()).collect();
    for entry in walkdir::WalkDir::new(&options.output_root)
        .into_iter()
        .filter_map(Result::ok)
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(rel) = entry.path().strip_prefix(&options.output_root) else {
            continue;
        };
        let rel = rel.to_string_lossy().replace('\\', "/");
        if rel == MANIFEST_FILE || rel == DIAGNOSTICS_FILE || rel.starts_with(".staging") {
            continue;
        }
        if !known.contains(rel.as_str()) {
            sink.warn(
                Phase::PostProcess,
                format!("stale file `{rel}` is not produced by any emitter"),
            );
        }
    }
}

/// Run the formatter over every staged file, in parallel. A missing or
/// failing formatter degrades to warnings; the staged text stays usable.
fn format_staged(
    files: &[EmittedFile],
    staging: &Path,
    options: &PostProcessOptions,
    sink: &DiagnosticSink,
) {
    let formatter = options.formatter.as_deref().unwrap_or("clang-format");
    let Ok(formatter_path) = which::which(formatter) else {
        sink.warn(
            Phase::PostProcess,
            format!("formatter `{formatter}` not found; emitting unformatted sources"),
        );
        return;
    };

    files.par_iter().for_each(|file| {
        let path = staging.join(&file.artifact.path);
        match Command::new(&formatter_path).arg("-i").arg(&path).output() {
            Ok(output) if output.status.success() => {}
            Ok(output) => sink.warn(
                Phase::PostProcess,
                format!(
                    "formatter failed on `{}`: {}",
                    file.artifact.path,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ),
            Err(err) => sink.warn(
                Phase::PostProcess,
                format!("formatter failed on `{}`: {err}", file.artifact.path),
            ),
        }
    });
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use capgen_common::DiagnosticSink;

    fn emitted(path: &str, text: &str) -> EmittedFile {
        EmittedFile {
            artifact: Artifact {
                path: path.to_string(),
                text: text.to_string(),
            },
            emitter: "recorder".to_string(),
            api: ApiFamily::Vulkan,
            registry_version: "1.0".to_string(),
        }
    }

    fn options(root: &Path) -> PostProcessOptions {
        PostProcessOptions {
            output_root: root.to_path_buf(),
            format: false,
            formatter: None,
            check: false,
        }
    }

    #[test]
    fn writes_files_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let report = run(
            vec![emitted("vulkan/recorder.cpp", "void f();\n")],
            &options(dir.path()),
            &sink,
        )
        .unwrap();

        assert_eq!(report.written, ["vulkan/recorder.cpp"]);
        let live = fs::read_to_string(dir.path().join("vulkan/recorder.cpp")).unwrap();
        assert_eq!(live, "void f();\n");
        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(manifest.files.len(), 1);
        assert_eq!(manifest.files[0].emitter, "recorder");
        assert!(dir.path().join(DIAGNOSTICS_FILE).exists());
        // No staging residue.
        let residues: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".staging-"))
            .collect();
        assert!(residues.is_empty());
    }

    #[test]
    fn unchanged_files_are_left_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let files = vec![emitted("vulkan/recorder.cpp", "void f();\n")];
        run(files.clone(), &options(dir.path()), &sink).unwrap();

        let live = dir.path().join("vulkan/recorder.cpp");
        let before = fs::metadata(&live).unwrap().modified().unwrap();
        let report = run(files, &options(dir.path()), &sink).unwrap();
        assert_eq!(report.unchanged, ["vulkan/recorder.cpp"]);
        assert!(report.written.is_empty());
        let after = fs::metadata(&live).unwrap().modified().unwrap();
        assert_eq!(before, after, "timestamp must be preserved");
    }

    #[test]
    fn check_mode_reports_drift_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        run(
            vec![emitted("vulkan/recorder.cpp", "void f();\n")],
            &options(dir.path()),
            &sink,
        )
        .unwrap();

        let mut check = options(dir.path());
        check.check = true;
        let report = run(
            vec![emitted("vulkan/recorder.cpp", "void g();\n")],
            &check,
            &sink,
        )
        .unwrap();
        assert_eq!(report.drift, ["vulkan/recorder.cpp"]);
        // Live tree untouched.
        let live = fs::read_to_string(dir.path().join("vulkan/recorder.cpp")).unwrap();
        assert_eq!(live, "void f();\n");
    }

    #[test]
    fn check_after_generate_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let files = vec![
            emitted("vulkan/recorder.cpp", "void f();\n"),
            emitted("vulkan/player.cpp", "void g();\n"),
        ];
        run(files.clone(), &options(dir.path()), &sink).unwrap();

        let mut check = options(dir.path());
        check.check = true;
        let report = run(files, &check, &sink).unwrap();
        assert!(report.drift.is_empty());
        assert_eq!(report.unchanged.len(), 2);
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let err = run(
            vec![
                emitted("vulkan/x.cpp", "a"),
                emitted("vulkan/x.cpp", "b"),
            ],
            &options(dir.path()),
            &sink,
        )
        .unwrap_err();
        assert!(matches!(err, PostProcessError::DuplicatePath { .. }));
    }

    #[test]
    fn stale_files_are_reported_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        run(
            vec![emitted("vulkan/recorder.cpp", "void f();\n")],
            &options(dir.path()),
            &sink,
        )
        .unwrap();

        let stale = dir.path().join("vulkan/old_emitter.cpp");
        fs::write(&stale, "// leftover\n").unwrap();
        let sink = DiagnosticSink::new();
        run(
            vec![emitted("vulkan/recorder.cpp", "void f();\n")],
            &options(dir.path()),
            &sink,
        )
        .unwrap();
        assert!(sink
            .records()
            .iter()
            .any(|d| d.message.contains("stale file `vulkan/old_emitter.cpp`")));
        assert!(stale.exists(), "stale files must never be deleted");
    }

    #[test]
    fn missing_formatter_degrades_to_warning() {
        let dir = tempfile::tempdir().unwrap();
        let sink = DiagnosticSink::new();
        let mut opts = options(dir.path());
        opts.format = true;
        opts.formatter = Some("definitely-not-a-formatter".to_string());
        let report = run(
            vec![emitted("vulkan/recorder.cpp", "void f();\n")],
            &opts,
            &sink,
        )
        .unwrap();
        assert_eq!(report.written.len(), 1);
        assert!(sink
            .records()
            .iter()
            .any(|d| d.message.contains("not found")));
    }
}
