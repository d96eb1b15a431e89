//! The pipeline driver.
//!
//! Assembles ingest inputs, the emitter set and options into values at run
//! start, then executes Ingest → Normalize → Emit → Post-process. Each
//! phase collects its findings and surfaces one phase-level failure; the
//! exit-code mapping lives on [`PipelineError`]. Emitters fan out on a
//! rayon pool sized by `--jobs`; the run is cancelable between phases and
//! between emitters.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info};

use capgen_common::{DiagnosticSink, Phase};

use crate::config::{ApiInputs, ConfigError, RunConfig};
use crate::emit::{select_emitters, EmitConfig, EmitError, Emitter};
use crate::ingest::header::{parse_header_file, HeaderOptions};
use crate::ingest::raw::RawRegistry;
use crate::ingest::registry_xml::parse_registry;
use crate::ingest::tables::parse_table_file;
use crate::ingest::IngestError;
use crate::model::{ApiFamily, Module};
use crate::normalize::{normalize, ModelError, NormalizeOptions};
use crate::postprocess::{
    self, EmittedFile, Manifest, PostProcessError, PostProcessOptions,
};
use crate::sdk;

/// Options merged from the configuration file and CLI flags.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub config: RunConfig,
    /// CLI `--api` filter; empty means every configured family.
    pub apis: Vec<String>,
    /// CLI `--emitter` filter; empty means all.
    pub emitters: Vec<String>,
    /// CLI `--output` override.
    pub output: Option<PathBuf>,
    /// Worker threads; 0 picks the rayon default.
    pub jobs: usize,
    pub check: bool,
    /// CLI `--format`/`--no-format` override.
    pub format: Option<bool>,
}

/// Cooperative cancellation flag, checked between phases and emitters.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("ingest failed with {} finding(s)", .0.len())]
    Ingest(Vec<IngestError>),

    #[error("normalization failed with {} finding(s)", .0.len())]
    Normalize(Vec<ModelError>),

    #[error(transparent)]
    Emit(#[from] EmitError),

    #[error(transparent)]
    PostProcess(#[from] PostProcessError),

    #[error("{} file(s) would change", .0.len())]
    Drift(Vec<String>),

    #[error("run canceled")]
    Canceled,
}

impl PipelineError {
    /// CLI exit-code mapping.
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) | PipelineError::Ingest(_) => 2,
            PipelineError::Normalize(_) => 3,
            PipelineError::Emit(_) => 4,
            PipelineError::PostProcess(_) => 5,
            PipelineError::Drift(_) => 6,
            PipelineError::Canceled => 130,
        }
    }

    /// Individual findings for the report, one line each.
    pub fn findings(&self) -> Vec<String> {
        match self {
            PipelineError::Ingest(errors) => errors.iter().map(|e| e.to_string()).collect(),
            PipelineError::Normalize(errors) => {
                errors.iter().map(|e| e.to_string()).collect()
            }
            PipelineError::Drift(paths) => paths.clone(),
            _ => Vec::new(),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug)]
pub struct RunSummary {
    pub modules: usize,
    pub files_written: Vec<String>,
    pub files_unchanged: Vec<String>,
    pub manifest: Manifest,
}

/// The assembled pipeline.
#[derive(Debug)]
pub struct Pipeline {
    options: PipelineOptions,
    sink: DiagnosticSink,
    cancel: CancelFlag,
}

impl Pipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            sink: DiagnosticSink::new(),
            cancel: CancelFlag::default(),
        }
    }

    pub fn sink(&self) -> &DiagnosticSink {
        &self.sink
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn run(&self) -> Result<RunSummary, PipelineError> {
        let emitters = select_emitters(&self.options.emitters)
            .map_err(|names| ConfigError::UnknownEmitters { names })?;
        let apis = self.options.config.selected_apis(&self.options.apis)?;

        let raws = self.ingest_phase(&apis)?;
        self.checkpoint()?;

        let modules = self.normalize_phase(&raws, &emitters)?;
        self.checkpoint()?;

        let files = self.emit_phase(&modules, &emitters)?;
        self.checkpoint()?;

        self.postprocess_phase(files, modules.len())
    }

    fn checkpoint(&self) -> Result<(), PipelineError> {
        if self.cancel.is_canceled() {
            Err(PipelineError::Canceled)
        } else {
            Ok(())
        }
    }

    // ---- phase 1 -----------------------------------------------------------

    fn ingest_phase(
        &self,
        apis: &[(ApiFamily, ApiInputs)],
    ) -> Result<Vec<RawRegistry>, PipelineError> {
        let mut raws = Vec::new();
        let mut findings: Vec<IngestError> = Vec::new();

        for (api, inputs) in apis {
            debug!(api = %api, "ingesting");
            let mut merged = RawRegistry::new(*api);

            if let Some(registry) = &inputs.registry {
                match open_registry(registry, *api) {
                    Ok(raw) => merge(&mut merged, raw),
                    Err(errors) => findings.extend(errors),
                }
            }

            if !inputs.headers.is_empty() {
                let mut header_options = HeaderOptions {
                    include_dirs: inputs.include_dirs.clone(),
                    defines: inputs.parsed_defines(),
                };
                if header_options.include_dirs.is_empty() {
                    // The locator is the only component that touches the
                    // environment; parsers receive resolved paths.
                    header_options.include_dirs = sdk::locate(*api).include_dirs;
                }
                for header in &inputs.headers {
                    match parse_header_file(header, &header_options, *api) {
                        Ok(raw) => merge(&mut merged, raw),
                        Err(errors) => findings.extend(errors),
                    }
                }
            }

            if let Some(tables) = &inputs.tables {
                match parse_table_file(tables, *api) {
                    Ok(raw) => merge(&mut merged, raw),
                    Err(errors) => findings.extend(errors),
                }
            }

            raws.push(merged);
        }

        if findings.is_empty() {
            Ok(raws)
        } else {
            // The whole list, not the first finding.
            for f in &findings {
                self.sink
                    .error_at(Phase::Ingest, f.loc().clone(), f.to_string());
            }
            Err(PipelineError::Ingest(findings))
        }
    }

    // ---- phase 2 -----------------------------------------------------------

    fn normalize_phase(
        &self,
        raws: &[RawRegistry],
        emitters: &[Box<dyn Emitter>],
    ) -> Result<Vec<Module>, PipelineError> {
        let options = NormalizeOptions {
            overrides: self.options.config.policies.clone(),
            groups: self.options.config.groups.clone(),
        };

        let mut modules = Vec::new();
        let mut findings: Vec<ModelError> = Vec::new();
        for raw in raws {
            match normalize(raw, emitters, &options, &self.sink) {
                Ok(module) => {
                    info!(
                        api = %module.api,
                        types = module.type_count(),
                        functions = module.functions.len(),
                        "normalized"
                    );
                    modules.push(module);
                }
                Err(errors) => findings.extend(errors),
            }
        }

        if findings.is_empty() {
            Ok(modules)
        } else {
            for f in &findings {
                self.sink.error(Phase::Normalize, f.to_string());
            }
            Err(PipelineError::Normalize(findings))
        }
    }

    // ---- phase 3 -----------------------------------------------------------

    fn emit_phase(
        &self,
        modules: &[Module],
        emitters: &[Box<dyn Emitter>],
    ) -> Result<Vec<EmittedFile>, PipelineError> {
        let emit_config = EmitConfig {
            namespace: self.options.config.namespace.clone(),
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.jobs)
            .build();
        let run_fanout = || -> Result<Vec<Vec<EmittedFile>>, EmitError> {
            modules
                .par_iter()
                .flat_map(|module| emitters.par_iter().map(move |e| (module, e)))
                .map(|(module, emitter)| {
                    if self.cancel.is_canceled() {
                        return Ok(Vec::new());
                    }
                    debug!(emitter = emitter.name(), api = %module.api, "emitting");
                    let artifacts = emitter.emit(module, &emit_config, &self.sink)?;
                    Ok(artifacts
                        .into_iter()
                        .map(|artifact| EmittedFile {
                            artifact,
                            emitter: emitter.name().to_string(),
                            api: module.api,
                            registry_version: module.registry_version.clone(),
                        })
                        .collect())
                })
                .collect()
        };

        let nested = match pool {
            Ok(pool) => pool.install(run_fanout),
            // Pool construction can fail under exotic resource limits; the
            // global pool still provides correct output, just not the
            // requested width.
            Err(_) => run_fanout(),
        }?;

        self.checkpoint()?;
        Ok(nested.into_iter().flatten().collect())
    }

    // ---- phase 4 -----------------------------------------------------------

    fn postprocess_phase(
        &self,
        files: Vec<EmittedFile>,
        modules: usize,
    ) -> Result<RunSummary, PipelineError> {
        let options = PostProcessOptions {
            output_root: self
                .options
                .output
                .clone()
                .unwrap_or_else(|| self.options.config.output_root.clone()),
            format: self.options.format.unwrap_or(self.options.config.format),
            formatter: self.options.config.formatter.clone(),
            check: self.options.check,
        };

        let report = postprocess::run(files, &options, &self.sink)?;
        if self.options.check && !report.drift.is_empty() {
            return Err(PipelineError::Drift(report.drift));
        }

        Ok(RunSummary {
            modules,
            files_written: report.written,
            files_unchanged: report.unchanged,
            manifest: report.manifest,
        })
    }
}

fn open_registry(path: &std::path::Path, api: ApiFamily) -> Result<RawRegistry, Vec<IngestError>> {
    let file = File::open(path).map_err(|err| {
        vec![IngestError::MissingDependency {
            loc: capgen_common::SourceLoc::new(path.display().to_string(), 0),
            message: format!("cannot read registry: {err}"),
        }]
    })?;
    parse_registry(BufReader::new(file), &path.display().to_string(), api)
}

fn merge(into: &mut RawRegistry, from: RawRegistry) {
    if into.version.is_empty() {
        into.version = from.version;
    }
    into.items.extend(from.items);
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::fs;

    const REGISTRY: &str = r#"<registry>
  <types>
    <type category="handle">VK_DEFINE_HANDLE(<name>VkDevice</name>)</type>
  </types>
  <enums name="VkResult" type="enum">
    <enum name="VK_SUCCESS" value="0"/>
  </enums>
  <commands>
    <command>
      <proto><type>VkResult</type> <name>vkCreateDevice</name></proto>
      <param><type>VkDevice</type>* <name>pDevice</name></param>
    </command>
    <command>
      <proto><type>void</type> <name>vkDestroyDevice</name></proto>
      <param><type>VkDevice</type> <name>device</name></param>
    </command>
  </commands>
</registry>"#;

    fn write_inputs(dir: &std::path::Path) -> RunConfig {
        fs::write(dir.join("vk.xml"), REGISTRY).unwrap();
        let text = format!(
            "output_root = \"{}\"\nformat = false\n\n[api.vulkan]\nregistry = \"{}\"\n",
            dir.join("generated").display(),
            dir.join("vk.xml").display()
        );
        RunConfig::parse(&text, std::path::Path::new("capgen.toml")).unwrap()
    }

    fn run_once(dir: &std::path::Path, check: bool) -> Result<RunSummary, PipelineError> {
        let config = write_inputs(dir);
        let pipeline = Pipeline::new(PipelineOptions {
            config,
            check,
            ..PipelineOptions::default()
        });
        pipeline.run()
    }

    #[test]
    fn full_run_writes_a_deterministic_tree() {
        let dir = tempfile::tempdir().unwrap();
        let summary = run_once(dir.path(), false).unwrap();
        assert_eq!(summary.modules, 1);
        assert!(!summary.files_written.is_empty());
        assert!(dir
            .path()
            .join("generated/vulkan/recorder.cpp")
            .exists());

        // Second run: everything unchanged, manifests byte-identical.
        let manifest_a =
            fs::read_to_string(dir.path().join("generated/manifest.json")).unwrap();
        let summary2 = run_once(dir.path(), false).unwrap();
        assert!(summary2.files_written.is_empty());
        assert_eq!(
            summary2.files_unchanged.len(),
            summary.files_written.len() + summary.files_unchanged.len()
        );
        let manifest_b =
            fs::read_to_string(dir.path().join("generated/manifest.json")).unwrap();
        assert_eq!(manifest_a, manifest_b);
    }

    #[test]
    fn check_after_generate_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        run_once(dir.path(), false).unwrap();
        let summary = run_once(dir.path(), true).unwrap();
        assert!(summary.files_written.is_empty());
    }

    #[test]
    fn check_against_empty_tree_reports_drift() {
        let dir = tempfile::tempdir().unwrap();
        let err = run_once(dir.path(), true).unwrap_err();
        assert!(matches!(err, PipelineError::Drift(_)));
        assert_eq!(err.exit_code(), 6);
    }

    #[test]
    fn version_conflict_maps_to_normalize_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let conflicted = r#"<registry>
  <commands>
    <command>
      <proto><type>void</type> <name>f</name></proto>
    </command>
  </commands>
  <feature api="vulkan" name="VK_VERSION_1_0" number="1.0">
    <require><command name="f"/></require>
  </feature>
  <feature api="vulkan" name="VK_VERSION_1_1" number="1.1">
    <require><command name="f"/></require>
  </feature>
</registry>"#;
        fs::write(dir.path().join("vk.xml"), conflicted).unwrap();
        let text = format!(
            "output_root = \"{}\"\nformat = false\n\n[api.vulkan]\nregistry = \"{}\"\n",
            dir.path().join("generated").display(),
            dir.path().join("vk.xml").display()
        );
        let config = RunConfig::parse(&text, std::path::Path::new("c.toml")).unwrap();
        let pipeline = Pipeline::new(PipelineOptions {
            config,
            ..PipelineOptions::default()
        });
        let err = pipeline.run().unwrap_err();
        assert_eq!(err.exit_code(), 3);
        // The diagnostic names both declarations.
        let findings = err.findings();
        assert!(findings[0].contains("VK_VERSION_1_0") && findings[0].contains("VK_VERSION_1_1"));
        // Nothing was emitted or published.
        assert!(!dir.path().join("generated").exists());
    }

    #[test]
    fn missing_registry_maps_to_ingest_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let text = format!(
            "[api.vulkan]\nregistry = \"{}\"\n",
            dir.path().join("absent.xml").display()
        );
        let config = RunConfig::parse(&text, std::path::Path::new("c.toml")).unwrap();
        let pipeline = Pipeline::new(PipelineOptions {
            config,
            ..PipelineOptions::default()
        });
        let err = pipeline.run().unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(matches!(err, PipelineError::Ingest(_)));
    }

    #[test]
    fn canceled_flag_stops_between_phases() {
        let dir = tempfile::tempdir().unwrap();
        let config = write_inputs(dir.path());
        let pipeline = Pipeline::new(PipelineOptions {
            config,
            ..PipelineOptions::default()
        });
        pipeline.cancel_flag().cancel();
        let err = pipeline.run().unwrap_err();
        assert!(matches!(err, PipelineError::Canceled));
        // Nothing published.
        assert!(!dir.path().join("generated/manifest.json").exists());
    }

    #[test]
    fn unknown_emitter_is_a_config_error() {
        let pipeline = Pipeline::new(PipelineOptions {
            emitters: vec!["bogus".to_string()],
            ..PipelineOptions::default()
        });
        let err = pipeline.run().unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }
}
