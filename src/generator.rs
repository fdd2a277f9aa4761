//! Generation driver
//!
//! Loads the configuration and sources once, then specializes every selected target that is
//! stale. Targets are independent: each runs on its own thread with its own trees, sharing
//! only the source texts, and a failed target never stops the others.
//!
//! ```text
//! transform.toml ─┐
//! template/*.rs ──┼─> validate ─> [stale?] ─> Specializer ─> generated/<output>.rs
//! interfaces/** ──┘                  │              │
//!                                    │              └─ Rejected ─> diagnostics + dump
//!                                    └─ up to date ─> skipped
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use colored::Colorize;

use crate::config::{SpecializationTarget, TransformConfig};
use crate::error::{Error, Result};
use crate::facet::validate_template;
use crate::front::{SourceText, Tree};
use crate::pipeline::Specializer;
use crate::workspace::{self, Layout};

#[derive(Clone, Debug, Default)]
pub struct GenerateOptions {
    /// Regenerate even when outputs are up to date.
    pub force: bool,
    /// Worker threads; `None` lets the pool decide.
    pub jobs: Option<usize>,
    /// Restrict the run to these output names.
    pub only: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetStatus {
    Generated { path: PathBuf },
    UpToDate,
    Failed { message: String, dump: Option<PathBuf> },
}

#[derive(Clone, Debug)]
pub struct TargetOutcome {
    pub output: String,
    pub status: TargetStatus,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct Report {
    pub outcomes: Vec<TargetOutcome>,
    pub init_time: Duration,
}

impl Report {
    pub fn failures(&self) -> impl Iterator<Item = &TargetOutcome> {
        self.outcomes
            .iter()
            .filter(|outcome| matches!(outcome.status, TargetStatus::Failed { .. }))
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }

    pub fn outcome(&self, output: &str) -> Option<&TargetOutcome> {
        self.outcomes.iter().find(|outcome| outcome.output == output)
    }
}

/// Sources shared read-only by every target of a run.
struct Inputs {
    templates: BTreeMap<String, SourceText>,
    interfaces: Vec<(PathBuf, SourceText)>,
    project_files: Vec<PathBuf>,
}

pub struct Generator {
    layout: Layout,
    config: TransformConfig,
}

impl Generator {
    /// Reads `transform.toml` from the project directory.
    pub fn new(layout: Layout) -> Result<Self> {
        let config = TransformConfig::load(&layout.config_path())?;
        Ok(Self::with_config(layout, config))
    }

    pub fn with_config(layout: Layout, config: TransformConfig) -> Self {
        Generator { layout, config }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn run(&self, options: &GenerateOptions) -> Result<Report> {
        let started = Instant::now();
        let targets = self.selected(&options.only)?;
        let inputs = self.load(&targets)?;
        let init_time = started.elapsed();
        println!("Initialization time: {:.1} seconds", init_time.as_secs_f64());

        let outcomes = self.run_targets(&targets, &inputs, options)?;
        Ok(Report { outcomes, init_time })
    }

    fn selected(&self, only: &[String]) -> Result<Vec<&SpecializationTarget>> {
        for name in only {
            if !self.config.targets.iter().any(|t| &t.output_name() == name) {
                return Err(Error::config(format!("no target produces `{name}`")));
            }
        }
        Ok(self
            .config
            .targets
            .iter()
            .filter(|target| only.is_empty() || only.contains(&target.output_name()))
            .collect())
    }

    /// Reads and validates every template and interface before any target runs.
    fn load(&self, targets: &[&SpecializationTarget]) -> Result<Inputs> {
        let mut templates = BTreeMap::new();
        for target in targets {
            if templates.contains_key(&target.template) {
                continue;
            }
            let path = self.layout.template_path(&target.template);
            let name = path.display().to_string();
            let source = workspace::read_source(&path, name.clone())?;
            let tree = Tree::parse(&name, &source.text)?;
            validate_template(&tree.file, &target.template, &self.config)?;
            templates.insert(target.template.clone(), source);
        }

        let interfaces = self
            .layout
            .interface_files()?
            .into_iter()
            .map(|path| {
                let name = path
                    .strip_prefix(&self.layout.interfaces)
                    .unwrap_or(&path)
                    .display()
                    .to_string();
                workspace::read_source(&path, name).map(|source| (path, source))
            })
            .collect::<Result<Vec<_>>>()?;
        let project_files = self.layout.project_files(&self.config.do_not_unload)?;
        tracing::info!(
            templates = templates.len(),
            interfaces = interfaces.len(),
            project_files = project_files.len(),
            "sources loaded"
        );
        Ok(Inputs {
            templates,
            interfaces,
            project_files,
        })
    }

    #[cfg(feature = "parallel")]
    fn run_targets(
        &self,
        targets: &[&SpecializationTarget],
        inputs: &Inputs,
        options: &GenerateOptions,
    ) -> Result<Vec<TargetOutcome>> {
        use rayon::prelude::*;

        let mut builder = rayon::ThreadPoolBuilder::new();
        if let Some(jobs) = options.jobs {
            builder = builder.num_threads(jobs);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::config(format!("cannot start worker pool: {e}")))?;
        Ok(pool.install(|| {
            targets
                .par_iter()
                .map(|target| self.process(target, inputs, options.force))
                .collect()
        }))
    }

    #[cfg(not(feature = "parallel"))]
    fn run_targets(
        &self,
        targets: &[&SpecializationTarget],
        inputs: &Inputs,
        options: &GenerateOptions,
    ) -> Result<Vec<TargetOutcome>> {
        Ok(targets
            .iter()
            .map(|target| self.process(target, inputs, options.force))
            .collect())
    }

    fn process(&self, target: &SpecializationTarget, inputs: &Inputs, force: bool) -> TargetOutcome {
        let started = Instant::now();
        let output = target.output_name();
        let status = match self.generate(target, inputs, force) {
            Ok(status) => status,
            Err(err) => self.report_failure(&output, err),
        };

        let line = match &status {
            TargetStatus::Generated { .. } => format!("{}", output.yellow()),
            TargetStatus::UpToDate => format!("{} - skipped (up to date)", output.yellow()),
            TargetStatus::Failed { message, .. } => {
                format!("{} - {}", output.yellow(), message.red())
            }
        };
        println!("{line}");

        TargetOutcome {
            output,
            status,
            elapsed: started.elapsed(),
        }
    }

    fn generate(&self, target: &SpecializationTarget, inputs: &Inputs, force: bool) -> Result<TargetStatus> {
        let output = target.output_name();
        let output_path = self.layout.output_path(&output);
        let template = inputs
            .templates
            .get(&target.template)
            .ok_or_else(|| Error::config(format!("template `{}` was not loaded", target.template)))?;

        if !force {
            let mut sources = vec![self.layout.template_path(&target.template)];
            sources.extend(inputs.interfaces.iter().map(|(path, _)| path.clone()));
            sources.extend(
                inputs
                    .project_files
                    .iter()
                    .filter(|path| **path != output_path)
                    .cloned(),
            );
            if !workspace::is_stale(&output_path, &sources)? {
                return Ok(TargetStatus::UpToDate);
            }
        }

        let context: Vec<SourceText> = inputs
            .interfaces
            .iter()
            .filter(|(path, _)| !(target.strip_generated && workspace::is_generated(path)))
            .map(|(_, source)| source.clone())
            .collect();
        let specialized = Specializer::new(&self.config).specialize(target, template, &context)?;
        for warning in &specialized.warnings {
            tracing::debug!(target = %output, %warning, "diagnostic");
        }
        workspace::write_atomic(&output_path, &specialized.text)?;
        tracing::info!(target = %output, path = %output_path.display(), "written");
        Ok(TargetStatus::Generated { path: output_path })
    }

    fn report_failure(&self, output: &str, err: Error) -> TargetStatus {
        let Error::Rejected {
            stage,
            diagnostics,
            partial,
        } = &err
        else {
            tracing::error!(target = %output, error = %err, "specialization failed");
            return TargetStatus::Failed {
                message: err.to_string(),
                dump: None,
            };
        };

        for diag in diagnostics {
            tracing::error!(
                target = %output,
                code = %diag.code,
                location = %diag.location,
                "{}",
                diag.message
            );
            println!("{} {}", "ERROR:".red(), diag);
            if let Some(line) = diag.source_line(partial) {
                println!("{line}");
            }
        }
        let dump = match workspace::dump_partial(output, partial) {
            Ok(path) => {
                println!("partial output after {stage} written to {}", path.display());
                Some(path)
            }
            Err(dump_err) => {
                tracing::warn!(target = %output, error = %dump_err, "could not write partial output");
                None
            }
        };
        TargetStatus::Failed {
            message: err.to_string(),
            dump,
        }
    }
}
