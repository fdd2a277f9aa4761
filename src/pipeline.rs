//! Specialization orchestrator
//!
//! Drives one target from template text to emitted source. Every pass goes through the same
//! [`Session`] combinator: apply the pass to the current tree, replace the unit in the
//! compilation when it changed, and rebind only when the next consumer asks for a model.
//!
//! ```text
//! Loaded -> Renamed -> StorageReduced* -> [ConstantFolded*] -> FeatureReduced
//!   -> BrokenStatementsRemoved* -> DeadCodeEliminated* -> UnusedVariablesRemoved*
//!   -> DeadCodeEliminated* -> [IndirectionResolved] -> EntryMelded -> FinalBound*
//!   -> DocumentationPropagated -> Emitted
//!
//! *  bound: the stage consults a freshly built semantic model
//! [] conditional
//! ```
//!
//! Any checkpoint can abort the target with [`Error::Rejected`], carrying the stage, the
//! offending diagnostics and the partially specialized text.

use std::fmt;

use syn::File;

use crate::config::{SpecializationTarget, TransformConfig, WidthFlag};
use crate::error::{Error, Result};
use crate::facet;
use crate::front::{
    declares_type, normalize, render, Code, Compilation, Diagnostic, SemanticModel, SourceText,
    Tree,
};
use crate::passes::{
    broken, constants, dead_code, docs, indirection, meld, rename, select, strip, unused, width,
    Rewrite,
};
use crate::workspace::snake_case;

/// Ceiling for every fixpoint loop.
pub const MAX_ITERATIONS: usize = 64;

/// First line of every emitted file.
pub const BANNER: &str =
    "// NOTE: This file is auto-generated. DO NOT MAKE CHANGES HERE! They will be overwritten on rebuild.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Loaded,
    Renamed,
    StorageReduced,
    ConstantFolded,
    FeatureReduced,
    BrokenStatementsRemoved,
    DeadCodeEliminated,
    UnusedVariablesRemoved,
    IndirectionResolved,
    EntryMelded,
    FinalBound,
    DocumentationPropagated,
    Emitted,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Loaded => "template load",
            Stage::Renamed => "identifier renaming",
            Stage::StorageReduced => "storage reduction",
            Stage::ConstantFolded => "constant folding",
            Stage::FeatureReduced => "feature reduction",
            Stage::BrokenStatementsRemoved => "broken-statement removal",
            Stage::DeadCodeEliminated => "dead-code elimination",
            Stage::UnusedVariablesRemoved => "unused-variable removal",
            Stage::IndirectionResolved => "indirection resolution",
            Stage::EntryMelded => "entry meld",
            Stage::FinalBound => "final binding",
            Stage::DocumentationPropagated => "documentation propagation",
            Stage::Emitted => "emission",
        };
        f.write_str(name)
    }
}

/// A successfully specialized target.
#[derive(Clone, Debug)]
pub struct Specialized {
    pub output: String,
    /// Emitted source, banner included.
    pub text: String,
    /// Stages traversed, in order.
    pub stages: Vec<Stage>,
    /// Non-fatal diagnostics of the final model.
    pub warnings: Vec<Diagnostic>,
}

impl Specialized {
    pub fn reached(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

// =============================================================================
// Session
// =============================================================================

/// The evolving state of one target: its tree, the compilation holding it and a cached model.
struct Session {
    unit: String,
    compilation: Compilation,
    file: File,
    model: Option<SemanticModel>,
    stages: Vec<Stage>,
}

impl Session {
    fn load(unit: String, template: &SourceText, context: &[SourceText]) -> Result<Self> {
        let tree = Tree::parse(&unit, &template.text)?;
        let file = tree.file.clone();
        let compilation = Compilation::from_sources(context)?.add(tree);
        Ok(Session {
            unit,
            compilation,
            file,
            model: None,
            stages: Vec::new(),
        })
    }

    fn reach(&mut self, stage: Stage) {
        tracing::debug!(%stage, "stage reached");
        self.stages.push(stage);
    }

    /// The model of the current tree, bound on first use.
    fn model(&mut self) -> Result<&SemanticModel> {
        let model = match self.model.take() {
            Some(model) => model,
            None => self.compilation.bind(&self.unit)?,
        };
        Ok(self.model.insert(model))
    }

    fn apply(&mut self, file: File) -> Result<()> {
        let file = normalize(&self.unit, &file)?;
        self.compilation = self.compilation.add(Tree {
            name: self.unit.clone(),
            file: file.clone(),
        });
        self.file = file;
        self.model = None;
        Ok(())
    }

    /// Applies a syntactic pass.
    fn rewrite(&mut self, pass: impl FnOnce(&File) -> Rewrite) -> Result<bool> {
        let Rewrite { file, changed } = pass(&self.file);
        if changed {
            self.apply(file)?;
        }
        Ok(changed)
    }

    /// Applies a semantic pass against the model of the current tree.
    fn rewrite_bound(&mut self, pass: impl FnOnce(&File, &SemanticModel) -> Rewrite) -> Result<bool> {
        let model = match self.model.take() {
            Some(model) => model,
            None => self.compilation.bind(&self.unit)?,
        };
        let Rewrite { file, changed } = pass(&self.file, &model);
        if changed {
            self.apply(file)?;
        } else {
            self.model = Some(model);
        }
        Ok(changed)
    }

    /// Repeats a semantic pass until it reports no change.
    fn fixpoint(
        &mut self,
        name: &'static str,
        pass: impl Fn(&File, &SemanticModel) -> Rewrite,
    ) -> Result<usize> {
        for round in 0..MAX_ITERATIONS {
            if !self.rewrite_bound(&pass)? {
                tracing::debug!(pass = name, rounds = round, "fixpoint reached");
                return Ok(round);
            }
        }
        Err(Error::NoFixpoint {
            pass: name,
            iterations: MAX_ITERATIONS,
        })
    }

    /// Aborts with every error of the current model that `fatal` selects.
    fn checkpoint(&mut self, stage: Stage, fatal: impl Fn(&Diagnostic) -> bool) -> Result<()> {
        let diagnostics: Vec<Diagnostic> = self
            .model()?
            .errors()
            .filter(|diag| fatal(diag))
            .cloned()
            .collect();
        if diagnostics.is_empty() {
            return Ok(());
        }
        Err(Error::Rejected {
            stage,
            diagnostics,
            partial: render(&self.file),
        })
    }
}

// =============================================================================
// Specializer
// =============================================================================

pub struct Specializer<'c> {
    config: &'c TransformConfig,
}

impl<'c> Specializer<'c> {
    pub fn new(config: &'c TransformConfig) -> Self {
        Specializer { config }
    }

    /// Specializes `template` for `target`, binding against the units of `context`.
    pub fn specialize(
        &self,
        target: &SpecializationTarget,
        template: &SourceText,
        context: &[SourceText],
    ) -> Result<Specialized> {
        let output = target.output_name();
        let span = tracing::info_span!("specialize", target = %output);
        let _guard = span.enter();
        let engine = &self.config.engine;

        let mut session = Session::load(format!("{}.rs", snake_case(&output)), template, context)?;
        if !declares_type(&session.file.items, &target.template) {
            return Err(Error::TemplateNotFound {
                template: target.template.clone(),
            });
        }
        session.reach(Stage::Loaded);

        session.rewrite(|file| rename::rename(file, &target.template, &output))?;
        session.rewrite(|file| {
            rename::rename(file, &target.template_entry_name(), &target.private_entry_name())
        })?;
        for pair in &target.renames {
            session.rewrite(|file| rename::rename(file, &pair.from, &pair.to))?;
        }
        session.reach(Stage::Renamed);

        let selection = target.selection();
        let storage = selection.restricted_to(&engine.storage_axis);
        session.rewrite(|file| select::select(file, &storage))?;
        if target.has_flag(WidthFlag::NarrowCount) {
            session.rewrite(|file| width::adjust(file, facet::COUNT, &engine.count_width))?;
        }
        if target.has_flag(WidthFlag::WidenRank) {
            session.rewrite(|file| width::adjust(file, facet::WIDEN, &engine.rank_width))?;
        }
        session.checkpoint(Stage::StorageReduced, |diag| {
            diag.code != Code::MissingTraitItems
        })?;
        session.reach(Stage::StorageReduced);

        let features: Vec<String> = engine
            .feature_axes
            .iter()
            .filter(|axis| selection.selects(axis))
            .cloned()
            .collect();
        if !features.is_empty() {
            session.rewrite_bound(|file, model| {
                let pinned = constants::pinned_symbols(model, &selection, &features);
                constants::substitute(file, model, &pinned)
            })?;
            session.fixpoint("dead code", dead_code::eliminate)?;
            session.reach(Stage::ConstantFolded);
        }

        session.rewrite(|file| select::select(file, &selection))?;
        session.reach(Stage::FeatureReduced);

        session.fixpoint("broken statements", broken::remove_broken)?;
        session.reach(Stage::BrokenStatementsRemoved);
        session.fixpoint("dead code", dead_code::eliminate)?;
        session.reach(Stage::DeadCodeEliminated);
        session.fixpoint("unused variables", unused::remove_unused)?;
        session.reach(Stage::UnusedVariablesRemoved);
        session.fixpoint("dead code", dead_code::eliminate)?;
        session.reach(Stage::DeadCodeEliminated);

        let indirect = selection
            .facets(&engine.storage_axis)
            .is_some_and(|facets| facets.len() == 1 && facets.contains(&engine.indirect_facet));
        if indirect {
            session.rewrite_bound(indirection::resolve_indirection)?;
            session.reach(Stage::IndirectionResolved);
        }

        let shared = target.shared_entry_name();
        let shared_exists = session
            .compilation
            .declares_type_outside(&session.unit, &shared);
        session.rewrite(|file| meld::meld(file, &target.private_entry_name(), &shared, shared_exists))?;
        session.reach(Stage::EntryMelded);

        let stripped = strip::strip_annotations(&session.file, &session.unit)?;
        if stripped.changed {
            session.apply(stripped.file)?;
        }
        session.checkpoint(Stage::FinalBound, |_| true)?;
        let warnings: Vec<Diagnostic> = session.model()?.warnings().cloned().collect();
        for warning in &warnings {
            tracing::debug!(%warning, "diagnostic");
        }
        session.reach(Stage::FinalBound);

        session.rewrite_bound(|file, model| docs::propagate(file, model, &output))?;
        session.reach(Stage::DocumentationPropagated);

        let text = format!("{BANNER}\n{}", render(&session.file));
        session.reach(Stage::Emitted);
        tracing::info!(stages = session.stages.len(), "specialized");

        Ok(Specialized {
            output,
            text,
            stages: session.stages,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EngineSettings, FacetAxis};
    use std::collections::BTreeMap;

    fn config() -> TransformConfig {
        let mut axes = BTreeMap::new();
        axes.insert("Storage".to_string(), vec!["Array".to_string(), "Object".to_string()]);
        axes.insert("Feature".to_string(), vec!["Dict".to_string(), "Rank".to_string()]);
        TransformConfig {
            engine: EngineSettings::default(),
            axes,
            do_not_unload: Vec::new(),
            targets: Vec::new(),
        }
    }

    fn target(storage: &str, features: &[&str]) -> SpecializationTarget {
        SpecializationTarget {
            template: "Tree".to_string(),
            storage_class: storage.to_string(),
            specialization: "Map".to_string(),
            flags: Vec::new(),
            facet_axes: vec![
                FacetAxis {
                    tag: "Storage".to_string(),
                    facets: vec![storage.to_string()],
                },
                FacetAxis {
                    tag: "Feature".to_string(),
                    facets: features.iter().map(|f| f.to_string()).collect(),
                },
            ],
            strip_generated: false,
            renames: Vec::new(),
        }
    }

    #[test]
    fn test_stage_trace_for_inline_storage() {
        let template = SourceText::new(
            "tree.rs",
            r#"
            pub struct Tree { len: usize }
            impl Tree {
                pub fn len(&self) -> usize { self.len }
            }
            "#,
        );
        let config = config();
        let result = Specializer::new(&config)
            .specialize(&target("Array", &["Dict"]), &template, &[])
            .unwrap();
        assert_eq!(result.output, "TreeArrayMap");
        assert!(result.text.starts_with(BANNER));
        assert!(result.text.contains("pub struct TreeArrayMap"));
        assert!(result.reached(Stage::ConstantFolded));
        assert!(!result.reached(Stage::IndirectionResolved));
        assert_eq!(result.stages.first(), Some(&Stage::Loaded));
        assert_eq!(result.stages.last(), Some(&Stage::Emitted));
    }

    #[test]
    fn test_missing_template_type() {
        let template = SourceText::new("tree.rs", "pub struct Forest;");
        let config = config();
        let err = Specializer::new(&config)
            .specialize(&target("Object", &[]), &template, &[])
            .unwrap_err();
        assert!(matches!(err, Error::TemplateNotFound { ref template } if template == "Tree"));
    }

    #[test]
    fn test_storage_checkpoint_rejects_with_partial_text() {
        let template = SourceText::new(
            "tree.rs",
            r#"
            pub struct Tree {
                #[facet(Storage(Array))]
                slots: Vec<u32>,
            }
            impl Tree {
                pub fn first(&self) -> u32 { self.slots[0] + missing() }
            }
            "#,
        );
        let config = config();
        let err = Specializer::new(&config)
            .specialize(&target("Object", &[]), &template, &[])
            .unwrap_err();
        match err {
            Error::Rejected {
                stage,
                diagnostics,
                partial,
            } => {
                assert_eq!(stage, Stage::StorageReduced);
                assert!(diagnostics.iter().any(|diag| diag.code == Code::NoField));
                assert!(partial.contains("pub struct TreeObjectMap"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
