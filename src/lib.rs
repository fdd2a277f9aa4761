//! # facetgen
//!
//! Facet-based template specialization for Rust sources.
//!
//! **One annotated template in, one pruned output per facet combination out.**
//!
//! ## Architecture
//!
//! A template is ordinary Rust whose declarations carry inert facet attributes. For each
//! configured target the engine removes every declaration the target's facets exclude, folds
//! the constants the selection pins, and cleans up whatever the reduction broke, until the
//! output has no residual conditional logic and binds without errors.
//!
//! ### 1. Tagging
//!
//! ```text
//! #[facet(Storage(Array))]                    kept only for Storage = Array
//! #[constant(Feature(Rank))]                  true for Rank, false otherwise
//! #[count] / #[widen]                         integer width follows the target flags
//! #[indirection]                              container bypassed under Object storage
//! ```
//!
//! ### 2. Rebinding
//! Passes never edit a tree in place. Each returns a new tree; the orchestrator swaps it into
//! the compilation and rebinds only when the next pass needs a semantic model.
//!
//! ### 3. Layers
//!
//! ```text
//! +-------------------------------------------------------------------+
//! |  Layer 0: Front end                                               |
//! |  - SourceText, Tree, Compilation, binder, SemanticModel           |
//! +-------------------------------------------------------------------+
//!                                |
//!                                v
//! +-------------------------------------------------------------------+
//! |  Layer 1: Rewrite passes                                          |
//! |  - rename, select, width, constants, dead_code, broken, unused    |
//! |  - indirection, meld, strip, docs                                 |
//! +-------------------------------------------------------------------+
//!                                |
//!                                v
//! +-------------------------------------------------------------------+
//! |  Layer 2: Orchestration                                           |
//! |  - Specializer (per target), Generator (per project), CLI         |
//! +-------------------------------------------------------------------+
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use facetgen::{GenerateOptions, Generator, Layout};
//!
//! let layout = Layout::new("collections", "collections/interface", "tree");
//! let report = Generator::new(layout)?.run(&GenerateOptions::default())?;
//! assert!(report.is_success());
//! ```

// =============================================================================
// Layer 0: Configuration and front end
// =============================================================================
pub mod config;
pub mod error;
pub mod facet;
pub mod front;

// =============================================================================
// Layer 1: Rewrite passes
// =============================================================================
pub mod passes;

// =============================================================================
// Layer 2: Orchestration
// =============================================================================
pub mod generator;
pub mod pipeline;
pub mod workspace;

// =============================================================================
// Re-exports at Crate Root
// =============================================================================
pub use config::{EngineSettings, FacetAxis, Rename, SpecializationTarget, TransformConfig, WidthFlag};
pub use error::{Error, Result};
pub use facet::FacetSelection;
pub use front::{Code, Compilation, Diagnostic, Location, SemanticModel, Severity, SourceText, Tree};
pub use generator::{GenerateOptions, Generator, Report, TargetOutcome, TargetStatus};
pub use pipeline::{Specialized, Specializer, Stage, BANNER};
pub use workspace::Layout;
