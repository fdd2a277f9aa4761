//! Compilation context
//!
//! The engine never mutates a syntax tree. Every pass returns a new [`syn::File`], which
//! replaces the old unit in a [`Compilation`]; a [`SemanticModel`] is rebuilt on demand.
//!
//! ```text
//! SourceText --parse--> Tree --with_tree--> Compilation --bind(focus)--> SemanticModel
//!                                      ^                                     |
//!                                      +-------- pass(&File, &Model) <-------+
//! ```
//!
//! Trees are kept in canonical form: the result of parsing their own `prettyplease`
//! rendering. Token spans therefore match the rendered text, which is what diagnostics
//! point into.

mod binder;
pub mod consteval;
pub mod diagnostic;
pub(crate) mod macros;
mod symbols;

use std::rc::Rc;

use crate::error::{Error, Result};

pub use consteval::ConstValue;
pub use diagnostic::{Code, Diagnostic, Location, Severity};
pub(crate) use symbols::declares_type;
pub use symbols::{
    element_type, peel, replace_self, type_name, type_text, Access, Reference, SemanticModel,
    Symbol, SymbolId, SymbolKind, TraitInfo, TraitItemInfo, TraitItemKind,
};

/// A named source file, shareable across threads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceText {
    pub name: String,
    pub text: String,
}

impl SourceText {
    pub fn new(name: impl Into<String>, text: impl Into<String>) -> Self {
        SourceText {
            name: name.into(),
            text: text.into(),
        }
    }
}

/// One parsed unit of a compilation.
#[derive(Clone, Debug)]
pub struct Tree {
    pub name: String,
    pub file: syn::File,
}

impl Tree {
    pub fn parse(name: &str, text: &str) -> Result<Self> {
        let file = syn::parse_file(text).map_err(|e| Error::Parse {
            unit: name.to_string(),
            message: located(&e),
        })?;
        Ok(Tree {
            name: name.to_string(),
            file: normalize(name, &file)?,
        })
    }

    pub fn render(&self) -> String {
        render(&self.file)
    }
}

pub fn render(file: &syn::File) -> String {
    prettyplease::unparse(file)
}

/// Re-parses the rendering of `file` so its spans match the rendered text.
pub fn normalize(name: &str, file: &syn::File) -> Result<syn::File> {
    let text = render(file);
    syn::parse_file(&text).map_err(|e| Error::Parse {
        unit: name.to_string(),
        message: located(&e),
    })
}

fn located(error: &syn::Error) -> String {
    format!("{} ({})", error, Location::of(error.span()))
}

/// The set of units a focus unit is bound against.
#[derive(Clone, Debug, Default)]
pub struct Compilation {
    units: Vec<Rc<Tree>>,
}

impl Compilation {
    pub fn from_sources(sources: &[SourceText]) -> Result<Self> {
        let units = sources
            .iter()
            .map(|source| Tree::parse(&source.name, &source.text).map(Rc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Compilation { units })
    }

    pub fn units(&self) -> impl Iterator<Item = &Tree> {
        self.units.iter().map(|unit| unit.as_ref())
    }

    pub fn tree(&self, name: &str) -> Option<&Tree> {
        self.units().find(|unit| unit.name == name)
    }

    /// Adds `tree`, replacing a unit of the same name.
    pub fn add(&self, tree: Tree) -> Self {
        let mut next = self.remove(&tree.name);
        next.units.push(Rc::new(tree));
        next
    }

    pub fn remove(&self, name: &str) -> Self {
        Compilation {
            units: self
                .units
                .iter()
                .filter(|unit| unit.name != name)
                .cloned()
                .collect(),
        }
    }

    /// Replaces unit `name` with a normalized copy of `file`. Other units are shared.
    pub fn with_tree(&self, name: &str, file: &syn::File) -> Result<Self> {
        let file = normalize(name, file)?;
        let units = self
            .units
            .iter()
            .map(|unit| {
                if unit.name == name {
                    Rc::new(Tree {
                        name: name.to_string(),
                        file: file.clone(),
                    })
                } else {
                    Rc::clone(unit)
                }
            })
            .collect();
        Ok(Compilation { units })
    }

    /// Whether a unit other than `except` declares a type called `name`.
    pub fn declares_type_outside(&self, except: &str, name: &str) -> bool {
        self.units()
            .filter(|unit| unit.name != except)
            .any(|unit| symbols::declares_type(&unit.file.items, name))
    }

    /// Builds the semantic model of unit `focus`.
    pub fn bind(&self, focus: &str) -> Result<SemanticModel> {
        let tree = self.tree(focus).ok_or_else(|| Error::Parse {
            unit: focus.to_string(),
            message: "unit is not part of the compilation".to_string(),
        })?;
        Ok(binder::bind(self, tree))
    }
}
