//! Constant substitution.
//!
//! A `#[constant(Feature(Rank))]` symbol whose value is fixed by the selection is replaced by
//! that literal at every site the model resolves to it. Resolution is by symbol identity, so
//! a local `has_rank` shadowing a pinned field is left alone.

use std::collections::HashMap;

use syn::{
    fold::{self, Fold},
    Expr, ExprLit, File, ImplItem, Item, Lit, Macro, Member,
};

use super::Rewrite;
use crate::facet::FacetSelection;
use crate::front::{macros, SemanticModel, SymbolId, SymbolKind};

/// Symbols the selection pins to a literal, restricted to `feature_axes`.
pub fn pinned_symbols(
    model: &SemanticModel,
    selection: &FacetSelection,
    feature_axes: &[String],
) -> HashMap<SymbolId, Lit> {
    model
        .symbols()
        .filter_map(|(id, symbol)| {
            let tag = symbol.pin.as_ref()?;
            if !feature_axes.contains(&tag.axis) {
                return None;
            }
            tag.pinned(selection).map(|lit| (id, lit))
        })
        .collect()
}

pub fn substitute(file: &File, model: &SemanticModel, pinned: &HashMap<SymbolId, Lit>) -> Rewrite {
    if pinned.is_empty() {
        return Rewrite::unchanged(file);
    }
    let mut substituter = Substituter {
        model,
        pinned,
        replaced: 0,
        removed: 0,
    };
    let file = substituter.fold_file(file.clone());
    tracing::debug!(
        replaced = substituter.replaced,
        removed = substituter.removed,
        "constant substitution"
    );
    Rewrite::new(file, substituter.replaced + substituter.removed > 0)
}

struct Substituter<'a> {
    model: &'a SemanticModel,
    pinned: &'a HashMap<SymbolId, Lit>,
    replaced: usize,
    removed: usize,
}

impl Substituter<'_> {
    fn pinned_at(&self, ident: &syn::Ident) -> Option<&Lit> {
        self.pinned.get(&self.model.resolve_ident(ident)?)
    }

    /// The literal `expr` is replaced with, if it is a use of a pinned symbol.
    fn literal_for(&self, expr: &Expr) -> Option<Lit> {
        let lit = match expr {
            Expr::Path(path) if path.qself.is_none() => {
                self.pinned_at(&path.path.segments.last()?.ident)?
            }
            Expr::Field(field) => match &field.member {
                Member::Named(ident) => self.pinned_at(ident)?,
                Member::Unnamed(_) => return None,
            },
            Expr::MethodCall(call) if call.args.is_empty() => self.pinned_at(&call.method)?,
            Expr::Call(call) if call.args.is_empty() => match &*call.func {
                Expr::Path(path) if path.qself.is_none() => {
                    self.pinned_at(&path.path.segments.last()?.ident)?
                }
                _ => return None,
            },
            _ => return None,
        };
        Some(lit.clone())
    }

    /// Pinned `const` declarations go once their uses are literals.
    fn is_pinned_const(&self, ident: &syn::Ident) -> bool {
        self.model.resolve_ident(ident).is_some_and(|id| {
            self.pinned.contains_key(&id)
                && matches!(
                    self.model.symbol(id).kind,
                    SymbolKind::Const | SymbolKind::AssocConst { .. }
                )
        })
    }

    fn retain_items(&mut self, items: Vec<Item>) -> Vec<Item> {
        let before = items.len();
        let kept: Vec<Item> = items
            .into_iter()
            .filter(|item| !matches!(item, Item::Const(c) if self.is_pinned_const(&c.ident)))
            .collect();
        self.removed += before - kept.len();
        kept
    }
}

impl Fold for Substituter<'_> {
    fn fold_file(&mut self, mut file: File) -> File {
        file.items = self.retain_items(std::mem::take(&mut file.items));
        fold::fold_file(self, file)
    }

    fn fold_item_mod(&mut self, mut module: syn::ItemMod) -> syn::ItemMod {
        if let Some((brace, items)) = module.content.take() {
            module.content = Some((brace, self.retain_items(items)));
        }
        fold::fold_item_mod(self, module)
    }

    fn fold_item_impl(&mut self, mut imp: syn::ItemImpl) -> syn::ItemImpl {
        if imp.trait_.is_none() {
            let before = imp.items.len();
            let items = std::mem::take(&mut imp.items);
            imp.items = items
                .into_iter()
                .filter(|item| !matches!(item, ImplItem::Const(c) if self.is_pinned_const(&c.ident)))
                .collect();
            self.removed += before - imp.items.len();
        }
        fold::fold_item_impl(self, imp)
    }

    fn fold_expr(&mut self, expr: Expr) -> Expr {
        match self.literal_for(&expr) {
            Some(lit) => {
                self.replaced += 1;
                Expr::Lit(ExprLit {
                    attrs: Vec::new(),
                    lit,
                })
            }
            None => fold::fold_expr(self, expr),
        }
    }

    fn fold_macro(&mut self, mac: Macro) -> Macro {
        let Some(body) = macros::parse_body(&mac) else {
            return mac;
        };
        let before = self.replaced;
        let body = body.map(|expr| self.fold_expr(expr));
        if self.replaced == before {
            mac
        } else {
            body.into_macro(&mac)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FacetAxis;
    use crate::front::{render, Compilation, SourceText};

    fn specialize(text: &str, facets: &[&str]) -> String {
        let compilation = Compilation::from_sources(&[SourceText::new("tree", text)]).unwrap();
        let model = compilation.bind("tree").unwrap();
        let selection = FacetSelection::from_axes(&[FacetAxis {
            tag: "Feature".to_string(),
            facets: facets.iter().map(|f| f.to_string()).collect(),
        }]);
        let pinned = pinned_symbols(&model, &selection, &["Feature".to_string()]);
        let tree = compilation.tree("tree").unwrap();
        render(&substitute(&tree.file, &model, &pinned).file)
    }

    const TEMPLATE: &str = r#"
        #[constant(Feature(Rank))]
        const HAS_RANK: bool = true;

        struct Tree {
            #[constant(Feature(Multi), then = 2, otherwise = 1)]
            arity: usize,
        }

        impl Tree {
            #[constant(Feature(Rank))]
            fn ranked(&self) -> bool { HAS_RANK }

            fn probe(&self) -> usize {
                if HAS_RANK && self.ranked() {
                    println!("{}", HAS_RANK);
                }
                let HAS_RANK_LOCAL = self.arity;
                HAS_RANK_LOCAL
            }

            fn shadow(&self) -> bool {
                let arity = false;
                arity
            }
        }
    "#;

    #[test]
    fn test_pinned_uses_become_literals() {
        let text = specialize(TEMPLATE, &["Dict"]);
        assert!(!text.contains("const HAS_RANK"));
        assert!(text.contains("if false && false"));
        assert!(text.contains("println!(\"{}\", false)"));
        assert!(text.contains("let HAS_RANK_LOCAL = 1;"));
        assert!(text.contains("fn ranked(&self) -> bool {\n        false\n    }"));
    }

    #[test]
    fn test_shadowing_local_is_untouched() {
        let text = specialize(TEMPLATE, &["Rank"]);
        assert!(text.contains("let arity = false;\n        arity\n"));
        assert!(text.contains("if true && true"));
    }

    #[test]
    fn test_unpinned_selection_changes_nothing() {
        let compilation = Compilation::from_sources(&[SourceText::new("tree", TEMPLATE)]).unwrap();
        let model = compilation.bind("tree").unwrap();
        let selection = FacetSelection::from_axes(&[FacetAxis {
            tag: "Storage".to_string(),
            facets: vec!["Array".to_string()],
        }]);
        let pinned = pinned_symbols(&model, &selection, &["Feature".to_string()]);
        assert!(pinned.is_empty());
        let tree = compilation.tree("tree").unwrap();
        assert!(!substitute(&tree.file, &model, &pinned).changed);
    }
}
