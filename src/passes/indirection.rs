//! Storage-indirection eliminator.
//!
//! The inline-array representation reaches nodes through a container (`self.nodes[node]`).
//! Under the object representation the index already is the node, so the lookup collapses
//! to the index itself when its type matches the container's element type.

use std::collections::{HashMap, HashSet};

use syn::{
    fold::{self, Fold},
    punctuated::Punctuated,
    Expr, ExprParen, File, ImplItem, Item, Member,
};

use super::Rewrite;
use crate::front::{element_type, replace_self, type_text, Access, Location, SemanticModel, SymbolId};

pub fn resolve_indirection(file: &File, model: &SemanticModel) -> Rewrite {
    let mut resolver = Resolver {
        model,
        compatible: HashMap::new(),
        rewritten: HashSet::new(),
    };
    let file = resolver.fold_file(file.clone());
    if resolver.rewritten.is_empty() {
        return Rewrite::unchanged(&file);
    }

    let rewritten_symbols: HashSet<SymbolId> = resolver
        .rewritten
        .iter()
        .filter_map(|at| model.resolve(*at))
        .collect();
    let removable: HashSet<SymbolId> = rewritten_symbols
        .into_iter()
        .filter(|id| {
            model
                .references_to(*id)
                .filter(|reference| reference.access != Access::Init)
                .all(|reference| resolver.rewritten.contains(&reference.at))
        })
        .collect();
    tracing::debug!(
        rewritten = resolver.rewritten.len(),
        removed = removable.len(),
        "storage indirection"
    );

    let file = Pruner { model, removable }.fold_file(file);
    Rewrite::new(file, true)
}

struct Resolver<'a> {
    model: &'a SemanticModel,
    /// (container, index type) pairs already classified.
    compatible: HashMap<(SymbolId, String), bool>,
    /// Container use sites that were collapsed.
    rewritten: HashSet<Location>,
}

impl Resolver<'_> {
    fn container(&self, expr: &Expr) -> Option<(SymbolId, Location)> {
        let ident = match expr {
            Expr::Field(field) => match &field.member {
                Member::Named(ident) => ident,
                Member::Unnamed(_) => return None,
            },
            Expr::Path(path) if path.qself.is_none() => path.path.get_ident()?,
            Expr::Paren(paren) => return self.container(&paren.expr),
            _ => return None,
        };
        let id = self.model.resolve_ident(ident)?;
        self.model
            .symbol(id)
            .indirection
            .then(|| (id, Location::of(ident.span())))
    }

    fn is_compatible(&mut self, container: SymbolId, index: &Expr) -> bool {
        let Some(index_ty) = self.model.type_of(index) else {
            return false;
        };
        let index_text = type_text(&self.model.canonical_type(&index_ty));
        let model = self.model;
        *self
            .compatible
            .entry((container, index_text.clone()))
            .or_insert_with(|| {
                let symbol = model.symbol(container);
                let Some(declared) = &symbol.ty else {
                    return false;
                };
                let declared = match symbol.owner() {
                    Some(owner) => replace_self(declared, owner),
                    None => declared.clone(),
                };
                element_type(&declared).is_some_and(|element| {
                    type_text(&model.canonical_type(element)) == index_text
                })
            })
    }
}

fn is_atomic(expr: &Expr) -> bool {
    matches!(
        expr,
        Expr::Path(_)
            | Expr::Lit(_)
            | Expr::Field(_)
            | Expr::MethodCall(_)
            | Expr::Call(_)
            | Expr::Paren(_)
            | Expr::Index(_)
    )
}

impl Fold for Resolver<'_> {
    fn fold_expr(&mut self, expr: Expr) -> Expr {
        let expr = fold::fold_expr(self, expr);
        let Expr::Index(index) = expr else {
            return expr;
        };
        match self.container(&index.expr) {
            Some((id, at)) if self.is_compatible(id, &index.index) => {
                self.rewritten.insert(at);
                let node = *index.index;
                if is_atomic(&node) {
                    node
                } else {
                    Expr::Paren(ExprParen {
                        attrs: Vec::new(),
                        paren_token: Default::default(),
                        expr: Box::new(node),
                    })
                }
            }
            _ => Expr::Index(index),
        }
    }
}

/// Drops containers with no remaining uses and their initializers.
struct Pruner<'a> {
    model: &'a SemanticModel,
    removable: HashSet<SymbolId>,
}

impl Pruner<'_> {
    fn is_removable(&self, ident: &syn::Ident) -> bool {
        self.model
            .resolve_ident(ident)
            .is_some_and(|id| self.removable.contains(&id))
    }

    fn keep_item(&self, item: &Item) -> bool {
        match item {
            Item::Const(item) => !self.is_removable(&item.ident),
            Item::Static(item) => !self.is_removable(&item.ident),
            _ => true,
        }
    }
}

impl Fold for Pruner<'_> {
    fn fold_file(&mut self, mut file: File) -> File {
        file.items.retain(|item| self.keep_item(item));
        fold::fold_file(self, file)
    }

    fn fold_item_mod(&mut self, mut module: syn::ItemMod) -> syn::ItemMod {
        if let Some((_, items)) = &mut module.content {
            items.retain(|item| self.keep_item(item));
        }
        fold::fold_item_mod(self, module)
    }

    fn fold_item_impl(&mut self, mut imp: syn::ItemImpl) -> syn::ItemImpl {
        imp.items
            .retain(|item| !matches!(item, ImplItem::Const(c) if self.is_removable(&c.ident)));
        fold::fold_item_impl(self, imp)
    }

    fn fold_fields_named(&mut self, mut fields: syn::FieldsNamed) -> syn::FieldsNamed {
        let named = std::mem::take(&mut fields.named);
        fields.named = named
            .into_pairs()
            .filter(|pair| {
                pair.value()
                    .ident
                    .as_ref()
                    .is_none_or(|ident| !self.is_removable(ident))
            })
            .collect();
        fold::fold_fields_named(self, fields)
    }

    fn fold_expr_struct(&mut self, mut literal: syn::ExprStruct) -> syn::ExprStruct {
        let fields = std::mem::take(&mut literal.fields);
        let kept: Punctuated<syn::FieldValue, syn::Token![,]> = fields
            .into_iter()
            .filter(|value| match &value.member {
                Member::Named(ident) => !self.is_removable(ident),
                Member::Unnamed(_) => true,
            })
            .collect();
        literal.fields = kept;
        fold::fold_expr_struct(self, literal)
    }
}
