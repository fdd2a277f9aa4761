//! Facet selector.
//!
//! Drops every declaration whose `#[facet]` tags the selection does not admit. Tags are
//! honoured on items, impl and trait items, fields, variants, generic parameters, fn
//! parameters, statements, match arms, struct-literal fields and call/tuple/array arguments.

use syn::{
    fold::{self, Fold},
    punctuated::Punctuated,
    Attribute, Expr, FnArg, GenericParam, ImplItem, Item, Stmt, TraitItem,
};

use super::Rewrite;
use crate::facet::FacetSelection;

pub fn select(file: &syn::File, selection: &FacetSelection) -> Rewrite {
    let mut selector = Selector {
        selection,
        dropped: 0,
    };
    let file = selector.fold_file(file.clone());
    tracing::trace!(dropped = selector.dropped, "facet selection");
    Rewrite::new(file, selector.dropped > 0)
}

// =============================================================================
// Attribute access
// =============================================================================

/// Attributes of a non-exhaustive syn enum; unlisted variants have none.
macro_rules! attrs_of {
    ($value:expr, $kind:ident { $($variant:ident),* $(,)? }) => {
        match $value {
            $($kind::$variant(node) => node.attrs.as_slice(),)*
            _ => &[][..],
        }
    };
}

pub(crate) fn item_attrs(item: &Item) -> &[Attribute] {
    attrs_of!(item, Item {
        Const, Enum, ExternCrate, Fn, ForeignMod, Impl, Macro, Mod, Static, Struct, Trait,
        TraitAlias, Type, Union, Use,
    })
}

pub(crate) fn impl_item_attrs(item: &ImplItem) -> &[Attribute] {
    attrs_of!(item, ImplItem { Const, Fn, Type, Macro })
}

fn trait_item_attrs(item: &TraitItem) -> &[Attribute] {
    attrs_of!(item, TraitItem { Const, Fn, Type, Macro })
}

fn generic_param_attrs(param: &GenericParam) -> &[Attribute] {
    match param {
        GenericParam::Type(node) => &node.attrs,
        GenericParam::Lifetime(node) => &node.attrs,
        GenericParam::Const(node) => &node.attrs,
    }
}

fn fn_arg_attrs(arg: &FnArg) -> &[Attribute] {
    match arg {
        FnArg::Receiver(node) => &node.attrs,
        FnArg::Typed(node) => &node.attrs,
    }
}

pub(crate) fn expr_attrs(expr: &Expr) -> &[Attribute] {
    attrs_of!(expr, Expr {
        Array, Assign, Async, Await, Binary, Block, Break, Call, Cast, Closure, Const, Continue,
        Field, ForLoop, Group, If, Index, Infer, Let, Lit, Loop, Macro, Match, MethodCall, Paren,
        Path, Range, Reference, Repeat, Return, Struct, Try, TryBlock, Tuple, Unary, Unsafe,
        While, Yield,
    })
}

pub(crate) fn stmt_attrs(stmt: &Stmt) -> &[Attribute] {
    match stmt {
        Stmt::Local(local) => &local.attrs,
        Stmt::Item(item) => item_attrs(item),
        Stmt::Expr(expr, _) => expr_attrs(expr),
        Stmt::Macro(mac) => &mac.attrs,
    }
}

// =============================================================================
// Selector
// =============================================================================

struct Selector<'a> {
    selection: &'a FacetSelection,
    dropped: usize,
}

impl Selector<'_> {
    fn keep(&mut self, attrs: &[Attribute]) -> bool {
        let keep = self.selection.admits_attrs(attrs);
        if !keep {
            self.dropped += 1;
        }
        keep
    }

    fn retain<T, P: Default>(
        &mut self,
        list: Punctuated<T, P>,
        attrs: impl Fn(&T) -> &[Attribute],
    ) -> Punctuated<T, P> {
        list.into_iter().filter(|node| self.keep(attrs(node))).collect()
    }

    /// Selects and folds `items`; inherent impls and inline modules emptied here go too.
    fn retain_items(&mut self, items: Vec<Item>) -> Vec<Item> {
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            if !self.keep(item_attrs(&item)) {
                continue;
            }
            let before = container_len(&item);
            let item = self.fold_item(item);
            if before.is_some_and(|n| n > 0) && container_len(&item) == Some(0) {
                self.dropped += 1;
                continue;
            }
            kept.push(item);
        }
        kept
    }
}

/// Item count of an inherent impl or inline module.
fn container_len(item: &Item) -> Option<usize> {
    match item {
        Item::Impl(imp) if imp.trait_.is_none() => Some(imp.items.len()),
        Item::Mod(module) => module.content.as_ref().map(|(_, items)| items.len()),
        _ => None,
    }
}

impl Fold for Selector<'_> {
    fn fold_file(&mut self, mut file: syn::File) -> syn::File {
        file.items = self.retain_items(std::mem::take(&mut file.items));
        file
    }

    fn fold_item_mod(&mut self, mut module: syn::ItemMod) -> syn::ItemMod {
        if let Some((brace, items)) = module.content.take() {
            module.content = Some((brace, self.retain_items(items)));
        }
        module
    }

    fn fold_item_impl(&mut self, mut imp: syn::ItemImpl) -> syn::ItemImpl {
        let items = std::mem::take(&mut imp.items);
        imp.items = items
            .into_iter()
            .filter(|item| self.keep(impl_item_attrs(item)))
            .collect();
        fold::fold_item_impl(self, imp)
    }

    fn fold_item_trait(&mut self, mut tr: syn::ItemTrait) -> syn::ItemTrait {
        let items = std::mem::take(&mut tr.items);
        tr.items = items
            .into_iter()
            .filter(|item| self.keep(trait_item_attrs(item)))
            .collect();
        fold::fold_item_trait(self, tr)
    }

    fn fold_item_enum(&mut self, mut item: syn::ItemEnum) -> syn::ItemEnum {
        item.variants = self.retain(std::mem::take(&mut item.variants), |v| &v.attrs);
        fold::fold_item_enum(self, item)
    }

    fn fold_fields_named(&mut self, mut fields: syn::FieldsNamed) -> syn::FieldsNamed {
        fields.named = self.retain(std::mem::take(&mut fields.named), |f| &f.attrs);
        fold::fold_fields_named(self, fields)
    }

    fn fold_fields_unnamed(&mut self, mut fields: syn::FieldsUnnamed) -> syn::FieldsUnnamed {
        fields.unnamed = self.retain(std::mem::take(&mut fields.unnamed), |f| &f.attrs);
        fold::fold_fields_unnamed(self, fields)
    }

    fn fold_generics(&mut self, mut generics: syn::Generics) -> syn::Generics {
        generics.params = self.retain(std::mem::take(&mut generics.params), generic_param_attrs);
        if generics.params.is_empty() {
            generics.lt_token = None;
            generics.gt_token = None;
        }
        fold::fold_generics(self, generics)
    }

    fn fold_signature(&mut self, mut sig: syn::Signature) -> syn::Signature {
        sig.inputs = self.retain(std::mem::take(&mut sig.inputs), fn_arg_attrs);
        fold::fold_signature(self, sig)
    }

    fn fold_block(&mut self, mut block: syn::Block) -> syn::Block {
        let stmts = std::mem::take(&mut block.stmts);
        for stmt in stmts {
            match stmt {
                Stmt::Item(item) => {
                    block.stmts.extend(self.retain_items(vec![item]).into_iter().map(Stmt::Item));
                }
                other if self.keep(stmt_attrs(&other)) => block.stmts.push(self.fold_stmt(other)),
                _ => {}
            }
        }
        block
    }

    fn fold_expr_match(&mut self, mut expr: syn::ExprMatch) -> syn::ExprMatch {
        let arms = std::mem::take(&mut expr.arms);
        expr.arms = arms.into_iter().filter(|arm| self.keep(&arm.attrs)).collect();
        fold::fold_expr_match(self, expr)
    }

    fn fold_expr_struct(&mut self, mut expr: syn::ExprStruct) -> syn::ExprStruct {
        expr.fields = self.retain(std::mem::take(&mut expr.fields), |f| &f.attrs);
        fold::fold_expr_struct(self, expr)
    }

    fn fold_expr_call(&mut self, mut expr: syn::ExprCall) -> syn::ExprCall {
        expr.args = self.retain(std::mem::take(&mut expr.args), expr_attrs);
        fold::fold_expr_call(self, expr)
    }

    fn fold_expr_method_call(&mut self, mut expr: syn::ExprMethodCall) -> syn::ExprMethodCall {
        expr.args = self.retain(std::mem::take(&mut expr.args), expr_attrs);
        fold::fold_expr_method_call(self, expr)
    }

    fn fold_expr_tuple(&mut self, mut expr: syn::ExprTuple) -> syn::ExprTuple {
        expr.elems = self.retain(std::mem::take(&mut expr.elems), expr_attrs);
        fold::fold_expr_tuple(self, expr)
    }

    fn fold_expr_array(&mut self, mut expr: syn::ExprArray) -> syn::ExprArray {
        expr.elems = self.retain(std::mem::take(&mut expr.elems), expr_attrs);
        fold::fold_expr_array(self, expr)
    }
}
