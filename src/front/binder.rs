//! Name resolution over the focus unit.
//!
//! The resolver never guesses: a diagnostic is only reported when the name or member is
//! provably absent from the compilation. Receivers of unknown type, generic parameters and
//! names glob-imported from outside the compilation are accepted silently.

use std::collections::{HashMap, HashSet};

use proc_macro2::{Span, TokenStream, TokenTree};
use quote::ToTokens;
use syn::{
    visit::{self, Visit},
    BinOp, Block, Expr, FnArg, GenericParam, Generics, Ident, Macro, Member, Pat, ReturnType,
    Signature, Type, UnOp,
};

use super::diagnostic::{Code, Diagnostic, Location};
use super::macros;
use super::symbols::{
    self, infer_type, peel, replace_self, type_name, Access, Reference, SemanticModel, Symbol,
    SymbolId, SymbolKind, SymbolSource, Tables, TypeKind, CRATE_ROOTS,
};
use super::{Compilation, Tree};

pub(super) fn bind(compilation: &Compilation, focus: &Tree) -> SemanticModel {
    let (mut tables, mut diagnostics) = symbols::collect(compilation, focus);

    let (locals, references, mut by_location, resolved) = {
        let mut resolver = Resolver::new(&tables, &focus.name);
        resolver.visit_file(&focus.file);
        (
            resolver.locals,
            resolver.references,
            resolver.by_location,
            resolver.diagnostics,
        )
    };
    diagnostics.extend(resolved);

    let base = tables.symbols.len();
    let reads: HashSet<SymbolId> = references
        .iter()
        .filter(|reference| reference.access == Access::Read)
        .map(|reference| reference.symbol)
        .collect();
    for (offset, local) in locals.iter().enumerate() {
        if local.is_local() && !local.name.starts_with('_') && !reads.contains(&(base + offset)) {
            diagnostics.push(Diagnostic::new(
                Code::UnusedVariable,
                local.decl,
                format!("unused variable: `{}`", local.name),
            ));
        }
    }

    tables.symbols.extend(locals);
    for (location, id) in &tables.focus_decls {
        by_location.entry(*location).or_insert(*id);
    }
    diagnostics.sort_by_key(|diag| (diag.location, diag.code));
    diagnostics.dedup();

    SemanticModel {
        focus: focus.name.clone(),
        tables,
        references,
        by_location,
        diagnostics,
    }
}

#[derive(Clone, Copy)]
enum Binding {
    Let,
    Pattern,
    Param,
}

struct Resolver<'a> {
    tables: &'a Tables,
    unit: &'a str,
    base: SymbolId,
    locals: Vec<Symbol>,
    scopes: Vec<HashMap<String, SymbolId>>,
    generics: Vec<HashSet<String>>,
    self_ty: Option<String>,
    /// While > 0, resolve without reporting.
    quiet: usize,
    references: Vec<Reference>,
    by_location: HashMap<Location, SymbolId>,
    diagnostics: Vec<Diagnostic>,
}

impl SymbolSource for Resolver<'_> {
    fn tables(&self) -> &Tables {
        self.tables
    }

    fn symbol_at(&self, location: Location) -> Option<&Symbol> {
        let id = self
            .by_location
            .get(&location)
            .or_else(|| self.tables.focus_decls.get(&location))?;
        Some(self.symbol(*id))
    }
}

impl<'a> Resolver<'a> {
    fn new(tables: &'a Tables, unit: &'a str) -> Self {
        Resolver {
            tables,
            unit,
            base: tables.symbols.len(),
            locals: Vec::new(),
            scopes: Vec::new(),
            generics: Vec::new(),
            self_ty: None,
            quiet: 0,
            references: Vec::new(),
            by_location: HashMap::new(),
            diagnostics: Vec::new(),
        }
    }

    fn symbol(&self, id: SymbolId) -> &Symbol {
        if id < self.base {
            &self.tables.symbols[id]
        } else {
            &self.locals[id - self.base]
        }
    }

    // =========================================================================
    // Bookkeeping
    // =========================================================================

    fn report(&mut self, code: Code, span: Span, message: String) {
        if self.quiet == 0 {
            self.diagnostics.push(Diagnostic::new(code, Location::of(span), message));
        }
    }

    fn reference(&mut self, symbol: SymbolId, span: Span, access: Access) {
        let at = Location::of(span);
        self.references.push(Reference { symbol, at, access });
        self.by_location.insert(at, symbol);
    }

    fn quietly(&mut self, f: impl FnOnce(&mut Self)) {
        self.quiet += 1;
        f(self);
        self.quiet -= 1;
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup_local(&self, name: &str) -> Option<SymbolId> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn is_generic(&self, name: &str) -> bool {
        self.generics.iter().any(|set| set.contains(name))
    }

    fn with_generics(&mut self, generics: &Generics, f: impl FnOnce(&mut Self)) {
        let names = generics
            .params
            .iter()
            .filter_map(|param| match param {
                GenericParam::Type(ty) => Some(ty.ident.to_string()),
                GenericParam::Const(constant) => Some(constant.ident.to_string()),
                GenericParam::Lifetime(_) => None,
            })
            .collect();
        self.generics.push(names);
        visit::visit_generics(self, generics);
        f(self);
        self.generics.pop();
    }

    fn declare(&mut self, ident: &Ident, kind: SymbolKind, ty: Option<Type>) -> SymbolId {
        let id = self.base + self.locals.len();
        let location = Location::of(ident.span());
        self.locals.push(Symbol {
            name: ident.to_string(),
            kind,
            unit: self.unit.to_string(),
            decl: location,
            ty,
            constant: None,
            pin: None,
            indirection: false,
            arity: None,
        });
        self.by_location.insert(location, id);
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(ident.to_string(), id);
        }
        id
    }

    /// `Self` replaced by the current impl type.
    fn concrete(&self, ty: &Type) -> Type {
        match &self.self_ty {
            Some(owner) => replace_self(ty, owner),
            None => ty.clone(),
        }
    }

    /// Struct, enum or union of the template a receiver expression has.
    fn nominal_of(&self, expr: &Expr) -> Option<String> {
        let ty = infer_type(self, expr)?;
        let name = type_name(peel(&ty))?;
        if self.is_generic(&name) {
            return None;
        }
        self.tables.nominal(&name)
    }

    // =========================================================================
    // Functions and patterns
    // =========================================================================

    fn visit_fn(&mut self, sig: &Signature, body: Option<&Block>) {
        let saved = std::mem::take(&mut self.scopes);
        self.with_generics(&sig.generics, |this| {
            this.push_scope();
            for input in &sig.inputs {
                match input {
                    FnArg::Receiver(receiver) => {
                        let ty = this.self_ty.as_ref().map(|owner| {
                            Type::Path(syn::TypePath {
                                qself: None,
                                path: Ident::new(owner, receiver.self_token.span).into(),
                            })
                        });
                        let ident = Ident::new("self", receiver.self_token.span);
                        this.declare(&ident, SymbolKind::Param, ty);
                    }
                    FnArg::Typed(typed) => {
                        this.visit_type(&typed.ty);
                        let ty = this.concrete(&typed.ty);
                        this.bind_pat(&typed.pat, Some(ty), Binding::Param);
                    }
                }
            }
            if let ReturnType::Type(_, ty) = &sig.output {
                this.visit_type(ty);
            }
            if let Some(body) = body {
                this.visit_block(body);
            }
        });
        self.scopes = saved;
    }

    fn bind_pat(&mut self, pat: &Pat, ty: Option<Type>, binding: Binding) {
        let mut bound = HashMap::new();
        self.bind_pat_inner(pat, ty, binding, &mut bound);
    }

    fn bind_pat_inner(
        &mut self,
        pat: &Pat,
        ty: Option<Type>,
        binding: Binding,
        bound: &mut HashMap<String, SymbolId>,
    ) {
        match pat {
            Pat::Ident(ident_pat) => {
                let plain = ident_pat.by_ref.is_none()
                    && ident_pat.mutability.is_none()
                    && ident_pat.subpat.is_none();
                if plain && self.names_constant_pattern(&ident_pat.ident) {
                    self.quietly(|this| this.resolve_single_value(&ident_pat.ident, Access::Read));
                    return;
                }
                let name = ident_pat.ident.to_string();
                match bound.get(&name) {
                    Some(&id) => {
                        self.by_location.insert(Location::of(ident_pat.ident.span()), id);
                    }
                    None => {
                        let kind = match binding {
                            Binding::Let => SymbolKind::Local {
                                mutable: ident_pat.mutability.is_some(),
                            },
                            Binding::Pattern => SymbolKind::Binding,
                            Binding::Param => SymbolKind::Param,
                        };
                        let id = self.declare(&ident_pat.ident, kind, ty);
                        bound.insert(name, id);
                    }
                }
                if let Some((_, sub)) = &ident_pat.subpat {
                    self.bind_pat_inner(sub, None, binding, bound);
                }
            }
            Pat::Type(typed) => {
                self.visit_type(&typed.ty);
                let ty = self.concrete(&typed.ty);
                self.bind_pat_inner(&typed.pat, Some(ty), binding, bound);
            }
            Pat::Paren(paren) => self.bind_pat_inner(&paren.pat, ty, binding, bound),
            Pat::Reference(reference) => self.bind_pat_inner(&reference.pat, None, binding, bound),
            Pat::Tuple(tuple) => {
                for elem in &tuple.elems {
                    self.bind_pat_inner(elem, None, binding, bound);
                }
            }
            Pat::TupleStruct(tuple) => {
                self.quietly(|this| this.resolve_value_path(tuple.qself.is_some(), &tuple.path, Access::Read));
                for elem in &tuple.elems {
                    self.bind_pat_inner(elem, None, binding, bound);
                }
            }
            Pat::Struct(structure) => {
                for field in &structure.fields {
                    self.bind_pat_inner(&field.pat, None, binding, bound);
                }
            }
            Pat::Slice(slice) => {
                for elem in &slice.elems {
                    self.bind_pat_inner(elem, None, binding, bound);
                }
            }
            Pat::Or(or) => {
                for case in &or.cases {
                    self.bind_pat_inner(case, ty.clone(), binding, bound);
                }
            }
            Pat::Path(path) => {
                self.quietly(|this| this.resolve_value_path(path.qself.is_some(), &path.path, Access::Read));
            }
            Pat::Lit(_) | Pat::Range(_) | Pat::Const(_) => {
                self.quietly(|this| visit::visit_pat(this, pat));
            }
            _ => {}
        }
    }

    /// A lone identifier in a pattern is a path when it names a constant, unit struct or variant.
    fn names_constant_pattern(&self, ident: &Ident) -> bool {
        let name = ident.to_string();
        if let Some(&id) = self.tables.values.get(&name) {
            return matches!(
                self.tables.symbols[id].kind,
                SymbolKind::Const | SymbolKind::Static | SymbolKind::Type | SymbolKind::Variant { .. }
            );
        }
        name.chars().next().is_some_and(char::is_uppercase) && self.tables.is_value(&name)
    }

    // =========================================================================
    // Paths
    // =========================================================================

    fn resolve_value_path(&mut self, qself: bool, path: &syn::Path, access: Access) {
        if qself || path.leading_colon.is_some() {
            return;
        }
        let segments: Vec<&Ident> = path.segments.iter().map(|segment| &segment.ident).collect();
        let mut start = 0;
        while start + 1 < segments.len() {
            let name = segments[start].to_string();
            let is_module = matches!(name.as_str(), "crate" | "self" | "super")
                || self.tables.modules.contains(&name);
            if !is_module {
                break;
            }
            start += 1;
        }
        match segments[start..] {
            [ident] => self.resolve_single_value(ident, access),
            [owner, item] => self.resolve_assoc(owner, item),
            _ => {}
        }
    }

    fn resolve_single_value(&mut self, ident: &Ident, access: Access) {
        let name = ident.to_string();
        if let Some(id) = self.lookup_local(&name) {
            self.reference(id, ident.span(), access);
            return;
        }
        if name == "Self" || self.is_generic(&name) {
            return;
        }
        if let Some(&id) = self.tables.values.get(&name) {
            self.reference(id, ident.span(), access);
            return;
        }
        if self.tables.is_value(&name) || self.tables.external_glob {
            return;
        }
        self.report(
            Code::UnresolvedName,
            ident.span(),
            format!("cannot find value `{name}` in this scope"),
        );
    }

    fn resolve_assoc(&mut self, owner_ident: &Ident, item: &Ident) {
        let owner = if owner_ident == "Self" {
            match &self.self_ty {
                Some(owner) => owner.clone(),
                None => return,
            }
        } else {
            owner_ident.to_string()
        };
        if self.is_generic(&owner) || self.lookup_local(&owner).is_some() {
            return;
        }
        let name = item.to_string();
        let tables = self.tables;
        match tables.type_kind(&owner) {
            Some(TypeKind::Trait) => {
                match tables.traits.get(&owner).and_then(|info| info.item(&name)) {
                    Some(trait_item) => self.reference(trait_item.symbol, item.span(), Access::Read),
                    None => self.report(
                        Code::NoMember,
                        item.span(),
                        format!("cannot find method or associated constant `{name}` in trait `{owner}`"),
                    ),
                }
            }
            Some(_) => {
                let Some(nominal) = tables.nominal(&owner) else { return };
                match tables.assoc_item(&nominal, &name) {
                    Some(id) => self.reference(id, item.span(), Access::Read),
                    None if tables.implicit_member(&nominal, &name) => {}
                    None => self.report(
                        Code::NoMember,
                        item.span(),
                        format!("no function or associated item named `{name}` found for `{owner}`"),
                    ),
                }
            }
            None => self.check_type_name(owner_ident),
        }
    }

    fn check_type_name(&mut self, ident: &Ident) {
        let name = ident.to_string();
        let unknown = name.chars().next().is_some_and(char::is_uppercase)
            && name != "Self"
            && !self.is_generic(&name)
            && !self.tables.is_type(&name)
            && !self.tables.modules.contains(&name)
            && !CRATE_ROOTS.contains(&name.as_str())
            && !self.tables.external_glob;
        if unknown {
            self.report(
                Code::UnresolvedType,
                ident.span(),
                format!("cannot find type `{name}` in this scope"),
            );
        }
    }

    // =========================================================================
    // Members
    // =========================================================================

    fn resolve_field(&mut self, base: &Expr, member: &Member, access: Access) {
        let Member::Named(ident) = member else { return };
        let Some(owner) = self.nominal_of(base) else { return };
        let tables = self.tables;
        let name = ident.to_string();
        match tables.types.get(&owner).and_then(|info| info.fields.get(&name)) {
            Some(&id) => self.reference(id, ident.span(), access),
            None => {
                if !tables.impls.get(&owner).is_some_and(|impls| impls.opaque) {
                    self.report(
                        Code::NoField,
                        ident.span(),
                        format!("no field `{name}` on type `{owner}`"),
                    );
                }
            }
        }
    }

    fn resolve_method(&mut self, receiver: &Expr, method: &Ident) {
        let Some(owner) = self.nominal_of(receiver) else { return };
        let name = method.to_string();
        match self.tables.member_fn(&owner, &name) {
            Some(id) => self.reference(id, method.span(), Access::Read),
            None if self.tables.implicit_member(&owner, &name) => {}
            None => self.report(
                Code::NoMember,
                method.span(),
                format!("no method named `{name}` found for `{owner}`"),
            ),
        }
    }

    /// Struct a literal path names, if it is a struct of the compilation.
    fn literal_owner(&self, path: &syn::Path) -> Option<String> {
        let last = path.segments.last()?;
        let name = if last.ident == "Self" {
            self.self_ty.clone()?
        } else if path.segments.len() == 1
            || path.segments.iter().rev().skip(1).all(|segment| {
                let name = segment.ident.to_string();
                matches!(name.as_str(), "crate" | "self" | "super") || self.tables.modules.contains(&name)
            })
        {
            last.ident.to_string()
        } else {
            return None;
        };
        let nominal = self.tables.nominal(&name)?;
        matches!(
            self.tables.type_kind(&nominal),
            Some(TypeKind::Struct | TypeKind::Union)
        )
        .then_some(nominal)
    }

    /// Left-hand side of an assignment: plain locals and fields are writes.
    fn visit_target(&mut self, target: &Expr) {
        match target {
            Expr::Path(path) if path.qself.is_none() && path.path.segments.len() == 1 => {
                self.resolve_single_value(&path.path.segments[0].ident, Access::Write);
            }
            Expr::Field(field) => {
                self.visit_expr(&field.base);
                self.resolve_field(&field.base, &field.member, Access::Write);
            }
            Expr::Paren(paren) => self.visit_target(&paren.expr),
            Expr::Tuple(tuple) => {
                for elem in &tuple.elems {
                    self.visit_target(elem);
                }
            }
            _ => self.visit_expr(target),
        }
    }

    // =========================================================================
    // Macros
    // =========================================================================

    fn scan_tokens(&mut self, tokens: TokenStream) {
        for token in tokens {
            match token {
                TokenTree::Ident(ident) => {
                    if let Some(id) = self.lookup_local(&ident.to_string()) {
                        self.reference(id, ident.span(), Access::Read);
                    }
                }
                TokenTree::Group(group) => self.scan_tokens(group.stream()),
                _ => {}
            }
        }
    }
}

fn is_place(expr: &Expr, destructuring: bool) -> bool {
    match expr {
        Expr::Path(_) | Expr::Field(_) | Expr::Index(_) | Expr::Macro(_) => true,
        Expr::Unary(unary) => matches!(unary.op, UnOp::Deref(_)),
        Expr::Paren(paren) => is_place(&paren.expr, destructuring),
        Expr::Group(group) => is_place(&group.expr, destructuring),
        Expr::Infer(_) | Expr::Struct(_) | Expr::Call(_) => destructuring,
        Expr::Range(range) => destructuring && range.start.is_none() && range.end.is_none(),
        Expr::Tuple(tuple) => destructuring && tuple.elems.iter().all(|elem| is_place(elem, true)),
        Expr::Array(array) => destructuring && array.elems.iter().all(|elem| is_place(elem, true)),
        _ => false,
    }
}

fn is_compound(op: &BinOp) -> bool {
    matches!(
        op,
        BinOp::AddAssign(_)
            | BinOp::SubAssign(_)
            | BinOp::MulAssign(_)
            | BinOp::DivAssign(_)
            | BinOp::RemAssign(_)
            | BinOp::BitXorAssign(_)
            | BinOp::BitAndAssign(_)
            | BinOp::BitOrAssign(_)
            | BinOp::ShlAssign(_)
            | BinOp::ShrAssign(_)
    )
}

fn first_span(expr: &Expr) -> Span {
    expr.to_token_stream()
        .into_iter()
        .next()
        .map_or_else(Span::call_site, |token| token.span())
}

impl<'ast> Visit<'ast> for Resolver<'_> {
    fn visit_attribute(&mut self, _attr: &'ast syn::Attribute) {}

    fn visit_item_use(&mut self, _item: &'ast syn::ItemUse) {}

    fn visit_item_macro(&mut self, _item: &'ast syn::ItemMacro) {}

    fn visit_item_fn(&mut self, item: &'ast syn::ItemFn) {
        self.visit_fn(&item.sig, Some(&item.block));
    }

    fn visit_item_struct(&mut self, item: &'ast syn::ItemStruct) {
        self.with_generics(&item.generics, |this| this.visit_fields(&item.fields));
    }

    fn visit_item_enum(&mut self, item: &'ast syn::ItemEnum) {
        self.with_generics(&item.generics, |this| {
            for variant in &item.variants {
                this.visit_variant(variant);
            }
        });
    }

    fn visit_item_union(&mut self, item: &'ast syn::ItemUnion) {
        self.with_generics(&item.generics, |this| this.visit_fields_named(&item.fields));
    }

    fn visit_item_type(&mut self, item: &'ast syn::ItemType) {
        self.with_generics(&item.generics, |this| this.visit_type(&item.ty));
    }

    fn visit_item_impl(&mut self, item: &'ast syn::ItemImpl) {
        let saved = self.self_ty.take();
        self.with_generics(&item.generics, |this| {
            this.visit_type(&item.self_ty);
            if let Some((_, path, _)) = &item.trait_ {
                this.visit_path(path);
            }
            this.self_ty = type_name(peel(&item.self_ty)).filter(|name| !this.is_generic(name));
            for impl_item in &item.items {
                this.visit_impl_item(impl_item);
            }
        });
        self.self_ty = saved;
    }

    fn visit_impl_item_fn(&mut self, item: &'ast syn::ImplItemFn) {
        self.visit_fn(&item.sig, Some(&item.block));
    }

    fn visit_item_trait(&mut self, item: &'ast syn::ItemTrait) {
        let saved = self.self_ty.take();
        self.with_generics(&item.generics, |this| {
            for bound in &item.supertraits {
                this.visit_type_param_bound(bound);
            }
            for trait_item in &item.items {
                this.visit_trait_item(trait_item);
            }
        });
        self.self_ty = saved;
    }

    fn visit_trait_item_fn(&mut self, item: &'ast syn::TraitItemFn) {
        self.visit_fn(&item.sig, item.default.as_ref());
    }

    fn visit_type_path(&mut self, path: &'ast syn::TypePath) {
        if path.qself.is_none() && path.path.leading_colon.is_none() && path.path.segments.len() == 1 {
            let ident = &path.path.segments[0].ident;
            let name = ident.to_string();
            if !name.chars().next().is_some_and(char::is_uppercase) {
                // Lowercase single segments are primitives or nothing rustc would accept either.
                if !symbols::PRIMITIVES.contains(&name.as_str()) && !self.is_generic(&name) {
                    self.check_type_name(ident);
                }
            } else {
                self.check_type_name(ident);
            }
        }
        visit::visit_type_path(self, path);
    }

    fn visit_block(&mut self, block: &'ast Block) {
        self.push_scope();
        for stmt in &block.stmts {
            self.visit_stmt(stmt);
        }
        self.pop_scope();
    }

    fn visit_local(&mut self, local: &'ast syn::Local) {
        let mut inferred = None;
        if let Some(init) = &local.init {
            self.visit_expr(&init.expr);
            if let Some((_, diverge)) = &init.diverge {
                self.visit_expr(diverge);
            }
            inferred = infer_type(&*self, &init.expr);
        }
        self.bind_pat(&local.pat, inferred, Binding::Let);
    }

    fn visit_expr_path(&mut self, expr: &'ast syn::ExprPath) {
        self.resolve_value_path(expr.qself.is_some(), &expr.path, Access::Read);
        if let Some(qself) = &expr.qself {
            self.visit_type(&qself.ty);
        }
        for segment in &expr.path.segments {
            self.visit_path_arguments(&segment.arguments);
        }
    }

    fn visit_expr_closure(&mut self, expr: &'ast syn::ExprClosure) {
        self.push_scope();
        for input in &expr.inputs {
            self.bind_pat(input, None, Binding::Param);
        }
        if let ReturnType::Type(_, ty) = &expr.output {
            self.visit_type(ty);
        }
        self.visit_expr(&expr.body);
        self.pop_scope();
    }

    fn visit_expr_if(&mut self, expr: &'ast syn::ExprIf) {
        self.push_scope();
        self.visit_expr(&expr.cond);
        self.visit_block(&expr.then_branch);
        self.pop_scope();
        if let Some((_, otherwise)) = &expr.else_branch {
            self.visit_expr(otherwise);
        }
    }

    fn visit_expr_let(&mut self, expr: &'ast syn::ExprLet) {
        self.visit_expr(&expr.expr);
        self.bind_pat(&expr.pat, None, Binding::Pattern);
    }

    fn visit_expr_while(&mut self, expr: &'ast syn::ExprWhile) {
        self.push_scope();
        self.visit_expr(&expr.cond);
        self.visit_block(&expr.body);
        self.pop_scope();
    }

    fn visit_expr_for_loop(&mut self, expr: &'ast syn::ExprForLoop) {
        self.visit_expr(&expr.expr);
        self.push_scope();
        self.bind_pat(&expr.pat, None, Binding::Pattern);
        self.visit_block(&expr.body);
        self.pop_scope();
    }

    fn visit_arm(&mut self, arm: &'ast syn::Arm) {
        self.push_scope();
        self.bind_pat(&arm.pat, None, Binding::Pattern);
        if let Some((_, guard)) = &arm.guard {
            self.visit_expr(guard);
        }
        self.visit_expr(&arm.body);
        self.pop_scope();
    }

    fn visit_expr_field(&mut self, expr: &'ast syn::ExprField) {
        self.visit_expr(&expr.base);
        self.resolve_field(&expr.base, &expr.member, Access::Read);
    }

    fn visit_expr_method_call(&mut self, expr: &'ast syn::ExprMethodCall) {
        self.visit_expr(&expr.receiver);
        self.resolve_method(&expr.receiver, &expr.method);
        if let Some(turbofish) = &expr.turbofish {
            self.visit_angle_bracketed_generic_arguments(turbofish);
        }
        for arg in &expr.args {
            self.visit_expr(arg);
        }
    }

    fn visit_expr_struct(&mut self, expr: &'ast syn::ExprStruct) {
        if expr.qself.is_none() && expr.path.segments.len() == 1 {
            self.check_type_name(&expr.path.segments[0].ident);
        }
        let owner = self.literal_owner(&expr.path);
        for field in &expr.fields {
            if let (Some(owner), Member::Named(ident)) = (&owner, &field.member) {
                let name = ident.to_string();
                match self.tables.types.get(owner).and_then(|info| info.fields.get(&name)) {
                    Some(&id) => {
                        let at = Location::of(ident.span());
                        self.references.push(Reference {
                            symbol: id,
                            at,
                            access: Access::Init,
                        });
                        if field.colon_token.is_some() {
                            self.by_location.insert(at, id);
                        }
                    }
                    None => self.report(
                        Code::UnknownLiteralField,
                        ident.span(),
                        format!("struct `{owner}` has no field named `{name}`"),
                    ),
                }
            }
            self.visit_expr(&field.expr);
        }
        if let Some(rest) = &expr.rest {
            self.visit_expr(rest);
        }
    }

    fn visit_expr_assign(&mut self, expr: &'ast syn::ExprAssign) {
        if !is_place(&expr.left, true) {
            self.report(
                Code::InvalidAssign,
                first_span(&expr.left),
                "invalid left-hand side of assignment".to_string(),
            );
        }
        self.visit_target(&expr.left);
        self.visit_expr(&expr.right);
    }

    fn visit_expr_binary(&mut self, expr: &'ast syn::ExprBinary) {
        if !is_compound(&expr.op) {
            visit::visit_expr_binary(self, expr);
            return;
        }
        if !is_place(&expr.left, false) {
            self.report(
                Code::InvalidCompoundAssign,
                first_span(&expr.left),
                "invalid left-hand side of compound assignment".to_string(),
            );
        }
        self.visit_target(&expr.left);
        self.visit_expr(&expr.right);
    }

    fn visit_macro(&mut self, mac: &'ast Macro) {
        match macros::parse_body(mac) {
            Some(body) => {
                for expr in body.exprs() {
                    self.visit_expr(expr);
                }
                for (name, span) in macros::format_captures(mac, &body) {
                    if let Some(id) = self.lookup_local(&name) {
                        self.references.push(Reference {
                            symbol: id,
                            at: Location::of(span),
                            access: Access::Read,
                        });
                    }
                }
            }
            None => self.scan_tokens(mac.tokens.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::front::{Code, Compilation, SourceText, SymbolKind};

    fn bind(template: &str, context: &[&str]) -> crate::front::SemanticModel {
        let mut sources = vec![SourceText::new("template", template)];
        for (i, text) in context.iter().enumerate() {
            sources.push(SourceText::new(format!("context{i}"), *text));
        }
        Compilation::from_sources(&sources).unwrap().bind("template").unwrap()
    }

    fn codes(model: &crate::front::SemanticModel) -> Vec<&'static str> {
        model.diagnostics().iter().map(|diag| diag.code.as_str()).collect()
    }

    #[test]
    fn test_clean_template_has_no_errors() {
        let model = bind(
            r#"
            use std::collections::HashMap;

            pub struct Tree<K, V> {
                nodes: Vec<Node<K, V>>,
                index: HashMap<usize, usize>,
                count: usize,
            }

            struct Node<K, V> {
                key: K,
                value: V,
            }

            impl<K: Ord, V> Tree<K, V> {
                pub fn new() -> Self {
                    Tree { nodes: Vec::new(), index: HashMap::new(), count: 0 }
                }

                pub fn len(&self) -> usize {
                    let total = self.count;
                    total
                }

                fn key_at(&self, i: usize) -> &K {
                    &self.nodes[i].key
                }

                pub fn first(&self) -> Option<&V> {
                    match self.nodes.first() {
                        Some(node) => Some(&node.value),
                        None => None,
                    }
                }
            }
            "#,
            &[],
        );
        assert_eq!(model.errors().count(), 0, "{:?}", model.diagnostics());
    }

    #[test]
    fn test_removed_members_are_reported() {
        let model = bind(
            r#"
            struct Tree { count: usize }
            impl Tree {
                fn grow(&mut self) {
                    self.count += 1;
                    self.rank += 1;
                    self.rebalance();
                    let weight = missing;
                    println!("{}", weight);
                }
            }
            "#,
            &[],
        );
        assert_eq!(codes(&model), ["E0609", "E0599", "E0425"]);
    }

    #[test]
    fn test_parameters_carry_declared_types() {
        let model = bind(
            r#"
            struct Tree { len: usize }
            impl Tree {
                fn copy_from(&mut self, other: &Self, extra: Missing) {
                    self.len = other.len;
                    let _rank = other.rank;
                    other.rebalance();
                }
            }
            "#,
            &[],
        );
        assert_eq!(codes(&model), ["E0412", "E0609", "E0599"]);
        let other = model
            .symbols()
            .find(|(_, symbol)| symbol.name == "other")
            .map(|(_, symbol)| symbol.ty.as_ref().map(crate::front::type_text));
        assert_eq!(other, Some(Some("& Tree".to_string())));
    }

    #[test]
    fn test_unused_and_shadowed_locals() {
        let model = bind(
            r#"
            fn run() -> u32 {
                let unused = 1;
                let mut written = 2;
                written += 1;
                let _ignored = 3;
                let value = 4;
                let value = value + 1;
                value
            }
            "#,
            &[],
        );
        let warned: Vec<&str> = model
            .warnings()
            .map(|diag| diag.message.as_str())
            .collect();
        assert_eq!(warned, ["unused variable: `unused`", "unused variable: `written`"]);
        assert!(model
            .symbols()
            .any(|(_, symbol)| symbol.name == "value" && symbol.kind == SymbolKind::Local { mutable: false }));
    }

    #[test]
    fn test_missing_trait_items_and_context_traits() {
        let contract = r#"
            /// Ordered map contract.
            pub trait OrderedMap {
                fn len(&self) -> usize;
                fn is_empty(&self) -> bool { self.len() == 0 }
                fn clear(&mut self);
            }
        "#;
        let model = bind(
            r#"
            struct Map;
            impl OrderedMap for Map {
                fn len(&self) -> usize { 0 }
            }
            fn check(map: Map) -> bool { map.is_empty() }
            "#,
            &[contract],
        );
        assert_eq!(codes(&model), ["E0046"]);
        assert!(model.diagnostics()[0].message.contains("clear"));
        assert!(model.trait_info("OrderedMap").is_some());
    }

    #[test]
    fn test_duplicates_and_literal_fields() {
        let model = bind(
            r#"
            struct Pair { a: u8, a: u8 }
            struct Pair;
            impl Pair {
                fn make() -> Pair { Pair { a: 1, b: 2 } }
            }
            "#,
            &[],
        );
        let found = codes(&model);
        for code in ["E0124", "E0428", "E0560"] {
            assert!(found.contains(&code), "{code} missing from {found:?}");
        }
    }

    #[test]
    fn test_invalid_assignment_targets() {
        let model = bind(
            r#"
            fn run(x: u32) {
                true = false;
                1 += x;
            }
            "#,
            &[],
        );
        assert_eq!(codes(&model), ["E0070", "E0067"]);
    }

    #[test]
    fn test_constants_are_evaluated() {
        let model = bind(
            r#"
            const BASE: u32 = 4;
            const DOUBLE: u32 = BASE * 2;
            struct S;
            impl S {
                const ENABLED: bool = DOUBLE > 7;
                fn enabled() -> bool { Self::ENABLED }
            }
            "#,
            &[],
        );
        let enabled = model
            .symbols()
            .find(|(_, symbol)| symbol.name == "ENABLED")
            .map(|(_, symbol)| symbol.constant.clone());
        assert_eq!(enabled, Some(Some(crate::front::ConstValue::Bool(true))));
        assert_eq!(model.errors().count(), 0);
    }

    #[test]
    fn test_pattern_constants_are_not_bindings() {
        let model = bind(
            r#"
            const LIMIT: u32 = 3;
            fn classify(n: u32) -> u32 {
                match n {
                    LIMIT => 1,
                    other => other,
                }
            }
            "#,
            &[],
        );
        assert_eq!(model.diagnostics().len(), 0, "{:?}", model.diagnostics());
        assert!(!model.symbols().any(|(_, symbol)| symbol.name == "LIMIT" && symbol.is_local()));
    }

    #[test]
    fn test_unknown_types() {
        let model = bind("struct Holder { inner: Missing, fine: Vec<u8> }", &[]);
        assert_eq!(codes(&model), ["E0412"]);
        assert_eq!(model.diagnostics()[0].code, Code::UnresolvedType);
    }
}
