//! Declarations and the semantic model.
//!
//! Binding is two-phase. [`collect`] flattens the declarations of every unit into global
//! tables (types, values, impls, traits); the resolver in `binder` then walks the focus unit
//! with scopes, recording a [`Reference`] for every resolved identifier.
//!
//! Module paths are flattened: `crate::a::B` and `B` name the same declaration. The units of
//! one compilation are expected to declare each type once.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use quote::ToTokens;
use syn::{
    fold::Fold, punctuated::Punctuated, visit::Visit, Attribute, Expr, Fields, Ident, Item,
    ReturnType, Token, Type,
};

use super::consteval::{self, ConstValue};
use super::diagnostic::{Code, Diagnostic, Location};
use super::{Compilation, Tree};
use crate::facet::{self, ConstantTag};

pub type SymbolId = usize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SymbolKind {
    /// `let` binding.
    Local { mutable: bool },
    /// Pattern binding in a `match` arm, `for` loop or `if let`.
    Binding,
    Param,
    Field { owner: String },
    Method { owner: String },
    AssocConst { owner: String },
    AssocType { owner: String },
    Variant { owner: String },
    Const,
    Static,
    Function,
    Type,
    Trait,
}

#[derive(Clone, Debug)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Unit the symbol is declared in.
    pub unit: String,
    pub decl: Location,
    /// Declared type; the return type for functions and methods.
    pub ty: Option<Type>,
    pub constant: Option<ConstValue>,
    pub pin: Option<ConstantTag>,
    pub indirection: bool,
    /// Inputs of functions and methods, receiver included.
    pub arity: Option<usize>,
}

impl Symbol {
    fn new(name: &Ident, kind: SymbolKind, unit: &str) -> Self {
        Symbol {
            name: name.to_string(),
            kind,
            unit: unit.to_string(),
            decl: Location::of(name.span()),
            ty: None,
            constant: None,
            pin: None,
            indirection: false,
            arity: None,
        }
    }

    pub fn owner(&self) -> Option<&str> {
        match &self.kind {
            SymbolKind::Field { owner }
            | SymbolKind::Method { owner }
            | SymbolKind::AssocConst { owner }
            | SymbolKind::AssocType { owner }
            | SymbolKind::Variant { owner } => Some(owner),
            _ => None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.kind, SymbolKind::Local { .. } | SymbolKind::Binding)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Access {
    Read,
    Write,
    /// Field initializer in a struct literal.
    Init,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Reference {
    pub symbol: SymbolId,
    pub at: Location,
    pub access: Access,
}

// =============================================================================
// Declaration tables
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum TypeKind {
    Struct,
    Enum,
    Union,
    Alias,
    Trait,
}

#[derive(Clone, Debug)]
pub(crate) struct TypeInfo {
    pub symbol: SymbolId,
    pub kind: TypeKind,
    pub fields: BTreeMap<String, SymbolId>,
    pub tuple_arity: Option<usize>,
    pub variants: BTreeMap<String, SymbolId>,
    pub derives: BTreeSet<String>,
    pub alias_of: Option<Type>,
}

/// Everything implemented for one type name.
#[derive(Clone, Debug, Default)]
pub(crate) struct ImplSet {
    pub methods: BTreeMap<String, SymbolId>,
    pub consts: BTreeMap<String, SymbolId>,
    pub trait_items: BTreeMap<String, SymbolId>,
    pub traits: BTreeSet<String>,
    /// Implements `Deref` or a trait outside the compilation: member lookups can't fail.
    pub opaque: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TraitItemKind {
    Method { inputs: usize, has_default: bool },
    Const { has_default: bool },
    Type { has_default: bool },
}

#[derive(Clone, Debug)]
pub struct TraitItemInfo {
    pub name: String,
    pub kind: TraitItemKind,
    pub docs: Vec<Attribute>,
    pub symbol: SymbolId,
}

impl TraitItemInfo {
    pub fn is_required(&self) -> bool {
        match self.kind {
            TraitItemKind::Method { has_default, .. }
            | TraitItemKind::Const { has_default }
            | TraitItemKind::Type { has_default } => !has_default,
        }
    }
}

#[derive(Clone, Debug)]
pub struct TraitInfo {
    pub name: String,
    pub symbol: SymbolId,
    pub docs: Vec<Attribute>,
    pub items: Vec<TraitItemInfo>,
}

impl TraitInfo {
    pub fn item(&self, name: &str) -> Option<&TraitItemInfo> {
        self.items.iter().find(|item| item.name == name)
    }
}

#[derive(Clone, Debug, Default)]
pub(crate) struct Tables {
    pub symbols: Vec<Symbol>,
    pub types: HashMap<String, TypeInfo>,
    pub impls: HashMap<String, ImplSet>,
    pub traits: HashMap<String, TraitInfo>,
    pub values: HashMap<String, SymbolId>,
    pub modules: HashSet<String>,
    /// Names brought in by `use`, in either namespace.
    pub imports: HashSet<String>,
    /// Enums whose variants are glob-imported.
    pub glob_enums: BTreeSet<String>,
    /// Traits with an `impl<T> Trait for T` blanket impl.
    pub blanket_traits: BTreeSet<String>,
    /// The focus unit glob-imports from outside the compilation; unknown names can't be judged.
    pub external_glob: bool,
    /// Declaration sites of the focus unit.
    pub focus_decls: HashMap<Location, SymbolId>,
}

impl Tables {
    fn push(&mut self, symbol: Symbol, focus: bool) -> SymbolId {
        let id = self.symbols.len();
        if focus {
            self.focus_decls.insert(symbol.decl, id);
        }
        self.symbols.push(symbol);
        id
    }

    pub fn type_kind(&self, name: &str) -> Option<TypeKind> {
        self.types.get(name).map(|info| info.kind)
    }

    /// Follows type aliases to a struct, enum or union name.
    pub fn nominal(&self, name: &str) -> Option<String> {
        let mut current = name.to_string();
        for _ in 0..8 {
            let info = self.types.get(&current)?;
            match info.kind {
                TypeKind::Struct | TypeKind::Enum | TypeKind::Union => return Some(current),
                TypeKind::Alias => current = type_name(peel(info.alias_of.as_ref()?))?,
                TypeKind::Trait => return None,
            }
        }
        None
    }

    /// Inherent item first, then trait items.
    pub fn member_fn(&self, owner: &str, name: &str) -> Option<SymbolId> {
        let impls = self.impls.get(owner)?;
        impls
            .methods
            .get(name)
            .or_else(|| impls.trait_items.get(name))
            .copied()
    }

    pub fn assoc_item(&self, owner: &str, name: &str) -> Option<SymbolId> {
        if let Some(variant) = self.types.get(owner).and_then(|info| info.variants.get(name)) {
            return Some(*variant);
        }
        let impls = self.impls.get(owner)?;
        impls
            .methods
            .get(name)
            .or_else(|| impls.consts.get(name))
            .or_else(|| impls.trait_items.get(name))
            .copied()
    }

    /// Methods a type gets without declaring them: derives, blanket impls, universal impls.
    pub fn implicit_member(&self, owner: &str, name: &str) -> bool {
        if UNIVERSAL_METHODS.contains(&name) {
            return true;
        }
        if let Some(info) = self.types.get(owner) {
            let derived = info.derives.iter().any(|derive| {
                DERIVED_METHODS
                    .iter()
                    .any(|(trait_name, methods)| derive == trait_name && methods.contains(&name))
            });
            if derived {
                return true;
            }
        }
        if self.impls.get(owner).is_some_and(|impls| impls.opaque) {
            return true;
        }
        self.blanket_traits.iter().any(|trait_name| {
            self.traits
                .get(trait_name)
                .is_some_and(|info| info.item(name).is_some())
        })
    }

    pub fn is_value(&self, name: &str) -> bool {
        self.values.contains_key(name)
            || self.imports.contains(name)
            || PRELUDE_VALUES.contains(&name)
            || self.glob_enums.iter().any(|owner| {
                self.types
                    .get(owner)
                    .is_some_and(|info| info.variants.contains_key(name))
            })
    }

    pub fn is_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
            || self.imports.contains(name)
            || PRIMITIVES.contains(&name)
            || PRELUDE_TYPES.contains(&name)
    }
}

pub(crate) const PRIMITIVES: &[&str] = &[
    "bool", "char", "str", "u8", "u16", "u32", "u64", "u128", "usize", "i8", "i16", "i32", "i64",
    "i128", "isize", "f32", "f64",
];

pub(crate) const PRELUDE_TYPES: &[&str] = &[
    "String", "Vec", "Option", "Result", "Box", "Copy", "Clone", "Send", "Sync", "Sized", "Unpin",
    "Drop", "Fn", "FnMut", "FnOnce", "Default", "Eq", "PartialEq", "Ord", "PartialOrd",
    "Iterator", "IntoIterator", "DoubleEndedIterator", "ExactSizeIterator", "Extend",
    "FromIterator", "From", "Into", "TryFrom", "TryInto", "AsRef", "AsMut", "ToOwned",
    "ToString",
];

pub(crate) const PRELUDE_VALUES: &[&str] = &["Some", "None", "Ok", "Err", "drop"];

/// Path roots that name crates rather than items.
pub(crate) const CRATE_ROOTS: &[&str] = &["std", "core", "alloc"];

const UNIVERSAL_METHODS: &[&str] = &[
    "into", "try_into", "borrow", "borrow_mut", "to_owned", "to_string", "type_id", "as_ref",
    "as_mut", "from", "try_from",
];

const DERIVED_METHODS: &[(&str, &[&str])] = &[
    ("Clone", &["clone", "clone_from"]),
    ("PartialEq", &["eq", "ne"]),
    ("PartialOrd", &["partial_cmp", "lt", "le", "gt", "ge"]),
    ("Ord", &["cmp", "max", "min", "clamp"]),
    ("Hash", &["hash"]),
    ("Debug", &["fmt"]),
    ("Default", &["default"]),
];

// =============================================================================
// Collection
// =============================================================================

/// Builds the declaration tables of `compilation`, focus unit first so its declarations win.
pub(crate) fn collect(compilation: &Compilation, focus: &Tree) -> (Tables, Vec<Diagnostic>) {
    let mut tables = Tables::default();
    let mut pending = Vec::new();
    let mut const_inits = Vec::new();

    let units = std::iter::once(focus).chain(compilation.units().filter(|unit| unit.name != focus.name));
    for unit in units {
        let is_focus = unit.name == focus.name;
        let mut collector = Collector {
            tables: &mut tables,
            unit: &unit.name,
            focus: is_focus,
            impls: &mut pending,
            const_inits: &mut const_inits,
        };
        collector.visit_file(&unit.file);
    }

    let mut diagnostics = Vec::new();
    for (impl_item, unit, is_focus) in &pending {
        register_impl(
            &mut tables,
            impl_item,
            unit,
            *is_focus,
            &mut const_inits,
            &mut diagnostics,
        );
    }
    check_duplicate_impl_items(&tables, &pending, &mut diagnostics);
    evaluate_consts(&mut tables, &const_inits);
    check_duplicates(&focus.file.items, &mut diagnostics);

    (tables, diagnostics)
}

pub(crate) fn declares_type(items: &[Item], name: &str) -> bool {
    items.iter().any(|item| match item {
        Item::Struct(s) => s.ident == name,
        Item::Enum(e) => e.ident == name,
        Item::Union(u) => u.ident == name,
        Item::Type(t) => t.ident == name,
        Item::Trait(t) => t.ident == name,
        Item::Mod(m) => m
            .content
            .as_ref()
            .is_some_and(|(_, items)| declares_type(items, name)),
        _ => false,
    })
}

struct ConstInit {
    symbol: SymbolId,
    owner: Option<String>,
    expr: Expr,
}

struct Collector<'a> {
    tables: &'a mut Tables,
    unit: &'a str,
    focus: bool,
    impls: &'a mut Vec<(syn::ItemImpl, String, bool)>,
    const_inits: &'a mut Vec<ConstInit>,
}

impl Collector<'_> {
    fn declare(&mut self, ident: &Ident, kind: SymbolKind) -> SymbolId {
        let symbol = Symbol::new(ident, kind, self.unit);
        self.tables.push(symbol, self.focus)
    }

    fn declare_type(&mut self, ident: &Ident, kind: TypeKind, attrs: &[Attribute]) -> SymbolId {
        let symbol_kind = if kind == TypeKind::Trait {
            SymbolKind::Trait
        } else {
            SymbolKind::Type
        };
        let symbol = self.declare(ident, symbol_kind);
        self.tables.types.entry(ident.to_string()).or_insert(TypeInfo {
            symbol,
            kind,
            fields: BTreeMap::new(),
            tuple_arity: None,
            variants: BTreeMap::new(),
            derives: derives(attrs),
            alias_of: None,
        });
        symbol
    }

    fn declare_value(&mut self, ident: &Ident, symbol: SymbolId) {
        self.tables.values.entry(ident.to_string()).or_insert(symbol);
    }

    fn declare_fields(&mut self, owner: &Ident, fields: &Fields) {
        let name = owner.to_string();
        match fields {
            Fields::Named(named) => {
                for field in &named.named {
                    let Some(ident) = &field.ident else { continue };
                    let id = self.declare(ident, SymbolKind::Field { owner: name.clone() });
                    let symbol = &mut self.tables.symbols[id];
                    symbol.ty = Some(field.ty.clone());
                    symbol.pin = facet::constant_tag(&field.attrs);
                    symbol.indirection = facet::has_marker(&field.attrs, facet::INDIRECTION);
                    if let Some(info) = self.tables.types.get_mut(&name) {
                        info.fields.entry(ident.to_string()).or_insert(id);
                    }
                }
            }
            Fields::Unnamed(unnamed) => {
                if let Some(info) = self.tables.types.get_mut(&name) {
                    info.tuple_arity.get_or_insert(unnamed.unnamed.len());
                }
            }
            Fields::Unit => {}
        }
    }

    fn collect_use(&mut self, tree: &syn::UseTree, prefix: &mut Vec<String>) {
        match tree {
            syn::UseTree::Path(path) => {
                prefix.push(path.ident.to_string());
                self.collect_use(&path.tree, prefix);
                prefix.pop();
            }
            syn::UseTree::Name(name) if name.ident == "self" => {
                if let Some(last) = prefix.last() {
                    self.tables.imports.insert(last.clone());
                }
            }
            syn::UseTree::Name(name) => {
                self.tables.imports.insert(name.ident.to_string());
            }
            syn::UseTree::Rename(rename) => {
                self.tables.imports.insert(rename.rename.to_string());
            }
            syn::UseTree::Glob(_) => {
                let internal = prefix
                    .first()
                    .is_some_and(|root| matches!(root.as_str(), "crate" | "self" | "super"));
                match prefix.last() {
                    Some(last) if last.chars().next().is_some_and(char::is_uppercase) => {
                        self.tables.glob_enums.insert(last.clone());
                    }
                    _ if internal => {}
                    _ => {
                        if self.focus {
                            self.tables.external_glob = true;
                        }
                    }
                }
            }
            syn::UseTree::Group(group) => {
                for item in &group.items {
                    self.collect_use(item, prefix);
                }
            }
        }
    }
}

impl<'ast> Visit<'ast> for Collector<'_> {
    fn visit_item_struct(&mut self, item: &'ast syn::ItemStruct) {
        let id = self.declare_type(&item.ident, TypeKind::Struct, &item.attrs);
        if !matches!(item.fields, Fields::Named(_)) {
            self.declare_value(&item.ident, id);
        }
        self.declare_fields(&item.ident, &item.fields);
    }

    fn visit_item_union(&mut self, item: &'ast syn::ItemUnion) {
        self.declare_type(&item.ident, TypeKind::Union, &item.attrs);
        let fields = Fields::Named(item.fields.clone());
        self.declare_fields(&item.ident, &fields);
    }

    fn visit_item_enum(&mut self, item: &'ast syn::ItemEnum) {
        self.declare_type(&item.ident, TypeKind::Enum, &item.attrs);
        let owner = item.ident.to_string();
        for variant in &item.variants {
            let id = self.declare(&variant.ident, SymbolKind::Variant { owner: owner.clone() });
            if let Some(info) = self.tables.types.get_mut(&owner) {
                info.variants.entry(variant.ident.to_string()).or_insert(id);
            }
        }
    }

    fn visit_item_type(&mut self, item: &'ast syn::ItemType) {
        let id = self.declare_type(&item.ident, TypeKind::Alias, &item.attrs);
        self.tables.symbols[id].ty = Some((*item.ty).clone());
        if let Some(info) = self.tables.types.get_mut(&item.ident.to_string()) {
            if info.symbol == id {
                info.alias_of = Some((*item.ty).clone());
            }
        }
    }

    fn visit_item_trait(&mut self, item: &'ast syn::ItemTrait) {
        let symbol = self.declare_type(&item.ident, TypeKind::Trait, &item.attrs);
        let owner = item.ident.to_string();
        let mut items = Vec::new();
        for trait_item in &item.items {
            let (ident, kind, attrs, ty) = match trait_item {
                syn::TraitItem::Fn(f) => (
                    &f.sig.ident,
                    TraitItemKind::Method {
                        inputs: f.sig.inputs.len(),
                        has_default: f.default.is_some(),
                    },
                    &f.attrs,
                    return_type(&f.sig.output),
                ),
                syn::TraitItem::Const(c) => (
                    &c.ident,
                    TraitItemKind::Const {
                        has_default: c.default.is_some(),
                    },
                    &c.attrs,
                    Some(c.ty.clone()),
                ),
                syn::TraitItem::Type(t) => (
                    &t.ident,
                    TraitItemKind::Type {
                        has_default: t.default.is_some(),
                    },
                    &t.attrs,
                    None,
                ),
                _ => continue,
            };
            let symbol_kind = match kind {
                TraitItemKind::Method { .. } => SymbolKind::Method { owner: owner.clone() },
                TraitItemKind::Const { .. } => SymbolKind::AssocConst { owner: owner.clone() },
                TraitItemKind::Type { .. } => SymbolKind::AssocType { owner: owner.clone() },
            };
            let id = self.declare(ident, symbol_kind);
            let symbol = &mut self.tables.symbols[id];
            symbol.ty = ty;
            if let TraitItemKind::Method { inputs, .. } = kind {
                symbol.arity = Some(inputs);
            }
            items.push(TraitItemInfo {
                name: ident.to_string(),
                kind,
                docs: doc_attrs(attrs),
                symbol: id,
            });
        }
        self.tables.traits.entry(owner.clone()).or_insert(TraitInfo {
            name: owner,
            symbol,
            docs: doc_attrs(&item.attrs),
            items,
        });
        syn::visit::visit_item_trait(self, item);
    }

    fn visit_item_fn(&mut self, item: &'ast syn::ItemFn) {
        let id = self.declare(&item.sig.ident, SymbolKind::Function);
        let symbol = &mut self.tables.symbols[id];
        symbol.ty = return_type(&item.sig.output);
        symbol.arity = Some(item.sig.inputs.len());
        self.declare_value(&item.sig.ident, id);
        syn::visit::visit_item_fn(self, item);
    }

    fn visit_item_const(&mut self, item: &'ast syn::ItemConst) {
        let id = self.declare(&item.ident, SymbolKind::Const);
        let symbol = &mut self.tables.symbols[id];
        symbol.ty = Some((*item.ty).clone());
        symbol.pin = facet::constant_tag(&item.attrs);
        symbol.indirection = facet::has_marker(&item.attrs, facet::INDIRECTION);
        if symbol.pin.is_none() {
            self.const_inits.push(ConstInit {
                symbol: id,
                owner: None,
                expr: (*item.expr).clone(),
            });
        }
        self.declare_value(&item.ident, id);
        syn::visit::visit_item_const(self, item);
    }

    fn visit_item_static(&mut self, item: &'ast syn::ItemStatic) {
        let id = self.declare(&item.ident, SymbolKind::Static);
        let symbol = &mut self.tables.symbols[id];
        symbol.ty = Some((*item.ty).clone());
        symbol.indirection = facet::has_marker(&item.attrs, facet::INDIRECTION);
        self.declare_value(&item.ident, id);
        syn::visit::visit_item_static(self, item);
    }

    fn visit_item_mod(&mut self, item: &'ast syn::ItemMod) {
        self.tables.modules.insert(item.ident.to_string());
        syn::visit::visit_item_mod(self, item);
    }

    fn visit_item_use(&mut self, item: &'ast syn::ItemUse) {
        self.collect_use(&item.tree, &mut Vec::new());
    }

    fn visit_item_impl(&mut self, item: &'ast syn::ItemImpl) {
        self.impls.push((item.clone(), self.unit.to_string(), self.focus));
        syn::visit::visit_item_impl(self, item);
    }

    fn visit_item_macro(&mut self, _item: &'ast syn::ItemMacro) {}
}

fn register_impl(
    tables: &mut Tables,
    item: &syn::ItemImpl,
    unit: &str,
    focus: bool,
    const_inits: &mut Vec<ConstInit>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let generics: HashSet<String> = item
        .generics
        .type_params()
        .map(|param| param.ident.to_string())
        .collect();
    let trait_name = item
        .trait_
        .as_ref()
        .and_then(|(_, path, _)| path.segments.last())
        .map(|segment| segment.ident.to_string());

    let Some(owner) = type_name(peel(&item.self_ty)) else {
        return;
    };
    if generics.contains(&owner) {
        if let Some(trait_name) = trait_name {
            tables.blanket_traits.insert(trait_name);
        }
        return;
    }

    let mut declared = Vec::new();
    for impl_item in &item.items {
        let (ident, kind, ty, arity, pin) = match impl_item {
            syn::ImplItem::Fn(f) => (
                &f.sig.ident,
                SymbolKind::Method { owner: owner.clone() },
                return_type(&f.sig.output),
                Some(f.sig.inputs.len()),
                facet::constant_tag(&f.attrs),
            ),
            syn::ImplItem::Const(c) => (
                &c.ident,
                SymbolKind::AssocConst { owner: owner.clone() },
                Some(c.ty.clone()),
                None,
                facet::constant_tag(&c.attrs),
            ),
            syn::ImplItem::Type(t) => (
                &t.ident,
                SymbolKind::AssocType { owner: owner.clone() },
                Some(t.ty.clone()),
                None,
                None,
            ),
            _ => continue,
        };
        let mut symbol = Symbol::new(ident, kind, unit);
        symbol.ty = ty;
        symbol.arity = arity;
        symbol.pin = pin;
        let is_const = matches!(symbol.kind, SymbolKind::AssocConst { .. });
        let id = tables.push(symbol, focus);
        if let syn::ImplItem::Const(c) = impl_item {
            if tables.symbols[id].pin.is_none() {
                const_inits.push(ConstInit {
                    symbol: id,
                    owner: Some(owner.clone()),
                    expr: c.expr.clone(),
                });
            }
        }
        declared.push((ident.to_string(), id, is_const));
    }

    let trait_info = trait_name.as_ref().and_then(|name| tables.traits.get(name).cloned());
    let impls = tables.impls.entry(owner.clone()).or_default();
    match &trait_name {
        None => {
            for (name, id, is_const) in declared {
                let table = if is_const { &mut impls.consts } else { &mut impls.methods };
                table.entry(name).or_insert(id);
            }
        }
        Some(trait_name) => {
            impls.traits.insert(trait_name.clone());
            if trait_name == "Deref" || trait_info.is_none() {
                impls.opaque = true;
            }
            for (name, id, _) in &declared {
                impls.trait_items.entry(name.clone()).or_insert(*id);
            }
            if let Some(info) = &trait_info {
                for trait_item in &info.items {
                    impls
                        .trait_items
                        .entry(trait_item.name.clone())
                        .or_insert(trait_item.symbol);
                }
                if focus {
                    let missing: Vec<&str> = info
                        .items
                        .iter()
                        .filter(|trait_item| trait_item.is_required())
                        .filter(|trait_item| !declared.iter().any(|(name, _, _)| *name == trait_item.name))
                        .map(|trait_item| trait_item.name.as_str())
                        .collect();
                    if !missing.is_empty() {
                        diagnostics.push(Diagnostic::new(
                            Code::MissingTraitItems,
                            Location::of(item.impl_token.span),
                            format!(
                                "not all trait items implemented, missing: `{}`",
                                missing.join("`, `")
                            ),
                        ));
                    }
                }
            }
        }
    }
}

fn check_duplicate_impl_items(
    tables: &Tables,
    pending: &[(syn::ItemImpl, String, bool)],
    diagnostics: &mut Vec<Diagnostic>,
) {
    let mut seen = HashSet::new();
    for (item, _, focus) in pending {
        if !focus || item.trait_.is_some() {
            continue;
        }
        let Some(owner) = type_name(&item.self_ty) else { continue };
        if !tables.types.contains_key(&owner) {
            continue;
        }
        for impl_item in &item.items {
            let ident = match impl_item {
                syn::ImplItem::Fn(f) => &f.sig.ident,
                syn::ImplItem::Const(c) => &c.ident,
                _ => continue,
            };
            if !seen.insert((owner.clone(), ident.to_string())) {
                diagnostics.push(Diagnostic::new(
                    Code::DuplicateImplItem,
                    Location::of(ident.span()),
                    format!("duplicate definitions with name `{ident}`"),
                ));
            }
        }
    }
}

/// E0428 per module scope and E0124 per struct.
fn check_duplicates(items: &[Item], diagnostics: &mut Vec<Diagnostic>) {
    let mut types = HashSet::new();
    let mut values = HashSet::new();
    for item in items {
        let (type_ident, value_ident) = match item {
            Item::Struct(s) => {
                check_duplicate_fields(&s.fields, diagnostics);
                let value = (!matches!(s.fields, Fields::Named(_))).then_some(&s.ident);
                (Some(&s.ident), value)
            }
            Item::Enum(e) => (Some(&e.ident), None),
            Item::Union(u) => (Some(&u.ident), None),
            Item::Type(t) => (Some(&t.ident), None),
            Item::Trait(t) => (Some(&t.ident), None),
            Item::Mod(m) => {
                if let Some((_, nested)) = &m.content {
                    check_duplicates(nested, diagnostics);
                }
                (Some(&m.ident), None)
            }
            Item::Fn(f) => (None, Some(&f.sig.ident)),
            Item::Const(c) => (None, Some(&c.ident)),
            Item::Static(s) => (None, Some(&s.ident)),
            _ => (None, None),
        };
        let type_dup = type_ident.filter(|ident| !types.insert(ident.to_string()));
        let value_dup = value_ident.filter(|ident| !values.insert(ident.to_string()));
        if let Some(ident) = type_dup.or(value_dup) {
            diagnostics.push(Diagnostic::new(
                Code::DuplicateItem,
                Location::of(ident.span()),
                format!("the name `{ident}` is defined multiple times"),
            ));
        }
    }
}

fn check_duplicate_fields(fields: &Fields, diagnostics: &mut Vec<Diagnostic>) {
    let mut seen = HashSet::new();
    for ident in fields.iter().filter_map(|field| field.ident.as_ref()) {
        if !seen.insert(ident.to_string()) {
            diagnostics.push(Diagnostic::new(
                Code::DuplicateField,
                Location::of(ident.span()),
                format!("field `{ident}` is already declared"),
            ));
        }
    }
}

fn evaluate_consts(tables: &mut Tables, inits: &[ConstInit]) {
    // Each round can only add values, so rounds are bounded by the number of constants.
    for _ in 0..=inits.len() {
        let mut progressed = false;
        for init in inits {
            if tables.symbols[init.symbol].constant.is_some() {
                continue;
            }
            let value = consteval::eval(&init.expr, &|path| {
                const_by_path(tables, &path.path, init.owner.as_deref())
            });
            if value.is_some() {
                tables.symbols[init.symbol].constant = value;
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
}

fn const_by_path(tables: &Tables, path: &syn::Path, owner: Option<&str>) -> Option<ConstValue> {
    let segments: Vec<String> = path.segments.iter().map(|s| s.ident.to_string()).collect();
    let id = match segments.as_slice() {
        [name] => tables.values.get(name).copied(),
        [ty, name] => {
            let ty = if ty == "Self" { owner? } else { ty.as_str() };
            tables.impls.get(ty).and_then(|impls| impls.consts.get(name)).copied()
        }
        _ => None,
    }?;
    tables.symbols[id].constant.clone()
}

fn derives(attrs: &[Attribute]) -> BTreeSet<String> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("derive"))
        .filter_map(|attr| {
            attr.parse_args_with(Punctuated::<syn::Path, Token![,]>::parse_terminated)
                .ok()
        })
        .flatten()
        .filter_map(|path| path.segments.last().map(|segment| segment.ident.to_string()))
        .collect()
}

pub(crate) fn doc_attrs(attrs: &[Attribute]) -> Vec<Attribute> {
    attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .cloned()
        .collect()
}

fn return_type(output: &ReturnType) -> Option<Type> {
    match output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) => Some((**ty).clone()),
    }
}

// =============================================================================
// Type helpers
// =============================================================================

/// Strips references, parentheses and `Box`/`Rc`/`Arc`.
pub fn peel(ty: &Type) -> &Type {
    match ty {
        Type::Reference(reference) => peel(&reference.elem),
        Type::Paren(paren) => peel(&paren.elem),
        Type::Group(group) => peel(&group.elem),
        Type::Path(path) if path.qself.is_none() => {
            match single_type_arg(path, &["Box", "Rc", "Arc"]) {
                Some(inner) => peel(inner),
                None => ty,
            }
        }
        _ => ty,
    }
}

/// Element type of `Vec<T>`, `VecDeque<T>`, `[T; N]` and `[T]`.
pub fn element_type(ty: &Type) -> Option<&Type> {
    match peel(ty) {
        Type::Array(array) => Some(&array.elem),
        Type::Slice(slice) => Some(&slice.elem),
        Type::Path(path) if path.qself.is_none() => single_type_arg(path, &["Vec", "VecDeque"]),
        _ => None,
    }
}

fn single_type_arg<'t>(path: &'t syn::TypePath, wrappers: &[&str]) -> Option<&'t Type> {
    let segment = path.path.segments.last()?;
    if !wrappers.iter().any(|wrapper| segment.ident == wrapper) {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    let mut types = args.args.iter().filter_map(|arg| match arg {
        syn::GenericArgument::Type(ty) => Some(ty),
        _ => None,
    });
    let first = types.next()?;
    types.next().is_none().then_some(first)
}

/// Last path segment of a plain path type.
pub fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) if path.qself.is_none() => {
            path.path.segments.last().map(|segment| segment.ident.to_string())
        }
        Type::Paren(paren) => type_name(&paren.elem),
        Type::Group(group) => type_name(&group.elem),
        _ => None,
    }
}

/// Replaces `Self` with `owner`.
pub fn replace_self(ty: &Type, owner: &str) -> Type {
    struct SelfReplacer<'a>(&'a str);

    impl Fold for SelfReplacer<'_> {
        fn fold_type_path(&mut self, path: syn::TypePath) -> syn::TypePath {
            if path.qself.is_none() && path.path.is_ident("Self") {
                let ident = Ident::new(self.0, proc_macro2::Span::call_site());
                return syn::parse_quote!(#ident);
            }
            syn::fold::fold_type_path(self, path)
        }
    }

    SelfReplacer(owner).fold_type(ty.clone())
}

pub fn type_text(ty: &Type) -> String {
    ty.to_token_stream().to_string()
}

// =============================================================================
// Expression types
// =============================================================================

/// Symbol lookups shared by the resolver (while binding) and the finished model.
pub(crate) trait SymbolSource {
    fn tables(&self) -> &Tables;
    fn symbol_at(&self, location: Location) -> Option<&Symbol>;
}

/// Best-effort static type of `expr`; `None` when unknown.
pub(crate) fn infer_type(source: &impl SymbolSource, expr: &Expr) -> Option<Type> {
    match expr {
        Expr::Paren(inner) => infer_type(source, &inner.expr),
        Expr::Group(inner) => infer_type(source, &inner.expr),
        Expr::Reference(reference) => infer_type(source, &reference.expr),
        Expr::Unary(unary) if matches!(unary.op, syn::UnOp::Deref(_)) => {
            infer_type(source, &unary.expr).map(|ty| peel(&ty).clone())
        }
        Expr::Cast(cast) => Some((*cast.ty).clone()),
        Expr::Path(path) if path.qself.is_none() => {
            let ident = &path.path.segments.last()?.ident;
            symbol_type(source.symbol_at(Location::of(ident.span()))?)
        }
        Expr::Field(field) => match &field.member {
            syn::Member::Named(ident) => symbol_type(source.symbol_at(Location::of(ident.span()))?),
            syn::Member::Unnamed(_) => None,
        },
        Expr::MethodCall(call) => {
            let method = call.method.to_string();
            match method.as_str() {
                "clone" | "to_owned" => infer_type(source, &call.receiver),
                "unwrap" | "expect" | "unwrap_unchecked" | "unwrap_or_default" => {
                    let receiver = infer_type(source, &call.receiver)?;
                    let syn::Type::Path(path) = peel(&receiver) else { return None };
                    single_type_arg(path, &["Option"])
                        .or_else(|| first_type_arg(path, "Result"))
                        .cloned()
                }
                _ => symbol_type(source.symbol_at(Location::of(call.method.span()))?),
            }
        }
        Expr::Call(call) => match &*call.func {
            Expr::Path(path) if path.qself.is_none() => {
                let ident = &path.path.segments.last()?.ident;
                let symbol = source.symbol_at(Location::of(ident.span()))?;
                match &symbol.kind {
                    SymbolKind::Function | SymbolKind::Method { .. } => symbol_type(symbol),
                    _ => None,
                }
            }
            _ => None,
        },
        Expr::Index(index) => {
            let base = infer_type(source, &index.expr)?;
            element_type(&base).cloned()
        }
        Expr::Struct(literal) if literal.qself.is_none() => {
            let path = &literal.path;
            Some(Type::Path(syn::TypePath {
                qself: None,
                path: path.clone(),
            }))
        }
        _ => None,
    }
}

fn first_type_arg<'t>(path: &'t syn::TypePath, wrapper: &str) -> Option<&'t Type> {
    let segment = path.path.segments.last()?;
    if segment.ident != wrapper {
        return None;
    }
    let syn::PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        syn::GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn symbol_type(symbol: &Symbol) -> Option<Type> {
    let ty = symbol.ty.as_ref()?;
    Some(match symbol.owner() {
        Some(owner) => replace_self(ty, owner),
        None => ty.clone(),
    })
}

// =============================================================================
// Semantic model
// =============================================================================

/// Bindings, references and diagnostics of one focus unit.
#[derive(Debug)]
pub struct SemanticModel {
    pub(crate) focus: String,
    pub(crate) tables: Tables,
    pub(crate) references: Vec<Reference>,
    pub(crate) by_location: HashMap<Location, SymbolId>,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl SymbolSource for SemanticModel {
    fn tables(&self) -> &Tables {
        &self.tables
    }

    fn symbol_at(&self, location: Location) -> Option<&Symbol> {
        self.resolve(location).map(|id| self.symbol(id))
    }
}

impl SemanticModel {
    pub fn focus(&self) -> &str {
        &self.focus
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.tables.symbols[id]
    }

    pub fn symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.tables.symbols.iter().enumerate()
    }

    /// Symbol declared or referenced at `location` of the focus unit.
    pub fn resolve(&self, location: Location) -> Option<SymbolId> {
        self.by_location.get(&location).copied()
    }

    pub fn resolve_ident(&self, ident: &Ident) -> Option<SymbolId> {
        self.resolve(Location::of(ident.span()))
    }

    pub fn references(&self) -> &[Reference] {
        &self.references
    }

    pub fn references_to(&self, id: SymbolId) -> impl Iterator<Item = &Reference> {
        self.references.iter().filter(move |reference| reference.symbol == id)
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|diag| diag.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|diag| !diag.is_error())
    }

    pub fn type_of(&self, expr: &Expr) -> Option<Type> {
        infer_type(self, expr)
    }

    /// Resolves aliases and peels pointers until neither applies.
    pub fn canonical_type(&self, ty: &Type) -> Type {
        let mut current = peel(ty).clone();
        for _ in 0..8 {
            let alias = type_name(&current)
                .and_then(|name| self.tables.types.get(&name))
                .filter(|info| info.kind == TypeKind::Alias)
                .and_then(|info| info.alias_of.clone());
            match alias {
                Some(target) => current = peel(&target).clone(),
                None => break,
            }
        }
        current
    }

    pub fn trait_info(&self, name: &str) -> Option<&TraitInfo> {
        self.tables.traits.get(name)
    }

    pub fn is_type(&self, name: &str) -> bool {
        self.tables.types.contains_key(name)
    }

    /// Value of the constant a path resolves to.
    pub fn constant_of(&self, path: &syn::ExprPath) -> Option<ConstValue> {
        if path.qself.is_some() {
            return None;
        }
        let ident = &path.path.segments.last()?.ident;
        let symbol = self.symbol(self.resolve_ident(ident)?);
        match symbol.kind {
            SymbolKind::Const | SymbolKind::AssocConst { .. } => symbol.constant.clone(),
            _ => None,
        }
    }

    pub fn eval(&self, expr: &Expr) -> Option<ConstValue> {
        consteval::eval(expr, &|path| self.constant_of(path))
    }
}
