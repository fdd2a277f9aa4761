//! Documentation propagator.
//!
//! Trait implementations of the output type inherit the trait's documentation: methods by
//! name and input count, associated consts and types by name, and the trait's own docs land
//! on the type declaration. Docs already present are never repeated.

use quote::ToTokens;
use syn::{fold::Fold, Attribute, File, ImplItem, Item};

use super::Rewrite;
use crate::front::{type_name, SemanticModel, TraitItemKind};

pub fn propagate(file: &File, model: &SemanticModel, output: &str) -> Rewrite {
    let mut propagator = Propagator {
        model,
        output,
        type_docs: Vec::new(),
        added: 0,
    };
    let mut file = propagator.fold_file(file.clone());

    let type_docs = std::mem::take(&mut propagator.type_docs);
    for item in &mut file.items {
        let attrs = match item {
            Item::Struct(item) if item.ident == output => &mut item.attrs,
            Item::Enum(item) if item.ident == output => &mut item.attrs,
            Item::Union(item) if item.ident == output => &mut item.attrs,
            _ => continue,
        };
        propagator.added += prepend(attrs, &type_docs);
    }
    tracing::debug!(output, added = propagator.added, "documentation");
    Rewrite::new(file, propagator.added > 0)
}

/// Prepends the docs in `docs` that `attrs` lacks; returns how many were added.
fn prepend(attrs: &mut Vec<Attribute>, docs: &[Attribute]) -> usize {
    let present: Vec<String> = attrs
        .iter()
        .filter(|attr| attr.path().is_ident("doc"))
        .map(|attr| attr.to_token_stream().to_string())
        .collect();
    let missing: Vec<Attribute> = docs
        .iter()
        .filter(|doc| !present.contains(&doc.to_token_stream().to_string()))
        .cloned()
        .collect();
    let added = missing.len();
    if added > 0 {
        attrs.splice(0..0, missing);
    }
    added
}

struct Propagator<'a> {
    model: &'a SemanticModel,
    output: &'a str,
    /// Trait docs collected for the output type declaration.
    type_docs: Vec<Attribute>,
    added: usize,
}

impl Fold for Propagator<'_> {
    fn fold_item_impl(&mut self, mut imp: syn::ItemImpl) -> syn::ItemImpl {
        let Some((_, path, _)) = &imp.trait_ else {
            return imp;
        };
        if type_name(&imp.self_ty).as_deref() != Some(self.output) {
            return imp;
        }
        let model = self.model;
        let Some(info) = path
            .segments
            .last()
            .and_then(|segment| model.trait_info(&segment.ident.to_string()))
        else {
            return imp;
        };

        for doc in &info.docs {
            let text = doc.to_token_stream().to_string();
            if !self
                .type_docs
                .iter()
                .any(|seen| seen.to_token_stream().to_string() == text)
            {
                self.type_docs.push(doc.clone());
            }
        }

        for item in &mut imp.items {
            let (name, inputs, attrs) = match item {
                ImplItem::Fn(f) => (f.sig.ident.to_string(), Some(f.sig.inputs.len()), &mut f.attrs),
                ImplItem::Const(c) => (c.ident.to_string(), None, &mut c.attrs),
                ImplItem::Type(t) => (t.ident.to_string(), None, &mut t.attrs),
                _ => continue,
            };
            let Some(trait_item) = info.item(&name) else { continue };
            let matches = match (&trait_item.kind, inputs) {
                (TraitItemKind::Method { inputs: expected, .. }, Some(actual)) => *expected == actual,
                (TraitItemKind::Const { .. } | TraitItemKind::Type { .. }, None) => true,
                _ => false,
            };
            if matches {
                self.added += prepend(attrs, &trait_item.docs);
            }
        }
        imp
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::front::{render, Compilation, SourceText};

    const INTERFACE: &str = r#"
        /// Ordered map over keys.
        pub trait OrderedMap {
            /// Number of entries.
            fn len(&self) -> usize;
            /// Smallest key.
            fn first(&self) -> Option<u32>;
            /// Upper bound on entries.
            const CAPACITY: usize;
        }
    "#;

    fn run(output_text: &str, output: &str) -> Rewrite {
        let compilation = Compilation::from_sources(&[
            SourceText::new("map", INTERFACE),
            SourceText::new("out", output_text),
        ])
        .unwrap();
        let model = compilation.bind("out").unwrap();
        propagate(&compilation.tree("out").unwrap().file, &model, output)
    }

    #[test]
    fn test_trait_docs_reach_impl_and_type() {
        let out = run(
            r#"
            pub struct TreeObject { len: usize }
            impl OrderedMap for TreeObject {
                fn len(&self) -> usize { self.len }
                /// Already documented.
                fn first(&self) -> Option<u32> { None }
                const CAPACITY: usize = 8;
            }
            "#,
            "TreeObject",
        );
        assert!(out.changed);
        let text = render(&out.file);
        assert!(text.contains("/// Ordered map over keys.\npub struct TreeObject"), "{text}");
        assert!(text.contains("    /// Number of entries.\n    fn len(&self)"), "{text}");
        assert!(text.contains("    /// Smallest key.\n    /// Already documented.\n    fn first"), "{text}");
        assert!(text.contains("    /// Upper bound on entries.\n    const CAPACITY"), "{text}");
    }

    #[test]
    fn test_propagation_is_idempotent_and_scoped() {
        let out = run(
            r#"
            pub struct TreeObjectEntry;
            impl OrderedMap for TreeObjectEntry {
                fn len(&self) -> usize { 0 }
                fn first(&self) -> Option<u32> { None }
                const CAPACITY: usize = 8;
            }
            "#,
            "TreeObject",
        );
        assert!(!out.changed);

        let once = run(
            "pub struct TreeObject;\nimpl OrderedMap for TreeObject {\n fn len(&self) -> usize { 0 }\n fn first(&self) -> Option<u32> { None }\n const CAPACITY: usize = 1;\n}",
            "TreeObject",
        );
        let again = run(&render(&once.file), "TreeObject");
        assert!(!again.changed);
    }
}
