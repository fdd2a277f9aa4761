//! Properties the rewrite passes guarantee on any input.

use facetgen::facet::FacetSelection;
use facetgen::front::render;
use facetgen::passes::{constants, dead_code, rename, select, unused, Rewrite};
use facetgen::{Compilation, FacetAxis, SemanticModel, SourceText};
use quote::ToTokens;

const TEMPLATE: &str = r#"
#[constant(Feature(Rank))]
const HAS_RANK: bool = true;

#[facet(Feature(Rank))]
pub struct RankInfo {
    pub rank: usize,
}

pub struct Tree {
    #[facet(Storage(Array))]
    slots: Vec<u32>,
    #[facet(Storage(Object))]
    root: Option<Box<u32>>,
    len: usize,
}

impl Tree {
    pub fn len(&self) -> usize {
        let doubled = self.len * 2;
        let unused = doubled + 1;
        if HAS_RANK && self.len > 0 {
            let mut scratch = 0;
            scratch += doubled;
            return self.len;
        }
        if !HAS_RANK {
            self.len
        } else {
            0
        }
    }

    #[facet(Storage(Array))]
    pub fn slot(&self, index: usize) -> u32 {
        self.slots[index]
    }
}
"#;

fn parse(text: &str) -> syn::File {
    Compilation::from_sources(&[SourceText::new("t", text)])
        .unwrap()
        .tree("t")
        .unwrap()
        .file
        .clone()
}

fn with_model<R>(text: &str, f: impl FnOnce(&syn::File, &SemanticModel) -> R) -> R {
    let compilation = Compilation::from_sources(&[SourceText::new("t", text)]).unwrap();
    let model = compilation.bind("t").unwrap();
    f(&compilation.tree("t").unwrap().file, &model)
}

fn fixpoint(text: &str, pass: fn(&syn::File, &SemanticModel) -> Rewrite) -> String {
    let mut current = render(&parse(text));
    for _ in 0..32 {
        let out = with_model(&current, pass);
        current = render(&out.file);
        if !out.changed {
            return current;
        }
    }
    panic!("no fixpoint");
}

fn selection(axes: &[(&str, &[&str])]) -> FacetSelection {
    let axes: Vec<FacetAxis> = axes
        .iter()
        .map(|(tag, facets)| FacetAxis {
            tag: tag.to_string(),
            facets: facets.iter().map(|f| f.to_string()).collect(),
        })
        .collect();
    FacetSelection::from_axes(&axes)
}

#[test]
fn test_rename_is_idempotent_and_reversible() {
    let file = parse(TEMPLATE);
    let once = rename::rename(&file, "Tree", "TreeArrayMap");
    assert!(once.changed);
    let twice = rename::rename(&once.file, "Tree", "TreeArrayMap");
    assert!(!twice.changed);
    let back = rename::rename(&once.file, "TreeArrayMap", "Tree");
    assert_eq!(render(&back.file), render(&file));
}

#[test]
fn test_selection_only_removes() {
    let file = parse(TEMPLATE);
    let before: Vec<String> = file.items.iter().map(|item| item.to_token_stream().to_string()).collect();
    for axes in [
        selection(&[("Storage", &["Object"])]),
        selection(&[("Storage", &["Array"]), ("Feature", &["Dict"])]),
        selection(&[("Feature", &["Rank"])]),
    ] {
        let out = select::select(&file, &axes);
        assert!(out.file.items.len() <= file.items.len());
        let text = render(&out.file);
        assert!(text.len() < render(&file).len() || !out.changed);
        for item in &out.file.items {
            let rendered = item.to_token_stream().to_string();
            if !before.contains(&rendered) {
                // Only items with members removed differ; their names survive.
                assert!(matches!(item, syn::Item::Struct(_) | syn::Item::Impl(_)), "{rendered}");
            }
        }
    }
    assert!(!select::select(&file, &FacetSelection::default()).changed);
}

#[test]
fn test_dead_code_fixpoint_is_idempotent() {
    let pinned = with_model(TEMPLATE, |file, model| {
        let selection = selection(&[("Feature", &["Dict"])]);
        let pinned = constants::pinned_symbols(model, &selection, &["Feature".to_string()]);
        render(&constants::substitute(file, model, &pinned).file)
    });
    let reduced = fixpoint(&pinned, dead_code::eliminate);
    assert!(!reduced.contains("if "), "{reduced}");
    assert!(!reduced.contains("scratch"));
    let again = with_model(&reduced, dead_code::eliminate);
    assert!(!again.changed);
}

#[test]
fn test_unused_fixpoint_leaves_no_unread_local() {
    let reduced = fixpoint(TEMPLATE, unused::remove_unused);
    assert!(!reduced.contains("let unused"));
    assert!(!reduced.contains("scratch"));
    assert!(!reduced.contains("doubled"));
    assert!(reduced.contains("return self.len;"));
    with_model(&reduced, |_, model| {
        assert!(unused::unused_locals(model).is_empty());
    });
}

#[test]
fn test_substitution_leaves_only_literals() {
    for (facets, literal) in [(&["Rank"][..], "true"), (&["Dict"][..], "false")] {
        let text = with_model(TEMPLATE, |file, model| {
            let selection = selection(&[("Feature", facets)]);
            let pinned = constants::pinned_symbols(model, &selection, &["Feature".to_string()]);
            assert_eq!(pinned.len(), 1);
            render(&constants::substitute(file, model, &pinned).file)
        });
        assert!(!text.contains("HAS_RANK"));
        assert!(text.contains(&format!("if {literal} && self.len > 0")), "{text}");
    }
}
