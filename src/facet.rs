//! Template annotations
//!
//! | Attribute | Parsed into | Consumed by |
//! |-----------|-------------|-------------|
//! | `#[facet(Storage(Array), Feature(Rank, Range))]` | [`FacetTags`] | facet selector |
//! | `#[constant(Feature(Rank), then = 1, otherwise = 0)]` | [`ConstantTag`] | constant substitution |
//! | `#[count]`, `#[widen]` | markers | width adjusters |
//! | `#[indirection]` | marker | indirection eliminator |
//!
//! All of them are removed before the output is emitted.

use std::collections::{BTreeMap, BTreeSet};

use syn::{
    parenthesized,
    parse::{Parse, ParseStream},
    punctuated::Punctuated,
    visit::Visit,
    Attribute, Ident, Lit, LitBool, Token,
};

use crate::config::{FacetAxis, TransformConfig};
use crate::error::{Error, Result};

pub const FACET: &str = "facet";
pub const CONSTANT: &str = "constant";
pub const COUNT: &str = "count";
pub const WIDEN: &str = "widen";
pub const INDIRECTION: &str = "indirection";

/// Every attribute the engine understands; none of them survives into the output.
pub const ANNOTATIONS: &[&str] = &[FACET, CONSTANT, COUNT, WIDEN, INDIRECTION];

pub fn is_annotation(attr: &Attribute) -> bool {
    ANNOTATIONS.iter().any(|name| attr.path().is_ident(name))
}

pub fn has_marker(attrs: &[Attribute], name: &str) -> bool {
    attrs.iter().any(|attr| attr.path().is_ident(name))
}

// =============================================================================
// Axis(Facet, ...) syntax
// =============================================================================

/// One `Axis(A, B)` group.
#[derive(Clone, Debug)]
pub struct AxisFacets {
    pub axis: Ident,
    pub facets: Vec<Ident>,
}

impl Parse for AxisFacets {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let axis: Ident = input.parse()?;
        let content;
        parenthesized!(content in input);
        let facets = Punctuated::<Ident, Token![,]>::parse_terminated(&content)?;
        if facets.is_empty() {
            return Err(syn::Error::new(axis.span(), "facet list must not be empty"));
        }
        Ok(AxisFacets {
            axis,
            facets: facets.into_iter().collect(),
        })
    }
}

struct AxisFacetsList(Vec<AxisFacets>);

impl Parse for AxisFacetsList {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let list = Punctuated::<AxisFacets, Token![,]>::parse_terminated(input)?;
        Ok(AxisFacetsList(list.into_iter().collect()))
    }
}

// =============================================================================
// Facet tags and selections
// =============================================================================

/// Facets a declaration is tagged with, per axis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FacetTags {
    axes: BTreeMap<String, BTreeSet<String>>,
}

impl FacetTags {
    pub fn is_empty(&self) -> bool {
        self.axes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.axes.iter()
    }

    pub fn on(&self, axis: &str) -> Option<&BTreeSet<String>> {
        self.axes.get(axis)
    }
}

/// Parses every `#[facet]` attribute; repeated axes merge.
pub fn parse_facet_tags(attrs: &[Attribute]) -> syn::Result<FacetTags> {
    let mut tags = FacetTags::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident(FACET)) {
        let list: AxisFacetsList = attr.parse_args()?;
        for group in list.0 {
            tags.axes
                .entry(group.axis.to_string())
                .or_default()
                .extend(group.facets.iter().map(Ident::to_string));
        }
    }
    Ok(tags)
}

/// Like [`parse_facet_tags`], for templates that already passed validation.
pub fn facet_tags(attrs: &[Attribute]) -> FacetTags {
    parse_facet_tags(attrs).unwrap_or_default()
}

/// Facets a target selects, per axis.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FacetSelection {
    axes: BTreeMap<String, BTreeSet<String>>,
}

impl FacetSelection {
    pub fn from_axes(axes: &[FacetAxis]) -> Self {
        let axes = axes
            .iter()
            .map(|axis| (axis.tag.clone(), axis.facets.iter().cloned().collect()))
            .collect();
        FacetSelection { axes }
    }

    /// The same selection limited to a single axis.
    pub fn restricted_to(&self, axis: &str) -> Self {
        let axes = self
            .axes
            .iter()
            .filter(|(tag, _)| tag.as_str() == axis)
            .map(|(tag, facets)| (tag.clone(), facets.clone()))
            .collect();
        FacetSelection { axes }
    }

    pub fn facets(&self, axis: &str) -> Option<&BTreeSet<String>> {
        self.axes.get(axis)
    }

    pub fn selects(&self, axis: &str) -> bool {
        self.axes.contains_key(axis)
    }

    /// Untagged declarations and axes outside the selection are always admitted.
    pub fn admits(&self, tags: &FacetTags) -> bool {
        tags.iter().all(|(axis, tagged)| match self.axes.get(axis) {
            Some(selected) => !selected.is_disjoint(tagged),
            None => true,
        })
    }

    pub fn admits_attrs(&self, attrs: &[Attribute]) -> bool {
        self.admits(&facet_tags(attrs))
    }
}

// =============================================================================
// Pinned constants
// =============================================================================

/// `#[constant(Axis(A, B), then = .., otherwise = ..)]`
#[derive(Clone, Debug)]
pub struct ConstantTag {
    pub axis: String,
    pub facets: BTreeSet<String>,
    pub then: Lit,
    pub otherwise: Lit,
}

impl Parse for ConstantTag {
    fn parse(input: ParseStream) -> syn::Result<Self> {
        let group: AxisFacets = input.parse()?;
        let span = group.axis.span();
        let mut then = Lit::Bool(LitBool::new(true, span));
        let mut otherwise = Lit::Bool(LitBool::new(false, span));

        while input.peek(Token![,]) {
            input.parse::<Token![,]>()?;
            if input.is_empty() {
                break;
            }
            let key: Ident = input.parse()?;
            input.parse::<Token![=]>()?;
            let value: Lit = input.parse()?;
            match key.to_string().as_str() {
                "then" => then = value,
                "otherwise" => otherwise = value,
                _ => return Err(syn::Error::new(key.span(), "expected `then` or `otherwise`")),
            }
        }

        Ok(ConstantTag {
            axis: group.axis.to_string(),
            facets: group.facets.iter().map(Ident::to_string).collect(),
            then,
            otherwise,
        })
    }
}

impl ConstantTag {
    /// The literal this symbol is pinned to under `selection`, if any.
    ///
    /// Pinned to `then` when every selected facet is listed, to `otherwise` when none is.
    pub fn pinned(&self, selection: &FacetSelection) -> Option<Lit> {
        let selected = selection.facets(&self.axis)?;
        if selected.is_empty() {
            None
        } else if selected.is_subset(&self.facets) {
            Some(self.then.clone())
        } else if selected.is_disjoint(&self.facets) {
            Some(self.otherwise.clone())
        } else {
            None
        }
    }
}

pub fn parse_constant_tag(attrs: &[Attribute]) -> Option<syn::Result<ConstantTag>> {
    attrs
        .iter()
        .find(|attr| attr.path().is_ident(CONSTANT))
        .map(|attr| attr.parse_args::<ConstantTag>())
}

pub fn constant_tag(attrs: &[Attribute]) -> Option<ConstantTag> {
    parse_constant_tag(attrs).and_then(|tag| tag.ok())
}

// =============================================================================
// Template validation
// =============================================================================

/// Rejects malformed annotations and references to undeclared axes or facets.
pub fn validate_template(file: &syn::File, template: &str, config: &TransformConfig) -> Result<()> {
    let mut checker = AnnotationChecker {
        config,
        errors: Vec::new(),
    };
    checker.visit_file(file);
    match checker.errors.into_iter().next() {
        Some(message) => Err(Error::config(format!("template `{template}`: {message}"))),
        None => Ok(()),
    }
}

struct AnnotationChecker<'a> {
    config: &'a TransformConfig,
    errors: Vec<String>,
}

impl AnnotationChecker<'_> {
    fn check(&mut self, axis: &str, facets: &BTreeSet<String>, line: usize) {
        if let Err(message) = self.config.check_facets(axis, facets) {
            self.errors.push(format!("line {line}: {message}"));
        }
    }
}

impl<'ast> Visit<'ast> for AnnotationChecker<'_> {
    fn visit_attribute(&mut self, attr: &'ast Attribute) {
        let line = attr.pound_token.span.start().line;
        if attr.path().is_ident(FACET) {
            match parse_facet_tags(std::slice::from_ref(attr)) {
                Ok(tags) => {
                    for (axis, facets) in tags.iter() {
                        self.check(axis, facets, line);
                    }
                }
                Err(e) => self.errors.push(format!("line {line}: malformed #[facet]: {e}")),
            }
        } else if attr.path().is_ident(CONSTANT) {
            match attr.parse_args::<ConstantTag>() {
                Ok(tag) => {
                    let facets = tag.facets.clone();
                    self.check(&tag.axis, &facets, line);
                }
                Err(e) => self.errors.push(format!("line {line}: malformed #[constant]: {e}")),
            }
        } else if [COUNT, WIDEN, INDIRECTION]
            .iter()
            .any(|marker| attr.path().is_ident(marker))
            && !matches!(attr.meta, syn::Meta::Path(_))
        {
            self.errors
                .push(format!("line {line}: marker attributes take no arguments"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

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
    fn test_tags_merge_across_attributes() {
        let item: syn::ItemStruct = parse_quote! {
            #[facet(Storage(Array))]
            #[facet(Feature(Rank), Storage(Object))]
            struct Node;
        };
        let tags = parse_facet_tags(&item.attrs).unwrap();
        assert_eq!(tags.on("Storage").unwrap().len(), 2);
        assert!(tags.on("Feature").unwrap().contains("Rank"));
    }

    #[test]
    fn test_admits_intersects_per_axis() {
        let item: syn::ItemStruct = parse_quote! {
            #[facet(Storage(Array), Feature(Rank, Range))]
            struct Node;
        };
        let tags = facet_tags(&item.attrs);
        assert!(selection(&[("Storage", &["Array"]), ("Feature", &["Range"])]).admits(&tags));
        assert!(!selection(&[("Storage", &["Object"]), ("Feature", &["Range"])]).admits(&tags));
        assert!(!selection(&[("Storage", &["Array"]), ("Feature", &["Dict"])]).admits(&tags));
        // Unselected axes never exclude.
        assert!(selection(&[("Storage", &["Array"])]).admits(&tags));
        assert!(selection(&[]).admits(&FacetTags::default()));
    }

    #[test]
    fn test_restricted_selection_ignores_other_axes() {
        let full = selection(&[("Storage", &["Array"]), ("Feature", &["Dict"])]);
        let storage = full.restricted_to("Storage");
        assert!(storage.selects("Storage"));
        assert!(!storage.selects("Feature"));
    }

    #[test]
    fn test_constant_pinning() {
        let item: syn::ItemConst = parse_quote! {
            #[constant(Feature(Rank, RankMulti))]
            const HAS_RANK: bool = true;
        };
        let tag = constant_tag(&item.attrs).unwrap();
        let pinned = |facets: &[&str]| tag.pinned(&selection(&[("Feature", facets)]));
        assert!(matches!(pinned(&["Rank"]), Some(Lit::Bool(ref b)) if b.value));
        assert!(matches!(pinned(&["Dict"]), Some(Lit::Bool(ref b)) if !b.value));
        assert!(pinned(&["Rank", "Dict"]).is_none());
        assert!(tag.pinned(&selection(&[("Storage", &["Array"])])).is_none());
    }

    #[test]
    fn test_constant_explicit_values() {
        let item: syn::ItemConst = parse_quote! {
            #[constant(Feature(Range2), then = 2, otherwise = 1)]
            const SIDES: usize = 0;
        };
        let tag = constant_tag(&item.attrs).unwrap();
        let lit = tag.pinned(&selection(&[("Feature", &["Range"])])).unwrap();
        assert!(matches!(lit, Lit::Int(ref i) if i.base10_digits() == "1"));
    }
}
