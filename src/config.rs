//! Facet configuration model
//!
//! A `transform.toml` document describes the axes a template family varies along and one
//! [`SpecializationTarget`] per generated output.
//!
//! | Table | Purpose |
//! |-------|---------|
//! | `[engine]` | axis roles and integer widths (all optional) |
//! | `[axes]` | declared facets per axis |
//! | `[[target]]` | one specialization each |
//! | `do_not_unload` | generated outputs kept as project inputs |

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::facet::FacetSelection;

// =============================================================================
// Document
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    /// Declared facets per axis tag.
    #[serde(default)]
    pub axes: BTreeMap<String, Vec<String>>,
    /// Output file names exempt from wipe-and-regenerate.
    #[serde(default)]
    pub do_not_unload: Vec<String>,
    #[serde(default, rename = "target")]
    pub targets: Vec<SpecializationTarget>,
}

/// Roles of the axes and the widths used by the width adjusters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSettings {
    /// Structural axis reduced before the first bind.
    pub storage_axis: String,
    /// Axes whose selections can pin `#[constant]` symbols.
    pub feature_axes: Vec<String>,
    /// Storage facet selecting the boxed representation.
    pub indirect_facet: String,
    pub count_width: String,
    pub rank_width: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            storage_axis: "Storage".to_string(),
            feature_axes: vec!["Feature".to_string()],
            indirect_facet: "Object".to_string(),
            count_width: "u32".to_string(),
            rank_width: "i64".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpecializationTarget {
    /// Template type name; also names the template file.
    pub template: String,
    pub storage_class: String,
    pub specialization: String,
    #[serde(default)]
    pub flags: Vec<WidthFlag>,
    #[serde(default)]
    pub facet_axes: Vec<FacetAxis>,
    /// Drop previously generated units from the compilation before regenerating.
    #[serde(default)]
    pub strip_generated: bool,
    #[serde(default)]
    pub renames: Vec<Rename>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FacetAxis {
    pub tag: String,
    pub facets: Vec<String>,
}

impl std::fmt::Display for FacetAxis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.tag, self.facets.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Rename {
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WidthFlag {
    #[serde(alias = "DowngradeCountToUint")]
    NarrowCount,
    #[serde(alias = "WidenInt")]
    WidenRank,
}

// =============================================================================
// Target naming
// =============================================================================

impl SpecializationTarget {
    /// Output type name: template + storage class + specialization.
    pub fn output_name(&self) -> String {
        format!("{}{}{}", self.template, self.storage_class, self.specialization)
    }

    /// Entry type name before melding.
    pub fn private_entry_name(&self) -> String {
        format!("{}Entry", self.output_name())
    }

    pub fn template_entry_name(&self) -> String {
        format!("{}Entry", self.template)
    }

    /// Entry type shared by every output with the same specialization.
    pub fn shared_entry_name(&self) -> String {
        format!("Entry{}", self.specialization)
    }

    pub fn has_flag(&self, flag: WidthFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn selection(&self) -> FacetSelection {
        FacetSelection::from_axes(&self.facet_axes)
    }
}

// =============================================================================
// Loading and validation
// =============================================================================

const INTEGER_TYPES: &[&str] = &[
    "i8", "i16", "i32", "i64", "i128", "isize", "u8", "u16", "u32", "u64", "u128", "usize",
];

pub fn is_integer_type(name: &str) -> bool {
    INTEGER_TYPES.contains(&name)
}

impl TransformConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let config: TransformConfig = toml::from_str(&text).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let config: TransformConfig = toml::from_str(text).map_err(|e| Error::ConfigParse {
            path: "<inline>".into(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every target against the declared axes.
    pub fn validate(&self) -> Result<()> {
        for (name, width) in [
            ("count_width", &self.engine.count_width),
            ("rank_width", &self.engine.rank_width),
        ] {
            if !is_integer_type(width) {
                return Err(Error::config(format!("{name} `{width}` is not an integer type")));
            }
        }
        for (axis, facets) in &self.axes {
            let unique: BTreeSet<&String> = facets.iter().collect();
            if unique.len() != facets.len() {
                return Err(Error::config(format!("axis `{axis}` declares a facet twice")));
            }
        }

        let mut outputs = BTreeSet::new();
        for target in &self.targets {
            let output = target.output_name();
            if !outputs.insert(output.clone()) {
                return Err(Error::config(format!("target `{output}` is declared twice")));
            }
            for ident in [&target.template, &output] {
                if syn::parse_str::<syn::Ident>(ident).is_err() {
                    return Err(Error::config(format!("`{ident}` is not a valid identifier")));
                }
            }

            let mut seen = BTreeSet::new();
            for axis in &target.facet_axes {
                if !seen.insert(axis.tag.as_str()) {
                    return Err(Error::config(format!(
                        "{output}: axis `{}` selected twice",
                        axis.tag
                    )));
                }
                self.check_facets(&axis.tag, &axis.facets)
                    .map_err(|e| Error::config(format!("{output}: {e}")))?;
            }

            for rename in &target.renames {
                for ident in [&rename.from, &rename.to] {
                    if syn::parse_str::<syn::Ident>(ident).is_err() {
                        return Err(Error::config(format!(
                            "{output}: rename `{}` -> `{}` is not identifier to identifier",
                            rename.from, rename.to
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Fails unless `axis` is declared and declares every facet in `facets`.
    pub fn check_facets<'a>(
        &self,
        axis: &str,
        facets: impl IntoIterator<Item = &'a String>,
    ) -> std::result::Result<(), String> {
        let declared = self
            .axes
            .get(axis)
            .ok_or_else(|| format!("unknown facet axis `{axis}`"))?;
        for facet in facets {
            if !declared.contains(facet) {
                return Err(format!("axis `{axis}` declares no facet `{facet}`"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        do_not_unload = ["entry_map.rs"]

        [axes]
        Storage = ["Array", "Object"]
        Feature = ["Dict", "Rank"]

        [[target]]
        template = "SplayTree"
        storage_class = "Array"
        specialization = "Map"
        flags = ["narrow_count", "WidenInt"]
        facet_axes = [{ tag = "Storage", facets = ["Array"] }, { tag = "Feature", facets = ["Dict"] }]
        renames = [{ from = "KeyType", to = "K" }]
    "#;

    #[test]
    fn test_sample_loads() {
        let config = TransformConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.targets.len(), 1);
        let target = &config.targets[0];
        assert_eq!(target.output_name(), "SplayTreeArrayMap");
        assert_eq!(target.private_entry_name(), "SplayTreeArrayMapEntry");
        assert_eq!(target.shared_entry_name(), "EntryMap");
        assert!(target.has_flag(WidthFlag::NarrowCount));
        assert!(target.has_flag(WidthFlag::WidenRank));
        assert_eq!(config.engine.storage_axis, "Storage");
        assert_eq!(config.do_not_unload, vec!["entry_map.rs"]);
    }

    #[test]
    fn test_unknown_facet_is_config_error() {
        let text = SAMPLE.replace(r#"facets = ["Dict"]"#, r#"facets = ["Graph"]"#);
        let err = TransformConfig::from_toml(&text).unwrap_err();
        assert!(matches!(err, Error::Config(ref m) if m.contains("Graph")), "{err}");
    }

    #[test]
    fn test_unknown_axis_is_config_error() {
        let text = SAMPLE.replace(r#"tag = "Feature""#, r#"tag = "Payload""#);
        assert!(matches!(TransformConfig::from_toml(&text), Err(Error::Config(_))));
    }

    #[test]
    fn test_unknown_flag_is_rejected() {
        let text = SAMPLE.replace("narrow_count", "shrink_everything");
        assert!(matches!(TransformConfig::from_toml(&text), Err(Error::ConfigParse { .. })));
    }

    #[test]
    fn test_bad_rename_is_rejected() {
        let text = SAMPLE.replace(r#"to = "K""#, r#"to = "two words""#);
        assert!(matches!(TransformConfig::from_toml(&text), Err(Error::Config(_))));
    }
}
