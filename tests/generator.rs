//! Generator runs over a temporary project layout.

use std::fs::{self, File};
use std::path::Path;
use std::time::{Duration, SystemTime};

use facetgen::{Error, GenerateOptions, Generator, Layout, TargetStatus};
use tempfile::TempDir;

const TEMPLATE: &str = r#"
pub struct TreeEntry {
    pub key: u32,
}

pub struct Tree {
    #[facet(Storage(Array))]
    slots: Vec<TreeEntry>,
    #[facet(Storage(Object))]
    root: Option<Box<TreeEntry>>,
}

impl Tree {
    #[facet(Storage(Array))]
    pub fn first(&self) -> Option<&TreeEntry> {
        self.slots.first()
    }
}
"#;

fn transform(strip_generated: bool) -> String {
    format!(
        r#"
[axes]
Storage = ["Array", "Object"]

[[target]]
template = "Tree"
storage_class = "Array"
specialization = "Map"
strip_generated = {strip_generated}
facet_axes = [{{ tag = "Storage", facets = ["Array"] }}]

[[target]]
template = "Tree"
storage_class = "Object"
specialization = "Map"
strip_generated = {strip_generated}
facet_axes = [{{ tag = "Storage", facets = ["Object"] }}]
"#
    )
}

fn age(path: &Path) {
    let file = File::options().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() - Duration::from_secs(3600))
        .unwrap();
}

fn project(template: &str, strip_generated: bool) -> (TempDir, Layout) {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path(), dir.path().join("interface"), "tree");
    fs::create_dir_all(dir.path().join("template")).unwrap();
    fs::create_dir_all(layout.project_dir()).unwrap();
    fs::write(layout.template_path("Tree"), template).unwrap();
    fs::write(layout.config_path(), transform(strip_generated)).unwrap();
    age(&layout.template_path("Tree"));
    age(&layout.config_path());
    (dir, layout)
}

fn run(layout: &Layout, options: &GenerateOptions) -> facetgen::Report {
    Generator::new(layout.clone()).unwrap().run(options).unwrap()
}

#[test]
fn test_second_run_skips_up_to_date_outputs() {
    let (_dir, layout) = project(TEMPLATE, false);
    let first = run(&layout, &GenerateOptions::default());
    assert!(first.is_success());
    assert_eq!(first.outcomes.len(), 2);
    for outcome in &first.outcomes {
        assert!(matches!(outcome.status, TargetStatus::Generated { .. }));
    }

    let second = run(&layout, &GenerateOptions::default());
    for outcome in &second.outcomes {
        assert_eq!(outcome.status, TargetStatus::UpToDate, "{}", outcome.output);
    }

    let forced = run(
        &layout,
        &GenerateOptions {
            force: true,
            ..GenerateOptions::default()
        },
    );
    for outcome in &forced.outcomes {
        assert!(matches!(outcome.status, TargetStatus::Generated { .. }));
    }
}

#[test]
fn test_newer_template_makes_outputs_stale() {
    let (_dir, layout) = project(TEMPLATE, false);
    run(&layout, &GenerateOptions::default());
    for output in ["TreeArrayMap", "TreeObjectMap"] {
        age(&layout.output_path(output));
    }
    fs::write(layout.template_path("Tree"), TEMPLATE).unwrap();

    let report = run(&layout, &GenerateOptions::default());
    assert!(report
        .outcomes
        .iter()
        .all(|outcome| matches!(outcome.status, TargetStatus::Generated { .. })));
}

#[test]
fn test_failed_target_keeps_previous_output() {
    let broken = TEMPLATE.replace("Option<&TreeEntry>", "Option<&Missing>");
    let (_dir, layout) = project(&broken, false);
    let output = layout.output_path("TreeArrayMap");
    fs::create_dir_all(layout.generated_dir()).unwrap();
    fs::write(&output, "// previous\n").unwrap();

    let report = run(
        &layout,
        &GenerateOptions {
            force: true,
            ..GenerateOptions::default()
        },
    );
    let failed = report.outcome("TreeArrayMap").unwrap();
    let TargetStatus::Failed { dump, .. } = &failed.status else {
        panic!("expected failure, got {:?}", failed.status);
    };
    assert_eq!(fs::read_to_string(&output).unwrap(), "// previous\n");
    if let Some(dump) = dump {
        fs::remove_file(dump).unwrap();
    }
    assert!(matches!(
        report.outcome("TreeObjectMap").unwrap().status,
        TargetStatus::Generated { .. }
    ));
}

#[test]
fn test_strip_generated_ignores_generated_interfaces() {
    for strip in [false, true] {
        let (_dir, layout) = project(TEMPLATE, strip);
        let shared = layout.interfaces.join("generated").join("entry_map.rs");
        fs::create_dir_all(shared.parent().unwrap()).unwrap();
        fs::write(&shared, "pub struct EntryMap {\n    pub key: u32,\n}\n").unwrap();
        age(&shared);

        let report = run(&layout, &GenerateOptions::default());
        assert!(report.is_success());
        let text = fs::read_to_string(layout.output_path("TreeArrayMap")).unwrap();
        assert!(text.contains("Option<&EntryMap>"));
        assert_eq!(text.contains("pub struct EntryMap"), strip, "{text}");
    }
}

#[test]
fn test_only_restricts_the_run() {
    let (_dir, layout) = project(TEMPLATE, false);
    let report = run(
        &layout,
        &GenerateOptions {
            only: vec!["TreeObjectMap".to_string()],
            ..GenerateOptions::default()
        },
    );
    assert_eq!(report.outcomes.len(), 1);
    assert_eq!(report.outcomes[0].output, "TreeObjectMap");
    assert!(!layout.output_path("TreeArrayMap").exists());

    let err = Generator::new(layout.clone())
        .unwrap()
        .run(&GenerateOptions {
            only: vec!["TreeHashMap".to_string()],
            ..GenerateOptions::default()
        })
        .unwrap_err();
    assert!(matches!(err, Error::Config(_)), "{err:?}");
}

#[test]
fn test_missing_config_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let layout = Layout::new(dir.path(), dir.path().join("interface"), "tree");
    assert!(Generator::new(layout).is_err());
}
