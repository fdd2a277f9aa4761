use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use facetgen::{GenerateOptions, Generator, Layout};

/// Specialize facet-annotated Rust templates into concrete sources
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding `template/` and the project directory (once per project)
    #[arg(long, env = "FACETGEN_BASE", required = true)]
    base: Vec<PathBuf>,

    /// Directory of interface sources bound with every template (once per project)
    #[arg(long, required = true)]
    interfaces: Vec<PathBuf>,

    /// Project directory name under the base; holds `transform.toml`
    #[arg(long, required = true)]
    project: Vec<String>,

    /// Regenerate outputs that are up to date
    #[arg(short, long)]
    force: bool,

    /// Log every pass and non-fatal diagnostic
    #[arg(short, long)]
    debug: bool,

    /// Worker threads for independent targets
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Only generate these outputs (repeatable)
    #[arg(long, value_name = "OUTPUT")]
    only: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default = if cli.debug { "facetgen=debug" } else { "facetgen=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_target(false)
        .init();

    match run(cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

impl Cli {
    /// Pairs up the repeated `--base`, `--interfaces` and `--project` values.
    fn layouts(&self) -> anyhow::Result<Vec<Layout>> {
        if self.base.len() != self.project.len() || self.interfaces.len() != self.project.len() {
            anyhow::bail!(
                "--base, --interfaces and --project must be given once per project ({}, {}, {})",
                self.base.len(),
                self.interfaces.len(),
                self.project.len()
            );
        }
        Ok(self
            .base
            .iter()
            .zip(&self.interfaces)
            .zip(&self.project)
            .map(|((base, interfaces), project)| Layout::new(base, interfaces, project))
            .collect())
    }
}

fn run(cli: Cli) -> anyhow::Result<bool> {
    let mut unmatched: Vec<&String> = cli.only.iter().collect();
    let mut failed = Vec::new();
    for layout in cli.layouts()? {
        let config_path = layout.config_path();
        let generator = Generator::new(layout)
            .with_context(|| format!("loading {}", config_path.display()))?;

        // `--only` names are spread over the projects; each takes the ones it produces.
        let produces = |name: &String| {
            generator
                .config()
                .targets
                .iter()
                .any(|target| &target.output_name() == name)
        };
        let only: Vec<String> = cli.only.iter().filter(|name| produces(*name)).cloned().collect();
        if !cli.only.is_empty() && only.is_empty() {
            continue;
        }
        unmatched.retain(|name| !produces(*name));

        let options = GenerateOptions {
            force: cli.force,
            jobs: cli.jobs,
            only,
        };
        let report = generator.run(&options)?;
        failed.extend(report.failures().map(|outcome| outcome.output.clone()));
    }
    if let Some(name) = unmatched.first() {
        anyhow::bail!("no target produces `{name}`");
    }

    if failed.is_empty() {
        println!("Finished");
        Ok(true)
    } else {
        println!("{} {}", "Failed:".red().bold(), failed.join(", "));
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projects_pair_up_in_order() {
        let cli = Cli::try_parse_from([
            "facetgen", "--base", "a", "--interfaces", "a/interface", "--project", "tree",
            "--base", "b", "--interfaces", "b/interface", "--project", "list",
        ])
        .unwrap();
        let layouts = cli.layouts().unwrap();
        assert_eq!(layouts.len(), 2);
        assert_eq!(layouts[1].config_path(), PathBuf::from("b/list/transform.toml"));
        assert_eq!(layouts[0].interfaces, PathBuf::from("a/interface"));
    }

    #[test]
    fn test_unbalanced_projects_are_rejected() {
        let cli = Cli::try_parse_from([
            "facetgen", "--base", "a", "--interfaces", "a/interface", "--project", "tree",
            "--project", "list",
        ])
        .unwrap();
        assert!(cli.layouts().is_err());
    }
}
