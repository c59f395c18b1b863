//! Creates the files of a new numbered deployment stage.

use std::{
    io,
    path::{Path, PathBuf},
};

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum ScaffoldError {
    #[error("deployment name must not be empty")]
    EmptyName,

    #[error("the deployment name already has files associated with it: {0:?}")]
    Exists(PathBuf),

    #[error("i/o error at {0:?}: {1}")]
    Io(PathBuf, #[source] io::Error),
}

const STAGE_TEMPLATE: &str = r#"use anyhow::Result;
use async_trait::async_trait;
use setdeploy::{DeployContext, Stage};
use setdeploy_contract::Chain;

pub struct {{type}};

#[async_trait]
impl<C: Chain> Stage<C> for {{type}} {
    fn id(&self) -> &str {
        "{{name}}"
    }

    async fn run(&self, _cx: &DeployContext<C>) -> Result<()> {
        Ok(())
    }
}
"#;

const CONSTANTS_TEMPLATE: &str = "# constants of {{name}}\n";

const TEST_TEMPLATE: &str = r#"// tests of {{name}}
"#;

/// The integer the first three characters of `name` start with, if any.
fn leading_number(name: &str) -> Option<u64> {
    let digits: String = name
        .chars()
        .take(3)
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// One more than the highest stage number in `dir`, 1 if there is none.
fn next_sequence_number(dir: &Path) -> Result<u64, ScaffoldError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(1),
        Err(err) => return Err(ScaffoldError::Io(dir.into(), err)),
    };
    let mut max = 0;
    for entry in entries {
        let entry = entry.map_err(|e| ScaffoldError::Io(dir.into(), e))?;
        if let Some(n) = entry.file_name().to_str().and_then(leading_number) {
            max = max.max(n);
        }
    }
    Ok(max + 1)
}

/// `example_adapter` becomes `004_example_adapter` when `deploy/` holds stages
/// up to 3. Prefixed names are kept as given.
pub fn stage_file_name(root: &Path, name: &str) -> Result<String, ScaffoldError> {
    let name = name.strip_suffix(".rs").unwrap_or(name);
    if name.is_empty() {
        return Err(ScaffoldError::EmptyName);
    }
    if leading_number(name).is_some() {
        return Ok(name.to_string());
    }
    let n = next_sequence_number(&root.join("deploy"))?;
    Ok(format!("{n:03}_{name}"))
}

fn type_name(file_name: &str) -> String {
    file_name
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(c) if c.is_ascii_digit() => format!("Stage{part}"),
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect()
}

fn render(template: &str, file_name: &str) -> String {
    template
        .replace("{{name}}", file_name)
        .replace("{{type}}", &type_name(file_name))
}

/// Create the stage, constants and test files of deployment `name` below
/// `root`. Nothing is written if any of them exists.
pub fn create_deployment_files(root: &Path, name: &str) -> Result<Vec<PathBuf>, ScaffoldError> {
    let file_name = stage_file_name(root, name)?;
    let files = [
        (
            root.join("deploy").join(format!("{file_name}.rs")),
            STAGE_TEMPLATE,
        ),
        (
            root.join("deployments/constants")
                .join(format!("{file_name}.toml")),
            CONSTANTS_TEMPLATE,
        ),
        (
            root.join("tests/deploys").join(format!("{file_name}.rs")),
            TEST_TEMPLATE,
        ),
    ];

    for (path, _) in &files {
        if path.exists() {
            return Err(ScaffoldError::Exists(path.clone()));
        }
    }

    let mut created = Vec::with_capacity(files.len());
    for (path, template) in files {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| ScaffoldError::Io(dir.into(), e))?;
        }
        std::fs::write(&path, render(template, &file_name))
            .map_err(|e| ScaffoldError::Io(path.clone(), e))?;
        info!(path = %path.display(), "created");
        created.push(path);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::scratch_dir;

    #[test]
    fn prefixes() {
        assert_eq!(leading_number("003_bed"), Some(3));
        assert_eq!(leading_number("12_fli"), Some(12));
        assert_eq!(leading_number("1234_x"), Some(123));
        assert_eq!(leading_number("example"), None);
        assert_eq!(type_name("004_example_adapter"), "Stage004ExampleAdapter");
    }

    #[test]
    fn numbers_follow_existing_stages() {
        let root = scratch_dir();
        assert_eq!(stage_file_name(&root, "first").unwrap(), "001_first");

        std::fs::create_dir_all(root.join("deploy")).unwrap();
        std::fs::write(root.join("deploy/000_setup.rs"), "").unwrap();
        std::fs::write(root.join("deploy/003_bed.rs"), "").unwrap();
        std::fs::write(root.join("deploy/mod.rs"), "").unwrap();

        assert_eq!(
            stage_file_name(&root, "example_adapter.rs").unwrap(),
            "004_example_adapter"
        );
        assert_eq!(stage_file_name(&root, "010_given").unwrap(), "010_given");
        assert!(matches!(
            stage_file_name(&root, ""),
            Err(ScaffoldError::EmptyName)
        ));
    }

    #[test]
    fn creates_all_files_once() {
        let root = scratch_dir();
        let created = create_deployment_files(&root, "example_adapter").unwrap();
        assert_eq!(
            created,
            [
                root.join("deploy/001_example_adapter.rs"),
                root.join("deployments/constants/001_example_adapter.toml"),
                root.join("tests/deploys/001_example_adapter.rs"),
            ]
        );
        let stage = std::fs::read_to_string(&created[0]).unwrap();
        assert!(stage.contains("pub struct Stage001ExampleAdapter;"));
        assert!(stage.contains("\"001_example_adapter\""));

        // the prefixed name now collides
        let err = create_deployment_files(&root, "001_example_adapter").unwrap_err();
        assert!(matches!(err, ScaffoldError::Exists(p) if p == created[0]));
    }
}
