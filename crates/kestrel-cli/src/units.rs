//! Reading JSON-encoded source units

use anyhow::Context;
use kestrel_ast::{renumber, SourceUnit};
use std::path::{Path, PathBuf};

/// Read one unit; a unit without a path takes the file it came from.
/// Node ids are reassigned so hand-written documents may omit them.
pub fn load_unit(path: &Path) -> anyhow::Result<SourceUnit> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let mut unit: SourceUnit = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a valid source unit", path.display()))?;
    if unit.path.is_none() {
        unit.path = Some(path.display().to_string());
    }
    renumber(&mut unit);
    Ok(unit)
}

/// Read every unit, in argument order
pub fn load_units(paths: &[PathBuf]) -> anyhow::Result<Vec<SourceUnit>> {
    if paths.is_empty() {
        anyhow::bail!("no input files");
    }
    paths.iter().map(|path| load_unit(path)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_unit_takes_file_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "main.json", r#"{"name": "Main", "classes": []}"#);
        let unit = load_unit(&path).unwrap();
        assert_eq!(unit.name, "Main");
        assert_eq!(unit.path.as_deref(), Some(path.display().to_string().as_str()));
    }

    #[test]
    fn test_declared_path_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(
            dir.path(),
            "main.json",
            r#"{"name": "Main", "path": "src/Main.kes", "classes": []}"#,
        );
        assert_eq!(load_unit(&path).unwrap().path.as_deref(), Some("src/Main.kes"));
    }

    #[test]
    fn test_malformed_unit_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = write(dir.path(), "broken.json", "{ not json");
        let err = load_unit(&path).unwrap_err();
        assert!(err.to_string().contains("broken.json"));
    }

    #[test]
    fn test_no_inputs_is_an_error() {
        assert!(load_units(&[]).is_err());
    }
}
