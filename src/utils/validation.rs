use crate::utils::error::{BagFilterError, Result};
use std::path::{Path, PathBuf};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_path(field_name: &str, path: &Path) -> Result<()> {
    let text = path.to_string_lossy();
    if text.trim().is_empty() {
        return Err(BagFilterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: text.into_owned(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if text.contains('\0') {
        return Err(BagFilterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: text.into_owned(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// The output bag must not be the input bag, live inside it, or contain it.
pub fn validate_distinct_paths(field_name: &str, input: &Path, output: &Path) -> Result<()> {
    let input = normalize(input);
    let output = normalize(output);

    if output == input || output.starts_with(&input) {
        return Err(BagFilterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: output.display().to_string(),
            reason: "Output must not be the input bag or a directory inside it".to_string(),
        });
    }

    // --overwrite 會整個刪掉輸出目錄
    if input.starts_with(&output) {
        return Err(BagFilterError::OutputContainsInput {
            output: output.display().to_string(),
            input: input.display().to_string(),
        });
    }
    Ok(())
}

/// Canonicalizes the longest existing prefix; the output usually does not exist yet.
fn normalize(path: &Path) -> PathBuf {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return canonical;
    }
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) if !parent.as_os_str().is_empty() => normalize(parent).join(name),
        _ => std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf()),
    }
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(BagFilterError::InvalidConfigValueError {
            field: field_name.to_string(),
            value: value.to_string(),
            reason: format!("Value must be at least {}", min_value),
        });
    }
    Ok(())
}

pub fn validate_required_field<'a, T>(field_name: &str, value: &'a Option<T>) -> Result<&'a T> {
    value
        .as_ref()
        .ok_or_else(|| BagFilterError::MissingConfigError {
            field: field_name.to_string(),
        })
}

pub fn validate_topic_names(field_name: &str, topics: &[String]) -> Result<()> {
    for topic in topics {
        if topic.trim().is_empty() {
            return Err(BagFilterError::InvalidConfigValueError {
                field: field_name.to_string(),
                value: topic.clone(),
                reason: "Topic name cannot be empty".to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("input", Path::new("bags/run1")).is_ok());
        assert!(validate_path("input", Path::new("")).is_err());
        assert!(validate_path("input", Path::new("   ")).is_err());
    }

    #[test]
    fn test_validate_distinct_paths() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("run1");
        std::fs::create_dir_all(&input).unwrap();

        assert!(validate_distinct_paths("output", &input, &dir.path().join("run1_trimmed")).is_ok());
        assert!(validate_distinct_paths("output", &input, &input).is_err());
        assert!(validate_distinct_paths("output", &input, &input.join("nested")).is_err());
    }

    #[test]
    fn test_output_must_not_contain_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("bags").join("run1");
        std::fs::create_dir_all(&input).unwrap();

        let result = validate_distinct_paths("output", &input, &dir.path().join("bags"));
        assert!(matches!(result, Err(BagFilterError::OutputContainsInput { .. })));

        let result = validate_distinct_paths("output", &input.join("run1_0.db3"), dir.path());
        assert!(matches!(result, Err(BagFilterError::OutputContainsInput { .. })));

        // 同層的目錄名稱有相同前綴不算包含
        assert!(validate_distinct_paths("output", &input, &dir.path().join("bags").join("run")).is_ok());
    }

    #[test]
    fn test_validate_positive_number() {
        assert!(validate_positive_number("batch_size", 5, 1).is_ok());
        assert!(validate_positive_number("batch_size", 0, 1).is_err());
    }

    #[test]
    fn test_validate_topic_names() {
        assert!(validate_topic_names("topics", &["/scan".to_string()]).is_ok());
        assert!(validate_topic_names("topics", &[" ".to_string()]).is_err());
    }
}
