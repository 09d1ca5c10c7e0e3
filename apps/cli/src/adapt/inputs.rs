//! Input loading and CV document plumbing: job description, CV YAML, prompt
//! templates, and the `cv.sections` splice points.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_yaml::Value;

use crate::config::RewriteStrategy;
use crate::errors::AppError;

/// The named prompt templates loaded from the queries file.
///
/// `analyze_jd` is always required. The two rewrite templates are optional in
/// the file; whichever one the configured strategy needs must be present.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptSet {
    pub analyze_jd: String,
    #[serde(default)]
    pub rewrite_sections: Option<String>,
    #[serde(default)]
    pub rewrite_section: Option<String>,
}

impl PromptSet {
    pub fn rewrite_template(&self, strategy: RewriteStrategy) -> Result<&str, AppError> {
        let (template, key) = match strategy {
            RewriteStrategy::Subtree => (self.rewrite_sections.as_deref(), "rewrite_sections"),
            RewriteStrategy::PerLeaf => (self.rewrite_section.as_deref(), "rewrite_section"),
        };
        template.ok_or_else(|| {
            AppError::Config(format!(
                "prompt file is missing the '{key}' template required by the configured rewrite strategy"
            ))
        })
    }
}

pub fn load_job_description(path: &Path) -> Result<String, AppError> {
    let text = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    if text.trim().is_empty() {
        return Err(AppError::Config(format!(
            "job description at {} is empty",
            path.display()
        )));
    }
    Ok(text)
}

pub fn load_cv_document(path: &Path) -> Result<Value, AppError> {
    let text = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    Ok(serde_yaml::from_str(&text)?)
}

pub fn load_prompts(path: &Path) -> Result<PromptSet, AppError> {
    let text = fs::read_to_string(path).map_err(|e| AppError::io(path, e))?;
    Ok(serde_yaml::from_str(&text)?)
}

/// Clones the `cv.sections` mapping out of the document. Its absence is a
/// configuration problem with the input file, reported before any model call.
pub fn sections_subtree(cv: &Value) -> Result<Value, AppError> {
    let sections = cv
        .get("cv")
        .and_then(|v| v.get("sections"))
        .ok_or_else(|| {
            AppError::Config("CV document is missing the 'cv.sections' mapping".to_string())
        })?;

    if sections.as_mapping().is_none() {
        return Err(AppError::Config(
            "'cv.sections' must be a mapping of section names to content".to_string(),
        ));
    }
    Ok(sections.clone())
}

/// Splices a rewritten subtree back at `cv.sections`, leaving every sibling
/// subtree untouched.
pub fn replace_sections(cv: &mut Value, sections: Value) -> Result<(), AppError> {
    let slot = cv
        .get_mut("cv")
        .and_then(|v| v.get_mut("sections"))
        .ok_or_else(|| {
            AppError::Config("CV document is missing the 'cv.sections' mapping".to_string())
        })?;
    *slot = sections;
    Ok(())
}

/// Writes the full document as YAML. Nothing is written until the whole
/// transform has completed, so an aborted run never leaves a partial CV.
pub fn persist_cv(cv: &Value, path: &Path) -> Result<(), AppError> {
    let text = serde_yaml::to_string(cv)?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| AppError::io(parent, e))?;
        }
    }
    fs::write(path, text).map_err(|e| AppError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn yaml(text: &str) -> Value {
        serde_yaml::from_str(text).unwrap()
    }

    const CV: &str = r#"
        cv:
          name: Jane Doe
          sections:
            summary: old text
        design:
          theme: classic
    "#;

    #[test]
    fn test_sections_subtree_extracts_mapping() {
        let sections = sections_subtree(&yaml(CV)).unwrap();
        assert_eq!(sections, yaml("summary: old text"));
    }

    #[test]
    fn test_sections_subtree_missing_is_config_error() {
        let err = sections_subtree(&yaml("cv:\n  name: Jane")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("cv.sections"));
    }

    #[test]
    fn test_sections_subtree_rejects_non_mapping() {
        let err = sections_subtree(&yaml("cv:\n  sections: just a string")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_replace_sections_leaves_siblings_untouched() {
        let mut cv = yaml(CV);
        replace_sections(&mut cv, yaml("summary:\n  - new text")).unwrap();

        assert_eq!(
            cv.get("cv").unwrap().get("sections").unwrap(),
            &yaml("summary:\n  - new text")
        );
        assert_eq!(
            cv.get("cv").unwrap().get("name").unwrap().as_str(),
            Some("Jane Doe")
        );
        assert_eq!(
            cv.get("design").unwrap().get("theme").unwrap().as_str(),
            Some("classic")
        );
    }

    #[test]
    fn test_persist_round_trips_and_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/cv_modified.yaml");

        let cv = yaml(CV);
        persist_cv(&cv, &path).unwrap();

        assert_eq!(load_cv_document(&path).unwrap(), cv);
    }

    #[test]
    fn test_load_missing_file_reports_path() {
        let err = load_job_description(Path::new("data/no_such_file.txt")).unwrap_err();
        assert!(err.to_string().contains("no_such_file.txt"));
    }

    #[test]
    fn test_empty_job_description_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job_description.txt");
        fs::write(&path, "  \n").unwrap();

        let err = load_job_description(&path).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_prompt_set_parses_queries_file() {
        let prompts: PromptSet = serde_yaml::from_str(
            r#"
            analyze_jd: "Analyze {job_description}"
            rewrite_sections: "Rewrite {sections_text} with {keywords}"
            "#,
        )
        .unwrap();

        assert_eq!(
            prompts.rewrite_template(RewriteStrategy::Subtree).unwrap(),
            "Rewrite {sections_text} with {keywords}"
        );
        let err = prompts
            .rewrite_template(RewriteStrategy::PerLeaf)
            .unwrap_err();
        assert!(err.to_string().contains("rewrite_section"));
    }
}
