//! Mission plan reference
//!
//! The plan file is resolved to an absolute path exactly once. Its contents
//! are never read here; loading and parsing belong to the [`PlanUploader`].
//!
//! [`PlanUploader`]: crate::link::PlanUploader

use crate::error::{RunnerError, RunnerResult};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Absolute path to the mission plan, fixed for the runner's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionPlanReference {
    path: PathBuf,
}

impl MissionPlanReference {
    /// Resolve `plan_file` against the working directory.
    ///
    /// The file does not need to exist; see [`Self::ensure_exists`].
    pub fn resolve<P: AsRef<Path>>(plan_file: P) -> RunnerResult<Self> {
        let plan_file = plan_file.as_ref();
        let path =
            std::path::absolute(plan_file).map_err(|source| RunnerError::PlanPathUnresolvable {
                path: plan_file.to_path_buf(),
                source,
            })?;
        Ok(Self { path })
    }

    /// Absolute plan path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fail unless the plan file exists right now.
    pub fn ensure_exists(&self) -> RunnerResult<()> {
        if self.path.exists() {
            Ok(())
        } else {
            Err(RunnerError::PlanNotFound {
                path: self.path.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relative_path_becomes_absolute() {
        let plan = MissionPlanReference::resolve("plans/survey.plan").unwrap();
        assert!(plan.path().is_absolute());
        assert!(plan.path().ends_with("plans/survey.plan"));
    }

    #[test]
    fn test_absolute_path_kept() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("survey.plan");
        let plan = MissionPlanReference::resolve(&file).unwrap();
        assert_eq!(plan.path(), file.as_path());
    }

    #[test]
    fn test_existing_plan_passes_check() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let plan = MissionPlanReference::resolve(file.path()).unwrap();
        assert!(plan.ensure_exists().is_ok());
    }

    #[test]
    fn test_missing_plan_reports_absolute_path() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("missing.plan");
        let plan = MissionPlanReference::resolve(&file).unwrap();
        match plan.ensure_exists() {
            Err(RunnerError::PlanNotFound { path }) => assert_eq!(path, file),
            other => panic!("expected PlanNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_path_unresolvable() {
        let err = MissionPlanReference::resolve("").unwrap_err();
        assert!(matches!(err, RunnerError::PlanPathUnresolvable { .. }));
    }
}
