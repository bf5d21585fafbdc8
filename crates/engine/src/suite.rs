//! Declarative YAML test suites
//!
//! A suite groups independent cases under a shared `before_each` setup
//! block. Cases are registered at load time and immutable during execution.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::step::Step;
use testwright_common::Result;

/// A named group of test cases sharing a setup hook
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSuite {
    /// Unique name for this suite
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Tags for filtering runs
    #[serde(default)]
    pub tags: Vec<String>,

    /// Executed immediately before each case's own steps
    #[serde(default)]
    pub before_each: Vec<Step>,

    /// Independent cases, each run with fresh isolated state
    pub cases: Vec<TestCase>,
}

/// One test case: a name and its ordered steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub steps: Vec<Step>,
}

impl TestSuite {
    /// Parse a suite from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a suite from a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Load every suite under a directory
    pub fn load_all(dir: &Path) -> Result<Vec<Self>> {
        let mut suites = Vec::new();

        for entry in walkdir::WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
        {
            suites.push(Self::from_file(entry.path())?);
        }

        Ok(suites)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| candidate == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::Step;

    #[test]
    fn parse_suite_with_setup_and_interception() {
        let yaml = r#"
name: badges
description: Badge administration flows
tags:
  - admin
  - smoke
before_each:
  - action: request
    method: POST
    path: /app/projects/proj1
    body:
      projectId: proj1
      name: proj1
  - action: intercept
    alias: loadBadges
    method: GET
    path: /admin/projects/proj1/badges
cases:
  - name: delete badge
    steps:
      - action: visit
        path: /administrator/projects/proj1/badges
      - action: wait_for
        alias: loadBadges
      - action: click
        selector: '[data-cy="badgeCard-badge2"] [data-cy="deleteBtn"]'
      - action: assert_absent
        selector: '[data-cy="badgeCard-badge2"]'
"#;
        let suite = TestSuite::from_yaml(yaml).unwrap();
        assert_eq!(suite.name, "badges");
        assert_eq!(suite.before_each.len(), 2);
        assert_eq!(suite.cases.len(), 1);
        assert!(suite.has_tag("smoke"));
        assert!(!suite.has_tag("progress"));
        assert!(matches!(suite.before_each[1], Step::Intercept { .. }));
        assert_eq!(suite.cases[0].steps.len(), 4);
    }

    #[test]
    fn parse_override_with_delay_and_table_assertion() {
        let yaml = r#"
name: sorting
cases:
  - name: slow persistence shows progress
    steps:
      - action: intercept
        alias: badge1Async
        path: /admin/projects/proj1/badges/badge1
        respond:
          status: 200
          delay_ms: 6000
      - action: drag_and_drop
        source: '[data-cy="badgeCard-badge1"] [data-cy="sortControlHandle"]'
        target: '[data-cy="badgeCard-badge2"] [data-cy="sortControlHandle"]'
        await_alias: badge1Async
        timeout_ms: 10000
      - action: assert_table
        selector: '[data-cy="simpleSkillsTable"]'
        page_size: 5
        rows:
          - - col: 0
              value: Skill 1
            - col: 1
              value: skill1
"#;
        let suite = TestSuite::from_yaml(yaml).unwrap();
        let steps = &suite.cases[0].steps;
        match &steps[0] {
            Step::Intercept { respond, method, .. } => {
                assert!(method.is_none());
                let respond = respond.as_ref().unwrap();
                assert_eq!(respond.status, 200);
                assert_eq!(respond.delay_ms, Some(6000));
            }
            other => panic!("unexpected step: {other:?}"),
        }
        match &steps[2] {
            Step::AssertTable { rows, page_size, .. } => {
                assert_eq!(*page_size, 5);
                assert_eq!(rows[0].len(), 2);
                assert_eq!(rows[0][1].value, "skill1");
            }
            other => panic!("unexpected step: {other:?}"),
        }
    }

    #[test]
    fn suite_files_load_from_a_directory_tree() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("admin");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(
            nested.join("badges.yaml"),
            "name: badges\ncases:\n  - name: open page\n    steps:\n      - action: visit\n        path: /\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a suite").unwrap();

        let suites = TestSuite::load_all(dir.path()).unwrap();
        assert_eq!(suites.len(), 1);
        assert_eq!(suites[0].name, "badges");
    }
}
