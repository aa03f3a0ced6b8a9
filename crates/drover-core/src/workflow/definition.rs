//! Workflow definition parsing, validation, and filesystem operations.
//!
//! Validation runs before any execution state is created: a cycle, a
//! duplicate step ID, or an unknown dependency reference is a synchronous
//! error to the caller, never a runtime failure mid-run.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use drover_types::graph::{DependencyEdge, Relation};
use drover_types::workflow::WorkflowDefinition;
use thiserror::Error;

use crate::graph::DependencyGraph;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Errors that can occur during workflow operations.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// YAML/JSON parse failure.
    #[error("parse error: {0}")]
    ParseError(String),

    /// Structural validation failure.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Filesystem I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Dependency graph contains a cycle.
    #[error("cycle detected: {0}")]
    CycleDetected(String),

    /// A step references an unknown dependency.
    #[error("unknown dependency: {0}")]
    UnknownDependency(String),

    /// A control operation was applied to an execution in the wrong state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Unknown execution ID.
    #[error("execution not found: {0}")]
    ExecutionNotFound(String),

    /// Storage failure from a repository port.
    #[error("store error: {0}")]
    Store(#[from] drover_types::error::StoreError),
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate structural constraints on a `WorkflowDefinition`.
///
/// Checks:
/// - ID is non-empty and contains only alphanumeric characters and hyphens
/// - At least one step exists
/// - All step IDs are unique
/// - All `dependencies` references point to existing step IDs
/// - The dependency graph is acyclic
pub fn validate_definition(def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if def.id.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow id must not be empty".to_string(),
        ));
    }
    if !def.id.chars().all(|c| c.is_alphanumeric() || c == '-') {
        return Err(WorkflowError::ValidationError(format!(
            "workflow id '{}' contains invalid characters (only alphanumeric and hyphens allowed)",
            def.id
        )));
    }

    if def.steps.is_empty() {
        return Err(WorkflowError::ValidationError(
            "workflow must have at least one step".to_string(),
        ));
    }

    // Unique step IDs
    let mut seen_ids = HashSet::new();
    for step in &def.steps {
        if !seen_ids.insert(step.id.as_str()) {
            return Err(WorkflowError::ValidationError(format!(
                "duplicate step ID: '{}'",
                step.id
            )));
        }
    }

    // dependencies references must be valid
    for step in &def.steps {
        for dep in &step.dependencies {
            if !seen_ids.contains(dep.as_str()) {
                return Err(WorkflowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                )));
            }
        }
    }

    // The dependency graph must admit a valid order
    let sorted = step_graph(def).topological_sort(&step_ids(def));
    if sorted.has_cycle {
        return Err(WorkflowError::CycleDetected(format!(
            "workflow '{}' has a dependency cycle among its steps",
            def.id
        )));
    }

    Ok(())
}

/// Step IDs in declaration order.
pub fn step_ids(def: &WorkflowDefinition) -> Vec<String> {
    def.steps.iter().map(|s| s.id.clone()).collect()
}

/// Build the dependency graph over a definition's steps.
pub fn step_graph(def: &WorkflowDefinition) -> DependencyGraph<String> {
    let ids = step_ids(def);
    let edges: Vec<DependencyEdge<String>> = def
        .steps
        .iter()
        .flat_map(|step| {
            step.dependencies.iter().map(|dep| {
                DependencyEdge::new(step.id.clone(), dep.clone(), Relation::DependsOn)
            })
        })
        .collect();
    DependencyGraph::build(&ids, &edges)
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse a YAML string into a validated `WorkflowDefinition`.
///
/// Runs `validate_definition` after deserialization, so the returned value
/// is guaranteed to be structurally valid.
pub fn parse_workflow_yaml(yaml: &str) -> Result<WorkflowDefinition, WorkflowError> {
    let def: WorkflowDefinition =
        serde_yaml_ng::from_str(yaml).map_err(|e| WorkflowError::ParseError(e.to_string()))?;
    validate_definition(&def)?;
    Ok(def)
}

/// Serialize a `WorkflowDefinition` to a YAML string.
pub fn serialize_workflow_yaml(def: &WorkflowDefinition) -> Result<String, WorkflowError> {
    serde_yaml_ng::to_string(def).map_err(|e| WorkflowError::ParseError(e.to_string()))
}

// ---------------------------------------------------------------------------
// Filesystem operations
// ---------------------------------------------------------------------------

/// Load a workflow definition from a YAML file.
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition, WorkflowError> {
    let content = std::fs::read_to_string(path)?;
    parse_workflow_yaml(&content)
}

/// Save a workflow definition to a YAML file.
///
/// Creates parent directories if they don't exist.
pub fn save_workflow_file(path: &Path, def: &WorkflowDefinition) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let yaml = serialize_workflow_yaml(def)?;
    std::fs::write(path, yaml)?;
    Ok(())
}

/// Discover all workflow YAML files under `base_dir`.
///
/// Scans for `.yaml` and `.yml` files recursively. Files that fail to parse
/// or validate are skipped with a warning (they may not be workflows).
pub fn discover_workflows(
    base_dir: &Path,
) -> Result<Vec<(PathBuf, WorkflowDefinition)>, WorkflowError> {
    let mut results = Vec::new();
    if !base_dir.exists() {
        return Ok(results);
    }
    discover_recursive(base_dir, &mut results)?;
    Ok(results)
}

fn discover_recursive(
    dir: &Path,
    results: &mut Vec<(PathBuf, WorkflowDefinition)>,
) -> Result<(), WorkflowError> {
    let entries = std::fs::read_dir(dir)?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            discover_recursive(&path, results)?;
        } else if let Some(ext) = path.extension() {
            if ext == "yaml" || ext == "yml" {
                match load_workflow_file(&path) {
                    Ok(def) => results.push((path, def)),
                    Err(_) => {
                        tracing::warn!(?path, "skipping unparseable workflow file");
                    }
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
