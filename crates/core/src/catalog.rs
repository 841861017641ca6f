// Workflow catalog: seed templates loaded from TOML and instantiated on demand

use crate::types::{StepId, TemplateId, Workflow, WorkflowStep};
use crate::workflow::WorkflowDag;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

/// A reusable workflow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowTemplate {
    pub id: TemplateId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub parameters: Vec<TemplateParameter>,
    pub steps: Vec<StepTemplate>,
}

impl WorkflowTemplate {
    /// Draft workflow with the template's step graph and no inputs.
    /// Parameter values never change the graph, so this is enough for planning.
    pub fn skeleton(&self) -> Workflow {
        let steps = self
            .steps
            .iter()
            .map(|s| {
                WorkflowStep::new(s.id.clone(), s.tool_id.clone())
                    .with_name(s.name.clone().unwrap_or_else(|| s.id.clone()))
                    .with_dependencies(s.dependencies.iter().cloned())
            })
            .collect();

        let mut workflow = Workflow::new(self.name.clone(), steps);
        workflow.template_id = Some(self.id.clone());
        workflow
    }
}

/// Parameter substituted into `{{name}}` placeholders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateParameter {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<String>,
}

/// Step definition inside a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTemplate {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    pub tool_id: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub inputs: Map<String, Value>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    templates: Vec<WorkflowTemplate>,
}

/// Set of workflow templates offered to callers
#[derive(Debug, Clone, Default)]
pub struct WorkflowCatalog {
    templates: Vec<WorkflowTemplate>,
}

impl WorkflowCatalog {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: CatalogFile = toml::from_str(content).context("Failed to parse workflow catalog")?;

        let mut catalog = Self::default();
        for template in file.templates {
            catalog.insert(template)?;
        }
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workflow catalog {}", path.display()))?;
        let catalog = Self::from_toml_str(&content)?;
        tracing::info!(
            "Loaded {} workflow templates from {}",
            catalog.templates.len(),
            path.display()
        );
        Ok(catalog)
    }

    /// Add a template after checking that it is well formed
    pub fn insert(&mut self, template: WorkflowTemplate) -> Result<()> {
        if self.get(&template.id.0).is_some() {
            bail!("Template '{}' is defined more than once", template.id);
        }
        validate_template(&template)?;
        self.templates.push(template);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&WorkflowTemplate> {
        self.templates.iter().find(|t| t.id.0 == id)
    }

    pub fn list(&self) -> &[WorkflowTemplate] {
        &self.templates
    }

    /// Every tool id referenced by any template
    pub fn tool_ids(&self) -> BTreeSet<String> {
        self.templates
            .iter()
            .flat_map(|t| t.steps.iter().map(|s| s.tool_id.clone()))
            .collect()
    }

    /// Create a fresh draft workflow from a template
    pub fn instantiate(&self, id: &str, params: &HashMap<String, String>) -> Result<Workflow> {
        let template = self
            .get(id)
            .with_context(|| format!("Template '{}' not found", id))?;
        instantiate(template, params)
    }
}

/// Instantiate a template with the given parameter values
pub fn instantiate(template: &WorkflowTemplate, params: &HashMap<String, String>) -> Result<Workflow> {
    let values = resolve_parameters(template, params)?;

    let steps = template
        .steps
        .iter()
        .map(|step| WorkflowStep {
            name: step.name.clone().unwrap_or_else(|| step.id.clone()),
            tool_id: step.tool_id.clone(),
            dependencies: step.dependencies.iter().map(StepId::new).collect(),
            inputs: step
                .inputs
                .iter()
                .map(|(k, v)| (k.clone(), substitute(v, &values)))
                .collect(),
            timeout_secs: step.timeout_secs,
            ..WorkflowStep::new(step.id.clone(), step.tool_id.clone())
        })
        .collect();

    let mut workflow = Workflow::new(template.name.clone(), steps);
    workflow.description = replace_parameters(&template.description, &values);
    workflow.template_id = Some(template.id.clone());

    tracing::debug!(
        "Instantiated template {} as workflow {}",
        template.id,
        workflow.id
    );
    Ok(workflow)
}

/// Build the parameter map, applying defaults and checking required values
fn resolve_parameters(
    template: &WorkflowTemplate,
    params: &HashMap<String, String>,
) -> Result<HashMap<String, String>> {
    let mut values = HashMap::new();
    for param in &template.parameters {
        match params.get(&param.name).or(param.default.as_ref()) {
            Some(value) => {
                values.insert(param.name.clone(), value.clone());
            }
            None if param.required => {
                bail!("Required parameter '{}' not provided", param.name);
            }
            // Optional with no default: placeholder becomes empty
            None => {
                values.insert(param.name.clone(), String::new());
            }
        }
    }

    for name in params.keys() {
        if !template.parameters.iter().any(|p| &p.name == name) {
            tracing::warn!(
                "Ignoring unknown parameter '{}' for template {}",
                name,
                template.id
            );
        }
    }

    Ok(values)
}

/// Check that placeholders are declared and the step graph is sound
fn validate_template(template: &WorkflowTemplate) -> Result<()> {
    if template.steps.is_empty() {
        bail!("Template '{}' has no steps", template.id);
    }

    let declared: BTreeSet<&str> = template.parameters.iter().map(|p| p.name.as_str()).collect();
    for step in &template.steps {
        for value in step.inputs.values() {
            for placeholder in placeholders(value) {
                if !declared.contains(placeholder.as_str()) {
                    bail!(
                        "Template '{}' step '{}' uses undeclared parameter '{}'",
                        template.id,
                        step.id,
                        placeholder
                    );
                }
            }
        }
    }

    WorkflowDag::from_workflow(&template.skeleton())
        .validate()
        .with_context(|| format!("Template '{}' has an invalid step graph", template.id))?;

    Ok(())
}

/// Replace placeholders in every string inside a JSON value
fn substitute(value: &Value, params: &HashMap<String, String>) -> Value {
    match value {
        Value::String(s) => Value::String(replace_parameters(s, params)),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, params)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, params)))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn placeholders(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => extract_parameters(s),
        Value::Array(items) => items.iter().flat_map(placeholders).collect(),
        Value::Object(map) => map.values().flat_map(placeholders).collect(),
        _ => Vec::new(),
    }
}

/// A `{{name}}` occurrence: byte range of the whole placeholder and its trimmed name
struct Placeholder<'a> {
    start: usize,
    end: usize,
    name: &'a str,
}

/// Scan placeholders left to right. A placeholder runs from a `{{` to the
/// next `}}`; an unclosed `{{` ends the scan.
fn scan_placeholders(text: &str) -> Vec<Placeholder<'_>> {
    let mut found = Vec::new();
    let mut offset = 0;

    while let Some(rel) = text[offset..].find("{{") {
        let start = offset + rel;
        let Some(len) = text[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len + 2;
        found.push(Placeholder {
            start,
            end,
            name: text[start + 2..start + 2 + len].trim(),
        });
        offset = end;
    }

    found
}

/// Replace parameter placeholders in a string.
/// Placeholders are in the form {{param_name}}; unknown names are left as is.
fn replace_parameters(text: &str, params: &HashMap<String, String>) -> String {
    let mut result = String::with_capacity(text.len());
    let mut copied = 0;

    for placeholder in scan_placeholders(text) {
        result.push_str(&text[copied..placeholder.start]);
        match params.get(placeholder.name) {
            Some(value) => result.push_str(value),
            None => result.push_str(&text[placeholder.start..placeholder.end]),
        }
        copied = placeholder.end;
    }

    result.push_str(&text[copied..]);
    result
}

/// Extract parameter names from a template string
pub fn extract_parameters(text: &str) -> Vec<String> {
    scan_placeholders(text)
        .into_iter()
        .filter(|p| !p.name.is_empty())
        .map(|p| p.name.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StepStatus, WorkflowStatus};
    use serde_json::json;

    const CATALOG: &str = r#"
[[templates]]
id = "business-lookup"
name = "Business Lookup"
description = "Look up {{company}}"
category = "research"

[[templates.parameters]]
name = "company"
required = true

[[templates.parameters]]
name = "state"
default = "CA"

[[templates.steps]]
id = "search"
name = "Search registries"
tool_id = "entity-search"
inputs = { query = "{{company}}", filters = { state = "{{state}}" } }

[[templates.steps]]
id = "credit"
tool_id = "credit-report"
dependencies = ["search"]
timeout_secs = 60

[[templates.steps]]
id = "summary"
tool_id = "summarize"
dependencies = ["search", "credit"]
inputs = { format = "brief", tags = ["{{state}}", "kyb"] }

[[templates]]
id = "rate-quote"
name = "Rate Quote"

[[templates.steps]]
id = "quote"
tool_id = "rate-calculator"
inputs = { amount = 250000 }
"#;

    #[test]
    fn test_load_catalog() {
        let catalog = WorkflowCatalog::from_toml_str(CATALOG).unwrap();

        assert_eq!(catalog.list().len(), 2);
        let template = catalog.get("business-lookup").unwrap();
        assert_eq!(template.steps.len(), 3);
        assert_eq!(template.parameters.len(), 2);
        assert!(catalog.get("missing").is_none());

        let tools: Vec<_> = catalog.tool_ids().into_iter().collect();
        assert_eq!(
            tools,
            vec!["credit-report", "entity-search", "rate-calculator", "summarize"]
        );
    }

    #[test]
    fn test_instantiate_substitutes_parameters() {
        let catalog = WorkflowCatalog::from_toml_str(CATALOG).unwrap();
        let params = HashMap::from([("company".to_string(), "Acme LLC".to_string())]);

        let workflow = catalog.instantiate("business-lookup", &params).unwrap();

        assert_eq!(workflow.status, WorkflowStatus::Draft);
        assert_eq!(workflow.name, "Business Lookup");
        assert_eq!(workflow.description, "Look up Acme LLC");
        assert_eq!(workflow.template_id, Some(TemplateId::new("business-lookup")));

        let search = workflow.step(&StepId::new("search")).unwrap();
        assert_eq!(search.name, "Search registries");
        assert_eq!(search.inputs["query"], json!("Acme LLC"));
        assert_eq!(search.inputs["filters"], json!({"state": "CA"}));
        assert_eq!(search.status, StepStatus::Pending);

        let credit = workflow.step(&StepId::new("credit")).unwrap();
        assert_eq!(credit.name, "credit");
        assert_eq!(credit.dependencies, vec![StepId::new("search")]);
        assert_eq!(credit.timeout_secs, Some(60));

        let summary = workflow.step(&StepId::new("summary")).unwrap();
        assert_eq!(summary.inputs["tags"], json!(["CA", "kyb"]));
    }

    #[test]
    fn test_skeleton_keeps_graph_without_inputs() {
        let catalog = WorkflowCatalog::from_toml_str(CATALOG).unwrap();
        let skeleton = catalog.get("business-lookup").unwrap().skeleton();

        assert_eq!(skeleton.steps.len(), 3);
        assert!(skeleton.steps.iter().all(|s| s.inputs.is_empty()));
        let waves = WorkflowDag::from_workflow(&skeleton).waves();
        assert_eq!(
            waves,
            vec![
                vec![StepId::new("search")],
                vec![StepId::new("credit")],
                vec![StepId::new("summary")]
            ]
        );
    }

    #[test]
    fn test_instances_are_independent() {
        let catalog = WorkflowCatalog::from_toml_str(CATALOG).unwrap();
        let first = catalog.instantiate("rate-quote", &HashMap::new()).unwrap();
        let second = catalog.instantiate("rate-quote", &HashMap::new()).unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(first.steps[0].inputs["amount"], json!(250000));
    }

    #[test]
    fn test_missing_required_parameter() {
        let catalog = WorkflowCatalog::from_toml_str(CATALOG).unwrap();
        let err = catalog
            .instantiate("business-lookup", &HashMap::new())
            .unwrap_err();
        assert!(err.to_string().contains("Required parameter 'company'"));
    }

    #[test]
    fn test_unknown_template() {
        let catalog = WorkflowCatalog::from_toml_str(CATALOG).unwrap();
        let err = catalog.instantiate("nope", &HashMap::new()).unwrap_err();
        assert_eq!(err.to_string(), "Template 'nope' not found");
    }

    #[test]
    fn test_cyclic_template_rejected() {
        let err = WorkflowCatalog::from_toml_str(
            r#"
[[templates]]
id = "loop"
name = "Loop"

[[templates.steps]]
id = "a"
tool_id = "t"
dependencies = ["b"]

[[templates.steps]]
id = "b"
tool_id = "t"
dependencies = ["a"]
"#,
        )
        .unwrap_err();

        assert!(format!("{err:#}").contains("circular dependencies"));
    }

    #[test]
    fn test_undeclared_placeholder_rejected() {
        let err = WorkflowCatalog::from_toml_str(
            r#"
[[templates]]
id = "t"
name = "T"

[[templates.steps]]
id = "a"
tool_id = "t"
inputs = { who = "{{customer}}" }
"#,
        )
        .unwrap_err();

        assert!(err.to_string().contains("undeclared parameter 'customer'"));
    }

    #[test]
    fn test_duplicate_template_rejected() {
        let mut catalog = WorkflowCatalog::from_toml_str(CATALOG).unwrap();
        let duplicate = catalog.get("rate-quote").unwrap().clone();
        assert!(catalog.insert(duplicate).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("workflows.toml");
        std::fs::write(&path, CATALOG).unwrap();

        let catalog = WorkflowCatalog::load(&path).unwrap();
        assert_eq!(catalog.list().len(), 2);

        let err = WorkflowCatalog::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read workflow catalog"));
    }

    #[test]
    fn test_replace_parameters() {
        let params = HashMap::from([("company".to_string(), "Acme".to_string())]);
        assert_eq!(
            replace_parameters("{{ company }} / {{company}} / {{other}} / {{open", &params),
            "Acme / Acme / {{other}} / {{open"
        );
    }

    #[test]
    fn test_extract_parameters() {
        assert_eq!(
            extract_parameters("{{ company }} in {{state}} {{}} {{open"),
            vec!["company".to_string(), "state".to_string()]
        );
        assert!(extract_parameters("no placeholders").is_empty());
    }

    #[test]
    fn test_nested_braces_read_the_same_for_validation_and_substitution() {
        let text = "{{a {{company}}";
        assert_eq!(extract_parameters(text), vec!["a {{company".to_string()]);

        let params = HashMap::from([("company".to_string(), "Acme".to_string())]);
        assert_eq!(replace_parameters(text, &params), text);

        let err = WorkflowCatalog::from_toml_str(
            r#"
[[templates]]
id = "t"
name = "T"

[[templates.parameters]]
name = "company"
required = true

[[templates.steps]]
id = "a"
tool_id = "t"
inputs = { q = "{{a {{company}}" }
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("undeclared parameter 'a {{company'"));
    }
}
