//! In-memory declaration graph.
//!
//! A [`Stack`] records resource declarations and exported outputs in program order and
//! renders them as a YAML program for the orchestration engine. References between
//! resources use the engine's interpolation syntax: `${name}` for the resource itself and
//! `${name.path}` for one of its properties. Nothing is applied here; the engine owns
//! ordering, parallelism and state.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;

use crate::{Error, Result};

/// Handle to an already-declared resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    name: String,
}

impl ResourceRef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Interpolation referencing the resource itself.
    pub fn handle(&self) -> String {
        format!("${{{}}}", self.name)
    }

    /// Interpolation referencing one of the resource's output properties.
    pub fn output(&self, path: &str) -> String {
        format!("${{{}.{}}}", self.name, path)
    }

    pub fn id(&self) -> String {
        self.output("id")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceOptions {
    parent: Option<String>,
    depends_on: Vec<String>,
    provider: Option<String>,
    ignore_changes: Vec<String>,
    delete_before_replace: bool,
}

impl ResourceOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parent(mut self, parent: &ResourceRef) -> Self {
        self.parent = Some(parent.name.clone());
        self
    }

    pub fn depends_on<'a>(mut self, resources: impl IntoIterator<Item = &'a ResourceRef>) -> Self {
        for resource in resources {
            if !self.depends_on.contains(&resource.name) {
                self.depends_on.push(resource.name.clone());
            }
        }
        self
    }

    pub fn provider(mut self, provider: &ResourceRef) -> Self {
        self.provider = Some(provider.name.clone());
        self
    }

    pub fn ignore_changes(mut self, properties: &[&str]) -> Self {
        self.ignore_changes
            .extend(properties.iter().map(|p| p.to_string()));
        self
    }

    pub fn delete_before_replace(mut self, enabled: bool) -> Self {
        self.delete_before_replace = enabled;
        self
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn provider_name(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn ignored_changes(&self) -> &[String] {
        &self.ignore_changes
    }

    pub fn is_delete_before_replace(&self) -> bool {
        self.delete_before_replace
    }

    fn referenced(&self) -> impl Iterator<Item = &str> {
        self.parent
            .iter()
            .chain(self.provider.iter())
            .chain(self.depends_on.iter())
            .map(String::as_str)
    }
}

/// A single resource request as handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub r#type: String,
    pub properties: Value,
    pub options: ResourceOptions,
    /// Id of an existing object to read instead of creating one.
    pub existing_id: Option<String>,
}

#[derive(Debug, Default)]
pub struct Stack {
    name: String,
    order: Vec<String>,
    resources: HashMap<String, Declaration>,
    outputs: BTreeMap<String, Value>,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declare a resource. Every resource it refers to, through options or through
    /// interpolations inside `properties`, must already be declared.
    pub fn declare(
        &mut self,
        name: &str,
        r#type: &str,
        properties: Value,
        options: ResourceOptions,
    ) -> Result<ResourceRef> {
        self.insert(
            name,
            Declaration {
                r#type: r#type.to_string(),
                properties,
                options,
                existing_id: None,
            },
        )
    }

    /// Read an object that already exists, typically one created as a side effect of
    /// another resource. Its outputs are referenced like those of a declared resource.
    pub fn read(
        &mut self,
        name: &str,
        r#type: &str,
        id: &str,
        options: ResourceOptions,
    ) -> Result<ResourceRef> {
        self.insert(
            name,
            Declaration {
                r#type: r#type.to_string(),
                properties: Value::Null,
                options,
                existing_id: Some(id.to_string()),
            },
        )
    }

    fn insert(&mut self, name: &str, declaration: Declaration) -> Result<ResourceRef> {
        if self.resources.contains_key(name) {
            return Err(Error::DuplicateResource(name.to_string()));
        }

        let mut referenced = Vec::new();
        collect_references(&declaration.properties, &mut referenced);
        for reference in declaration.options.referenced().chain(referenced) {
            if !self.resources.contains_key(reference) {
                return Err(Error::UnknownResource {
                    resource: name.to_string(),
                    reference: reference.to_string(),
                });
            }
        }

        tracing::debug!(
            resource = name,
            resource_type = %declaration.r#type,
            existing = declaration.existing_id.is_some(),
            "declared resource"
        );

        self.order.push(name.to_string());
        self.resources.insert(name.to_string(), declaration);

        Ok(ResourceRef {
            name: name.to_string(),
        })
    }

    /// Export a named stack output. Keys are write-once.
    pub fn export(&mut self, key: &str, value: impl Into<Value>) -> Result<()> {
        if self.outputs.contains_key(key) {
            return Err(Error::DuplicateOutput(key.to_string()));
        }

        let value = value.into();
        let mut referenced = Vec::new();
        collect_references(&value, &mut referenced);
        if let Some(reference) = referenced
            .into_iter()
            .find(|r| !self.resources.contains_key(*r))
        {
            return Err(Error::UnknownResource {
                resource: format!("output {key}"),
                reference: reference.to_string(),
            });
        }

        self.outputs.insert(key.to_string(), value);
        Ok(())
    }

    pub fn resource(&self, name: &str) -> Option<&Declaration> {
        self.resources.get(name)
    }

    /// Declarations in program order.
    pub fn resources(&self) -> impl Iterator<Item = (&str, &Declaration)> {
        self.order
            .iter()
            .filter_map(|name| self.resources.get(name).map(|d| (name.as_str(), d)))
    }

    pub fn resources_of_type<'a>(
        &'a self,
        r#type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a Declaration)> {
        self.resources().filter(move |(_, d)| d.r#type == r#type)
    }

    pub fn outputs(&self) -> &BTreeMap<String, Value> {
        &self.outputs
    }

    pub fn program(&self) -> Program {
        Program {
            name: self.name.clone(),
            runtime: "yaml",
            description: format!("Kubernetes cluster stack {}", self.name),
            resources: self
                .resources
                .iter()
                .map(|(name, declaration)| (name.clone(), ProgramResource::from(declaration)))
                .collect(),
            outputs: self.outputs.clone(),
        }
    }
}

/// Resource names referenced by `${...}` interpolations anywhere inside `value`.
fn collect_references<'a>(value: &'a Value, into: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => into.extend(interpolated_resources(s)),
        Value::Array(items) => items.iter().for_each(|v| collect_references(v, into)),
        Value::Object(map) => {
            for (key, v) in map {
                into.extend(interpolated_resources(key));
                collect_references(v, into);
            }
        }
        _ => {}
    }
}

fn interpolated_resources(s: &str) -> Vec<&str> {
    let mut found = Vec::new();
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        // `$$` is a literal `$`, so only an odd run of dollars escapes the interpolation
        let dollars = rest[..start].chars().rev().take_while(|c| *c == '$').count();
        let escaped = dollars % 2 == 1;
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        if !escaped {
            let expr = &after[..end];
            let root = expr
                .split(['.', '['])
                .next()
                .unwrap_or(expr)
                .trim();
            if !root.is_empty() {
                found.push(root);
            }
        }
        rest = &after[end + 1..];
    }

    found
}

#[derive(Debug, Clone, Serialize)]
pub struct Program {
    pub name: String,
    pub runtime: &'static str,
    pub description: String,
    pub resources: BTreeMap<String, ProgramResource>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Value>,
}

impl Program {
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgramResource {
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(skip_serializing_if = "ProgramOptions::is_empty")]
    pub options: ProgramOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub get: Option<ExistingResource>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExistingResource {
    pub id: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub ignore_changes: Vec<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub delete_before_replace: bool,
}

impl ProgramOptions {
    fn is_empty(&self) -> bool {
        self.parent.is_none()
            && self.depends_on.is_empty()
            && self.provider.is_none()
            && self.ignore_changes.is_empty()
            && !self.delete_before_replace
    }
}

impl From<&Declaration> for ProgramResource {
    fn from(declaration: &Declaration) -> Self {
        let handle = |name: &String| format!("${{{name}}}");
        let options = &declaration.options;

        Self {
            r#type: declaration.r#type.clone(),
            properties: declaration.properties.clone(),
            options: ProgramOptions {
                parent: options.parent.as_ref().map(handle),
                depends_on: options.depends_on.iter().map(handle).collect(),
                provider: options.provider.as_ref().map(handle),
                ignore_changes: options.ignore_changes.clone(),
                delete_before_replace: options.delete_before_replace,
            },
            get: declaration
                .existing_id
                .clone()
                .map(|id| ExistingResource { id }),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn stack_with_vpc() -> (Stack, ResourceRef) {
        let mut stack = Stack::new("test");
        let vpc = stack
            .declare(
                "vpc",
                "gcp:compute:Network",
                json!({ "autoCreateSubnetworks": false }),
                ResourceOptions::new(),
            )
            .unwrap();
        (stack, vpc)
    }

    #[test]
    fn references_render_as_interpolations() {
        let (_, vpc) = stack_with_vpc();
        assert_eq!(vpc.handle(), "${vpc}");
        assert_eq!(vpc.output("selfLink"), "${vpc.selfLink}");
        assert_eq!(vpc.id(), "${vpc.id}");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let (mut stack, _) = stack_with_vpc();
        let err = stack
            .declare("vpc", "gcp:compute:Network", json!({}), ResourceOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateResource(name) if name == "vpc"));
    }

    #[test]
    fn property_references_must_be_declared_first() {
        let (mut stack, vpc) = stack_with_vpc();

        stack
            .declare(
                "router",
                "gcp:compute:Router",
                json!({ "network": vpc.output("selfLink") }),
                ResourceOptions::new().parent(&vpc),
            )
            .unwrap();

        let err = stack
            .declare(
                "nat",
                "gcp:compute:RouterNat",
                json!({ "natIps": ["${router-nat-ip.selfLink}"] }),
                ResourceOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            Error::UnknownResource { resource, reference }
                if resource == "nat" && reference == "router-nat-ip"
        ));
        assert!(stack.resource("nat").is_none());
    }

    #[test]
    fn option_references_must_be_declared_first() {
        let mut stack = Stack::new("test");
        let ghost = ResourceRef {
            name: "ghost".to_string(),
        };
        let err = stack
            .declare(
                "subnet",
                "gcp:compute:Subnetwork",
                json!({}),
                ResourceOptions::new().depends_on([&ghost]),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource { reference, .. } if reference == "ghost"));
    }

    #[rstest]
    #[case("${vpc.selfLink}", vec!["vpc"])]
    #[case("serviceAccount:${cluster-project.number}@cloudservices.gserviceaccount.com", vec!["cluster-project"])]
    #[case("${a.b}-${c[0].d}", vec!["a", "c"])]
    #[case("$${literal}", vec![])]
    #[case("$$${vpc.id}", vec!["vpc"])]
    #[case("$$$${literal}-${vpc}", vec!["vpc"])]
    #[case("no interpolation", vec![])]
    fn finds_interpolated_resources(#[case] input: &str, #[case] expected: Vec<&str>) {
        assert_eq!(interpolated_resources(input), expected);
    }

    #[test]
    fn literal_dollar_before_interpolation_is_still_checked() {
        let mut stack = Stack::new("test");
        let err = stack
            .declare(
                "router",
                "gcp:compute:Router",
                json!({ "description": "costs $$${ghost.price}" }),
                ResourceOptions::new(),
            )
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource { reference, .. } if reference == "ghost"));
    }

    #[test]
    fn read_resources_render_a_get_and_are_referencable() {
        let (mut stack, vpc) = stack_with_vpc();
        let secret = stack
            .read(
                "anchor-secret",
                "kubernetes:core/v1:Secret",
                "linkerd/linkerd-trust-anchor",
                ResourceOptions::new().depends_on([&vpc]),
            )
            .unwrap();
        stack
            .declare(
                "consumer",
                "kubernetes:core/v1:ConfigMap",
                json!({ "data": { "ca": secret.output("data[\"ca.crt\"]") } }),
                ResourceOptions::new(),
            )
            .unwrap();

        let program = serde_json::to_value(stack.program()).unwrap();
        let read = &program["resources"]["anchor-secret"];
        assert_eq!(read["get"]["id"], "linkerd/linkerd-trust-anchor");
        assert!(read.get("properties").is_none());
        assert_eq!(read["options"]["dependsOn"], json!(["${vpc}"]));
        assert!(program["resources"]["consumer"].get("get").is_none());

        let err = stack
            .read("anchor-secret", "kubernetes:core/v1:Secret", "x/y", ResourceOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateResource(name) if name == "anchor-secret"));
    }

    #[test]
    fn outputs_are_write_once() {
        let (mut stack, vpc) = stack_with_vpc();
        stack.export("network-self-link", vpc.output("selfLink")).unwrap();
        let err = stack
            .export("network-self-link", vpc.output("selfLink"))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateOutput(key) if key == "network-self-link"));
    }

    #[test]
    fn outputs_must_reference_declared_resources() {
        let mut stack = Stack::new("test");
        let err = stack
            .export("cluster-endpoint", "${cluster.endpoint}")
            .unwrap_err();
        assert!(matches!(err, Error::UnknownResource { reference, .. } if reference == "cluster"));
    }

    #[test]
    fn program_renders_options_as_handles() {
        let (mut stack, vpc) = stack_with_vpc();
        let provider = stack
            .declare(
                "gcp-provider",
                "pulumi:providers:gcp",
                json!({}),
                ResourceOptions::new(),
            )
            .unwrap();
        stack
            .declare(
                "firewall",
                "gcp:compute:Firewall",
                json!({ "network": vpc.output("name") }),
                ResourceOptions::new()
                    .parent(&vpc)
                    .provider(&provider)
                    .depends_on([&vpc])
                    .ignore_changes(&["sourceRanges"])
                    .delete_before_replace(true),
            )
            .unwrap();

        let program = serde_json::to_value(stack.program()).unwrap();
        let firewall = &program["resources"]["firewall"];
        assert_eq!(firewall["type"], "gcp:compute:Firewall");
        assert_eq!(firewall["options"]["parent"], "${vpc}");
        assert_eq!(firewall["options"]["provider"], "${gcp-provider}");
        assert_eq!(firewall["options"]["dependsOn"], json!(["${vpc}"]));
        assert_eq!(firewall["options"]["ignoreChanges"], json!(["sourceRanges"]));
        assert_eq!(firewall["options"]["deleteBeforeReplace"], true);
        assert!(program["resources"]["vpc"].get("options").is_none());
        assert_eq!(program["runtime"], "yaml");
    }

    #[test]
    fn resources_iterate_in_declaration_order() {
        let (mut stack, vpc) = stack_with_vpc();
        stack
            .declare(
                "a-subnet",
                "gcp:compute:Subnetwork",
                json!({ "network": vpc.id() }),
                ResourceOptions::new(),
            )
            .unwrap();
        let names: Vec<_> = stack.resources().map(|(name, _)| name).collect();
        assert_eq!(names, ["vpc", "a-subnet"]);
    }
}
