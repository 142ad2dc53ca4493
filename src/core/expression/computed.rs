use crate::core::error::AppError;
use crate::core::expression::{ExprValue, ExpressionEngine};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use signalbox_types::ErrorCategory;
use std::collections::HashMap;
use tracing::warn;

/// A computed parameter to resolve: its expression and declared dependencies.
#[derive(Debug, Clone)]
pub struct ComputedSpec {
    pub name: String,
    pub expr: String,
    pub depends_on: Vec<String>,
}

/// Resolve computed parameters in dependency order.
///
/// The result contains `initial` plus every successfully computed value.
/// Explicitly supplied values win over computed ones. A dependency cycle is
/// fatal and names the cycle members; a single failing expression is logged
/// and its value omitted.
pub fn resolve_computed_parameters(
    specs: &[ComputedSpec],
    initial: &HashMap<String, ExprValue>,
) -> Result<HashMap<String, ExprValue>, AppError> {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut nodes: HashMap<&str, NodeIndex> = HashMap::new();
    let by_name: HashMap<&str, &ComputedSpec> =
        specs.iter().map(|s| (s.name.as_str(), s)).collect();

    for spec in specs {
        let node = graph.add_node(spec.name.as_str());
        nodes.insert(spec.name.as_str(), node);
    }
    for spec in specs {
        for dep in &spec.depends_on {
            // Only dependencies on other computed parameters order evaluation;
            // plain parameters are already present in the initial context.
            if let Some(&dep_node) = nodes.get(dep.as_str()) {
                graph.add_edge(dep_node, nodes[spec.name.as_str()], ());
            }
        }
    }

    let order = toposort(&graph, None).map_err(|_| {
        let members = cycle_members(&graph);
        AppError::new(
            ErrorCategory::CircularDependency,
            format!(
                "circular dependency among computed parameters: {}",
                members.join(" -> ")
            ),
        )
        .with_code("RTR-EXPR-006")
    })?;

    let mut engine = ExpressionEngine::new();
    engine.set_context(initial.clone());
    let mut resolved = initial.clone();

    for node in order {
        let name = graph[node];
        let spec = by_name[name];
        if initial.contains_key(name) {
            // Explicit value wins; it is already in the context.
            continue;
        }
        match engine.evaluate(&spec.expr) {
            Ok(value) => {
                engine.set_variable(name, value.clone());
                resolved.insert(name.to_string(), value);
            }
            Err(err) => {
                warn!(parameter = name, error = %err, "computed parameter failed; omitting value");
            }
        }
    }

    Ok(resolved)
}

fn cycle_members(graph: &DiGraph<&str, ()>) -> Vec<String> {
    let mut members = Vec::new();
    for component in tarjan_scc(graph) {
        let cyclic = component.len() > 1
            || component
                .first()
                .map(|&n| graph.find_edge(n, n).is_some())
                .unwrap_or(false);
        if cyclic {
            for node in component {
                members.push(graph[node].to_string());
            }
        }
    }
    members.sort();
    members
}
