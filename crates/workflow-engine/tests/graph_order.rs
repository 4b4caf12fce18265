//! Ordering properties of randomly generated acyclic graphs.

use std::collections::HashMap;

use clipflow_workflow::{GraphError, WorkflowGraph};
use proptest::prelude::*;
use serde_json::{json, Value};

/// Nodes carry a random rank; edges only run from lower to higher
/// `(rank, index)`, so every generated graph is acyclic while its edges
/// still disagree with declaration order.
fn acyclic_graph() -> impl Strategy<Value = WorkflowGraph> {
    (1usize..14)
        .prop_flat_map(|n| {
            (
                prop::collection::vec(0u32..6, n),
                prop::collection::vec(any::<bool>(), n),
                prop::collection::vec(any::<bool>(), n * n),
            )
        })
        .prop_map(|(ranks, disabled, links)| {
            let n = ranks.len();
            let steps: Vec<Value> = (0..n)
                .map(|i| {
                    json!({
                        "id": format!("s{i}"),
                        "category": "utility",
                        "type": "pass_through",
                        "disabled": disabled[i] && i % 3 == 0,
                    })
                })
                .collect();
            let mut edges = Vec::new();
            for i in 0..n {
                for j in 0..n {
                    if i != j && links[i * n + j] && (ranks[i], i) < (ranks[j], j) {
                        edges.push(json!({ "source": format!("s{i}"), "target": format!("s{j}") }));
                    }
                }
            }
            serde_json::from_value(json!({ "id": "wf", "steps": steps, "edges": edges }))
                .expect("generated graph is well formed")
        })
}

proptest! {
    #[test]
    fn prop_order_covers_enabled_steps_once(graph in acyclic_graph()) {
        let order = graph.topological_order().unwrap();
        let mut ids: Vec<&str> = order.iter().map(|s| s.id.as_str()).collect();
        let mut expected: Vec<&str> = graph
            .steps
            .iter()
            .filter(|s| !s.disabled)
            .map(|s| s.id.as_str())
            .collect();
        ids.sort_unstable();
        expected.sort_unstable();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn prop_order_respects_enabled_edges(graph in acyclic_graph()) {
        let order = graph.topological_order().unwrap();
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, s)| (s.id.as_str(), i))
            .collect();
        for edge in &graph.edges {
            if let (Some(src), Some(dst)) = (
                position.get(edge.source.as_str()),
                position.get(edge.target.as_str()),
            ) {
                prop_assert!(src < dst, "{} must precede {}", edge.source, edge.target);
            }
        }
    }

    #[test]
    fn prop_closing_a_path_is_a_cycle(graph in acyclic_graph()) {
        let mut graph = graph;
        for step in &mut graph.steps {
            step.disabled = false;
        }
        let Some(edge) = graph.edges.first().cloned() else {
            return Ok(());
        };
        graph.edges.push(clipflow_workflow::Edge::new(edge.target.clone(), edge.source.clone()));
        let result = graph.topological_order();
        let is_cycle = matches!(result, Err(GraphError::Cycle { .. }));
        prop_assert!(is_cycle);
    }
}
