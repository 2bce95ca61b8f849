use std::collections::HashMap;

use tracing::{debug, warn};

use crate::{
    config::IdentityPolicy,
    models::{Edge, Effectiveness, Triple, SOURCE_RELATION},
    node_builder::NodeTable,
    resolver::ResolvedSources,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipStats {
    pub unresolved_endpoints: usize,
    pub unresolved_sources: usize,
    pub unparseable_effectiveness: usize,
    pub duplicate_edges_merged: usize,
    pub conflicting_effectiveness: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EdgeTable {
    pub edges: Vec<Edge>,
    by_key: HashMap<(String, String, String), Vec<usize>>,
    pub stats: RelationshipStats,
}

impl EdgeTable {
    // Inserts `edge` unless an equivalent one exists. A known effectiveness
    // upgrades an unknown duplicate in place; two different known values are
    // both kept.
    fn insert(&mut self, edge: Edge) {
        let key = (
            edge.start_id.clone(),
            edge.end_id.clone(),
            edge.relation_type.clone(),
        );
        let existing = self.by_key.entry(key).or_default();

        if existing.is_empty() {
            existing.push(self.edges.len());
            self.edges.push(edge);
            return;
        }

        match edge.is_effective {
            Effectiveness::Unknown => {
                self.stats.duplicate_edges_merged += 1;
            }
            Effectiveness::Known(value) => {
                if existing
                    .iter()
                    .any(|&idx| self.edges[idx].is_effective == Effectiveness::Known(value))
                {
                    self.stats.duplicate_edges_merged += 1;
                    return;
                }
                let unknown = existing
                    .iter()
                    .copied()
                    .find(|&idx| !self.edges[idx].is_effective.is_known());
                if let Some(idx) = unknown {
                    self.edges[idx].is_effective = Effectiveness::Known(value);
                    self.stats.duplicate_edges_merged += 1;
                    return;
                }
                warn!(
                    start_id = %edge.start_id,
                    end_id = %edge.end_id,
                    relation = %edge.relation_type,
                    "Conflicting effectiveness values for the same relationship, keeping both"
                );
                self.stats.conflicting_effectiveness += 1;
                existing.push(self.edges.len());
                self.edges.push(edge);
            }
        }
    }
}

pub fn build_relationships(
    triples: &[Triple],
    nodes: &NodeTable,
    sources: &ResolvedSources,
    policy: &IdentityPolicy,
) -> EdgeTable {
    let mut table = EdgeTable::default();

    let endpoint_id = |node_type: &str, name: &str| -> Option<String> {
        let id = if node_type == policy.source_type {
            sources.node_id_for(name)
        } else {
            nodes.entity_id(node_type, name)
        };
        id.filter(|id| nodes.contains(id)).map(str::to_string)
    };

    for triple in triples {
        let start = endpoint_id(&triple.x_type, &triple.x_name);
        let end = endpoint_id(&triple.y_type, &triple.y_name);

        let is_effective = match triple.is_effective.as_deref() {
            None => Effectiveness::Unknown,
            Some(raw) => Effectiveness::parse(raw).unwrap_or_else(|| {
                debug!(value = %raw, relation = %triple.relation, "Unparseable effectiveness value");
                table.stats.unparseable_effectiveness += 1;
                Effectiveness::Unknown
            }),
        };

        match (&start, &end) {
            (Some(start_id), Some(end_id)) => table.insert(Edge {
                start_id: start_id.clone(),
                end_id: end_id.clone(),
                relation_type: triple.relation.clone(),
                is_effective,
            }),
            _ => {
                debug!(
                    subject = %triple.x_name,
                    object = %triple.y_name,
                    relation = %triple.relation,
                    "Dropping relationship with unresolved endpoint"
                );
                table.stats.unresolved_endpoints += 1;
            }
        }

        let sides = [
            (start.as_deref(), triple.x_type.as_str(), triple.subject_source_ref()),
            (end.as_deref(), triple.y_type.as_str(), triple.object_source_ref()),
        ];
        for (owner, owner_type, source_ref) in sides {
            let (Some(owner), Some(source_ref)) = (owner, source_ref) else {
                continue;
            };
            if owner_type == policy.source_type {
                continue;
            }
            let Some(source_id) = sources
                .node_id_for(source_ref)
                .filter(|id| nodes.contains(id))
            else {
                table.stats.unresolved_sources += 1;
                continue;
            };
            table.insert(Edge {
                start_id: owner.to_string(),
                end_id: source_id.to_string(),
                relation_type: SOURCE_RELATION.to_string(),
                is_effective: Effectiveness::Unknown,
            });
        }
    }

    debug!(
        edges = table.edges.len(),
        merged = table.stats.duplicate_edges_merged,
        dropped = table.stats.unresolved_endpoints,
        "Relationship table built"
    );
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::PropertyRecord,
        node_builder::build_nodes,
        resolver::{resolve_sources, NameIdentityMap},
    };

    fn triple(
        x: (&str, &str),
        relation: &str,
        y: (&str, &str),
        sources: (Option<&str>, Option<&str>),
        is_effective: Option<&str>,
    ) -> Triple {
        Triple {
            x_name: x.1.to_string(),
            x_type: x.0.to_string(),
            relation: relation.to_string(),
            y_name: y.1.to_string(),
            y_type: y.0.to_string(),
            x_source: sources.0.map(str::to_string),
            y_source: sources.1.map(str::to_string),
            x_external_source_id: None,
            y_external_source_id: None,
            is_effective: is_effective.map(str::to_string),
        }
    }

    fn build(triples: &[Triple], records: &[PropertyRecord]) -> (NodeTable, EdgeTable) {
        let policy = IdentityPolicy::default();
        let map = NameIdentityMap::build(records, &policy);
        let sources = resolve_sources(triples, records, &map, &policy);
        let nodes = build_nodes(triples, records, &sources, &policy).unwrap();
        let edges = build_relationships(triples, &nodes, &sources, &policy);
        (nodes, edges)
    }

    fn edge_rows(edges: &EdgeTable) -> Vec<(&str, &str, &str, Effectiveness)> {
        edges
            .edges
            .iter()
            .map(|e| {
                (
                    e.start_id.as_str(),
                    e.end_id.as_str(),
                    e.relation_type.as_str(),
                    e.is_effective,
                )
            })
            .collect()
    }

    #[test]
    fn side_effect_scenario_produces_main_and_source_edges() {
        let records = vec![PropertyRecord {
            external_source_id: "es_9".to_string(),
            source_secondary: Some("GuidelineX".to_string()),
            ..Default::default()
        }];
        let triples = vec![triple(
            ("Treatment", "Donepezil"),
            "HAS_SIDE_EFFECT",
            ("SideEffect", "Nausea"),
            (Some("GuidelineX"), Some("GuidelineX")),
            None,
        )];

        let (nodes, edges) = build(&triples, &records);
        assert_eq!(nodes.nodes.len(), 3);
        assert_eq!(
            edge_rows(&edges),
            vec![
                ("n_0", "n_1", "HAS_SIDE_EFFECT", Effectiveness::Unknown),
                ("n_0", "es_9", "SOURCE", Effectiveness::Unknown),
                ("n_1", "es_9", "SOURCE", Effectiveness::Unknown),
            ]
        );
    }

    #[test]
    fn redundant_rows_collapse() {
        let row = triple(
            ("Treatment", "Donepezil"),
            "TREATS",
            ("Disease", "AD"),
            (Some("PrimeKG"), Some("PrimeKG")),
            None,
        );
        let (_, edges) = build(&[row.clone(), row], &[]);
        assert_eq!(edges.edges.len(), 3);
        assert_eq!(edges.stats.duplicate_edges_merged, 3);
    }

    #[test]
    fn known_effectiveness_upgrades_unknown_duplicate() {
        let triples = vec![
            triple(("Drug", "A"), "TREATS", ("Disease", "AD"), (None, None), None),
            triple(("Drug", "A"), "TREATS", ("Disease", "AD"), (None, None), Some("1")),
            triple(("Drug", "A"), "TREATS", ("Disease", "AD"), (None, None), Some("1.0")),
        ];
        let (_, edges) = build(&triples, &[]);
        assert_eq!(
            edge_rows(&edges),
            vec![("n_0", "n_1", "TREATS", Effectiveness::Known(1))]
        );
        assert_eq!(edges.stats.duplicate_edges_merged, 2);
    }

    #[test]
    fn conflicting_known_values_are_both_kept() {
        let triples = vec![
            triple(("Drug", "A"), "TREATS", ("Disease", "AD"), (None, None), Some("1")),
            triple(("Drug", "A"), "TREATS", ("Disease", "AD"), (None, None), Some("0")),
            triple(("Drug", "A"), "TREATS", ("Disease", "AD"), (None, None), None),
        ];
        let (_, edges) = build(&triples, &[]);
        assert_eq!(edges.edges.len(), 2);
        assert_eq!(edges.stats.conflicting_effectiveness, 1);
        assert_eq!(edges.edges[1].is_effective, Effectiveness::Known(0));
    }

    #[test]
    fn unparseable_effectiveness_is_unknown_and_counted() {
        let triples = vec![triple(
            ("Drug", "A"),
            "TREATS",
            ("Disease", "AD"),
            (None, None),
            Some("probably"),
        )];
        let (_, edges) = build(&triples, &[]);
        assert_eq!(edges.edges[0].is_effective, Effectiveness::Unknown);
        assert_eq!(edges.stats.unparseable_effectiveness, 1);
    }

    #[test]
    fn source_typed_endpoint_links_to_source_node_without_source_edge() {
        let triples = vec![triple(
            ("Treatment", "Donepezil"),
            "RECOMMENDED_BY",
            ("source", "Mayo Clinic"),
            (Some("PrimeKG"), Some("PrimeKG")),
            None,
        )];
        let (nodes, edges) = build(&triples, &[]);
        let rows = edge_rows(&edges);
        assert_eq!(rows[0], ("n_0", "s_1", "RECOMMENDED_BY", Effectiveness::Unknown));
        assert_eq!(rows[1], ("n_0", "s_0", "SOURCE", Effectiveness::Unknown));
        assert_eq!(rows.len(), 2);
        assert_eq!(nodes.get("s_1").map(|n| n.name.as_str()), Some("Mayo Clinic"));
    }

    #[test]
    fn every_edge_endpoint_exists_and_source_edges_end_at_sources() {
        let triples = vec![
            triple(("Drug", "A"), "TREATS", ("Disease", "AD"), (Some("x"), Some("es_3")), Some("1")),
            triple(("Drug", "B"), "TREATS", ("Disease", "AD"), (Some("X "), None), None),
            triple(("Symptom", "Apathy"), "STAGE_OF", ("Stage", "Mild"), (None, Some("y")), None),
        ];
        let (nodes, edges) = build(&triples, &[]);
        for edge in &edges.edges {
            assert!(nodes.contains(&edge.start_id), "{edge:?}");
            assert!(nodes.contains(&edge.end_id), "{edge:?}");
            if edge.relation_type == SOURCE_RELATION {
                assert_eq!(nodes.get(&edge.end_id).unwrap().node_type, "source");
                assert_ne!(nodes.get(&edge.start_id).unwrap().node_type, "source");
            }
        }
    }
}
