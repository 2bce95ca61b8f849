use std::collections::HashMap;

use tracing::debug;

use crate::{
    config::IdentityPolicy,
    error::{EtlError, Result},
    models::{Node, PropertyRecord, SourceProperties, Triple},
    resolver::{ResolvedSources, SourceOrigin},
};

#[derive(Debug, Clone, Default)]
pub struct NodeTable {
    pub nodes: Vec<Node>,
    entity_by_type: HashMap<String, HashMap<String, usize>>,
    by_id: HashMap<String, usize>,
    pub entity_count: usize,
    pub source_count: usize,
}

impl NodeTable {
    pub fn entity_id(&self, node_type: &str, name: &str) -> Option<&str> {
        self.entity_by_type
            .get(node_type)
            .and_then(|names| names.get(name))
            .map(|&idx| self.nodes[idx].node_id.as_str())
    }

    pub fn get(&self, node_id: &str) -> Option<&Node> {
        self.by_id.get(node_id).map(|&idx| &self.nodes[idx])
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.by_id.contains_key(node_id)
    }

    fn push(&mut self, node: Node) -> Result<usize> {
        let idx = self.nodes.len();
        if let Some(&existing) = self.by_id.get(&node.node_id) {
            let first = &self.nodes[existing];
            return Err(EtlError::DuplicateNodeId {
                node_id: node.node_id.clone(),
                first: format!("{}:{}", first.node_type, first.name),
                second: format!("{}:{}", node.node_type, node.name),
            });
        }
        self.by_id.insert(node.node_id.clone(), idx);
        self.nodes.push(node);
        Ok(idx)
    }
}

pub fn build_nodes(
    triples: &[Triple],
    records: &[PropertyRecord],
    sources: &ResolvedSources,
    policy: &IdentityPolicy,
) -> Result<NodeTable> {
    let mut table = NodeTable::default();

    for triple in triples {
        for (node_type, name) in [
            (&triple.x_type, &triple.x_name),
            (&triple.y_type, &triple.y_name),
        ] {
            if *node_type == policy.source_type {
                continue;
            }
            let already = table
                .entity_by_type
                .get(node_type.as_str())
                .is_some_and(|names| names.contains_key(name.as_str()));
            if already {
                continue;
            }

            let node_id = format!("{}{}", policy.entity_id_prefix, table.entity_count);
            let idx = table.push(Node {
                node_id,
                node_type: node_type.clone(),
                name: name.clone(),
                source: None,
            })?;
            table
                .entity_by_type
                .entry(node_type.clone())
                .or_default()
                .insert(name.clone(), idx);
            table.entity_count += 1;
        }
    }

    for source in &sources.sources {
        let (name, properties) = match &source.origin {
            SourceOrigin::Known { record } => {
                let record = &records[*record];
                let name = record
                    .title
                    .as_ref()
                    .or(record.source_secondary.as_ref())
                    .or(record.source_primary.as_ref())
                    .unwrap_or(&record.external_source_id)
                    .clone();
                (name, SourceProperties::from(record))
            }
            SourceOrigin::Unvalidated => (source.node_id.clone(), SourceProperties::default()),
            SourceOrigin::Bare { raw } => (
                raw.clone(),
                SourceProperties {
                    source_primary: Some(policy.bare_source_label.clone()),
                    source_secondary: Some(raw.clone()),
                    ..SourceProperties::default()
                },
            ),
        };

        table.push(Node {
            node_id: source.node_id.clone(),
            node_type: policy.source_type.clone(),
            name,
            source: Some(properties),
        })?;
        table.source_count += 1;
    }

    debug!(
        entities = table.entity_count,
        sources = table.source_count,
        "Node table built"
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{resolve_sources, NameIdentityMap};

    fn triple(x: (&str, &str), y: (&str, &str), x_source: Option<&str>) -> Triple {
        Triple {
            x_name: x.1.to_string(),
            x_type: x.0.to_string(),
            relation: "RELATED_TO".to_string(),
            y_name: y.1.to_string(),
            y_type: y.0.to_string(),
            x_source: x_source.map(str::to_string),
            y_source: None,
            x_external_source_id: None,
            y_external_source_id: None,
            is_effective: None,
        }
    }

    fn build(triples: &[Triple], records: &[PropertyRecord]) -> Result<NodeTable> {
        let policy = IdentityPolicy::default();
        let map = NameIdentityMap::build(records, &policy);
        let sources = resolve_sources(triples, records, &map, &policy);
        build_nodes(triples, records, &sources, &policy)
    }

    #[test]
    fn entity_pairs_are_deduplicated_in_first_seen_order() {
        let triples = vec![
            triple(("Treatment", "Donepezil"), ("SideEffect", "Nausea"), None),
            triple(("Treatment", "Donepezil"), ("Disease", "Alzheimer's disease"), None),
            triple(("Drug", "Donepezil"), ("SideEffect", "Nausea"), None),
        ];

        let table = build(&triples, &[]).unwrap();
        let rows: Vec<(&str, &str, &str)> = table
            .nodes
            .iter()
            .map(|n| (n.node_id.as_str(), n.node_type.as_str(), n.name.as_str()))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("n_0", "Treatment", "Donepezil"),
                ("n_1", "SideEffect", "Nausea"),
                ("n_2", "Disease", "Alzheimer's disease"),
                ("n_3", "Drug", "Donepezil"),
            ]
        );
        assert_eq!(table.entity_id("Drug", "Donepezil"), Some("n_3"));
        assert_eq!(table.entity_id("Drug", "Nausea"), None);
    }

    #[test]
    fn known_source_carries_record_properties() {
        let records = vec![PropertyRecord {
            external_source_id: "es_9".to_string(),
            source_primary: Some("NICE".to_string()),
            source_secondary: Some("GuidelineX".to_string()),
            source_link: Some("https://example.org/x".to_string()),
            ..Default::default()
        }];
        let triples = vec![triple(
            ("Treatment", "Donepezil"),
            ("SideEffect", "Nausea"),
            Some("GuidelineX"),
        )];

        let table = build(&triples, &records).unwrap();
        let node = table.get("es_9").unwrap();
        assert_eq!(node.node_type, "source");
        assert_eq!(node.name, "GuidelineX");
        let props = node.source.as_ref().unwrap();
        assert_eq!(props.source_link.as_deref(), Some("https://example.org/x"));
        assert_eq!(props.title, None);
        assert_eq!(props.pubmed_id, None);
    }

    #[test]
    fn bare_source_gets_primary_label_and_raw_secondary() {
        let triples = vec![triple(
            ("Treatment", "Donepezil"),
            ("SideEffect", "Nausea"),
            Some("disgenet"),
        )];

        let table = build(&triples, &[]).unwrap();
        let node = table.get("s_0").unwrap();
        let props = node.source.as_ref().unwrap();
        assert_eq!(node.name, "disgenet");
        assert_eq!(props.source_primary.as_deref(), Some("PrimeKG"));
        assert_eq!(props.source_secondary.as_deref(), Some("disgenet"));
        assert_eq!(props.source_link, None);
    }

    #[test]
    fn source_typed_endpoints_are_not_entity_nodes() {
        let triples = vec![triple(
            ("Treatment", "Donepezil"),
            ("source", "Mayo Clinic"),
            None,
        )];

        let table = build(&triples, &[]).unwrap();
        assert_eq!(table.entity_count, 1);
        assert_eq!(table.source_count, 1);
        assert_eq!(table.entity_id("source", "Mayo Clinic"), None);
    }

    #[test]
    fn colliding_node_id_is_fatal() {
        let records = vec![PropertyRecord {
            external_source_id: "n_0".to_string(),
            source_secondary: Some("Odd export".to_string()),
            ..Default::default()
        }];
        let triples = vec![triple(
            ("Treatment", "Donepezil"),
            ("SideEffect", "Nausea"),
            Some("Odd export"),
        )];

        assert!(matches!(
            build(&triples, &records),
            Err(EtlError::DuplicateNodeId { ref node_id, .. }) if node_id == "n_0"
        ));
    }
}
