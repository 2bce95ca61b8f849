use std::collections::{hash_map::Entry, HashMap, HashSet};

use tracing::{debug, warn};

use crate::{
    config::IdentityPolicy,
    models::{PropertyRecord, Triple},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AliasSlot {
    Unique(usize),
    // Two different records claim this spelling; never resolve through it.
    Ambiguous,
}

#[derive(Debug, Default)]
struct AliasTier {
    slots: HashMap<String, AliasSlot>,
    ambiguous: usize,
}

impl AliasTier {
    fn register(&mut self, alias: String, record: usize) {
        if alias.is_empty() {
            return;
        }
        match self.slots.entry(alias) {
            Entry::Vacant(entry) => {
                entry.insert(AliasSlot::Unique(record));
            }
            Entry::Occupied(mut entry) => match *entry.get() {
                AliasSlot::Unique(existing) if existing != record => {
                    debug!(alias = %entry.key(), "Alias claimed by multiple sources, marking ambiguous");
                    entry.insert(AliasSlot::Ambiguous);
                    self.ambiguous += 1;
                }
                _ => {}
            },
        }
    }

    fn lookup(&self, alias: &str) -> Option<usize> {
        match self.slots.get(alias) {
            Some(AliasSlot::Unique(record)) => Some(*record),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchTier {
    Prefixed,
    Exact,
    Lowercase,
    Folded,
    Bare,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceIdentity {
    Known(usize),
    Unvalidated(String),
    Bare(String),
}

#[derive(Debug)]
pub struct NameIdentityMap {
    external_id_prefix: String,
    ids: HashMap<String, usize>,
    exact: AliasTier,
    lower: AliasTier,
    folded: AliasTier,
}

impl NameIdentityMap {
    pub fn build(records: &[PropertyRecord], policy: &IdentityPolicy) -> Self {
        let mut map = Self {
            external_id_prefix: policy.external_id_prefix.clone(),
            ids: HashMap::with_capacity(records.len()),
            exact: AliasTier::default(),
            lower: AliasTier::default(),
            folded: AliasTier::default(),
        };

        for (idx, record) in records.iter().enumerate() {
            map.ids.insert(record.external_source_id.clone(), idx);

            let spellings = [
                Some(record.external_source_id.as_str()),
                record.source_primary.as_deref(),
                record.source_secondary.as_deref(),
                record.title.as_deref(),
            ];
            for spelling in spellings.into_iter().flatten() {
                let spelling = spelling.trim();
                map.exact.register(spelling.to_string(), idx);
                map.lower.register(spelling.to_lowercase(), idx);
                map.folded.register(fold(spelling), idx);
            }
        }

        map
    }

    pub fn ambiguous_aliases(&self) -> usize {
        self.exact.ambiguous + self.lower.ambiguous + self.folded.ambiguous
    }

    pub fn record_for_id(&self, external_source_id: &str) -> Option<usize> {
        self.ids.get(external_source_id).copied()
    }

    pub fn classify(&self, raw: &str) -> (SourceIdentity, MatchTier) {
        let raw = raw.trim();

        if raw.starts_with(&self.external_id_prefix) {
            let identity = match self.record_for_id(raw) {
                Some(idx) => SourceIdentity::Known(idx),
                None => SourceIdentity::Unvalidated(raw.to_string()),
            };
            return (identity, MatchTier::Prefixed);
        }

        if let Some(idx) = self.exact.lookup(raw) {
            return (SourceIdentity::Known(idx), MatchTier::Exact);
        }

        let lowered = raw.to_lowercase();
        if let Some(idx) = self.lower.lookup(&lowered) {
            return (SourceIdentity::Known(idx), MatchTier::Lowercase);
        }

        let folded = fold(raw);
        if let Some(idx) = self.folded.lookup(&folded) {
            return (SourceIdentity::Known(idx), MatchTier::Folded);
        }

        let key = if folded.is_empty() { lowered } else { folded };
        (SourceIdentity::Bare(key), MatchTier::Bare)
    }
}

pub fn fold(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOrigin {
    Known { record: usize },
    Unvalidated,
    Bare { raw: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSource {
    pub node_id: String,
    pub origin: SourceOrigin,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub ambiguous_aliases: usize,
    pub unvalidated_external_ids: usize,
    pub bare_sources_created: usize,
    pub prefixed: usize,
    pub exact: usize,
    pub lowercase: usize,
    pub folded: usize,
    pub bare: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedSources {
    pub sources: Vec<CanonicalSource>,
    by_raw: HashMap<String, usize>,
    pub stats: ResolveStats,
}

impl ResolvedSources {
    pub fn lookup(&self, raw: &str) -> Option<&CanonicalSource> {
        self.by_raw
            .get(raw.trim())
            .map(|&idx| &self.sources[idx])
    }

    pub fn node_id_for(&self, raw: &str) -> Option<&str> {
        self.lookup(raw).map(|source| source.node_id.as_str())
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

struct SourceRegistry<'a> {
    map: &'a NameIdentityMap,
    records: &'a [PropertyRecord],
    policy: &'a IdentityPolicy,
    resolved: ResolvedSources,
    by_record: HashMap<usize, usize>,
    by_unvalidated: HashMap<String, usize>,
    by_bare_key: HashMap<String, usize>,
    warned: HashSet<String>,
}

impl<'a> SourceRegistry<'a> {
    fn observe(&mut self, raw: Option<&str>) {
        let Some(raw) = raw.map(str::trim).filter(|v| !v.is_empty()) else {
            return;
        };
        if self.resolved.by_raw.contains_key(raw) {
            return;
        }

        let (identity, tier) = self.map.classify(raw);
        match tier {
            MatchTier::Prefixed => self.resolved.stats.prefixed += 1,
            MatchTier::Exact => self.resolved.stats.exact += 1,
            MatchTier::Lowercase => self.resolved.stats.lowercase += 1,
            MatchTier::Folded => self.resolved.stats.folded += 1,
            MatchTier::Bare => self.resolved.stats.bare += 1,
        }

        let idx = match identity {
            SourceIdentity::Known(record) => self.known(record),
            SourceIdentity::Unvalidated(id) => self.unvalidated(id),
            SourceIdentity::Bare(key) => self.bare(key, raw),
        };
        self.resolved.by_raw.insert(raw.to_string(), idx);
    }

    fn known(&mut self, record: usize) -> usize {
        if let Some(&idx) = self.by_record.get(&record) {
            return idx;
        }
        let idx = self.push(CanonicalSource {
            node_id: self.records[record].external_source_id.clone(),
            origin: SourceOrigin::Known { record },
        });
        self.by_record.insert(record, idx);
        idx
    }

    fn unvalidated(&mut self, id: String) -> usize {
        if let Some(&idx) = self.by_unvalidated.get(&id) {
            return idx;
        }
        if self.warned.insert(id.clone()) {
            warn!(
                external_source_id = %id,
                "Prefixed source id has no property record, trusting as-is"
            );
        }
        self.resolved.stats.unvalidated_external_ids += 1;
        let idx = self.push(CanonicalSource {
            node_id: id.clone(),
            origin: SourceOrigin::Unvalidated,
        });
        self.by_unvalidated.insert(id, idx);
        idx
    }

    fn bare(&mut self, key: String, raw: &str) -> usize {
        if let Some(&idx) = self.by_bare_key.get(&key) {
            return idx;
        }
        let node_id = format!(
            "{}{}",
            self.policy.bare_id_prefix, self.resolved.stats.bare_sources_created
        );
        self.resolved.stats.bare_sources_created += 1;
        let idx = self.push(CanonicalSource {
            node_id,
            origin: SourceOrigin::Bare {
                raw: raw.to_string(),
            },
        });
        self.by_bare_key.insert(key, idx);
        idx
    }

    fn push(&mut self, source: CanonicalSource) -> usize {
        self.resolved.sources.push(source);
        self.resolved.sources.len() - 1
    }
}

// Traversal is row order, subject side before object side; on each side a
// source-typed endpoint name comes first, then the side's source reference.
// Bare ids are therefore assigned identically for identical inputs.
pub fn resolve_sources(
    triples: &[Triple],
    records: &[PropertyRecord],
    map: &NameIdentityMap,
    policy: &IdentityPolicy,
) -> ResolvedSources {
    let mut registry = SourceRegistry {
        map,
        records,
        policy,
        resolved: ResolvedSources::default(),
        by_record: HashMap::new(),
        by_unvalidated: HashMap::new(),
        by_bare_key: HashMap::new(),
        warned: HashSet::new(),
    };

    for triple in triples {
        if triple.x_type == policy.source_type {
            registry.observe(Some(&triple.x_name));
        }
        registry.observe(triple.subject_source_ref());

        if triple.y_type == policy.source_type {
            registry.observe(Some(&triple.y_name));
        }
        registry.observe(triple.object_source_ref());
    }

    if policy.emit_unreferenced_sources {
        for record in 0..records.len() {
            registry.known(record);
        }
    }

    let mut resolved = registry.resolved;
    resolved.stats.ambiguous_aliases = map.ambiguous_aliases();

    debug!(
        sources = resolved.sources.len(),
        spellings = resolved.by_raw.len(),
        bare = resolved.stats.bare_sources_created,
        "Source identities resolved"
    );
    resolved
}
