//! Transaction-scoped cache.
//!
//! One `TxCache` belongs to exactly one open transaction and is never
//! shared. It records every concept the transaction touched, with typed
//! views over castings, relations and resources for the validator and the
//! commit log, batches instance-count deltas per type, and keeps read-through
//! id and label lookups. It is cleared when the transaction commits or rolls
//! back.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tessera_core::BaseType;

use crate::concept::{Casting, Concept, ConceptHandle, ConceptId, Relation, RelationType, Resource};

#[derive(Debug, Default)]
pub struct TxCache {
    modified: BTreeMap<ConceptId, BaseType>,
    castings: BTreeSet<ConceptId>,
    /// relation -> its relation type
    relations: BTreeMap<ConceptId, ConceptId>,
    resources: BTreeSet<ConceptId>,
    /// type -> pending instance-count delta
    instance_counts: BTreeMap<ConceptId, i64>,
    concepts: HashMap<ConceptId, Concept>,
    types: HashMap<String, Concept>,
    clears: usize,
}

impl TxCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Tracking ─────────────────────────────────────────────────

    /// Record a concept as modified. Repeated calls are no-ops.
    pub fn track(&mut self, concept: Concept) {
        self.modified.entry(concept.id).or_insert(concept.base_type);
    }

    pub fn track_casting(&mut self, casting: Casting) {
        self.track(casting.concept());
        self.castings.insert(casting.id());
    }

    pub fn track_relation(&mut self, relation: Relation, relation_type: RelationType) {
        self.track(relation.concept());
        self.relations.insert(relation.id(), relation_type.id());
    }

    pub fn track_resource(&mut self, resource: Resource) {
        self.track(resource.concept());
        self.resources.insert(resource.id());
    }

    /// Accumulate an instance-count change for `type_id`. Deltas are written
    /// to the shared counter once, at commit.
    pub fn adjust_instance_count(&mut self, type_id: ConceptId, delta: i64) {
        let entry = self.instance_counts.entry(type_id).or_insert(0);
        *entry += delta;
        if *entry == 0 {
            self.instance_counts.remove(&type_id);
        }
    }

    // ── Read-through Lookups ─────────────────────────────────────

    pub fn get_cached_concept(&self, id: ConceptId) -> Option<Concept> {
        self.concepts.get(&id).copied()
    }

    pub fn cache_concept(&mut self, concept: Concept) {
        self.concepts.insert(concept.id, concept);
    }

    pub fn get_cached_type(&self, label: &str) -> Option<Concept> {
        self.types.get(label).copied()
    }

    pub fn cache_type(&mut self, label: &str, concept: Concept) {
        self.types.insert(label.to_string(), concept);
        self.concepts.insert(concept.id, concept);
    }

    /// Forget a concept deleted within this transaction.
    pub fn evict(&mut self, id: ConceptId) {
        self.concepts.remove(&id);
        self.types.retain(|_, c| c.id != id);
    }

    // ── Views ────────────────────────────────────────────────────

    pub fn is_modified(&self, id: ConceptId) -> bool {
        self.modified.contains_key(&id)
    }

    pub fn modified(&self) -> impl Iterator<Item = Concept> + '_ {
        self.modified
            .iter()
            .map(|(id, base)| Concept::new(*id, *base))
    }

    pub fn modified_of_kind(&self, kind: BaseType) -> Vec<ConceptId> {
        self.modified
            .iter()
            .filter(|(_, base)| **base == kind)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn modified_castings(&self) -> &BTreeSet<ConceptId> {
        &self.castings
    }

    pub fn modified_relations(&self) -> &BTreeMap<ConceptId, ConceptId> {
        &self.relations
    }

    pub fn modified_resources(&self) -> &BTreeSet<ConceptId> {
        &self.resources
    }

    pub fn pending_instance_count(&self, type_id: ConceptId) -> i64 {
        self.instance_counts.get(&type_id).copied().unwrap_or(0)
    }

    pub fn instance_count_deltas(&self) -> &BTreeMap<ConceptId, i64> {
        &self.instance_counts
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// True when every collection, read caches included, is empty.
    pub fn is_empty(&self) -> bool {
        self.modified.is_empty()
            && self.castings.is_empty()
            && self.relations.is_empty()
            && self.resources.is_empty()
            && self.instance_counts.is_empty()
            && self.concepts.is_empty()
            && self.types.is_empty()
    }

    pub fn clear(&mut self) {
        self.modified.clear();
        self.castings.clear();
        self.relations.clear();
        self.resources.clear();
        self.instance_counts.clear();
        self.concepts.clear();
        self.types.clear();
        self.clears += 1;
    }

    /// How many times `clear` has run.
    pub fn clear_count(&self) -> usize {
        self.clears
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(id: u64) -> Relation {
        Relation::wrap(ConceptId(id))
    }

    #[test]
    fn track_is_idempotent() {
        let mut cache = TxCache::new();
        let c = Concept::new(ConceptId(1), BaseType::Entity);
        cache.track(c);
        cache.track(c);
        assert_eq!(cache.modified().count(), 1);
        assert!(cache.is_modified(ConceptId(1)));
    }

    #[test]
    fn typed_tracking_populates_views() {
        let mut cache = TxCache::new();
        cache.track_casting(Casting::wrap(ConceptId(2)));
        cache.track_relation(relation(3), RelationType::wrap(ConceptId(9)));
        cache.track_relation(relation(3), RelationType::wrap(ConceptId(9)));
        cache.track_resource(Resource::wrap(ConceptId(4)));

        assert_eq!(cache.modified().count(), 3);
        assert_eq!(cache.modified_castings().len(), 1);
        assert_eq!(cache.modified_relations().get(&ConceptId(3)), Some(&ConceptId(9)));
        assert_eq!(cache.modified_of_kind(BaseType::Resource), vec![ConceptId(4)]);
    }

    #[test]
    fn instance_counts_batch_per_type() {
        let mut cache = TxCache::new();
        let person = ConceptId(7);
        cache.adjust_instance_count(person, 1);
        cache.adjust_instance_count(person, 1);
        cache.adjust_instance_count(ConceptId(8), 1);
        assert_eq!(cache.pending_instance_count(person), 2);

        cache.adjust_instance_count(ConceptId(8), -1);
        assert_eq!(cache.instance_count_deltas().len(), 1);
    }

    #[test]
    fn evict_drops_label_entries() {
        let mut cache = TxCache::new();
        let t = Concept::new(ConceptId(5), BaseType::EntityType);
        cache.cache_type("person", t);
        assert_eq!(cache.get_cached_type("person"), Some(t));
        assert_eq!(cache.get_cached_concept(ConceptId(5)), Some(t));
        cache.evict(ConceptId(5));
        assert!(cache.get_cached_type("person").is_none());
        assert!(cache.get_cached_concept(ConceptId(5)).is_none());
    }

    #[test]
    fn clear_empties_everything() {
        let mut cache = TxCache::new();
        cache.track_casting(Casting::wrap(ConceptId(2)));
        cache.track_relation(relation(3), RelationType::wrap(ConceptId(9)));
        cache.track_resource(Resource::wrap(ConceptId(4)));
        cache.adjust_instance_count(ConceptId(9), 1);
        cache.cache_type("marriage", Concept::new(ConceptId(9), BaseType::RelationType));
        assert!(!cache.is_empty());

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.clear_count(), 1);
    }
}
