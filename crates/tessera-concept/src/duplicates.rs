//! Duplicate resolution for content-addressed castings and resources.
//!
//! Concurrent writers can each create a casting or resource for the same
//! key. The fixes here collapse every live candidate of a key into the
//! oldest one (smallest id), moving relations over and merging relations
//! that become identical. They run inside a resolver transaction, are safe
//! to repeat, and ignore candidates that have already disappeared.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use tessera_core::{BaseType, EdgeLabel};

use crate::concept::{
    Casting, ConceptHandle, ConceptId, Relation, RelationType, Resource, RoleType,
};
use crate::error::Result;
use crate::transaction::Transaction;

/// What one fix changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FixOutcome {
    /// Duplicates folded into the survivor.
    pub merged: usize,
    /// Relations deleted because an identical relation already existed.
    pub relations_merged: usize,
    /// Relations moved onto the survivor.
    pub relations_retargeted: usize,
}

impl FixOutcome {
    pub fn is_noop(&self) -> bool {
        *self == Self::default()
    }
}

impl Transaction {
    /// Live concepts of `kind` carrying `key`: the given candidates plus any
    /// the index now reports, oldest first.
    fn live_candidates(
        &self,
        key: &str,
        candidates: &BTreeSet<ConceptId>,
        kind: BaseType,
    ) -> Result<Vec<ConceptId>> {
        let reader = self.reader();
        let mut all = candidates.clone();
        all.extend(reader.lookup_index(key)?);

        let mut live = Vec::new();
        for id in all {
            if reader.is_kind(id, kind)? && reader.index(id)?.as_deref() == Some(key) {
                live.push(id);
            }
        }
        Ok(live)
    }

    /// Collapse the castings sharing `key` into the oldest one.
    pub fn fix_duplicate_castings(
        &mut self,
        key: &str,
        candidates: &BTreeSet<ConceptId>,
    ) -> Result<FixOutcome> {
        self.ensure_open()?;
        let live = self.live_candidates(key, candidates, BaseType::Casting)?;
        let mut outcome = FixOutcome::default();
        let Some((&survivor, others)) = live.split_first() else {
            return Ok(outcome);
        };
        if others.is_empty() {
            return Ok(outcome);
        }
        let Some(role) = self.reader().role_of_casting(survivor)? else {
            return Ok(outcome);
        };
        let role = RoleType::wrap(role);

        let mut merges = BTreeMap::new();
        for &other in others {
            let relations = self.reader().relations_of_casting(other)?;
            for relation in relations {
                if self.is_attached(relation, survivor)? {
                    continue;
                }
                match self.equivalent_relation(relation, survivor, None)? {
                    Some(into) => {
                        merges.entry(relation).or_insert(into);
                    }
                    None => {
                        self.attach_casting(relation, Casting::wrap(survivor), role)?;
                        self.track_relation_id(relation)?;
                        outcome.relations_retargeted += 1;
                    }
                }
            }
            self.graph.delete_vertex(other.vertex())?;
            self.cache.evict(other);
            outcome.merged += 1;
        }

        // A duplicate may already be gone through cascade; it still counts.
        outcome.relations_merged = merges.len();
        for (duplicate, into) in merges {
            self.merge_relation(duplicate, into)?;
        }

        tracing::info!(
            key,
            survivor = %survivor,
            merged = outcome.merged,
            relations_merged = outcome.relations_merged,
            "Duplicate castings resolved"
        );
        Ok(outcome)
    }

    /// Collapse the resources sharing `key` into the oldest one. Every
    /// relation a duplicate took part in ends up pointing at the survivor,
    /// except those that would then duplicate a relation it already has.
    pub fn fix_duplicate_resources(
        &mut self,
        key: &str,
        candidates: &BTreeSet<ConceptId>,
    ) -> Result<FixOutcome> {
        self.ensure_open()?;
        let live = self.live_candidates(key, candidates, BaseType::Resource)?;
        let mut outcome = FixOutcome::default();
        let Some((&survivor, others)) = live.split_first() else {
            return Ok(outcome);
        };
        if others.is_empty() {
            return Ok(outcome);
        }

        let mut merges = BTreeMap::new();
        for &other in others {
            let castings = self.reader().castings_of_player(other)?;
            for casting in castings {
                let Some(role) = self.reader().role_of_casting(casting)? else {
                    continue;
                };
                let relations = self.reader().relations_of_casting(casting)?;
                for relation in relations {
                    match self.equivalent_relation(relation, survivor, Some(other))? {
                        Some(into) => {
                            merges.entry(relation).or_insert(into);
                        }
                        None => {
                            let target = self.put_casting(RoleType::wrap(role), survivor)?;
                            self.attach_casting(relation, target, RoleType::wrap(role))?;
                            self.track_relation_id(relation)?;
                            outcome.relations_retargeted += 1;
                        }
                    }
                }
            }
            self.delete_thing(other)?;
            outcome.merged += 1;
        }

        // A duplicate may already be gone through cascade; it still counts.
        outcome.relations_merged = merges.len();
        for (duplicate, into) in merges {
            self.merge_relation(duplicate, into)?;
        }

        let reader = self.reader();
        if let Some(resource_type) = reader.type_of(survivor)? {
            if reader.is_unique(resource_type)? {
                let owners = self.owners_of(Resource::wrap(survivor))?;
                if owners.len() > 1 {
                    tracing::warn!(
                        key,
                        survivor = %survivor,
                        owners = owners.len(),
                        "Unique resource has more than one owner after merge"
                    );
                }
            }
        }

        tracing::info!(
            key,
            survivor = %survivor,
            merged = outcome.merged,
            relations_merged = outcome.relations_merged,
            relations_retargeted = outcome.relations_retargeted,
            "Duplicate resources resolved"
        );
        Ok(outcome)
    }

    fn is_attached(&self, relation: ConceptId, casting: ConceptId) -> Result<bool> {
        Ok(!self
            .graph
            .edges_between(relation.vertex(), casting.vertex(), EdgeLabel::Casting)?
            .is_empty())
    }

    fn track_relation_id(&mut self, relation: ConceptId) -> Result<()> {
        if let Some(ty) = self.reader().type_of(relation)? {
            self.cache
                .track_relation(Relation::wrap(relation), RelationType::wrap(ty));
        }
        Ok(())
    }

    /// A relation `survivor` already takes part in that has the signature
    /// `relation` would have once `replaced` is swapped for `survivor`.
    fn equivalent_relation(
        &self,
        relation: ConceptId,
        survivor: ConceptId,
        replaced: Option<ConceptId>,
    ) -> Result<Option<ConceptId>> {
        let reader = self.reader();
        let (relation_type, pairs) = reader.relation_signature(relation)?;
        let mut wanted: Vec<(ConceptId, ConceptId)> = pairs
            .into_iter()
            .map(|(role, player)| match replaced {
                Some(old) if player == old => (role, survivor),
                _ => (role, player),
            })
            .collect();
        wanted.sort();
        wanted.dedup();
        let wanted = (relation_type, wanted);

        let candidates = match replaced {
            // Resource fix: relations the survivor plays in.
            Some(_) => reader.relations_of_player(survivor, None)?,
            // Casting fix: relations the survivor casting belongs to.
            None => reader.relations_of_casting(survivor)?,
        };
        for candidate in candidates {
            if candidate != relation && reader.relation_signature(candidate)? == wanted {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Fold `duplicate` into `into`: roles the duplicate plays and scopes
    /// pointing at it move over, then the duplicate is deleted. Returns
    /// false when either side is already gone.
    fn merge_relation(&mut self, duplicate: ConceptId, into: ConceptId) -> Result<bool> {
        let reader = self.reader();
        if !reader.is_kind(duplicate, BaseType::Relation)?
            || !reader.is_kind(into, BaseType::Relation)?
        {
            return Ok(false);
        }

        let played = reader.castings_of_player(duplicate)?;
        for casting in played {
            let Some(role) = self.reader().role_of_casting(casting)? else {
                continue;
            };
            let role = RoleType::wrap(role);
            let target = self.put_casting(role, into)?;
            let relations = self.reader().relations_of_casting(casting)?;
            for relation in relations {
                self.attach_casting(relation, target, role)?;
                self.track_relation_id(relation)?;
            }
        }

        let scopes = self.reader().scopes(duplicate)?;
        for scope in scopes {
            self.link_scope(into, scope)?;
        }
        let scoped = self.scoped_by(duplicate)?;
        for thing in scoped {
            if thing != into {
                self.link_scope(thing, into)?;
            }
        }

        self.delete_thing(duplicate)?;
        self.track_relation_id(into)?;
        tracing::debug!(duplicate = %duplicate, into = %into, "Relation merged");
        Ok(true)
    }

    fn link_scope(&mut self, thing: ConceptId, scope: ConceptId) -> Result<()> {
        if thing == scope {
            return Ok(());
        }
        let (from, to) = (thing.vertex(), scope.vertex());
        if self
            .graph
            .edges_between(from, to, EdgeLabel::HasScope)?
            .is_empty()
        {
            self.graph.add_edge(EdgeLabel::HasScope, from, to)?;
        }
        Ok(())
    }
}
