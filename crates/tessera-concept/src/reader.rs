//! Graph-level reads over a transaction's view of the substrate.
//!
//! `ConceptReader` answers structural questions (labels, super chains,
//! plays and relates edges, castings) in terms of concept ids. It never
//! writes and never touches the transaction cache, so the validator rules
//! can share it with the mutation code.

use std::collections::{BTreeSet, VecDeque};

use tessera_core::{meta, BaseType, DataType, EdgeLabel, PropertyKey, Value};
use tessera_graph::{Direction, GraphTxn};

use crate::concept::{Concept, ConceptId};
use crate::error::Result;

#[derive(Clone, Copy)]
pub struct ConceptReader<'a> {
    graph: &'a GraphTxn,
}

impl<'a> ConceptReader<'a> {
    pub fn new(graph: &'a GraphTxn) -> Self {
        Self { graph }
    }

    // ── Identity ─────────────────────────────────────────────────

    pub fn concept(&self, id: ConceptId) -> Result<Option<Concept>> {
        Ok(self
            .graph
            .kind(id.vertex())?
            .map(|kind| Concept::new(id, kind)))
    }

    pub fn exists(&self, id: ConceptId) -> Result<bool> {
        Ok(self.graph.contains_vertex(id.vertex())?)
    }

    pub fn is_kind(&self, id: ConceptId, kind: BaseType) -> Result<bool> {
        Ok(self.graph.kind(id.vertex())? == Some(kind))
    }

    fn flag(&self, id: ConceptId, key: PropertyKey) -> Result<bool> {
        Ok(self
            .graph
            .property(id.vertex(), key)?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    // ── Schema ───────────────────────────────────────────────────

    pub fn label(&self, id: ConceptId) -> Result<Option<String>> {
        Ok(self
            .graph
            .property(id.vertex(), PropertyKey::TypeLabel)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Label for messages: the type label, or the id for instances.
    pub fn describe(&self, id: ConceptId) -> Result<String> {
        Ok(self.label(id)?.unwrap_or_else(|| id.to_string()))
    }

    pub fn type_by_label(&self, label: &str) -> Result<Option<Concept>> {
        let hits = self
            .graph
            .lookup(PropertyKey::TypeLabel, &Value::from(label))?;
        match hits.first() {
            Some(v) => self.concept((*v).into()),
            None => Ok(None),
        }
    }

    pub fn is_meta(&self, id: ConceptId) -> Result<bool> {
        Ok(self
            .label(id)?
            .is_some_and(|label| meta::is_meta_label(&label)))
    }

    pub fn is_abstract(&self, id: ConceptId) -> Result<bool> {
        self.flag(id, PropertyKey::IsAbstract)
    }

    pub fn is_implicit(&self, id: ConceptId) -> Result<bool> {
        self.flag(id, PropertyKey::IsImplicit)
    }

    pub fn is_unique(&self, id: ConceptId) -> Result<bool> {
        self.flag(id, PropertyKey::IsUnique)
    }

    pub fn data_type(&self, id: ConceptId) -> Result<Option<DataType>> {
        Ok(self
            .graph
            .property(id.vertex(), PropertyKey::DataType)?
            .and_then(|v| v.as_str().and_then(DataType::parse)))
    }

    pub fn super_type(&self, id: ConceptId) -> Result<Option<ConceptId>> {
        Ok(self
            .graph
            .neighbours(id.vertex(), Direction::Out, EdgeLabel::Sub)?
            .first()
            .map(|v| (*v).into()))
    }

    /// `id` followed by each of its ancestors, nearest first.
    pub fn super_chain(&self, id: ConceptId) -> Result<Vec<ConceptId>> {
        let mut chain = vec![id];
        let mut seen = BTreeSet::from([id]);
        let mut current = id;
        while let Some(parent) = self.super_type(current)? {
            if !seen.insert(parent) {
                break;
            }
            chain.push(parent);
            current = parent;
        }
        Ok(chain)
    }

    pub fn direct_sub_types(&self, id: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .neighbours(id.vertex(), Direction::In, EdgeLabel::Sub)?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    /// `id` and every descendant, breadth first.
    pub fn sub_types(&self, id: ConceptId) -> Result<Vec<ConceptId>> {
        let mut out = Vec::new();
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([id]);
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            queue.extend(self.direct_sub_types(next)?);
        }
        Ok(out)
    }

    /// Roles a type plays directly, with the required flag of each edge.
    pub fn plays(&self, id: ConceptId) -> Result<Vec<(ConceptId, bool)>> {
        Ok(self
            .graph
            .edges(id.vertex(), Direction::Out, Some(EdgeLabel::Plays))?
            .into_iter()
            .map(|e| {
                let required = e
                    .property(PropertyKey::Required)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                (e.target.into(), required)
            })
            .collect())
    }

    pub fn relates(&self, id: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .neighbours(id.vertex(), Direction::Out, EdgeLabel::Relates)?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    /// Relation types that declare `role`.
    pub fn relation_types_of(&self, role: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .neighbours(role.vertex(), Direction::In, EdgeLabel::Relates)?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    // ── Instances ────────────────────────────────────────────────

    /// The most specific type of an instance (or the role of a casting).
    pub fn type_of(&self, id: ConceptId) -> Result<Option<ConceptId>> {
        Ok(self
            .graph
            .neighbours(id.vertex(), Direction::Out, EdgeLabel::Isa)?
            .first()
            .map(|v| (*v).into()))
    }

    pub fn direct_instances(&self, type_id: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .neighbours(type_id.vertex(), Direction::In, EdgeLabel::Isa)?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    pub fn value(&self, id: ConceptId) -> Result<Option<Value>> {
        Ok(self.graph.property(id.vertex(), PropertyKey::Value)?)
    }

    pub fn index(&self, id: ConceptId) -> Result<Option<String>> {
        Ok(self
            .graph
            .property(id.vertex(), PropertyKey::Index)?
            .and_then(|v| v.as_str().map(str::to_string)))
    }

    /// Every visible concept stored under a content-addressed key.
    pub fn lookup_index(&self, key: &str) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .lookup(PropertyKey::Index, &Value::from(key))?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    pub fn scopes(&self, id: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .neighbours(id.vertex(), Direction::Out, EdgeLabel::HasScope)?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    // ── Castings ─────────────────────────────────────────────────

    pub fn role_of_casting(&self, casting: ConceptId) -> Result<Option<ConceptId>> {
        self.type_of(casting)
    }

    pub fn player_of_casting(&self, casting: ConceptId) -> Result<Option<ConceptId>> {
        Ok(self
            .graph
            .neighbours(casting.vertex(), Direction::Out, EdgeLabel::RolePlayer)?
            .first()
            .map(|v| (*v).into()))
    }

    /// Castings attached to a relation.
    pub fn castings_of_relation(&self, relation: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .neighbours(relation.vertex(), Direction::Out, EdgeLabel::Casting)?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    /// Relations a casting is attached to.
    pub fn relations_of_casting(&self, casting: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .neighbours(casting.vertex(), Direction::In, EdgeLabel::Casting)?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    /// Castings in which `player` plays a role.
    pub fn castings_of_player(&self, player: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .neighbours(player.vertex(), Direction::In, EdgeLabel::RolePlayer)?
            .into_iter()
            .map(ConceptId::from)
            .collect())
    }

    /// Sorted (role, player) assignments of a relation.
    pub fn role_players(&self, relation: ConceptId) -> Result<Vec<(ConceptId, ConceptId)>> {
        let mut pairs = Vec::new();
        for casting in self.castings_of_relation(relation)? {
            if let (Some(role), Some(player)) = (
                self.role_of_casting(casting)?,
                self.player_of_casting(casting)?,
            ) {
                pairs.push((role, player));
            }
        }
        pairs.sort();
        pairs.dedup();
        Ok(pairs)
    }

    /// Relations in which `player` plays any role, optionally one role only.
    pub fn relations_of_player(
        &self,
        player: ConceptId,
        role: Option<ConceptId>,
    ) -> Result<Vec<ConceptId>> {
        let mut out = BTreeSet::new();
        for casting in self.castings_of_player(player)? {
            if let Some(wanted) = role {
                if self.role_of_casting(casting)? != Some(wanted) {
                    continue;
                }
            }
            out.extend(self.relations_of_casting(casting)?);
        }
        Ok(out.into_iter().collect())
    }

    /// Relation type plus sorted assignments: two relations with equal
    /// signatures are duplicates.
    pub fn relation_signature(
        &self,
        relation: ConceptId,
    ) -> Result<(Option<ConceptId>, Vec<(ConceptId, ConceptId)>)> {
        Ok((self.type_of(relation)?, self.role_players(relation)?))
    }
}
