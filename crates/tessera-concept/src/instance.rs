//! Data operations on a [`Transaction`]: creating things, role players,
//! resources and scopes, and cascading deletion.

use std::collections::{BTreeMap, BTreeSet};

use tessera_core::{implicit, meta, BaseType, EdgeLabel, PropertyKey, Value};
use tessera_graph::Direction;

use crate::concept::{
    Casting, Concept, ConceptHandle, ConceptId, Entity, EntityType, Relation, RelationType,
    Resource, ResourceType, RoleType, Rule, RuleType, SchemaType, Thing,
};
use crate::error::{ConceptError, Result};
use crate::keys;
use crate::transaction::{counter_name, Transaction};

impl Transaction {
    // ── Create ───────────────────────────────────────────────────

    pub fn add_entity(&mut self, ty: EntityType) -> Result<Entity> {
        self.require(ty)?;
        self.add_thing(ty.id())
    }

    pub fn add_relation(&mut self, ty: RelationType) -> Result<Relation> {
        self.require(ty)?;
        let relation: Relation = self.add_thing(ty.id())?;
        self.cache.track_relation(relation, ty);
        Ok(relation)
    }

    pub fn add_rule(&mut self, ty: RuleType, lhs: &str, rhs: &str) -> Result<Rule> {
        self.require(ty)?;
        let rule: Rule = self.add_thing(ty.id())?;
        let v = rule.id().vertex();
        self.graph.set_property(v, PropertyKey::RuleLhs, Value::from(lhs))?;
        self.graph.set_property(v, PropertyKey::RuleRhs, Value::from(rhs))?;
        Ok(rule)
    }

    /// Return the resource of `ty` holding `value`, creating it if no
    /// resource with that value is visible. When duplicates exist the oldest
    /// is returned.
    pub fn put_resource(&mut self, ty: ResourceType, value: Value) -> Result<Resource> {
        self.ensure_open()?;
        self.require(ty)?;
        self.ensure_instantiable(ty.id())?;

        let reader = self.reader();
        if let Some(expected) = reader.data_type(ty.id())? {
            if value.data_type() != expected {
                return Err(ConceptError::DataTypeMismatch {
                    label: reader.describe(ty.id())?,
                    expected: expected.to_string(),
                    value: value.to_string(),
                });
            }
        }

        let key = keys::resource_key(ty.id(), &value);
        if let Some(hit) = self.find_indexed(&key, BaseType::Resource)? {
            return Ok(Resource::wrap(hit));
        }

        let resource: Resource = self.add_thing(ty.id())?;
        let v = resource.id().vertex();
        self.graph.set_property(v, PropertyKey::Value, value)?;
        self.graph
            .set_property(v, PropertyKey::Index, Value::from(key))?;
        self.cache.track_resource(resource);
        Ok(resource)
    }

    /// Oldest visible concept of `kind` stored under `key`.
    fn find_indexed(&self, key: &str, kind: BaseType) -> Result<Option<ConceptId>> {
        let reader = self.reader();
        for hit in reader.lookup_index(key)? {
            if reader.is_kind(hit, kind)? {
                return Ok(Some(hit));
            }
        }
        Ok(None)
    }

    fn ensure_instantiable(&self, type_id: ConceptId) -> Result<()> {
        match self.reader().label(type_id)? {
            Some(label) if meta::is_meta_label(&label) && !meta::allows_instances(&label) => {
                Err(ConceptError::MetaTypeInstance { label })
            }
            _ => Ok(()),
        }
    }

    fn add_thing<T: Thing>(&mut self, type_id: ConceptId) -> Result<T> {
        self.ensure_open()?;
        self.ensure_instantiable(type_id)?;

        let v = self.graph.add_vertex(T::BASE);
        self.graph.add_edge(EdgeLabel::Isa, v, type_id.vertex())?;
        let thing = T::wrap(v.into());
        self.cache.adjust_instance_count(type_id, 1);
        self.cache.track(thing.concept());
        tracing::debug!(id = %thing.id(), kind = %T::BASE, ty = %type_id, "Instance created");
        Ok(thing)
    }

    // ── Role Players ─────────────────────────────────────────────

    /// Assign `player` to `role` in `relation`. The casting for
    /// (role, player) is shared with every other relation using it.
    pub fn add_role_player<P: Thing>(
        &mut self,
        relation: Relation,
        role: RoleType,
        player: P,
    ) -> Result<Casting> {
        self.ensure_open()?;
        self.require(relation)?;
        self.require(role)?;
        self.require(player)?;

        let relation_type = self
            .reader()
            .type_of(relation.id())?
            .ok_or(ConceptError::ConceptNotFound(relation.id()))?;
        let casting = self.put_casting(role, player.id())?;
        self.attach_casting(relation.id(), casting, role)?;
        self.cache
            .track_relation(relation, RelationType::wrap(relation_type));
        self.cache.track(player.concept());
        Ok(casting)
    }

    /// Find or create the casting for (role, player).
    pub(crate) fn put_casting(&mut self, role: RoleType, player: ConceptId) -> Result<Casting> {
        let key = keys::casting_key(role.id(), player);
        if let Some(hit) = self.find_indexed(&key, BaseType::Casting)? {
            let casting = Casting::wrap(hit);
            self.cache.track_casting(casting);
            tracing::debug!(casting = %hit, "Casting reused");
            return Ok(casting);
        }

        let v = self.graph.add_vertex(BaseType::Casting);
        self.graph
            .set_property(v, PropertyKey::Index, Value::from(key))?;
        self.graph.add_edge(EdgeLabel::Isa, v, role.id().vertex())?;
        let edge = self
            .graph
            .add_edge(EdgeLabel::RolePlayer, v, player.vertex())?;
        self.graph
            .set_edge_property(edge, PropertyKey::RoleType, role_value(role.id()))?;

        let casting = Casting::wrap(v.into());
        self.cache.track_casting(casting);
        tracing::debug!(casting = %casting.id(), role = %role.id(), player = %player, "Casting created");
        Ok(casting)
    }

    /// Link a relation to a casting unless already linked.
    pub(crate) fn attach_casting(
        &mut self,
        relation: ConceptId,
        casting: Casting,
        role: RoleType,
    ) -> Result<bool> {
        let (from, to) = (relation.vertex(), casting.id().vertex());
        if !self
            .graph
            .edges_between(from, to, EdgeLabel::Casting)?
            .is_empty()
        {
            return Ok(false);
        }
        let edge = self.graph.add_edge(EdgeLabel::Casting, from, to)?;
        self.graph
            .set_edge_property(edge, PropertyKey::RoleType, role_value(role.id()))?;
        self.cache.track_casting(casting);
        Ok(true)
    }

    /// Role -> players of a relation.
    pub fn role_players(
        &self,
        relation: Relation,
    ) -> Result<BTreeMap<RoleType, BTreeSet<ConceptId>>> {
        self.require(relation)?;
        let mut out: BTreeMap<RoleType, BTreeSet<ConceptId>> = BTreeMap::new();
        for (role, player) in self.reader().role_players(relation.id())? {
            out.entry(RoleType::wrap(role)).or_default().insert(player);
        }
        Ok(out)
    }

    pub fn castings_of<T: Thing>(&self, thing: T) -> Result<Vec<Casting>> {
        self.require(thing)?;
        Ok(self
            .reader()
            .castings_of_player(thing.id())?
            .into_iter()
            .map(Casting::wrap)
            .collect())
    }

    /// Relations in which `thing` plays a role, optionally one role only.
    pub fn relations_of<T: Thing>(&self, thing: T, role: Option<RoleType>) -> Result<Vec<Relation>> {
        self.require(thing)?;
        Ok(self
            .reader()
            .relations_of_player(thing.id(), role.map(|r| r.id()))?
            .into_iter()
            .map(Relation::wrap)
            .collect())
    }

    /// The most specific type of a thing.
    pub fn type_of<T: Thing>(&self, thing: T) -> Result<Option<Concept>> {
        self.require(thing)?;
        match self.reader().type_of(thing.id())? {
            Some(ty) => self.reader().concept(ty),
            None => Ok(None),
        }
    }

    pub fn value(&self, resource: Resource) -> Result<Option<Value>> {
        self.require(resource)?;
        self.reader().value(resource.id())
    }

    pub fn rule_bodies(&self, rule: Rule) -> Result<(Option<Value>, Option<Value>)> {
        self.require(rule)?;
        let v = rule.id().vertex();
        Ok((
            self.graph.property(v, PropertyKey::RuleLhs)?,
            self.graph.property(v, PropertyKey::RuleRhs)?,
        ))
    }

    /// Live instance count of a type: committed counter plus this
    /// transaction's pending delta.
    pub fn instance_count<T: SchemaType>(&self, ty: T) -> Result<i64> {
        self.require(ty)?;
        let committed = self.graph.counter(&counter_name(ty.id()))?;
        Ok(committed + self.cache.pending_instance_count(ty.id()))
    }

    // ── Resources ────────────────────────────────────────────────

    /// Attach `resource` to `owner` through the implicit relation of its
    /// type. Idempotent. A unique resource already owned by another
    /// concept is rejected.
    pub fn has<O: Thing>(&mut self, owner: O, resource: Resource) -> Result<Relation> {
        self.ensure_open()?;
        self.require(owner)?;
        self.require(resource)?;

        let resource_type = self
            .reader()
            .type_of(resource.id())?
            .ok_or(ConceptError::ConceptNotFound(resource.id()))?;
        let label = self.label_of(resource_type)?;
        let relation_type = self.get_relation_type(&implicit::relation(&label))?;
        let owner_role = self.get_role_type(&implicit::owner(&label))?;
        let value_role = self.get_role_type(&implicit::value(&label))?;
        let (Some(relation_type), Some(owner_role), Some(value_role)) =
            (relation_type, owner_role, value_role)
        else {
            return Err(ConceptError::ResourceNotAttached {
                resource_type: label,
            });
        };

        let reader = self.reader();
        for existing in reader.relations_of_player(owner.id(), Some(owner_role.id()))? {
            if reader
                .role_players(existing)?
                .contains(&(value_role.id(), resource.id()))
            {
                return Ok(Relation::wrap(existing));
            }
        }

        if reader.is_unique(resource_type)? {
            for existing in reader.relations_of_player(resource.id(), Some(value_role.id()))? {
                for (role, player) in reader.role_players(existing)? {
                    if role == owner_role.id() && player != owner.id() {
                        return Err(ConceptError::ResourceNotUnique {
                            label,
                            value: reader
                                .value(resource.id())?
                                .map(|v| v.to_string())
                                .unwrap_or_default(),
                            owner: player,
                        });
                    }
                }
            }
        }

        let relation = self.add_relation(relation_type)?;
        self.add_role_player(relation, owner_role, owner)?;
        self.add_role_player(relation, value_role, resource)?;
        Ok(relation)
    }

    /// Resources attached to `owner`.
    pub fn resources_of<O: Thing>(&self, owner: O) -> Result<Vec<Resource>> {
        self.require(owner)?;
        let found = self.implicit_partners(owner.id(), implicit_owner_role)?;
        Ok(found
            .into_iter()
            .filter_map(|c| c.downcast::<Resource>())
            .collect())
    }

    /// Concepts carrying `resource`.
    pub fn owners_of(&self, resource: Resource) -> Result<Vec<Concept>> {
        self.require(resource)?;
        self.implicit_partners(resource.id(), implicit_value_role)
    }

    /// Players on the other side of the implicit relations in which `id`
    /// plays a role selected by `side`.
    fn implicit_partners(
        &self,
        id: ConceptId,
        side: fn(&str) -> bool,
    ) -> Result<Vec<Concept>> {
        let reader = self.reader();
        let mut partners = BTreeSet::new();
        for casting in reader.castings_of_player(id)? {
            let Some(role) = reader.role_of_casting(casting)? else {
                continue;
            };
            let is_side = reader.is_implicit(role)?
                && reader.label(role)?.is_some_and(|l| side(&l));
            if !is_side {
                continue;
            }
            for relation in reader.relations_of_casting(casting)? {
                for (other_role, player) in reader.role_players(relation)? {
                    if other_role != role && player != id {
                        partners.insert(player);
                    }
                }
            }
        }
        self.concepts(partners.into_iter().collect())
    }

    // ── Scopes ───────────────────────────────────────────────────

    pub fn scope<T: Thing, S: Thing>(&mut self, thing: T, scope: S) -> Result<()> {
        self.ensure_open()?;
        self.require(thing)?;
        self.require(scope)?;
        let (from, to) = (thing.id().vertex(), scope.id().vertex());
        if self
            .graph
            .edges_between(from, to, EdgeLabel::HasScope)?
            .is_empty()
        {
            self.graph.add_edge(EdgeLabel::HasScope, from, to)?;
        }
        self.cache.track(thing.concept());
        Ok(())
    }

    pub fn delete_scope<T: Thing, S: Thing>(&mut self, thing: T, scope: S) -> Result<()> {
        self.ensure_open()?;
        self.require(thing)?;
        self.require(scope)?;
        for edge in self.graph.edges_between(
            thing.id().vertex(),
            scope.id().vertex(),
            EdgeLabel::HasScope,
        )? {
            self.graph.delete_edge(edge.id)?;
        }
        self.cache.track(thing.concept());
        Ok(())
    }

    pub fn scopes<T: Thing>(&self, thing: T) -> Result<Vec<Concept>> {
        self.require(thing)?;
        self.concepts(self.reader().scopes(thing.id())?)
    }

    // ── Delete ───────────────────────────────────────────────────

    /// Delete a thing with its castings. Relations left without role
    /// players are deleted in turn.
    pub fn delete_instance<T: Thing>(&mut self, thing: T) -> Result<()> {
        self.ensure_open()?;
        self.require(thing)?;
        self.delete_thing(thing.id())
    }

    pub(crate) fn delete_thing(&mut self, id: ConceptId) -> Result<()> {
        let Some(concept) = self.reader().concept(id)? else {
            return Ok(());
        };
        let type_id = self.reader().type_of(id)?;

        // Castings in which the thing plays go with it.
        let mut affected = BTreeSet::new();
        let played = self.reader().castings_of_player(id)?;
        for casting in played {
            affected.extend(self.reader().relations_of_casting(casting)?);
            self.graph.delete_vertex(casting.vertex())?;
            self.cache.evict(casting);
        }

        // A relation's own castings survive while other relations use them.
        let own_castings = if concept.base_type == BaseType::Relation {
            self.reader().castings_of_relation(id)?
        } else {
            Vec::new()
        };

        self.graph.delete_vertex(id.vertex())?;
        self.cache.evict(id);
        if let Some(ty) = type_id {
            self.cache.adjust_instance_count(ty, -1);
        }
        tracing::debug!(id = %id, kind = %concept.base_type, "Instance deleted");

        for casting in own_castings {
            let reader = self.reader();
            if reader.exists(casting)? && reader.relations_of_casting(casting)?.is_empty() {
                self.graph.delete_vertex(casting.vertex())?;
                self.cache.evict(casting);
            }
        }

        affected.remove(&id);
        for relation in affected {
            self.settle_relation(relation)?;
        }
        Ok(())
    }

    /// After a relation lost a casting: delete it when nothing meaningful
    /// is left, otherwise mark it for re-validation.
    fn settle_relation(&mut self, relation: ConceptId) -> Result<()> {
        let reader = self.reader();
        if !reader.is_kind(relation, BaseType::Relation)? {
            return Ok(());
        }
        let Some(relation_type) = reader.type_of(relation)? else {
            return Ok(());
        };
        let pairs = reader.role_players(relation)?;
        // An implicit resource relation is only meaningful with both sides.
        let collapse = pairs.is_empty() || (reader.is_implicit(relation_type)? && pairs.len() < 2);

        if collapse {
            let survivors = self.concepts(pairs.iter().map(|(_, p)| *p).collect())?;
            self.delete_thing(relation)?;
            for player in survivors {
                self.cache.track(player);
            }
        } else {
            self.cache
                .track_relation(Relation::wrap(relation), RelationType::wrap(relation_type));
        }
        Ok(())
    }

    /// Things that list `id` as a scope.
    pub(crate) fn scoped_by(&self, id: ConceptId) -> Result<Vec<ConceptId>> {
        Ok(self
            .graph
            .edges(id.vertex(), Direction::In, Some(EdgeLabel::HasScope))?
            .into_iter()
            .map(|e| e.source.into())
            .collect())
    }
}

pub(crate) fn role_value(role: ConceptId) -> Value {
    Value::Long(role.0 as i64)
}

fn implicit_owner_role(label: &str) -> bool {
    implicit::is_implicit_label(label) && label.ends_with("-owner")
}

fn implicit_value_role(label: &str) -> bool {
    implicit::is_implicit_label(label) && label.ends_with("-value")
}
