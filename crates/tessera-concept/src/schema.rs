//! Schema operations on a [`Transaction`]: putting, linking and deleting
//! types.
//!
//! Structural checks that hold at any instant (label kind clashes, cycles,
//! meta immutability, deletion guards, schema locking) fail immediately.
//! Whole-schema rules such as role ownership are left to commit-time
//! validation so a schema can pass through intermediate states.

use tessera_core::{implicit, meta, BaseType, DataType, EdgeLabel, PropertyKey, Value};
use tessera_graph::Direction;

use crate::concept::{
    Concept, ConceptHandle, ConceptId, EntityType, PlayerType, RelationType, ResourceType,
    RoleType, RuleType, SchemaType,
};
use crate::error::{ConceptError, Result};
use crate::transaction::Transaction;

impl Transaction {
    // ── Put ──────────────────────────────────────────────────────

    pub fn put_entity_type(&mut self, label: &str) -> Result<EntityType> {
        self.put_type(label, false)
    }

    pub fn put_relation_type(&mut self, label: &str) -> Result<RelationType> {
        self.put_type(label, false)
    }

    pub fn put_role_type(&mut self, label: &str) -> Result<RoleType> {
        self.put_type(label, false)
    }

    pub fn put_rule_type(&mut self, label: &str) -> Result<RuleType> {
        self.put_type(label, false)
    }

    pub fn put_resource_type(&mut self, label: &str, data_type: DataType) -> Result<ResourceType> {
        self.put_resource_type_with(label, data_type, false)
    }

    /// A resource type allowing at most one owner per value.
    pub fn put_resource_type_unique(
        &mut self,
        label: &str,
        data_type: DataType,
    ) -> Result<ResourceType> {
        self.put_resource_type_with(label, data_type, true)
    }

    fn put_resource_type_with(
        &mut self,
        label: &str,
        data_type: DataType,
        unique: bool,
    ) -> Result<ResourceType> {
        self.ensure_open()?;
        if let Some(existing) = self.existing_type::<ResourceType>(label)? {
            let reader = self.reader();
            let current = reader.data_type(existing.id())?;
            if current != Some(data_type) {
                return Err(ConceptError::ImmutableValue {
                    label: label.to_string(),
                    property: "data type",
                    existing: current.map_or_else(|| "none".to_string(), |d| d.to_string()),
                    requested: data_type.to_string(),
                });
            }
            let current_unique = reader.is_unique(existing.id())?;
            if current_unique != unique {
                return Err(ConceptError::ImmutableValue {
                    label: label.to_string(),
                    property: "uniqueness",
                    existing: current_unique.to_string(),
                    requested: unique.to_string(),
                });
            }
            return Ok(existing);
        }

        let created: ResourceType = self.create_type(label, false)?;
        let v = created.id().vertex();
        self.graph
            .set_property(v, PropertyKey::DataType, Value::from(data_type.as_str()))?;
        if unique {
            self.graph
                .set_property(v, PropertyKey::IsUnique, Value::Boolean(true))?;
        }
        Ok(created)
    }

    /// Return the type labelled `label`, creating it if absent. Fails when
    /// the label belongs to a concept of another kind.
    fn put_type<T: SchemaType>(&mut self, label: &str, implicit: bool) -> Result<T> {
        self.ensure_open()?;
        match self.existing_type::<T>(label)? {
            Some(existing) => Ok(existing),
            None => self.create_type(label, implicit),
        }
    }

    fn existing_type<T: SchemaType>(&mut self, label: &str) -> Result<Option<T>> {
        match self.get_type(label)? {
            Some(concept) => concept
                .downcast::<T>()
                .map(Some)
                .ok_or_else(|| ConceptError::LabelTaken {
                    label: label.to_string(),
                    existing: concept.base_type,
                    requested: T::BASE,
                }),
            None => Ok(None),
        }
    }

    fn create_type<T: SchemaType>(&mut self, label: &str, implicit: bool) -> Result<T> {
        self.ensure_schema_mutable()?;
        let root_label = meta::root_for(T::BASE)
            .ok_or_else(|| ConceptError::MissingMetaType(T::BASE.to_string()))?;
        let root = self.meta_type(root_label)?;

        let v = self.graph.add_vertex(T::BASE);
        self.graph
            .set_property(v, PropertyKey::TypeLabel, Value::from(label))?;
        if implicit {
            self.graph
                .set_property(v, PropertyKey::IsImplicit, Value::Boolean(true))?;
        }
        self.graph.add_edge(EdgeLabel::Sub, v, root.vertex())?;

        let created = T::wrap(v.into());
        self.cache.track(created.concept());
        self.cache.cache_type(label, created.concept());
        tracing::debug!(label, kind = %T::BASE, id = %created.id(), "Type created");
        Ok(created)
    }

    // ── Get ──────────────────────────────────────────────────────

    /// Typed lookup by label; `None` when absent or of another kind.
    pub fn get_schema_type<T: SchemaType>(&mut self, label: &str) -> Result<Option<T>> {
        Ok(self.get_type(label)?.and_then(Concept::downcast))
    }

    pub fn get_entity_type(&mut self, label: &str) -> Result<Option<EntityType>> {
        self.get_schema_type(label)
    }

    pub fn get_relation_type(&mut self, label: &str) -> Result<Option<RelationType>> {
        self.get_schema_type(label)
    }

    pub fn get_role_type(&mut self, label: &str) -> Result<Option<RoleType>> {
        self.get_schema_type(label)
    }

    pub fn get_resource_type(&mut self, label: &str) -> Result<Option<ResourceType>> {
        self.get_schema_type(label)
    }

    pub fn get_rule_type(&mut self, label: &str) -> Result<Option<RuleType>> {
        self.get_schema_type(label)
    }

    // ── Read ─────────────────────────────────────────────────────

    pub fn label<T: SchemaType>(&self, ty: T) -> Result<String> {
        self.require(ty)?;
        self.reader()
            .label(ty.id())?
            .ok_or(ConceptError::ConceptNotFound(ty.id()))
    }

    /// The direct super type; `None` for a category root.
    pub fn super_type<T: SchemaType>(&self, ty: T) -> Result<Option<T>> {
        self.require(ty)?;
        Ok(self.reader().super_type(ty.id())?.map(T::wrap))
    }

    /// `ty` followed by its ancestors, nearest first.
    pub fn super_chain<T: SchemaType>(&self, ty: T) -> Result<Vec<T>> {
        self.require(ty)?;
        Ok(self
            .reader()
            .super_chain(ty.id())?
            .into_iter()
            .map(T::wrap)
            .collect())
    }

    /// `ty` and every transitive sub-type.
    pub fn sub_types<T: SchemaType>(&self, ty: T) -> Result<Vec<T>> {
        self.require(ty)?;
        Ok(self
            .reader()
            .sub_types(ty.id())?
            .into_iter()
            .map(T::wrap)
            .collect())
    }

    pub fn is_abstract<T: SchemaType>(&self, ty: T) -> Result<bool> {
        self.require(ty)?;
        self.reader().is_abstract(ty.id())
    }

    pub fn is_implicit<T: SchemaType>(&self, ty: T) -> Result<bool> {
        self.require(ty)?;
        self.reader().is_implicit(ty.id())
    }

    pub fn data_type(&self, ty: ResourceType) -> Result<Option<DataType>> {
        self.require(ty)?;
        self.reader().data_type(ty.id())
    }

    pub fn is_unique(&self, ty: ResourceType) -> Result<bool> {
        self.require(ty)?;
        self.reader().is_unique(ty.id())
    }

    /// Roles `ty` plays directly.
    pub fn roles_played<T: PlayerType>(&self, ty: T) -> Result<Vec<RoleType>> {
        self.require(ty)?;
        Ok(self
            .reader()
            .plays(ty.id())?
            .into_iter()
            .map(|(role, _)| RoleType::wrap(role))
            .collect())
    }

    pub fn roles_related(&self, relation_type: RelationType) -> Result<Vec<RoleType>> {
        self.require(relation_type)?;
        Ok(self
            .reader()
            .relates(relation_type.id())?
            .into_iter()
            .map(RoleType::wrap)
            .collect())
    }

    /// Relation types declaring `role`.
    pub fn relation_types_of(&self, role: RoleType) -> Result<Vec<RelationType>> {
        self.require(role)?;
        Ok(self
            .reader()
            .relation_types_of(role.id())?
            .into_iter()
            .map(RelationType::wrap)
            .collect())
    }

    pub fn direct_instances<T: SchemaType>(&self, ty: T) -> Result<Vec<Concept>> {
        self.require(ty)?;
        self.concepts(self.reader().direct_instances(ty.id())?)
    }

    /// Instances of `ty` and of every sub-type.
    pub fn instances<T: SchemaType>(&self, ty: T) -> Result<Vec<Concept>> {
        self.require(ty)?;
        let reader = self.reader();
        let mut ids = Vec::new();
        for sub in reader.sub_types(ty.id())? {
            ids.extend(reader.direct_instances(sub)?);
        }
        ids.sort();
        self.concepts(ids)
    }

    pub(crate) fn concepts(&self, ids: Vec<ConceptId>) -> Result<Vec<Concept>> {
        let reader = self.reader();
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            out.extend(reader.concept(id)?);
        }
        Ok(out)
    }

    // ── Mutate ───────────────────────────────────────────────────

    /// Re-parent `ty` under `super_type`. Fails without changing anything
    /// when `ty` is already an ancestor of `super_type`.
    pub fn set_super_type<T: SchemaType>(&mut self, ty: T, super_type: T) -> Result<()> {
        self.ensure_open()?;
        self.require(ty)?;
        self.require(super_type)?;
        self.ensure_not_meta(ty.id())?;
        self.ensure_schema_mutable()?;

        if self.reader().super_chain(super_type.id())?.contains(&ty.id()) {
            return Err(ConceptError::CycleDetected {
                label: self.label_of(ty.id())?,
                super_label: self.label_of(super_type.id())?,
            });
        }

        let v = ty.id().vertex();
        for edge in self.graph.edges(v, Direction::Out, Some(EdgeLabel::Sub))? {
            self.graph.delete_edge(edge.id)?;
        }
        self.graph
            .add_edge(EdgeLabel::Sub, v, super_type.id().vertex())?;
        self.cache.track(ty.concept());
        tracing::debug!(ty = %ty.id(), super_type = %super_type.id(), "Super type set");
        Ok(())
    }

    /// Flag or unflag `ty` as abstract. Fails when making a type with direct
    /// instances abstract.
    pub fn set_abstract<T: SchemaType>(&mut self, ty: T, is_abstract: bool) -> Result<()> {
        self.ensure_open()?;
        self.require(ty)?;
        self.ensure_not_meta(ty.id())?;
        self.ensure_schema_mutable()?;

        if is_abstract {
            let count = self.reader().direct_instances(ty.id())?.len();
            if count > 0 {
                return Err(ConceptError::AbstractTypeInstances {
                    label: self.label_of(ty.id())?,
                    count,
                });
            }
        }

        self.graph.set_property(
            ty.id().vertex(),
            PropertyKey::IsAbstract,
            Value::Boolean(is_abstract),
        )?;
        self.cache.track(ty.concept());
        // Role ownership counts only non-abstract relation types.
        if T::BASE == BaseType::RelationType {
            for role in self.reader().relates(ty.id())? {
                self.cache.track(Concept::new(role, BaseType::RoleType));
            }
        }
        Ok(())
    }

    /// Declare `role` on `relation_type`. Idempotent.
    pub fn relates(&mut self, relation_type: RelationType, role: RoleType) -> Result<()> {
        self.guard_link(relation_type.id(), role.id())?;
        self.require(relation_type)?;
        self.require(role)?;
        if self
            .graph
            .edges_between(relation_type.id().vertex(), role.id().vertex(), EdgeLabel::Relates)?
            .is_empty()
        {
            self.graph.add_edge(
                EdgeLabel::Relates,
                relation_type.id().vertex(),
                role.id().vertex(),
            )?;
        }
        self.cache.track(relation_type.concept());
        self.cache.track(role.concept());
        Ok(())
    }

    pub fn delete_relates(&mut self, relation_type: RelationType, role: RoleType) -> Result<()> {
        self.guard_link(relation_type.id(), role.id())?;
        self.require(relation_type)?;
        self.require(role)?;
        for edge in self.graph.edges_between(
            relation_type.id().vertex(),
            role.id().vertex(),
            EdgeLabel::Relates,
        )? {
            self.graph.delete_edge(edge.id)?;
        }
        self.cache.track(relation_type.concept());
        self.cache.track(role.concept());
        Ok(())
    }

    /// Allow instances of `ty` to play `role`. Idempotent.
    pub fn plays<T: PlayerType>(&mut self, ty: T, role: RoleType) -> Result<()> {
        self.require(ty)?;
        self.set_plays(ty.concept(), role, false)
    }

    /// Like [`Transaction::plays`], and every instance of `ty` must play
    /// `role` exactly once.
    pub fn plays_required<T: PlayerType>(&mut self, ty: T, role: RoleType) -> Result<()> {
        self.require(ty)?;
        self.set_plays(ty.concept(), role, true)
    }

    pub fn delete_plays<T: PlayerType>(&mut self, ty: T, role: RoleType) -> Result<()> {
        self.guard_link(ty.id(), role.id())?;
        self.require(ty)?;
        self.require(role)?;
        for edge in self
            .graph
            .edges_between(ty.id().vertex(), role.id().vertex(), EdgeLabel::Plays)?
        {
            self.graph.delete_edge(edge.id)?;
        }
        self.cache.track(ty.concept());
        self.cache.track(role.concept());
        Ok(())
    }

    /// A plays edge is never downgraded from required.
    fn set_plays(&mut self, owner: Concept, role: RoleType, required: bool) -> Result<()> {
        self.guard_link(owner.id, role.id())?;
        self.require(role)?;

        let (from, to) = (owner.id.vertex(), role.id().vertex());
        let existing = self.graph.edges_between(from, to, EdgeLabel::Plays)?;
        match existing.first() {
            Some(edge) => {
                let already = edge
                    .property(PropertyKey::Required)
                    .and_then(Value::as_bool)
                    .unwrap_or(false);
                if required && !already {
                    self.graph
                        .set_edge_property(edge.id, PropertyKey::Required, Value::Boolean(true))?;
                }
            }
            None => {
                let edge = self.graph.add_edge(EdgeLabel::Plays, from, to)?;
                self.graph
                    .set_edge_property(edge, PropertyKey::Required, Value::Boolean(required))?;
            }
        }
        self.cache.track(owner);
        self.cache.track(role.concept());
        Ok(())
    }

    fn guard_link(&self, a: ConceptId, b: ConceptId) -> Result<()> {
        self.ensure_open()?;
        self.ensure_not_meta(a)?;
        self.ensure_not_meta(b)?;
        self.ensure_schema_mutable()
    }

    // ── Resources ────────────────────────────────────────────────

    /// Let instances of `owner` carry resources of `resource_type`. Creates
    /// (or reuses) the implicit `@has-<label>` relation type with its owner
    /// and value roles, and returns it.
    pub fn has_resource<T: PlayerType>(
        &mut self,
        owner: T,
        resource_type: ResourceType,
    ) -> Result<RelationType> {
        self.attach_resource(owner.concept(), resource_type, false)
    }

    /// Like [`Transaction::has_resource`], and every instance of `owner`
    /// must carry exactly one such resource.
    pub fn key<T: PlayerType>(
        &mut self,
        owner: T,
        resource_type: ResourceType,
    ) -> Result<RelationType> {
        self.attach_resource(owner.concept(), resource_type, true)
    }

    fn attach_resource(
        &mut self,
        owner: Concept,
        resource_type: ResourceType,
        required: bool,
    ) -> Result<RelationType> {
        self.ensure_open()?;
        self.require(resource_type)?;
        if self.reader().concept(owner.id)? != Some(owner) {
            return Err(ConceptError::ConceptNotFound(owner.id));
        }
        self.ensure_not_meta(owner.id)?;
        self.ensure_not_meta(resource_type.id())?;

        let resource_label = self.label(resource_type)?;
        let relation_type: RelationType =
            self.put_type(&implicit::relation(&resource_label), true)?;
        let owner_role: RoleType = self.put_type(&implicit::owner(&resource_label), true)?;
        let value_role: RoleType = self.put_type(&implicit::value(&resource_label), true)?;

        self.relates(relation_type, owner_role)?;
        self.relates(relation_type, value_role)?;
        self.set_plays(owner, owner_role, required)?;
        self.set_plays(resource_type.concept(), value_role, false)?;

        tracing::debug!(
            owner = %owner.id,
            resource_type = %resource_label,
            required,
            "Resource attached"
        );
        Ok(relation_type)
    }

    // ── Delete ───────────────────────────────────────────────────

    /// Delete a type. Fails when it is a meta type, has sub-types, or has
    /// direct instances.
    pub fn delete_type<T: SchemaType>(&mut self, ty: T) -> Result<()> {
        self.ensure_open()?;
        self.require(ty)?;
        self.ensure_not_meta(ty.id())?;
        self.ensure_schema_mutable()?;

        let reader = self.reader();
        let label = reader.describe(ty.id())?;
        let subs = reader.direct_sub_types(ty.id())?.len();
        if subs > 0 {
            return Err(ConceptError::TypeHasSubTypes { label, count: subs });
        }
        let instances = reader.direct_instances(ty.id())?.len();
        if instances > 0 {
            return Err(ConceptError::TypeHasInstances {
                label,
                count: instances,
            });
        }

        // Relation types losing a role, and roles losing their owner, are
        // re-validated at commit.
        let mut neighbours = reader.relates(ty.id())?;
        neighbours.extend(reader.relation_types_of(ty.id())?);
        let neighbours = self.concepts(neighbours)?;

        self.graph.delete_vertex(ty.id().vertex())?;
        self.cache.evict(ty.id());
        for concept in neighbours {
            self.cache.track(concept);
        }
        tracing::debug!(label = %label, id = %ty.id(), "Type deleted");
        Ok(())
    }
}
