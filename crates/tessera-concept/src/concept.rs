//! Concept identity and typed handles.
//!
//! Every concept is a substrate vertex; its id is the vertex id. A
//! [`Concept`] pairs the id with the base kind, and narrows into one of the
//! typed handles with [`Concept::downcast`]. Handles are plain `Copy` ids:
//! they hold no references into the graph and stay valid for the lifetime of
//! the transaction unless the concept is deleted within it.

use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_core::BaseType;
use tessera_graph::VertexId;

/// Stable identity of a concept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConceptId(pub u64);

impl ConceptId {
    pub(crate) fn vertex(self) -> VertexId {
        VertexId(self.0)
    }
}

impl From<VertexId> for ConceptId {
    fn from(v: VertexId) -> Self {
        Self(v.0)
    }
}

impl fmt::Display for ConceptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An untyped concept: id plus base kind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Concept {
    pub id: ConceptId,
    pub base_type: BaseType,
}

impl Concept {
    pub fn new(id: ConceptId, base_type: BaseType) -> Self {
        Self { id, base_type }
    }

    pub fn is_schema(&self) -> bool {
        self.base_type.is_schema()
    }

    pub fn is_thing(&self) -> bool {
        self.base_type.is_thing()
    }

    /// Narrow to a typed handle; `None` when the kinds differ.
    pub fn downcast<T: ConceptHandle>(self) -> Option<T> {
        (self.base_type == T::BASE).then(|| T::wrap(self.id))
    }

    pub fn as_entity_type(self) -> Option<EntityType> {
        self.downcast()
    }

    pub fn as_relation_type(self) -> Option<RelationType> {
        self.downcast()
    }

    pub fn as_role_type(self) -> Option<RoleType> {
        self.downcast()
    }

    pub fn as_resource_type(self) -> Option<ResourceType> {
        self.downcast()
    }

    pub fn as_entity(self) -> Option<Entity> {
        self.downcast()
    }

    pub fn as_relation(self) -> Option<Relation> {
        self.downcast()
    }

    pub fn as_resource(self) -> Option<Resource> {
        self.downcast()
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.base_type, self.id)
    }
}

// ── Handle Traits ────────────────────────────────────────────────

/// A typed, `Copy` reference to a concept of one base kind.
pub trait ConceptHandle: Copy + fmt::Debug + Eq + Ord + std::hash::Hash {
    const BASE: BaseType;

    fn id(&self) -> ConceptId;

    /// Build a handle from an id. Operations taking a handle re-check the
    /// kind on the graph, so a forged handle is rejected there.
    fn wrap(id: ConceptId) -> Self;

    fn concept(&self) -> Concept {
        Concept::new(self.id(), Self::BASE)
    }
}

/// Schema-level concepts: the five type kinds.
pub trait SchemaType: ConceptHandle {}

/// Types whose instances can play roles.
pub trait PlayerType: SchemaType {}

/// Data-level concepts that count towards their type's instances and may
/// play roles.
pub trait Thing: ConceptHandle {}

macro_rules! concept_handle {
    ($(#[$doc:meta])* $name:ident => $base:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(ConceptId);

        impl ConceptHandle for $name {
            const BASE: BaseType = BaseType::$base;

            fn id(&self) -> ConceptId {
                self.0
            }

            fn wrap(id: ConceptId) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Concept {
            fn from(handle: $name) -> Concept {
                handle.concept()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{} {}", BaseType::$base, self.0)
            }
        }
    };
}

concept_handle!(EntityType => EntityType);
concept_handle!(RelationType => RelationType);
concept_handle!(
    /// A role a type may play within a relation type.
    RoleType => RoleType
);
concept_handle!(ResourceType => ResourceType);
concept_handle!(RuleType => RuleType);
concept_handle!(Entity => Entity);
concept_handle!(Relation => Relation);
concept_handle!(Resource => Resource);
concept_handle!(Rule => Rule);
concept_handle!(
    /// A reified (role, player) pair. Shared by every relation in which
    /// that player plays that role.
    Casting => Casting
);

impl SchemaType for EntityType {}
impl SchemaType for RelationType {}
impl SchemaType for RoleType {}
impl SchemaType for ResourceType {}
impl SchemaType for RuleType {}

impl PlayerType for EntityType {}
impl PlayerType for RelationType {}
impl PlayerType for ResourceType {}

impl Thing for Entity {}
impl Thing for Relation {}
impl Thing for Resource {}
impl Thing for Rule {}
