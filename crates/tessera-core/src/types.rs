//! Core vocabulary shared by the substrate and the concept layer.
//!
//! These types name what lives on the graph: the base kind of every vertex,
//! the labels carried by edges, the property keys, and the literal values
//! that resources hold.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

// ── Base Types ────────────────────────────────────────────────────

/// The kind tag carried by every vertex that backs a concept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BaseType {
    EntityType,
    RelationType,
    RoleType,
    ResourceType,
    RuleType,
    Entity,
    Relation,
    Resource,
    Rule,
    Casting,
}

impl BaseType {
    pub const ALL: [BaseType; 10] = [
        BaseType::EntityType,
        BaseType::RelationType,
        BaseType::RoleType,
        BaseType::ResourceType,
        BaseType::RuleType,
        BaseType::Entity,
        BaseType::Relation,
        BaseType::Resource,
        BaseType::Rule,
        BaseType::Casting,
    ];

    /// The vertex kind string stored on the substrate.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EntityType => "ENTITY_TYPE",
            Self::RelationType => "RELATION_TYPE",
            Self::RoleType => "ROLE_TYPE",
            Self::ResourceType => "RESOURCE_TYPE",
            Self::RuleType => "RULE_TYPE",
            Self::Entity => "ENTITY",
            Self::Relation => "RELATION",
            Self::Resource => "RESOURCE",
            Self::Rule => "RULE",
            Self::Casting => "CASTING",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.as_str() == kind)
    }

    /// True for schema-level kinds (types, including role types).
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            Self::EntityType
                | Self::RelationType
                | Self::RoleType
                | Self::ResourceType
                | Self::RuleType
        )
    }

    /// True for data-level kinds that carry an instance count on their type.
    pub fn is_thing(&self) -> bool {
        matches!(
            self,
            Self::Entity | Self::Relation | Self::Resource | Self::Rule
        )
    }

    /// The instance kind produced by a type kind, if any.
    pub fn instance_kind(&self) -> Option<BaseType> {
        match self {
            Self::EntityType => Some(Self::Entity),
            Self::RelationType => Some(Self::Relation),
            Self::ResourceType => Some(Self::Resource),
            Self::RuleType => Some(Self::Rule),
            Self::RoleType => Some(Self::Casting),
            _ => None,
        }
    }
}

impl fmt::Display for BaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Edge Labels ───────────────────────────────────────────────────

/// Labels of the edges the concept layer writes onto the substrate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeLabel {
    /// instance -> its most specific type; casting -> its role type.
    Isa,
    /// type -> its super-type.
    Sub,
    /// type -> a role type it may play.
    Plays,
    /// relation type -> a role type it declares.
    Relates,
    /// relation -> one of its castings.
    Casting,
    /// casting -> the instance playing the role.
    RolePlayer,
    /// instance -> an instance that scopes it.
    HasScope,
}

impl EdgeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Isa => "ISA",
            Self::Sub => "SUB",
            Self::Plays => "PLAYS",
            Self::Relates => "RELATES",
            Self::Casting => "CASTING",
            Self::RolePlayer => "ROLE_PLAYER",
            Self::HasScope => "HAS_SCOPE",
        }
    }
}

impl fmt::Display for EdgeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Property Keys ─────────────────────────────────────────────────

/// Vertex and edge property keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyKey {
    TypeLabel,
    IsAbstract,
    IsImplicit,
    IsUnique,
    DataType,
    /// Content-addressed key of castings, resources and relations.
    Index,
    Value,
    RuleLhs,
    RuleRhs,
    /// Edge property: the role type id on CASTING and ROLE_PLAYER edges.
    RoleType,
    /// Edge property: whether a PLAYS edge is mandatory (keys).
    Required,
}

impl PropertyKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TypeLabel => "TYPE_LABEL",
            Self::IsAbstract => "IS_ABSTRACT",
            Self::IsImplicit => "IS_IMPLICIT",
            Self::IsUnique => "IS_UNIQUE",
            Self::DataType => "DATA_TYPE",
            Self::Index => "INDEX",
            Self::Value => "VALUE",
            Self::RuleLhs => "RULE_LHS",
            Self::RuleRhs => "RULE_RHS",
            Self::RoleType => "ROLE_TYPE",
            Self::Required => "REQUIRED",
        }
    }
}

// ── Values ────────────────────────────────────────────────────────

/// The data type a resource type declares for its values.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    String,
    Long,
    Double,
    Boolean,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Long => "long",
            Self::Double => "double",
            Self::Boolean => "boolean",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "long" => Some(Self::Long),
            "double" => Some(Self::Double),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed literal. Used both as a substrate property value and as the
/// value held by a resource.
///
/// Doubles compare and hash by their bit pattern (`total_cmp`) so that a
/// value can key the property index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
}

impl Value {
    pub fn data_type(&self) -> DataType {
        match self {
            Self::String(_) => DataType::String,
            Self::Long(_) => DataType::Long,
            Self::Double(_) => DataType::Double,
            Self::Boolean(_) => DataType::Boolean,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            _ => None,
        }
    }

    /// Canonical text form, stable across runs. Feeds content-addressed keys.
    pub fn canonical(&self) -> String {
        match self {
            Self::String(s) => format!("string:{s}"),
            Self::Long(v) => format!("long:{v}"),
            Self::Double(v) => format!("double:{:016x}", v.to_bits()),
            Self::Boolean(v) => format!("boolean:{v}"),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::String(_) => 0,
            Self::Long(_) => 1,
            Self::Double(_) => 2,
            Self::Boolean(_) => 3,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Long(a), Self::Long(b)) => a.cmp(b),
            (Self::Double(a), Self::Double(b)) => a.total_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::String(s) => s.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::Boolean(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

// ── Meta Schema ───────────────────────────────────────────────────

/// Labels of the immutable category roots created when a keyspace is
/// bootstrapped.
pub mod meta {
    use super::BaseType;

    pub const ENTITY: &str = "entity";
    pub const RELATION: &str = "relation";
    pub const ROLE: &str = "role";
    pub const RESOURCE: &str = "resource";
    pub const RULE: &str = "rule";
    pub const INFERENCE_RULE: &str = "inference-rule";
    pub const CONSTRAINT_RULE: &str = "constraint-rule";

    /// Every meta label with its kind, in creation order.
    pub const ALL: [(&str, BaseType); 7] = [
        (ENTITY, BaseType::EntityType),
        (RELATION, BaseType::RelationType),
        (ROLE, BaseType::RoleType),
        (RESOURCE, BaseType::ResourceType),
        (RULE, BaseType::RuleType),
        (INFERENCE_RULE, BaseType::RuleType),
        (CONSTRAINT_RULE, BaseType::RuleType),
    ];

    pub fn is_meta_label(label: &str) -> bool {
        ALL.iter().any(|(l, _)| *l == label)
    }

    /// Rule metas are the only meta types that may hold instances.
    pub fn allows_instances(label: &str) -> bool {
        label == INFERENCE_RULE || label == CONSTRAINT_RULE
    }

    /// The category root a freshly created type of `kind` subs.
    pub fn root_for(kind: BaseType) -> Option<&'static str> {
        match kind {
            BaseType::EntityType => Some(ENTITY),
            BaseType::RelationType => Some(RELATION),
            BaseType::RoleType => Some(ROLE),
            BaseType::ResourceType => Some(RESOURCE),
            BaseType::RuleType => Some(RULE),
            _ => None,
        }
    }
}

// ── Implicit Types ────────────────────────────────────────────────

/// Labels of the relation and role types generated when a resource type is
/// attached to an owner with `has_resource` or `key`.
pub mod implicit {
    pub const PREFIX: &str = "@has-";

    pub fn relation(resource_label: &str) -> String {
        format!("{PREFIX}{resource_label}")
    }

    pub fn owner(resource_label: &str) -> String {
        format!("{PREFIX}{resource_label}-owner")
    }

    pub fn value(resource_label: &str) -> String {
        format!("{PREFIX}{resource_label}-value")
    }

    pub fn is_implicit_label(label: &str) -> bool {
        label.starts_with(PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_type_serializes_screaming_snake() {
        let json = serde_json::to_string(&BaseType::RelationType).unwrap();
        assert_eq!(json, "\"RELATION_TYPE\"");
        assert_eq!(BaseType::parse("RELATION_TYPE"), Some(BaseType::RelationType));
        assert_eq!(BaseType::parse("nope"), None);
    }

    #[test]
    fn base_type_categories() {
        assert!(BaseType::RoleType.is_schema());
        assert!(!BaseType::Casting.is_schema());
        assert!(!BaseType::Casting.is_thing());
        assert!(BaseType::Resource.is_thing());
        assert_eq!(BaseType::EntityType.instance_kind(), Some(BaseType::Entity));
        assert_eq!(BaseType::Entity.instance_kind(), None);
    }

    #[test]
    fn doubles_compare_by_bits() {
        let a = Value::Double(0.1 + 0.2);
        let b = Value::Double(0.3);
        assert_ne!(a, b);
        assert_eq!(Value::Double(1.5), Value::Double(1.5));
        assert_ne!(Value::Long(1), Value::Double(1.0));
    }

    #[test]
    fn canonical_form_distinguishes_types() {
        assert_ne!(Value::from("1").canonical(), Value::from(1i64).canonical());
        assert_eq!(Value::from(true).canonical(), "boolean:true");
    }

    #[test]
    fn value_json_is_tagged() {
        let json = serde_json::to_string(&Value::Long(7)).unwrap();
        assert_eq!(json, r#"{"type":"long","value":7}"#);
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Long(7));
    }

    #[test]
    fn meta_and_implicit_labels() {
        assert!(meta::is_meta_label("entity"));
        assert!(!meta::is_meta_label("person"));
        assert_eq!(meta::root_for(BaseType::RoleType), Some("role"));
        assert_eq!(implicit::relation("name"), "@has-name");
        assert_eq!(implicit::owner("name"), "@has-name-owner");
        assert_eq!(implicit::value("name"), "@has-name-value");
        assert!(implicit::is_implicit_label("@has-name-value"));
    }
}
