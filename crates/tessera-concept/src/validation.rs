//! Commit-time structural validation.
//!
//! Each rule is a pure function over a [`ValidationContext`] (a read view of
//! the transaction plus its cache) returning the violations it found. The
//! rules run in a fixed order and their results are concatenated; nothing
//! here writes to the graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tessera_core::BaseType;

use crate::cache::TxCache;
use crate::concept::ConceptId;
use crate::error::Result;
use crate::keys;
use crate::reader::ConceptReader;

// ── Report Types ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RuleKind {
    RoleOwnership,
    MinimumRoles,
    PlaysRole,
    RelationStructure,
    AbstractInstances,
    RelationUniqueness,
    RequiredRoles,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleKind::RoleOwnership => "role-ownership",
            RuleKind::MinimumRoles => "minimum-roles",
            RuleKind::PlaysRole => "plays-role",
            RuleKind::RelationStructure => "relation-structure",
            RuleKind::AbstractInstances => "abstract-instances",
            RuleKind::RelationUniqueness => "relation-uniqueness",
            RuleKind::RequiredRoles => "required-roles",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One failed predicate, naming the offending concept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Violation {
    pub rule: RuleKind,
    pub concept: ConceptId,
    pub message: String,
}

impl Violation {
    fn new(rule: RuleKind, concept: ConceptId, message: impl Into<String>) -> Self {
        Self {
            rule,
            concept,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.rule, self.concept, self.message)
    }
}

/// Every violation found by one validation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn new(violations: Vec<Violation>) -> Self {
        Self { violations }
    }

    pub fn is_empty(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn count(&self, rule: RuleKind) -> usize {
        self.violations.iter().filter(|v| v.rule == rule).count()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Validation failed with {} violation(s):",
            self.violations.len()
        )?;
        for violation in &self.violations {
            write!(f, "\n  {violation}")?;
        }
        Ok(())
    }
}

// ── Rules ────────────────────────────────────────────────────────

/// What a rule sees: the transaction's graph view and its modified set.
pub struct ValidationContext<'a> {
    pub reader: ConceptReader<'a>,
    pub cache: &'a TxCache,
}

impl<'a> ValidationContext<'a> {
    pub fn new(reader: ConceptReader<'a>, cache: &'a TxCache) -> Self {
        Self { reader, cache }
    }

    /// Modified concepts of `kind` that still exist.
    fn live(&self, kind: BaseType) -> Result<Vec<ConceptId>> {
        let mut out = Vec::new();
        for id in self.cache.modified_of_kind(kind) {
            if self.reader.is_kind(id, kind)? {
                out.push(id);
            }
        }
        Ok(out)
    }

    fn live_things(&self) -> Result<Vec<ConceptId>> {
        let mut out = Vec::new();
        for kind in [BaseType::Entity, BaseType::Relation, BaseType::Resource, BaseType::Rule] {
            out.extend(self.live(kind)?);
        }
        out.sort();
        Ok(out)
    }
}

pub type RuleFn = fn(&ValidationContext<'_>) -> Result<Vec<Violation>>;

/// The rules, in the order they run.
pub const RULES: [(RuleKind, RuleFn); 7] = [
    (RuleKind::RoleOwnership, role_ownership),
    (RuleKind::MinimumRoles, minimum_roles),
    (RuleKind::PlaysRole, plays_role),
    (RuleKind::RelationStructure, relation_structure),
    (RuleKind::AbstractInstances, abstract_instances),
    (RuleKind::RelationUniqueness, relation_uniqueness),
    (RuleKind::RequiredRoles, required_roles),
];

/// Run every rule and concatenate the results.
pub fn validate(ctx: &ValidationContext<'_>) -> Result<Vec<Violation>> {
    let mut violations = Vec::new();
    for (kind, rule) in RULES {
        let found = rule(ctx)?;
        if !found.is_empty() {
            tracing::debug!(rule = %kind, count = found.len(), "Validation rule failed");
        }
        violations.extend(found);
    }
    Ok(violations)
}

/// Every modified, non-abstract role must be declared by exactly one
/// non-abstract relation type.
pub fn role_ownership(ctx: &ValidationContext<'_>) -> Result<Vec<Violation>> {
    let r = ctx.reader;
    let mut out = Vec::new();
    for role in ctx.live(BaseType::RoleType)? {
        if r.is_meta(role)? || r.is_abstract(role)? {
            continue;
        }
        let mut owners = Vec::new();
        for relation_type in r.relation_types_of(role)? {
            if !r.is_abstract(relation_type)? {
                owners.push(relation_type);
            }
        }
        if owners.len() != 1 {
            out.push(Violation::new(
                RuleKind::RoleOwnership,
                role,
                format!(
                    "Role [{}] must be declared by exactly one non-abstract relation type, found {}",
                    r.describe(role)?,
                    owners.len()
                ),
            ));
        }
    }
    Ok(out)
}

/// Every modified, non-abstract relation type must declare two roles.
pub fn minimum_roles(ctx: &ValidationContext<'_>) -> Result<Vec<Violation>> {
    let r = ctx.reader;
    let mut out = Vec::new();
    for relation_type in ctx.live(BaseType::RelationType)? {
        if r.is_meta(relation_type)? || r.is_abstract(relation_type)? {
            continue;
        }
        let declared: BTreeSet<ConceptId> = r.relates(relation_type)?.into_iter().collect();
        if declared.len() < 2 {
            out.push(Violation::new(
                RuleKind::MinimumRoles,
                relation_type,
                format!(
                    "Relation type [{}] declares {} role(s), at least 2 are required",
                    r.describe(relation_type)?,
                    declared.len()
                ),
            ));
        }
    }
    Ok(out)
}

/// The player of every modified casting must be allowed to play its role:
/// some type on the player's super chain plays the role or a sub-role.
pub fn plays_role(ctx: &ValidationContext<'_>) -> Result<Vec<Violation>> {
    let r = ctx.reader;
    let mut out = Vec::new();
    for &casting in ctx.cache.modified_castings() {
        if !r.is_kind(casting, BaseType::Casting)? {
            continue;
        }
        let (Some(role), Some(player)) = (r.role_of_casting(casting)?, r.player_of_casting(casting)?)
        else {
            continue;
        };
        let Some(player_type) = r.type_of(player)? else {
            continue;
        };

        let accepted: BTreeSet<ConceptId> = r.sub_types(role)?.into_iter().collect();
        let mut allowed = false;
        'chain: for ancestor in r.super_chain(player_type)? {
            for (played, _) in r.plays(ancestor)? {
                if accepted.contains(&played) {
                    allowed = true;
                    break 'chain;
                }
            }
        }

        if !allowed {
            out.push(Violation::new(
                RuleKind::PlaysRole,
                casting,
                format!(
                    "Type [{}] of role player {} is not allowed to play role [{}]",
                    r.describe(player_type)?,
                    player,
                    r.describe(role)?
                ),
            ));
        }
    }
    Ok(out)
}

/// Roles used by a modified relation must be declared by its type.
pub fn relation_structure(ctx: &ValidationContext<'_>) -> Result<Vec<Violation>> {
    let r = ctx.reader;
    let mut out = Vec::new();
    for relation in ctx.live(BaseType::Relation)? {
        let Some(relation_type) = r.type_of(relation)? else {
            continue;
        };
        let declared: BTreeSet<ConceptId> = r.relates(relation_type)?.into_iter().collect();
        let undeclared: BTreeSet<ConceptId> = r
            .role_players(relation)?
            .into_iter()
            .map(|(role, _)| role)
            .filter(|role| !declared.contains(role))
            .collect();
        for role in undeclared {
            out.push(Violation::new(
                RuleKind::RelationStructure,
                relation,
                format!(
                    "Relation of type [{}] uses role [{}] which its type does not declare",
                    r.describe(relation_type)?,
                    r.describe(role)?
                ),
            ));
        }
    }
    Ok(out)
}

/// Abstract types touched by the transaction, directly or through a new
/// instance, must have no direct instances.
pub fn abstract_instances(ctx: &ValidationContext<'_>) -> Result<Vec<Violation>> {
    let r = ctx.reader;
    let mut candidates = BTreeSet::new();
    for kind in BaseType::ALL.into_iter().filter(BaseType::is_schema) {
        candidates.extend(ctx.live(kind)?);
    }
    for thing in ctx.live_things()? {
        candidates.extend(r.type_of(thing)?);
    }

    let mut out = Vec::new();
    for type_id in candidates {
        if !r.is_abstract(type_id)? {
            continue;
        }
        let count = r.direct_instances(type_id)?.len();
        if count > 0 {
            out.push(Violation::new(
                RuleKind::AbstractInstances,
                type_id,
                format!(
                    "Abstract type [{}] has {} direct instance(s)",
                    r.describe(type_id)?,
                    count
                ),
            ));
        }
    }
    Ok(out)
}

/// No two relations of one type may share a role-player assignment. The
/// later relation of each clashing pair is reported.
pub fn relation_uniqueness(ctx: &ValidationContext<'_>) -> Result<Vec<Violation>> {
    let r = ctx.reader;
    let modified: BTreeSet<ConceptId> = ctx.live(BaseType::Relation)?.into_iter().collect();
    let mut by_key: BTreeMap<String, Vec<ConceptId>> = BTreeMap::new();
    let mut out = Vec::new();

    for &relation in &modified {
        let (Some(relation_type), pairs) = r.relation_signature(relation)? else {
            continue;
        };
        if pairs.is_empty() {
            continue;
        }
        let key = keys::relation_key(relation_type, &pairs);

        // Stored keys of untouched relations are current; modified ones are
        // compared by their freshly computed key below.
        for existing in r.lookup_index(&key)? {
            if existing == relation || modified.contains(&existing) {
                continue;
            }
            if r.relation_signature(existing)? == (Some(relation_type), pairs.clone()) {
                out.push(Violation::new(
                    RuleKind::RelationUniqueness,
                    relation,
                    format!(
                        "Relation of type [{}] duplicates existing relation {} with the same role players",
                        r.describe(relation_type)?,
                        existing
                    ),
                ));
                break;
            }
        }
        by_key.entry(key).or_default().push(relation);
    }

    for group in by_key.into_values().filter(|g| g.len() > 1) {
        let first = group[0];
        for &later in &group[1..] {
            out.push(Violation::new(
                RuleKind::RelationUniqueness,
                later,
                format!("Relation duplicates relation {first} created in the same transaction"),
            ));
        }
    }
    Ok(out)
}

/// A thing whose type requires a role (a key) must play it in exactly one
/// relation.
pub fn required_roles(ctx: &ValidationContext<'_>) -> Result<Vec<Violation>> {
    let r = ctx.reader;
    let mut out = Vec::new();
    for thing in ctx.live_things()? {
        let Some(thing_type) = r.type_of(thing)? else {
            continue;
        };
        let mut required = BTreeSet::new();
        for ancestor in r.super_chain(thing_type)? {
            required.extend(
                r.plays(ancestor)?
                    .into_iter()
                    .filter(|(_, req)| *req)
                    .map(|(role, _)| role),
            );
        }
        for role in required {
            let count = r.relations_of_player(thing, Some(role))?.len();
            if count != 1 {
                out.push(Violation::new(
                    RuleKind::RequiredRoles,
                    thing,
                    format!(
                        "Instance of [{}] must play required role [{}] exactly once, found {}",
                        r.describe(thing_type)?,
                        r.describe(role)?,
                        count
                    ),
                ));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::ConceptHandle;
    use crate::keyspace::Keyspace;
    use crate::transaction::{Transaction, TxMode};
    use tessera_core::DataType;

    fn run(tx: &Transaction, rule: RuleFn) -> Vec<Violation> {
        let ctx = ValidationContext::new(tx.reader(), tx.cache());
        rule(&ctx).unwrap()
    }

    fn write_tx(ks: &Keyspace) -> Transaction {
        ks.transaction(TxMode::Write)
    }

    #[test]
    fn role_without_owner_is_reported() {
        let ks = Keyspace::in_memory("validation").unwrap();
        let mut tx = write_tx(&ks);
        let role = tx.put_role_type("lonely-role").unwrap();
        let found = run(&tx, role_ownership);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].concept, role.id());

        tx.set_abstract(role, true).unwrap();
        assert!(run(&tx, role_ownership).is_empty());
    }

    #[test]
    fn role_with_two_owners_is_reported() {
        let ks = Keyspace::in_memory("validation").unwrap();
        let mut tx = write_tx(&ks);
        let shared = tx.put_role_type("shared").unwrap();
        for label in ["first", "second"] {
            let rel = tx.put_relation_type(label).unwrap();
            tx.relates(rel, shared).unwrap();
        }
        let found = run(&tx, role_ownership);
        assert_eq!(found.len(), 1);
        assert!(found[0].message.contains("found 2"));
    }

    #[test]
    fn relation_type_needs_two_roles() {
        let ks = Keyspace::in_memory("validation").unwrap();
        let mut tx = write_tx(&ks);
        let rel = tx.put_relation_type("solo").unwrap();
        let only = tx.put_role_type("only").unwrap();
        tx.relates(rel, only).unwrap();
        assert_eq!(run(&tx, minimum_roles).len(), 1);

        let other = tx.put_role_type("other").unwrap();
        tx.relates(rel, other).unwrap();
        assert!(run(&tx, minimum_roles).is_empty());
    }

    #[test]
    fn plays_role_walks_both_hierarchies() {
        let ks = Keyspace::in_memory("validation").unwrap();
        let mut tx = write_tx(&ks);
        let animal = tx.put_entity_type("animal").unwrap();
        let dog = tx.put_entity_type("dog").unwrap();
        tx.set_super_type(dog, animal).unwrap();
        let pet = tx.put_role_type("pet").unwrap();
        let good_pet = tx.put_role_type("good-pet").unwrap();
        tx.set_super_type(good_pet, pet).unwrap();
        let owner = tx.put_role_type("pet-owner").unwrap();
        let ownership = tx.put_relation_type("ownership").unwrap();
        tx.relates(ownership, pet).unwrap();
        tx.relates(ownership, owner).unwrap();

        let rex = tx.add_entity(dog).unwrap();
        let rel = tx.add_relation(ownership).unwrap();
        tx.add_role_player(rel, pet, rex).unwrap();
        assert_eq!(run(&tx, plays_role).len(), 1);

        // animal plays a sub-role of pet: accepted for dog through its super chain
        tx.plays(animal, good_pet).unwrap();
        assert!(run(&tx, plays_role).is_empty());
    }

    #[test]
    fn undeclared_role_breaks_structure() {
        let ks = Keyspace::in_memory("validation").unwrap();
        let mut tx = write_tx(&ks);
        let person = tx.put_entity_type("person").unwrap();
        let a = tx.put_role_type("a").unwrap();
        let b = tx.put_role_type("b").unwrap();
        let stray = tx.put_role_type("stray").unwrap();
        let rel_type = tx.put_relation_type("pair").unwrap();
        tx.relates(rel_type, a).unwrap();
        tx.relates(rel_type, b).unwrap();
        tx.plays(person, stray).unwrap();

        let p = tx.add_entity(person).unwrap();
        let rel = tx.add_relation(rel_type).unwrap();
        tx.add_role_player(rel, stray, p).unwrap();
        let found = run(&tx, relation_structure);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].concept, rel.id());
    }

    #[test]
    fn abstract_type_with_instance_is_reported() {
        let ks = Keyspace::in_memory("validation").unwrap();
        let mut tx = write_tx(&ks);
        let shape = tx.put_entity_type("shape").unwrap();
        tx.set_abstract(shape, true).unwrap();
        assert!(run(&tx, abstract_instances).is_empty());

        tx.add_entity(shape).unwrap();
        let found = run(&tx, abstract_instances);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].concept, shape.id());
    }

    #[test]
    fn duplicate_relations_in_one_transaction() {
        let ks = Keyspace::in_memory("validation").unwrap();
        let mut tx = write_tx(&ks);
        let person = tx.put_entity_type("person").unwrap();
        let friend = tx.put_role_type("friend").unwrap();
        let other = tx.put_role_type("other-friend").unwrap();
        let friendship = tx.put_relation_type("friendship").unwrap();
        tx.relates(friendship, friend).unwrap();
        tx.relates(friendship, other).unwrap();
        tx.plays(person, friend).unwrap();
        tx.plays(person, other).unwrap();

        let alice = tx.add_entity(person).unwrap();
        let bob = tx.add_entity(person).unwrap();
        let mut relations = Vec::new();
        for _ in 0..2 {
            let rel = tx.add_relation(friendship).unwrap();
            tx.add_role_player(rel, friend, alice).unwrap();
            tx.add_role_player(rel, other, bob).unwrap();
            relations.push(rel);
        }
        let found = run(&tx, relation_uniqueness);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].concept, relations[1].id());
    }

    #[test]
    fn key_must_be_present() {
        let ks = Keyspace::in_memory("validation").unwrap();
        let mut tx = write_tx(&ks);
        let person = tx.put_entity_type("person").unwrap();
        let ssn = tx.put_resource_type("ssn", DataType::String).unwrap();
        tx.key(person, ssn).unwrap();

        let alice = tx.add_entity(person).unwrap();
        assert_eq!(run(&tx, required_roles).len(), 1);

        let value = tx.put_resource(ssn, "123".into()).unwrap();
        tx.has(alice, value).unwrap();
        assert!(run(&tx, required_roles).is_empty());
    }

    #[test]
    fn report_lists_one_line_per_violation() {
        let report = ValidationReport::new(vec![
            Violation::new(RuleKind::RoleOwnership, ConceptId(4), "first"),
            Violation::new(RuleKind::MinimumRoles, ConceptId(9), "second"),
        ]);
        let text = report.to_string();
        assert_eq!(text.lines().count(), 3);
        assert!(text.starts_with("Validation failed with 2 violation(s):"));
        assert!(text.contains("[minimum-roles] #9: second"));
        assert_eq!(report.count(RuleKind::RoleOwnership), 1);
    }
}
