//! End-to-end scenarios over an in-memory keyspace: schema rules, commit
//! validation, cascading deletes, and the transaction lifecycle.

use tessera_concept::{
    Concept, ConceptError, ConceptHandle, EntityType, Keyspace, RelationType, RoleType, RuleKind,
    Transaction, TxMode,
};
use tessera_core::{meta, BaseType, DataType, EngineConfig, Value};

struct Marriage {
    person: EntityType,
    marriage: RelationType,
    husband: RoleType,
    wife: RoleType,
}

fn marriage_schema(tx: &mut Transaction) -> Marriage {
    let person = tx.put_entity_type("person").unwrap();
    let husband = tx.put_role_type("husband").unwrap();
    let wife = tx.put_role_type("wife").unwrap();
    let marriage = tx.put_relation_type("marriage").unwrap();
    tx.relates(marriage, husband).unwrap();
    tx.relates(marriage, wife).unwrap();
    tx.plays(person, husband).unwrap();
    tx.plays(person, wife).unwrap();
    Marriage {
        person,
        marriage,
        husband,
        wife,
    }
}

fn committed_schema(ks: &Keyspace) -> Marriage {
    let mut tx = ks.transaction(TxMode::Write);
    let schema = marriage_schema(&mut tx);
    tx.commit().unwrap();
    schema
}

fn validation_report(err: ConceptError) -> tessera_concept::ValidationReport {
    match err {
        ConceptError::Validation(report) => report,
        other => panic!("expected a validation failure, got {other}"),
    }
}

// ── Scenarios ────────────────────────────────────────────────────

#[test]
fn marriage_survives_commit_and_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = dir.path().join("genealogy.json");
    let config = EngineConfig {
        snapshot_path: Some(snapshot.to_string_lossy().into_owned()),
        ..EngineConfig::in_memory("genealogy")
    };

    let ks = Keyspace::open(config.clone()).unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let s = marriage_schema(&mut tx);
    let alice = tx.add_entity(s.person).unwrap();
    let bob = tx.add_entity(s.person).unwrap();
    let wedding = tx.add_relation(s.marriage).unwrap();
    tx.add_role_player(wedding, s.husband, bob).unwrap();
    tx.add_role_player(wedding, s.wife, alice).unwrap();
    assert!(tx.validate().unwrap().is_empty());
    tx.commit().unwrap();

    let mut tx = ks.transaction(TxMode::Write);
    let person = tx.get_type("person").unwrap().unwrap();
    assert_eq!(person.id, s.person.id());
    assert_eq!(tx.get_concept(alice.id()).unwrap(), Some(Concept::from(alice)));
    assert_eq!(tx.get_concept(wedding.id()).unwrap(), Some(Concept::from(wedding)));
    let players = tx.role_players(wedding).unwrap();
    assert!(players[&s.husband].contains(&bob.id()));
    assert!(players[&s.wife].contains(&alice.id()));
    tx.close();

    ks.save_snapshot().unwrap();
    drop(ks);

    let reopened = Keyspace::open(config).unwrap();
    let mut tx = reopened.transaction(TxMode::Write);
    assert_eq!(tx.get_type("marriage").unwrap(), Some(Concept::from(s.marriage)));
    assert_eq!(tx.get_concept(bob.id()).unwrap(), Some(Concept::from(bob)));
    assert_eq!(tx.relations_of(alice, Some(s.wife)).unwrap(), vec![wedding]);
    assert_eq!(tx.instance_count(s.person).unwrap(), 2);
}

#[test]
fn lonely_role_fails_validation_without_partial_state() {
    let ks = Keyspace::in_memory("lonely").unwrap();
    let before = ks.graph().vertex_count().unwrap();

    let mut tx = ks.transaction(TxMode::Write);
    tx.put_role_type("lonely-role").unwrap();
    tx.put_entity_type("bystander").unwrap();

    let violations = tx.validate().unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].rule, RuleKind::RoleOwnership);

    let report = validation_report(tx.commit().unwrap_err());
    assert_eq!(report.violations.len(), 1);
    assert!(report.to_string().contains("lonely-role"));
    assert!(tx.cache().is_empty());
    assert!(!tx.is_open());

    assert_eq!(ks.graph().vertex_count().unwrap(), before);
    let mut tx = ks.transaction(TxMode::Write);
    assert!(tx.get_type("lonely-role").unwrap().is_none());
    assert!(tx.get_type("bystander").unwrap().is_none());
}

#[test]
fn commit_reports_every_violation() {
    let ks = Keyspace::in_memory("many").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    tx.put_role_type("orphan-a").unwrap();
    tx.put_role_type("orphan-b").unwrap();
    tx.put_relation_type("empty").unwrap();

    let report = validation_report(tx.commit().unwrap_err());
    assert_eq!(report.count(RuleKind::RoleOwnership), 2);
    assert_eq!(report.count(RuleKind::MinimumRoles), 1);
    assert_eq!(report.to_string().lines().count(), 4);
}

// ── Type Rules ───────────────────────────────────────────────────

#[test]
fn type_delete_is_guarded() {
    let ks = Keyspace::in_memory("delete").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::Write);
    let man = tx.put_entity_type("man").unwrap();
    tx.set_super_type(man, s.person).unwrap();
    assert!(matches!(
        tx.delete_type(s.person),
        Err(ConceptError::TypeHasSubTypes { count: 1, .. })
    ));

    tx.add_entity(man).unwrap();
    assert!(matches!(
        tx.delete_type(man),
        Err(ConceptError::TypeHasInstances { count: 1, .. })
    ));

    let entity = tx.get_entity_type(meta::ENTITY).unwrap().unwrap();
    assert!(matches!(
        tx.delete_type(entity),
        Err(ConceptError::MetaTypeImmutable { .. })
    ));

    let spare = tx.put_entity_type("spare").unwrap();
    tx.delete_type(spare).unwrap();
    assert!(tx.get_type("spare").unwrap().is_none());
    tx.commit().unwrap();
}

#[test]
fn cycle_is_rejected_and_super_type_kept() {
    let ks = Keyspace::in_memory("cycle").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let a = tx.put_entity_type("a").unwrap();
    let b = tx.put_entity_type("b").unwrap();
    let c = tx.put_entity_type("c").unwrap();
    tx.set_super_type(b, a).unwrap();
    tx.set_super_type(c, b).unwrap();
    let original = tx.super_type(a).unwrap();

    assert!(matches!(
        tx.set_super_type(a, c),
        Err(ConceptError::CycleDetected { .. })
    ));
    assert!(matches!(
        tx.set_super_type(a, a),
        Err(ConceptError::CycleDetected { .. })
    ));
    assert_eq!(tx.super_type(a).unwrap(), original);
    let chain = tx.super_chain(c).unwrap();
    assert_eq!(chain[..3].to_vec(), vec![c, b, a]);
    assert_eq!(tx.sub_types(a).unwrap(), vec![a, b, c]);
}

#[test]
fn meta_types_are_immutable() {
    let ks = Keyspace::in_memory("meta").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let entity = tx.get_entity_type(meta::ENTITY).unwrap().unwrap();
    let role = tx.put_role_type("r").unwrap();

    assert!(matches!(
        tx.set_abstract(entity, true),
        Err(ConceptError::MetaTypeImmutable { .. })
    ));
    assert!(matches!(
        tx.plays(entity, role),
        Err(ConceptError::MetaTypeImmutable { .. })
    ));
    assert!(matches!(
        tx.add_entity(entity),
        Err(ConceptError::MetaTypeInstance { .. })
    ));

    let inference = tx.get_rule_type(meta::INFERENCE_RULE).unwrap().unwrap();
    let rule = tx.add_rule(inference, "($x isa person)", "($x isa mortal)").unwrap();
    let (lhs, _) = tx.rule_bodies(rule).unwrap();
    assert_eq!(lhs, Some(Value::from("($x isa person)")));
}

#[test]
fn put_is_idempotent_per_label_and_kind() {
    let ks = Keyspace::in_memory("labels").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let first = tx.put_entity_type("thing").unwrap();
    assert_eq!(tx.put_entity_type("thing").unwrap(), first);
    assert!(matches!(
        tx.put_relation_type("thing"),
        Err(ConceptError::LabelTaken { .. })
    ));

    let name = tx.put_resource_type("name", DataType::String).unwrap();
    assert_eq!(tx.put_resource_type("name", DataType::String).unwrap(), name);
    assert!(matches!(
        tx.put_resource_type("name", DataType::Long),
        Err(ConceptError::ImmutableValue { .. })
    ));
    assert!(matches!(
        tx.put_resource_type_unique("name", DataType::String),
        Err(ConceptError::ImmutableValue { .. })
    ));
}

#[test]
fn abstract_flag_checks_instances() {
    let ks = Keyspace::in_memory("abstract").unwrap();
    let s = committed_schema(&ks);
    let mut tx = ks.transaction(TxMode::Write);
    tx.add_entity(s.person).unwrap();
    assert!(matches!(
        tx.set_abstract(s.person, true),
        Err(ConceptError::AbstractTypeInstances { count: 1, .. })
    ));
    assert!(!tx.is_abstract(s.person).unwrap());
}

// ── Instances ────────────────────────────────────────────────────

#[test]
fn duplicate_relation_is_rejected() {
    let ks = Keyspace::in_memory("dup-relation").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::Write);
    let alice = tx.add_entity(s.person).unwrap();
    let bob = tx.add_entity(s.person).unwrap();
    let first = tx.add_relation(s.marriage).unwrap();
    tx.add_role_player(first, s.husband, bob).unwrap();
    tx.add_role_player(first, s.wife, alice).unwrap();
    tx.commit().unwrap();

    let mut tx = ks.transaction(TxMode::Write);
    let second = tx.add_relation(s.marriage).unwrap();
    tx.add_role_player(second, s.wife, alice).unwrap();
    tx.add_role_player(second, s.husband, bob).unwrap();
    let report = validation_report(tx.commit().unwrap_err());
    assert_eq!(report.count(RuleKind::RelationUniqueness), 1);
    assert_eq!(report.violations[0].concept, second.id());

    let tx = ks.transaction(TxMode::Write);
    assert_eq!(tx.relations_of(alice, None).unwrap(), vec![first]);
    assert_eq!(tx.instance_count(s.marriage).unwrap(), 1);
}

#[test]
fn deleting_sole_player_removes_casting_and_relation() {
    let ks = Keyspace::in_memory("cascade").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::Write);
    let alice = tx.add_entity(s.person).unwrap();
    let solo = tx.add_relation(s.marriage).unwrap();
    let casting = tx.add_role_player(solo, s.wife, alice).unwrap();
    tx.commit().unwrap();

    let mut tx = ks.transaction(TxMode::Write);
    tx.delete_instance(alice).unwrap();
    assert!(tx.get_concept(casting.id()).unwrap().is_none());
    assert!(tx.get_concept(solo.id()).unwrap().is_none());
    tx.commit().unwrap();

    let mut tx = ks.transaction(TxMode::Write);
    assert!(tx.get_concept(solo.id()).unwrap().is_none());
    assert_eq!(tx.instance_count(s.marriage).unwrap(), 0);
    assert_eq!(tx.instance_count(s.person).unwrap(), 0);
}

#[test]
fn deleting_one_player_keeps_the_rest() {
    let ks = Keyspace::in_memory("partial").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::Write);
    let alice = tx.add_entity(s.person).unwrap();
    let bob = tx.add_entity(s.person).unwrap();
    let wedding = tx.add_relation(s.marriage).unwrap();
    tx.add_role_player(wedding, s.husband, bob).unwrap();
    tx.add_role_player(wedding, s.wife, alice).unwrap();
    tx.delete_instance(alice).unwrap();

    let players = tx.role_players(wedding).unwrap();
    assert_eq!(players.len(), 1);
    assert!(players[&s.husband].contains(&bob.id()));
    tx.commit().unwrap();
}

#[test]
fn castings_are_shared_per_role_and_player() {
    let ks = Keyspace::in_memory("castings").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::Write);
    let alice = tx.add_entity(s.person).unwrap();
    let bob = tx.add_entity(s.person).unwrap();
    let carl = tx.add_entity(s.person).unwrap();
    let first = tx.add_relation(s.marriage).unwrap();
    let c1 = tx.add_role_player(first, s.wife, alice).unwrap();
    tx.add_role_player(first, s.husband, bob).unwrap();
    let second = tx.add_relation(s.marriage).unwrap();
    let c2 = tx.add_role_player(second, s.wife, alice).unwrap();
    tx.add_role_player(second, s.husband, carl).unwrap();

    assert_eq!(c1, c2);
    assert_eq!(tx.castings_of(alice).unwrap(), vec![c1]);
    assert_eq!(tx.relations_of(alice, Some(s.wife)).unwrap(), vec![first, second]);
    tx.commit().unwrap();
}

#[test]
fn instance_counts_batch_until_commit() {
    let ks = Keyspace::in_memory("counts").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::Write);
    let alice = tx.add_entity(s.person).unwrap();
    tx.add_entity(s.person).unwrap();
    assert_eq!(tx.instance_count(s.person).unwrap(), 2);
    assert_eq!(tx.cache().pending_instance_count(s.person.id()), 2);
    tx.commit().unwrap();

    let mut tx = ks.transaction(TxMode::Write);
    tx.delete_instance(alice).unwrap();
    assert_eq!(tx.instance_count(s.person).unwrap(), 1);
    tx.rollback().unwrap();

    let tx = ks.transaction(TxMode::Write);
    assert_eq!(tx.instance_count(s.person).unwrap(), 2);
    assert_eq!(tx.instances(s.person).unwrap().len(), 2);
}

#[test]
fn scopes_link_instances() {
    let ks = Keyspace::in_memory("scopes").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::Write);
    let alice = tx.add_entity(s.person).unwrap();
    let bob = tx.add_entity(s.person).unwrap();
    let wedding = tx.add_relation(s.marriage).unwrap();
    tx.add_role_player(wedding, s.husband, bob).unwrap();
    tx.add_role_player(wedding, s.wife, alice).unwrap();

    tx.scope(wedding, alice).unwrap();
    tx.scope(wedding, alice).unwrap();
    assert_eq!(tx.scopes(wedding).unwrap(), vec![Concept::from(alice)]);
    tx.delete_scope(wedding, alice).unwrap();
    assert!(tx.scopes(wedding).unwrap().is_empty());
    tx.commit().unwrap();
}

#[test]
fn concepts_of_kind_sees_own_writes() {
    let ks = Keyspace::in_memory("kinds").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::Write);
    let alice = tx.add_entity(s.person).unwrap();
    let bob = tx.add_entity(s.person).unwrap();
    tx.commit().unwrap();

    let mut tx = ks.transaction(TxMode::Write);
    let carl = tx.add_entity(s.person).unwrap();
    tx.delete_instance(alice).unwrap();
    let entities = tx.concepts_of_kind(BaseType::Entity).unwrap();
    assert_eq!(entities, vec![Concept::from(bob), Concept::from(carl)]);

    let relation_types = tx.concepts_of_kind(BaseType::RelationType).unwrap();
    assert!(relation_types.contains(&Concept::from(s.marriage)));
    tx.rollback().unwrap();

    let tx = ks.transaction(TxMode::Write);
    let entities = tx.concepts_of_kind(BaseType::Entity).unwrap();
    assert_eq!(entities, vec![Concept::from(alice), Concept::from(bob)]);
}

// ── Resources ────────────────────────────────────────────────────

#[test]
fn has_resource_creates_implicit_types() {
    let ks = Keyspace::in_memory("implicit").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let person = tx.put_entity_type("person").unwrap();
    let name = tx.put_resource_type("name", DataType::String).unwrap();
    let has_name = tx.has_resource(person, name).unwrap();
    assert_eq!(tx.has_resource(person, name).unwrap(), has_name);

    assert!(tx.is_implicit(has_name).unwrap());
    let owner = tx.get_role_type("@has-name-owner").unwrap().unwrap();
    let value = tx.get_role_type("@has-name-value").unwrap().unwrap();
    assert_eq!(tx.roles_related(has_name).unwrap(), vec![owner, value]);
    assert_eq!(tx.roles_played(person).unwrap(), vec![owner]);
    assert_eq!(tx.roles_played(name).unwrap(), vec![value]);

    let alice = tx.add_entity(person).unwrap();
    let label = tx.put_resource(name, "alice".into()).unwrap();
    let rel = tx.has(alice, label).unwrap();
    assert_eq!(tx.has(alice, label).unwrap(), rel);
    assert_eq!(tx.resources_of(alice).unwrap(), vec![label]);
    assert_eq!(tx.owners_of(label).unwrap(), vec![Concept::from(alice)]);
    tx.commit().unwrap();
}

#[test]
fn key_is_required_and_survives_has_resource() {
    let ks = Keyspace::in_memory("keys").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let person = tx.put_entity_type("person").unwrap();
    let ssn = tx.put_resource_type("ssn", DataType::String).unwrap();
    tx.key(person, ssn).unwrap();
    tx.has_resource(person, ssn).unwrap();
    tx.commit().unwrap();

    let mut tx = ks.transaction(TxMode::Write);
    tx.add_entity(person).unwrap();
    let report = validation_report(tx.commit().unwrap_err());
    assert_eq!(report.count(RuleKind::RequiredRoles), 1);

    let mut tx = ks.transaction(TxMode::Write);
    let alice = tx.add_entity(person).unwrap();
    let number = tx.put_resource(ssn, "123-45".into()).unwrap();
    tx.has(alice, number).unwrap();
    tx.commit().unwrap();
}

#[test]
fn resource_without_attachment_is_rejected() {
    let ks = Keyspace::in_memory("unattached").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let person = tx.put_entity_type("person").unwrap();
    let nickname = tx.put_resource_type("nickname", DataType::String).unwrap();
    let alice = tx.add_entity(person).unwrap();
    let value = tx.put_resource(nickname, "al".into()).unwrap();
    assert!(matches!(
        tx.has(alice, value),
        Err(ConceptError::ResourceNotAttached { .. })
    ));
}

#[test]
fn unique_resource_has_one_owner() {
    let ks = Keyspace::in_memory("unique").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let person = tx.put_entity_type("person").unwrap();
    let email = tx
        .put_resource_type_unique("email", DataType::String)
        .unwrap();
    tx.has_resource(person, email).unwrap();
    let alice = tx.add_entity(person).unwrap();
    let bob = tx.add_entity(person).unwrap();
    let address = tx.put_resource(email, "a@example.com".into()).unwrap();
    tx.has(alice, address).unwrap();

    match tx.has(bob, address) {
        Err(ConceptError::ResourceNotUnique { owner, .. }) => assert_eq!(owner, alice.id()),
        other => panic!("expected ResourceNotUnique, got {other:?}"),
    }
}

#[test]
fn resource_values_match_data_type() {
    let ks = Keyspace::in_memory("datatypes").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let age = tx.put_resource_type("age", DataType::Long).unwrap();
    assert!(matches!(
        tx.put_resource(age, "old".into()),
        Err(ConceptError::DataTypeMismatch { .. })
    ));
    let forty = tx.put_resource(age, 40i64.into()).unwrap();
    assert_eq!(tx.put_resource(age, Value::Long(40)).unwrap(), forty);
    assert_eq!(tx.value(forty).unwrap(), Some(Value::Long(40)));
}

// ── Lifecycle ────────────────────────────────────────────────────

#[test]
fn cache_is_cleared_once_on_commit() {
    let ks = Keyspace::in_memory("cache").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    let s = marriage_schema(&mut tx);
    tx.add_entity(s.person).unwrap();
    assert!(!tx.cache().is_empty());
    tx.commit().unwrap();
    assert!(tx.cache().is_empty());
    assert_eq!(tx.cache().clear_count(), 1);
}

#[test]
fn cache_is_cleared_once_on_failed_commit() {
    let ks = Keyspace::in_memory("cache-fail").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    tx.put_role_type("lonely-role").unwrap();
    assert!(tx.commit().is_err());
    assert!(tx.cache().is_empty());
    assert_eq!(tx.cache().clear_count(), 1);
}

#[test]
fn schema_locked_transaction_rejects_schema_writes() {
    let ks = Keyspace::in_memory("locked").unwrap();
    let s = committed_schema(&ks);

    let mut tx = ks.transaction(TxMode::SchemaLocked);
    let err = tx.put_entity_type("newcomer").unwrap_err();
    assert!(matches!(err, ConceptError::SchemaLocked));
    assert_eq!(
        err.to_string(),
        "Schema mutations are not permitted in a schema-locked transaction"
    );
    assert!(matches!(
        tx.set_abstract(s.person, true),
        Err(ConceptError::SchemaLocked)
    ));
    assert_eq!(tx.put_entity_type("person").unwrap(), s.person);

    tx.add_entity(s.person).unwrap();
    tx.commit().unwrap();
}

#[test]
fn closed_transaction_rejects_everything() {
    let ks = Keyspace::in_memory("closed").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    tx.put_entity_type("person").unwrap();
    tx.commit().unwrap();

    assert!(matches!(
        tx.put_entity_type("late"),
        Err(ConceptError::TransactionClosed)
    ));
    assert!(matches!(tx.commit(), Err(ConceptError::TransactionClosed)));
    assert!(matches!(tx.rollback(), Err(ConceptError::TransactionClosed)));
    tx.close();
}

#[test]
fn rollback_discards_writes() {
    let ks = Keyspace::in_memory("rollback").unwrap();
    let mut tx = ks.transaction(TxMode::Write);
    tx.put_entity_type("ephemeral").unwrap();
    tx.rollback().unwrap();
    assert_eq!(tx.cache().clear_count(), 1);

    let mut tx = ks.transaction(TxMode::Write);
    assert!(tx.get_type("ephemeral").unwrap().is_none());
}
