//! Content-addressed keys.
//!
//! A key is derived from a concept's semantic identity only, never from its
//! id, so two transactions creating the same fact independently compute the
//! same key. Keys are stored in the `INDEX` property and looked up through
//! the substrate index, which does not enforce uniqueness.

use tessera_core::Value;

use crate::concept::ConceptId;

const CASTING: &str = "casting";
const RESOURCE: &str = "resource";
const RELATION: &str = "relation";

fn digest(kind: &str, payload: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(kind.as_bytes());
    hasher.update(&[0]);
    hasher.update(payload.as_bytes());
    format!("{kind}-{}", hasher.finalize().to_hex())
}

/// Key of a casting: (role type, role player). The owning relation is left
/// out so duplicate castings attached to different relations collide.
pub fn casting_key(role: ConceptId, player: ConceptId) -> String {
    digest(CASTING, &format!("{}|{}", role.0, player.0))
}

/// Key of a resource: (resource type, value).
pub fn resource_key(resource_type: ConceptId, value: &Value) -> String {
    digest(RESOURCE, &format!("{}|{}", resource_type.0, value.canonical()))
}

/// Key of a relation: (relation type, sorted role -> player assignments).
pub fn relation_key(relation_type: ConceptId, assignments: &[(ConceptId, ConceptId)]) -> String {
    let mut pairs = assignments.to_vec();
    pairs.sort();
    let mut payload = relation_type.0.to_string();
    for (role, player) in pairs {
        payload.push_str(&format!("|{}={}", role.0, player.0));
    }
    digest(RELATION, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn casting_key_ignores_relation() {
        let a = casting_key(ConceptId(10), ConceptId(20));
        let b = casting_key(ConceptId(10), ConceptId(20));
        assert_eq!(a, b);
        assert_ne!(a, casting_key(ConceptId(20), ConceptId(10)));
        assert!(a.starts_with("casting-"));
    }

    #[test]
    fn resource_key_depends_on_type_and_value() {
        let name = ConceptId(4);
        let k1 = resource_key(name, &Value::from("alice"));
        assert_eq!(k1, resource_key(name, &Value::from("alice")));
        assert_ne!(k1, resource_key(name, &Value::from("bob")));
        assert_ne!(k1, resource_key(ConceptId(5), &Value::from("alice")));
        assert!(k1.starts_with("resource-"));
    }

    #[test]
    fn relation_key_is_order_independent() {
        let t = ConceptId(1);
        let forward = relation_key(t, &[(ConceptId(2), ConceptId(8)), (ConceptId(3), ConceptId(9))]);
        let reverse = relation_key(t, &[(ConceptId(3), ConceptId(9)), (ConceptId(2), ConceptId(8))]);
        assert_eq!(forward, reverse);
        let swapped = relation_key(t, &[(ConceptId(2), ConceptId(9)), (ConceptId(3), ConceptId(8))]);
        assert_ne!(forward, swapped);
    }
}
