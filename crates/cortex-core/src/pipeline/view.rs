//! Projections from stored records into the caller-facing context views.

use cortex_types::context::{
    InvariantView, IdentityView, MemoryItemView, MemoryView, StyleView, ValueView,
};
use cortex_types::identity::Identity;
use cortex_types::memory::MemoryRetrieval;

/// Identity view with values ordered by descending priority.
///
/// Values with equal priority keep their stored order.
pub fn identity_view(identity: &Identity) -> IdentityView {
    let mut values: Vec<ValueView> = identity
        .values
        .iter()
        .map(|v| ValueView {
            name: v.name.clone(),
            description: v.description.clone(),
            priority: v.priority,
        })
        .collect();
    values.sort_by(|a, b| b.priority.cmp(&a.priority));

    IdentityView {
        name: identity.name.clone(),
        description: identity.description.clone(),
        risk_posture: identity.risk_posture,
        version: identity.version,
        values,
        invariants: identity
            .invariants
            .iter()
            .map(|i| InvariantView {
                rule: i.rule.clone(),
                rationale: i.rationale.clone(),
            })
            .collect(),
        style: identity
            .style_constraints
            .iter()
            .map(|s| StyleView {
                aspect: s.aspect.clone(),
                constraint: s.constraint.clone(),
            })
            .collect(),
    }
}

fn items(retrieval: &MemoryRetrieval) -> Vec<MemoryItemView> {
    retrieval
        .memories
        .iter()
        .map(|s| MemoryItemView {
            content: s.memory.content.clone(),
            confidence: s.memory.confidence,
        })
        .collect()
}

pub fn memory_view(
    lessons: &MemoryRetrieval,
    preferences: &MemoryRetrieval,
    warnings: &MemoryRetrieval,
) -> MemoryView {
    MemoryView {
        lessons: items(lessons),
        preferences: items(preferences),
        warnings: items(warnings),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use cortex_types::identity::{IdentityId, IdentityValue, RiskPosture};
    use uuid::Uuid;

    fn value(name: &str, priority: u32) -> IdentityValue {
        IdentityValue {
            id: Uuid::now_v7(),
            name: name.to_string(),
            description: format!("{name} matters"),
            priority,
        }
    }

    #[test]
    fn test_values_sorted_by_priority_stable() {
        let now = Utc::now();
        let identity = Identity {
            id: IdentityId::new(),
            name: "Atlas".to_string(),
            description: None,
            values: vec![value("speed", 1), value("safety", 9), value("clarity", 1)],
            invariants: vec![],
            style_constraints: vec![],
            risk_posture: RiskPosture::Moderate,
            version: 3,
            created_at: now,
            updated_at: now,
        };

        let view = identity_view(&identity);
        let names: Vec<&str> = view.values.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["safety", "speed", "clarity"]);
        assert_eq!(view.version, 3);
        // The source record is untouched.
        assert_eq!(identity.values[0].name, "speed");
    }
}
