//! State → district → age-group tree with a per-state "Other" remainder.
//!
//! Nodes live in a flat arena and point at their parent by string id; the
//! tree is rebuilt on every call and never edited afterwards.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::filter::AgeGroupSelection;
use crate::models::{AgeGroup, EnrollmentRecord};

pub const ROOT_ID: &str = "root";
pub const ROOT_LABEL: &str = "India";
pub const OTHER_LABEL: &str = "Other";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HierarchyMode {
    /// Each record contributes its `total`.
    #[default]
    Total,
    /// Each record contributes its selected age groups, and districts gain
    /// one child per age group.
    AgeBreakdown,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HierarchyNode {
    pub id: String,
    pub label: String,
    pub parent_id: Option<String>,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hierarchy {
    pub nodes: Vec<HierarchyNode>,
}

impl Hierarchy {
    pub fn root(&self) -> Option<&HierarchyNode> {
        self.nodes.iter().find(|node| node.parent_id.is_none())
    }

    pub fn node(&self, id: &str) -> Option<&HierarchyNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn children<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a HierarchyNode> + 'a {
        self.nodes
            .iter()
            .filter(move |node| node.parent_id.as_deref() == Some(id))
    }
}

#[derive(Default)]
struct DistrictAcc {
    value: u64,
    by_age: BTreeMap<AgeGroup, u64>,
}

pub fn build_hierarchy(
    records: &[EnrollmentRecord],
    mode: HierarchyMode,
    age_groups: &AgeGroupSelection,
    max_children_per_state: usize,
) -> Hierarchy {
    let mut grand_total = 0u64;
    let mut states: HashMap<&str, u64> = HashMap::new();
    let mut districts: HashMap<&str, HashMap<&str, DistrictAcc>> = HashMap::new();

    for record in records {
        let contribution = match mode {
            HierarchyMode::Total => record.total,
            HierarchyMode::AgeBreakdown => record.sum_of(age_groups.iter()),
        };
        if contribution == 0 {
            continue;
        }

        grand_total += contribution;
        *states.entry(record.state.as_str()).or_insert(0) += contribution;
        let acc = districts
            .entry(record.state.as_str())
            .or_default()
            .entry(record.district.as_str())
            .or_default();
        acc.value += contribution;
        if mode == HierarchyMode::AgeBreakdown {
            for group in age_groups.iter() {
                let count = record.count(group);
                if count > 0 {
                    *acc.by_age.entry(group).or_insert(0) += count;
                }
            }
        }
    }

    let mut nodes = vec![HierarchyNode {
        id: ROOT_ID.to_string(),
        label: ROOT_LABEL.to_string(),
        parent_id: None,
        value: grand_total,
    }];

    let mut ranked_states: Vec<(&str, u64)> = states.into_iter().collect();
    ranked_states.sort_by(by_value_desc);

    for (state, state_total) in ranked_states {
        let state_id = format!("state:{state}");
        nodes.push(HierarchyNode {
            id: state_id.clone(),
            label: state.to_string(),
            parent_id: Some(ROOT_ID.to_string()),
            value: state_total,
        });

        let mut ranked: Vec<(&str, DistrictAcc)> = districts
            .remove(state)
            .map(|map| map.into_iter().collect())
            .unwrap_or_default();
        ranked.sort_by(|a, b| by_value_desc(&(a.0, a.1.value), &(b.0, b.1.value)));

        let keep = max_children_per_state.min(ranked.len());
        let rest = ranked.split_off(keep);

        for (district, acc) in ranked {
            let district_id = format!("district:{state}:{district}");
            nodes.push(HierarchyNode {
                id: district_id.clone(),
                label: district.to_string(),
                parent_id: Some(state_id.clone()),
                value: acc.value,
            });
            if mode == HierarchyMode::AgeBreakdown {
                push_age_children(&mut nodes, &district_id, &format!("{state}:{district}"), &acc.by_age);
            }
        }

        if !rest.is_empty() {
            let other_id = format!("district:{state}:__other__");
            let mut other_by_age: BTreeMap<AgeGroup, u64> = BTreeMap::new();
            let mut other_total = 0u64;
            for (_, acc) in &rest {
                other_total += acc.value;
                for (group, count) in &acc.by_age {
                    *other_by_age.entry(*group).or_insert(0) += count;
                }
            }
            nodes.push(HierarchyNode {
                id: other_id.clone(),
                label: OTHER_LABEL.to_string(),
                parent_id: Some(state_id.clone()),
                value: other_total,
            });
            if mode == HierarchyMode::AgeBreakdown {
                push_age_children(&mut nodes, &other_id, &format!("{state}:__other__"), &other_by_age);
            }
        }
    }

    tracing::debug!(nodes = nodes.len(), grand_total, ?mode, "hierarchy built");
    Hierarchy { nodes }
}

fn push_age_children(
    nodes: &mut Vec<HierarchyNode>,
    parent_id: &str,
    id_stem: &str,
    by_age: &BTreeMap<AgeGroup, u64>,
) {
    for (group, value) in by_age {
        if *value == 0 {
            continue;
        }
        nodes.push(HierarchyNode {
            id: format!("age:{id_stem}:{}", group.key()),
            label: group.label().to_string(),
            parent_id: Some(parent_id.to_string()),
            value: *value,
        });
    }
}

fn by_value_desc(a: &(&str, u64), b: &(&str, u64)) -> Ordering {
    b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(state: &str, district: &str, a: u64, b: u64, c: u64) -> EnrollmentRecord {
        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        EnrollmentRecord::new(date, state, district, a, b, c)
    }

    fn sample() -> Vec<EnrollmentRecord> {
        vec![
            record("Kerala", "Kollam", 10, 0, 5),
            record("Kerala", "Idukki", 1, 1, 1),
            record("Kerala", "Wayanad", 2, 0, 0),
            record("Kerala", "Kollam", 0, 4, 0),
            record("Goa", "North Goa", 0, 0, 30),
            record("Goa", "South Goa", 0, 0, 0),
        ]
    }

    fn assert_conserved(tree: &Hierarchy) {
        for node in &tree.nodes {
            let children: Vec<_> = tree.children(&node.id).collect();
            if children.is_empty() {
                continue;
            }
            let sum: u64 = children.iter().map(|c| c.value).sum();
            assert_eq!(sum, node.value, "children of {} must add up", node.id);
        }
    }

    #[test]
    fn total_mode_keeps_states_sorted_and_sums_to_root() {
        let tree = build_hierarchy(&sample(), HierarchyMode::Total, &AgeGroupSelection::all(), 15);
        let root = tree.root().unwrap();
        assert_eq!(root.label, "India");
        assert_eq!(root.value, 54);

        let states: Vec<_> = tree.children(ROOT_ID).map(|n| n.label.as_str()).collect();
        assert_eq!(states, ["Goa", "Kerala"]);
        assert!(tree.node("district:Goa:South Goa").is_none(), "zero rows are skipped");
        assert_conserved(&tree);
    }

    #[test]
    fn truncation_folds_remainder_into_other() {
        let tree = build_hierarchy(&sample(), HierarchyMode::Total, &AgeGroupSelection::all(), 1);
        let other = tree.node("district:Kerala:__other__").unwrap();
        assert_eq!(other.label, OTHER_LABEL);
        assert_eq!(other.value, 5);
        assert_eq!(tree.node("district:Kerala:Kollam").unwrap().value, 19);
        assert!(tree.node("district:Goa:__other__").is_none());
        assert_conserved(&tree);
    }

    #[test]
    fn age_breakdown_adds_age_leaves_and_respects_selection() {
        let selection = AgeGroupSelection::new([AgeGroup::Age0To5, AgeGroup::Age18Plus]).unwrap();
        let tree = build_hierarchy(&sample(), HierarchyMode::AgeBreakdown, &selection, 1);

        assert_eq!(tree.root().unwrap().value, 10 + 5 + 2 + 2 + 30);
        let kollam = tree.node("district:Kerala:Kollam").unwrap();
        assert_eq!(kollam.value, 15);
        let leaves: Vec<_> = tree
            .children("district:Kerala:Kollam")
            .map(|n| (n.label.as_str(), n.value))
            .collect();
        assert_eq!(leaves, [("0-5 Years", 10), ("18+ Years", 5)]);

        let other_leaves: Vec<_> = tree
            .children("district:Kerala:__other__")
            .map(|n| (n.id.as_str(), n.value))
            .collect();
        assert_eq!(
            other_leaves,
            [
                ("age:Kerala:__other__:age_0_5", 3),
                ("age:Kerala:__other__:age_18_greater", 1)
            ]
        );
        assert_conserved(&tree);
    }

    #[test]
    fn empty_input_gives_bare_root() {
        let tree = build_hierarchy(&[], HierarchyMode::Total, &AgeGroupSelection::all(), 15);
        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.root().unwrap().value, 0);
    }
}
