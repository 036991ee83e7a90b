use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use super::intent::{ClusterList, ClusterRef, IntentStruc, LabelSelector, Leaf, OptionalGroup};
use crate::error::Result;

/// Answers label lookups during resolution.
///
/// Resolution itself never performs I/O: callers fetch the selectors
/// reported by [`IntentStruc::label_selectors`] beforehand and hand the
/// answers in through this trait.
pub trait LabelIndex {
    fn clusters_with_label(&self, provider: &str, label: &str) -> Vec<String>;
}

impl<S: BuildHasher> LabelIndex for HashMap<LabelSelector, Vec<String>, S> {
    fn clusters_with_label(&self, provider: &str, label: &str) -> Vec<String> {
        let key = LabelSelector {
            provider: provider.to_string(),
            label: label.to_string(),
        };
        self.get(&key).cloned().unwrap_or_default()
    }
}

impl LabelIndex for BTreeMap<LabelSelector, Vec<String>> {
    fn clusters_with_label(&self, provider: &str, label: &str) -> Vec<String> {
        let key = LabelSelector {
            provider: provider.to_string(),
            label: label.to_string(),
        };
        self.get(&key).cloned().unwrap_or_default()
    }
}

/// Expand a placement predicate tree into mandatory clusters and numbered
/// optional groups.
///
/// `allOf` elements contribute mandatory clusters; every nested `anyOf`
/// predicate and every top-level `anyOf` predicate becomes its own optional
/// group. Group numbers start at 1 and follow the walk order, so identical
/// input always yields identical numbering.
pub fn resolve(intent: &IntentStruc, labels: &impl LabelIndex) -> Result<ClusterList> {
    intent.validate()?;

    let mut list = ClusterList::default();
    let mut next_group: u32 = 1;
    // A predicate that matches nothing still consumes its group number.
    let mut push_group = |list: &mut ClusterList, clusters: Vec<ClusterRef>| {
        if !clusters.is_empty() {
            list.optional_groups.push(OptionalGroup {
                group_number: next_group,
                clusters,
            });
        }
        next_group += 1;
    };

    for all in &intent.all_of {
        if !all.is_group_only() {
            list.mandatory.extend(expand(all.leaf()?, labels));
        }
        for any in &all.any_of {
            let clusters = expand(any.leaf()?, labels);
            push_group(&mut list, clusters);
        }
    }
    for any in &intent.any_of {
        let clusters = expand(any.leaf()?, labels);
        push_group(&mut list, clusters);
    }

    tracing::debug!(
        mandatory = list.mandatory.len(),
        groups = list.optional_groups.len(),
        "Resolved placement intent"
    );
    Ok(list)
}

/// A label nobody carries expands to no clusters.
fn expand(leaf: Leaf<'_>, labels: &impl LabelIndex) -> Vec<ClusterRef> {
    match leaf {
        Leaf::Named { provider, cluster } => vec![ClusterRef::new(provider, cluster)],
        Leaf::Labelled { provider, label } => labels
            .clusters_with_label(provider, label)
            .into_iter()
            .map(|name| ClusterRef::new(provider, name))
            .collect(),
    }
}
