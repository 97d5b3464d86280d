//! Array splice reindexing.
//!
//! When the sequence at `key` is spliced, every registered field under
//! `key.<n>` with `n` at or past the end of the removed range moves by the
//! splice offset. The plan is computed from the registered names alone; the
//! form applies it to the registry and the value store.

use std::collections::{BTreeMap, BTreeSet};

use fieldstate_path::Path;
use tracing::debug;

/// Rename of one field entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    pub from: String,
    pub to: String,
}

/// Ordered relocations plus the entries left stale afterwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SplicePlan {
    /// Safe to apply in order: ascending source index when the sequence
    /// shrinks, descending when it grows
    pub relocations: Vec<Relocation>,
    /// Entries that no longer correspond to an element
    pub stale: Vec<String>,
}

impl SplicePlan {
    /// Plan `splice(index, howmany, ..inserted)` on the sequence at `key`.
    pub fn compute(
        names: &[String],
        key: &Path,
        index: usize,
        howmany: usize,
        inserted: usize,
    ) -> Self {
        let start = index.saturating_add(howmany);
        let shrinking = howmany > inserted;
        let vacated = index.saturating_add(inserted)..start;

        let mut groups: BTreeMap<usize, Vec<Relocation>> = BTreeMap::new();
        let mut vacated_names = Vec::new();

        for name in names {
            let Ok(path) = Path::parse(name) else {
                continue;
            };
            let Some(child) = path.index_after(key) else {
                continue;
            };

            if child.index >= start {
                // child.index >= start >= howmany, and the result never goes
                // below index + inserted
                let Some(target) = (child.index - howmany).checked_add(inserted) else {
                    vacated_names.push(name.clone());
                    continue;
                };
                if target != child.index {
                    groups.entry(child.index).or_default().push(Relocation {
                        from: name.clone(),
                        to: path.with_index(&child, target),
                    });
                }
            } else if vacated.contains(&child.index) {
                vacated_names.push(name.clone());
            }
        }

        let ordered: Vec<Vec<Relocation>> = if shrinking {
            groups.into_values().collect()
        } else {
            groups.into_values().rev().collect()
        };
        let relocations: Vec<Relocation> = ordered.into_iter().flatten().collect();

        let targets: BTreeSet<&str> = relocations.iter().map(|r| r.to.as_str()).collect();
        let mut seen = BTreeSet::new();
        let stale: Vec<String> = relocations
            .iter()
            .map(|r| r.from.clone())
            .chain(vacated_names)
            .filter(|name| !targets.contains(name.as_str()))
            .filter(|name| seen.insert(name.clone()))
            .collect();

        debug!(
            key = %key,
            index,
            howmany,
            inserted,
            relocations = relocations.len(),
            stale = stale.len(),
            "Planned array splice"
        );

        Self { relocations, stale }
    }

    pub fn is_empty(&self) -> bool {
        self.relocations.is_empty() && self.stale.is_empty()
    }

    /// Every name whose entry is touched by the plan.
    pub fn affected(&self) -> impl Iterator<Item = &str> {
        self.relocations
            .iter()
            .flat_map(|r| [r.from.as_str(), r.to.as_str()])
            .chain(self.stale.iter().map(String::as_str))
    }
}

/// Split a deprecated `key.{index}` / `key[{index}]` template into the
/// sequence key, or `None` when it does not end in an index placeholder.
pub fn split_index_template(key_match: &str) -> Option<&str> {
    key_match
        .strip_suffix(".{index}")
        .or_else(|| key_match.strip_suffix("[{index}]"))
        .filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn names(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn key(raw: &str) -> Path {
        Path::parse(raw).unwrap()
    }

    fn pairs(plan: &SplicePlan) -> Vec<(&str, &str)> {
        plan.relocations
            .iter()
            .map(|r| (r.from.as_str(), r.to.as_str()))
            .collect()
    }

    #[test]
    fn test_delete_middle() {
        let plan = SplicePlan::compute(
            &names(&["k.0.x", "k.1.x", "k.2.x"]),
            &key("k"),
            1,
            1,
            0,
        );
        assert_eq!(pairs(&plan), vec![("k.2.x", "k.1.x")]);
        assert_eq!(plan.stale, vec!["k.2.x"]);
    }

    #[test]
    fn test_delete_last_has_no_relocations() {
        let plan = SplicePlan::compute(&names(&["k.0", "k.1"]), &key("k"), 1, 1, 0);
        assert!(plan.relocations.is_empty());
        assert_eq!(plan.stale, vec!["k.1"]);
    }

    #[test]
    fn test_shrink_processes_low_indexes_first() {
        let plan = SplicePlan::compute(
            &names(&["k.3.a", "k.0.a", "k.2.a", "k.1.a", "k.2.b"]),
            &key("k"),
            0,
            1,
            0,
        );
        assert_eq!(
            pairs(&plan),
            vec![
                ("k.1.a", "k.0.a"),
                ("k.2.a", "k.1.a"),
                ("k.2.b", "k.1.b"),
                ("k.3.a", "k.2.a"),
            ]
        );
        assert_eq!(plan.stale, vec!["k.2.b", "k.3.a"]);
    }

    #[test]
    fn test_delete_range_wider_than_tail() {
        let plan = SplicePlan::compute(
            &names(&["k.0", "k.1", "k.2", "k.3"]),
            &key("k"),
            1,
            2,
            0,
        );
        assert_eq!(pairs(&plan), vec![("k.3", "k.1")]);
        assert_eq!(plan.stale, vec!["k.3", "k.2"]);
    }

    #[test]
    fn test_insert_processes_high_indexes_first() {
        let plan = SplicePlan::compute(
            &names(&["k.0.x", "k.1.x", "k.2.x"]),
            &key("k"),
            1,
            0,
            1,
        );
        assert_eq!(
            pairs(&plan),
            vec![("k.2.x", "k.3.x"), ("k.1.x", "k.2.x")]
        );
        assert_eq!(plan.stale, vec!["k.1.x"]);
    }

    #[test]
    fn test_counts_near_usize_max_do_not_overflow() {
        let max = usize::MAX;
        let plan = SplicePlan::compute(&names(&["k.0", "k.1", "k.2"]), &key("k"), 1, max, 0);
        assert!(plan.relocations.is_empty());
        assert_eq!(plan.stale, vec!["k.1", "k.2"]);

        // An entry pushed past the largest index has nowhere to go
        let plan = SplicePlan::compute(
            &names(&["k.0", format!("k.{max}").as_str()]),
            &key("k"),
            0,
            0,
            1,
        );
        assert_eq!(pairs(&plan), vec![("k.0", "k.1")]);
        assert_eq!(plan.stale, vec!["k.0".to_string(), format!("k.{max}")]);
    }

    #[test]
    fn test_replace_in_place_moves_nothing() {
        let plan = SplicePlan::compute(&names(&["k.0", "k.1"]), &key("k"), 0, 1, 1);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_keeps_bracket_spelling_and_ignores_other_keys() {
        let plan = SplicePlan::compute(
            &names(&["$k[1].x", "$kx.1", "other.2", "$k.name"]),
            &key("$k"),
            0,
            1,
            0,
        );
        assert_eq!(pairs(&plan), vec![("$k[1].x", "$k[0].x")]);
    }

    #[rstest]
    #[case("list.{index}", Some("list"))]
    #[case("a.list[{index}]", Some("a.list"))]
    #[case("list", None)]
    #[case(".{index}", None)]
    fn test_split_index_template(#[case] template: &str, #[case] expected: Option<&str>) {
        assert_eq!(split_index_template(template), expected);
    }
}
