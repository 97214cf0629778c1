//! The app graph and its differ. A graph is the declarative picture of a
//! follower's dataplane: named apps plus directed links between their
//! ports. The leader never interprets a graph beyond diffing two of them
//! into the action stream that turns one into the other.

use crate::action::Action;
use std::collections::{BTreeMap, BTreeSet};

/// One app in the graph: its class and printed argument string.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AppSpec {
    /// App class name.
    pub kind: String,
    /// Printed argument string handed to the class at instantiation.
    pub config: String,
}

/// A dataplane app graph. Produced by the user's `setup_fn` from a
/// configuration; treated as a value.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AppGraph {
    apps: BTreeMap<String, AppSpec>,
    links: BTreeSet<String>,
}

impl AppGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an app.
    pub fn add_app(
        &mut self,
        name: impl Into<String>,
        kind: impl Into<String>,
        config: impl Into<String>,
    ) {
        self.apps.insert(
            name.into(),
            AppSpec {
                kind: kind.into(),
                config: config.into(),
            },
        );
    }

    /// Adds a link, `from.port -> to.port`.
    pub fn add_link(&mut self, spec: impl Into<String>) {
        self.links.insert(spec.into());
    }

    /// The apps by name.
    pub fn apps(&self) -> &BTreeMap<String, AppSpec> {
        &self.apps
    }

    /// The link specs.
    pub fn links(&self) -> &BTreeSet<String> {
        &self.links
    }
}

/// The app names a link spec touches.
fn link_endpoints(spec: &str) -> (Option<&str>, Option<&str>) {
    let mut sides = spec.split("->");
    fn app_of(side: Option<&str>) -> Option<&str> {
        side.map(str::trim)
            .and_then(|s| s.split('.').next())
            .filter(|s| !s.is_empty())
    }
    let from = app_of(sides.next());
    let to = app_of(sides.next());
    (from, to)
}

/// Computes the ordered action list that reconstructs `new` from `old` at
/// a follower: links down first, then app removals, additions and
/// reconfigurations, then links up. An app whose class changed is
/// restarted (remove + add), and any link touching a restarted app is
/// re-established around it.
pub fn compute_config_actions(old: &AppGraph, new: &AppGraph) -> Vec<Action> {
    let restarted: BTreeSet<&str> = old
        .apps
        .iter()
        .filter(|(name, spec)| {
            new.apps
                .get(*name)
                .map(|next| next.kind != spec.kind)
                .unwrap_or(false)
        })
        .map(|(name, _)| name.as_str())
        .collect();
    let touches_restart = |spec: &str| {
        let (from, to) = link_endpoints(spec);
        from.map_or(false, |app| restarted.contains(app))
            || to.map_or(false, |app| restarted.contains(app))
    };

    let mut actions = Vec::new();
    for spec in &old.links {
        if !new.links.contains(spec) || touches_restart(spec) {
            actions.push(Action::Unlink { spec: spec.clone() });
        }
    }
    for (name, _) in &old.apps {
        if !new.apps.contains_key(name) || restarted.contains(name.as_str()) {
            actions.push(Action::RemoveApp { name: name.clone() });
        }
    }
    for (name, spec) in &new.apps {
        if !old.apps.contains_key(name) || restarted.contains(name.as_str()) {
            actions.push(Action::AddApp {
                name: name.clone(),
                kind: spec.kind.clone(),
                config: spec.config.clone(),
            });
        }
    }
    for (name, spec) in &new.apps {
        if let Some(prev) = old.apps.get(name) {
            if prev.kind == spec.kind && prev.config != spec.config {
                actions.push(Action::ReconfigApp {
                    name: name.clone(),
                    config: spec.config.clone(),
                });
            }
        }
    }
    for spec in &new.links {
        if !old.links.contains(spec) || touches_restart(spec) {
            actions.push(Action::Link { spec: spec.clone() });
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(apps: &[(&str, &str, &str)], links: &[&str]) -> AppGraph {
        let mut g = AppGraph::new();
        for (name, kind, config) in apps {
            g.add_app(*name, *kind, *config);
        }
        for link in links {
            g.add_link(*link);
        }
        g
    }

    #[test]
    fn identical_graphs_diff_to_nothing() {
        let g = graph(&[("a", "A", "1")], &["a.out -> a.in"]);
        assert!(compute_config_actions(&g, &g).is_empty());
    }

    #[test]
    fn add_and_link_ordering() {
        let old = graph(&[("a", "A", "1")], &[]);
        let new = graph(
            &[("a", "A", "1"), ("b", "B", "2")],
            &["a.out -> b.in"],
        );
        assert_eq!(
            compute_config_actions(&old, &new),
            vec![
                Action::AddApp {
                    name: "b".into(),
                    kind: "B".into(),
                    config: "2".into()
                },
                Action::Link {
                    spec: "a.out -> b.in".into()
                },
            ]
        );
    }

    #[test]
    fn removal_unlinks_first() {
        let old = graph(
            &[("a", "A", "1"), ("b", "B", "2")],
            &["a.out -> b.in"],
        );
        let new = graph(&[("a", "A", "1")], &[]);
        assert_eq!(
            compute_config_actions(&old, &new),
            vec![
                Action::Unlink {
                    spec: "a.out -> b.in".into()
                },
                Action::RemoveApp { name: "b".into() },
            ]
        );
    }

    #[test]
    fn config_change_reconfigures() {
        let old = graph(&[("a", "A", "1")], &[]);
        let new = graph(&[("a", "A", "2")], &[]);
        assert_eq!(
            compute_config_actions(&old, &new),
            vec![Action::ReconfigApp {
                name: "a".into(),
                config: "2".into()
            }]
        );
    }

    #[test]
    fn kind_change_restarts_and_relinks() {
        let old = graph(
            &[("a", "A", "1"), ("b", "B", "2")],
            &["a.out -> b.in"],
        );
        let new = graph(
            &[("a", "A2", "1"), ("b", "B", "2")],
            &["a.out -> b.in"],
        );
        assert_eq!(
            compute_config_actions(&old, &new),
            vec![
                Action::Unlink {
                    spec: "a.out -> b.in".into()
                },
                Action::RemoveApp { name: "a".into() },
                Action::AddApp {
                    name: "a".into(),
                    kind: "A2".into(),
                    config: "1".into()
                },
                Action::Link {
                    spec: "a.out -> b.in".into()
                },
            ]
        );
    }
}
