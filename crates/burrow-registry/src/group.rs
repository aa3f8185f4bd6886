//! Tree of named tunnel groups
//!
//! Each [`TunnelGroup`] holds a flat set of controllers plus its child groups.
//! Children are owned by their parent, so every group is reachable through
//! exactly one path and the tree cannot contain cycles.

use crate::controller::TunnelController;
use crate::error::RegistryError;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, trace, warn};

/// Snapshot of a group as reported to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Key under which the parent holds this group
    pub name: String,
    /// Identifiers of tunnels held directly by the group (sorted)
    pub tunnels: Vec<String>,
    /// Names of the group's immediate children (sorted)
    pub groups: Vec<String>,
}

/// A registry node
#[derive(Debug, Default)]
pub struct TunnelGroup {
    name: String,
    tunnels: HashMap<String, TunnelController>,
    groups: HashMap<String, TunnelGroup>,
}

impl TunnelGroup {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tunnels: HashMap::new(),
            groups: HashMap::new(),
        }
    }

    /// Display name; the root group's name is empty
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index a controller under `key`, returning whatever it replaced
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        controller: TunnelController,
    ) -> Option<TunnelController> {
        self.tunnels.insert(key.into(), controller)
    }

    pub fn tunnel_count(&self) -> usize {
        self.tunnels.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Descend along `path`, one child name per step
    pub fn group(&self, path: &[String]) -> Option<&TunnelGroup> {
        path.iter()
            .try_fold(self, |group, name| group.groups.get(name))
    }

    pub fn group_mut(&mut self, path: &[String]) -> Option<&mut TunnelGroup> {
        path.iter()
            .try_fold(self, |group, name| group.groups.get_mut(name))
    }

    pub fn summary(&self) -> GroupSummary {
        let mut tunnels = self.list();
        tunnels.sort();
        let mut groups: Vec<String> = self.groups.keys().cloned().collect();
        groups.sort();

        GroupSummary {
            name: self.name.clone(),
            tunnels,
            groups,
        }
    }

    /// Identifiers of tunnels held directly by this group
    pub fn list(&self) -> Vec<String> {
        self.tunnels.values().map(|t| t.id().to_string()).collect()
    }

    /// Identifiers of tunnels held by every strict descendant
    ///
    /// This group's own tunnels are not included.
    pub fn list_all_below(&self) -> Vec<String> {
        self.descendants()
            .into_iter()
            .flat_map(|group| group.list())
            .collect()
    }

    /// Immediate children
    pub fn groups(&self) -> Vec<GroupSummary> {
        self.groups.values().map(TunnelGroup::summary).collect()
    }

    /// Every descendant group, each exactly once, nearest first
    pub fn all_groups(&self) -> Vec<GroupSummary> {
        self.descendants()
            .into_iter()
            .map(TunnelGroup::summary)
            .collect()
    }

    /// Tunnels held directly by the child group `group`
    ///
    /// Empty when no such child exists.
    pub fn list_group(&self, group: &str) -> Vec<String> {
        self.groups
            .get(group)
            .map(TunnelGroup::list)
            .unwrap_or_default()
    }

    /// Children of the child group `group`
    ///
    /// Empty when no such child exists.
    pub fn group_groups(&self, group: &str) -> Vec<GroupSummary> {
        self.groups
            .get(group)
            .map(TunnelGroup::groups)
            .unwrap_or_default()
    }

    /// Find a tunnel by identifier in this group or one of its children
    ///
    /// Returns the controller and the name of the child it was found in, or
    /// an empty string when it is held by this group directly. Grandchildren
    /// are not searched.
    pub fn find(&self, id: &str) -> Result<(TunnelController, String), RegistryError> {
        if let Some(controller) = self.tunnels.values().find(|t| t.id() == id) {
            return Ok((controller.clone(), String::new()));
        }

        for (name, group) in &self.groups {
            if let Some(controller) = group.tunnels.values().find(|t| t.id() == id) {
                return Ok((controller.clone(), name.clone()));
            }
        }

        Err(RegistryError::NotFound { id: id.to_string() })
    }

    /// Find every tunnel of `kind` in this group or one of its children
    ///
    /// Matches found in a child get their group tag set to that child's name;
    /// read it with [`TunnelController::take_group`] before the next search
    /// overwrites it.
    pub fn find_a_type(&self, kind: &str) -> Result<Vec<TunnelController>, RegistryError> {
        let mut found: Vec<TunnelController> = self
            .tunnels
            .values()
            .filter(|t| t.kind() == kind)
            .cloned()
            .collect();

        for (name, group) in &self.groups {
            for controller in group.tunnels.values().filter(|t| t.kind() == kind) {
                controller.set_group(name.as_str());
                found.push(controller.clone());
            }
        }

        if found.is_empty() {
            return Err(RegistryError::KindNotFound {
                kind: kind.to_string(),
            });
        }

        Ok(found)
    }

    /// Relocate a tunnel into the child group `group`
    ///
    /// The tunnel is looked up with [`find`](Self::find), so it must live in
    /// this group or one of its children. The target child is created when
    /// missing. Only the relocated tunnel leaves its origin; the origin group
    /// itself and its other tunnels stay in place. A target that already holds
    /// a different tunnel with the same identifier is left untouched and the
    /// move fails with [`RegistryError::DuplicateId`].
    pub fn move_tunnel(&mut self, id: &str, group: &str) -> Result<TunnelController, RegistryError> {
        if group.is_empty() {
            return Err(RegistryError::InvalidGroupName(group.to_string()));
        }

        let (controller, origin) = self.find(id)?;
        if origin == group {
            trace!(tunnel_id = %id, group = %group, "Tunnel already in target group");
            return Ok(controller);
        }

        if let Some(target) = self.groups.get(group) {
            if target.holds_other(&controller) {
                warn!(tunnel_id = %id, group = %group, "Refusing to replace a tunnel with the same ID");
                return Err(RegistryError::DuplicateId {
                    id: id.to_string(),
                    group: group.to_string(),
                });
            }
        }

        let source = if origin.is_empty() {
            Some(&mut *self)
        } else {
            self.groups.get_mut(&origin)
        };
        let removed = source.map(|g| g.take(&controller)).unwrap_or(false);
        debug_assert!(removed, "found tunnel must be removable from its origin");

        let target = self
            .groups
            .entry(group.to_string())
            .or_insert_with(|| {
                debug!(group = %group, "Creating tunnel group");
                TunnelGroup::new(group)
            });
        target.insert(controller.id(), controller.clone());

        debug!(tunnel_id = %id, from = %origin, to = %group, "Moved tunnel");
        Ok(controller)
    }

    /// True when a different controller with the same identifier is held here
    fn holds_other(&self, controller: &TunnelController) -> bool {
        self.tunnels
            .values()
            .any(|t| t.id() == controller.id() && !t.same_tunnel(controller))
    }

    /// Remove the entry holding `controller`, whatever key it was indexed by
    fn take(&mut self, controller: &TunnelController) -> bool {
        let before = self.tunnels.len();
        self.tunnels.retain(|_, t| !t.same_tunnel(controller));
        self.tunnels.len() != before
    }

    /// Breadth-first walk over strict descendants
    fn descendants(&self) -> Vec<&TunnelGroup> {
        let mut found = Vec::new();
        let mut queue: VecDeque<&TunnelGroup> = self.groups.values().collect();

        while let Some(group) = queue.pop_front() {
            queue.extend(group.groups.values());
            found.push(group);
        }

        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tunnel::testing::tunnel;

    fn root_with(ids: &[(&str, &str)]) -> TunnelGroup {
        let mut root = TunnelGroup::new("");
        for (port, (id, kind)) in ids.iter().enumerate() {
            root.insert(*id, TunnelController::new(tunnel(id, kind), port as u16));
        }
        root
    }

    fn sorted(mut ids: Vec<String>) -> Vec<String> {
        ids.sort();
        ids
    }

    fn names(groups: &[GroupSummary]) -> Vec<String> {
        sorted(groups.iter().map(|g| g.name.clone()).collect())
    }

    #[test]
    fn test_list_direct_tunnels_only() {
        let mut root = root_with(&[("a", "server"), ("b", "client"), ("c", "server"), ("d", "http")]);
        root.move_tunnel("d", "g1").unwrap();

        assert_eq!(sorted(root.list()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_find_in_root_has_empty_origin() {
        let root = root_with(&[("a", "server"), ("b", "client")]);

        for id in ["a", "b"] {
            let (controller, origin) = root.find(id).unwrap();
            assert_eq!(controller.id(), id);
            assert_eq!(origin, "");
        }
    }

    #[test]
    fn test_find_in_child_reports_group() {
        let mut root = root_with(&[("t1", "server")]);
        root.move_tunnel("t1", "g1").unwrap();

        let (controller, origin) = root.find("t1").unwrap();
        assert_eq!(controller.id(), "t1");
        assert_eq!(origin, "g1");
    }

    #[test]
    fn test_find_missing() {
        let root = root_with(&[("a", "server")]);
        assert_eq!(
            root.find("nope").unwrap_err(),
            RegistryError::NotFound {
                id: "nope".to_string()
            }
        );
    }

    #[test]
    fn test_find_does_not_search_grandchildren() {
        let mut root = root_with(&[("t1", "server")]);
        root.move_tunnel("t1", "g1").unwrap();
        root.group_mut(&["g1".to_string()])
            .unwrap()
            .move_tunnel("t1", "g2")
            .unwrap();

        assert!(root.find("t1").unwrap_err().is_not_found());
        assert_eq!(sorted(root.list_all_below()), vec!["t1"]);
    }

    #[test]
    fn test_move_keeps_exclusive_membership() {
        let mut root = root_with(&[("t1", "server"), ("t2", "server")]);
        root.move_tunnel("t1", "g1").unwrap();
        root.move_tunnel("t2", "g1").unwrap();
        root.move_tunnel("t1", "g2").unwrap();

        let (_, origin) = root.find("t1").unwrap();
        assert_eq!(origin, "g2");
        assert_eq!(root.list_group("g1"), vec!["t2"]);
        assert_eq!(root.list_group("g2"), vec!["t1"]);
        assert!(root.list().is_empty());
        assert_eq!(names(&root.groups()), vec!["g1", "g2"]);
    }

    #[test]
    fn test_move_keeps_emptied_group() {
        let mut root = root_with(&[("t1", "server")]);
        root.move_tunnel("t1", "g1").unwrap();
        root.move_tunnel("t1", "g2").unwrap();

        assert!(root.list_group("g1").is_empty());
        assert_eq!(root.group_count(), 2);
    }

    #[test]
    fn test_move_into_current_group_is_noop() {
        let mut root = root_with(&[("t1", "server")]);
        root.move_tunnel("t1", "g1").unwrap();
        root.move_tunnel("t1", "g1").unwrap();

        assert_eq!(root.list_group("g1"), vec!["t1"]);
        assert_eq!(root.group_count(), 1);
    }

    #[test]
    fn test_move_missing_tunnel() {
        let mut root = root_with(&[("t1", "server")]);
        let err = root.move_tunnel("ghost", "g1").unwrap_err();

        assert!(err.is_not_found());
        assert_eq!(root.group_count(), 0);
    }

    #[test]
    fn test_move_rejects_empty_group_name() {
        let mut root = root_with(&[("t1", "server")]);
        assert_eq!(
            root.move_tunnel("t1", "").unwrap_err(),
            RegistryError::InvalidGroupName(String::new())
        );
    }

    #[test]
    fn test_move_refuses_to_replace_same_id() {
        let mut root = TunnelGroup::new("");
        root.insert("a", TunnelController::new(tunnel("web", "server"), 1));
        root.insert("b", TunnelController::new(tunnel("web", "server"), 2));

        root.move_tunnel("web", "g1").unwrap();
        assert_eq!(
            root.move_tunnel("web", "g1").unwrap_err(),
            RegistryError::DuplicateId {
                id: "web".to_string(),
                group: "g1".to_string()
            }
        );

        assert_eq!(root.tunnel_count() + root.list_all_below().len(), 2);
        assert_eq!(root.list_group("g1"), vec!["web"]);
    }

    #[test]
    fn test_move_reindexes_by_tunnel_id() {
        let mut root = TunnelGroup::new("");
        root.insert("alias", TunnelController::new(tunnel("real-id", "server"), 0));
        root.move_tunnel("real-id", "g1").unwrap();

        assert_eq!(root.tunnel_count(), 0);
        assert_eq!(root.list_group("g1"), vec!["real-id"]);
    }

    #[test]
    fn test_all_groups_three_levels() {
        let mut root = root_with(&[("t1", "server"), ("t2", "client")]);
        root.move_tunnel("t1", "g1").unwrap();
        root.group_mut(&["g1".to_string()])
            .unwrap()
            .move_tunnel("t1", "g2")
            .unwrap();

        let all = root.all_groups();
        assert_eq!(names(&all), vec!["g1", "g2"]);
        assert_eq!(all[0].name, "g1");
        assert_eq!(all[0].groups, vec!["g2"]);
    }

    #[test]
    fn test_all_groups_branching() {
        let ids: Vec<(String, String)> = (0..6)
            .map(|i| (format!("t{}", i), "server".to_string()))
            .collect();
        let mut root = TunnelGroup::new("");
        for (id, kind) in &ids {
            root.insert(id.as_str(), TunnelController::new(tunnel(id, kind), 0));
        }

        root.move_tunnel("t0", "a").unwrap();
        root.move_tunnel("t1", "b").unwrap();
        let a = root.group_mut(&["a".to_string()]).unwrap();
        a.move_tunnel("t0", "a1").unwrap();
        root.move_tunnel("t2", "a").unwrap();
        let a = root.group_mut(&["a".to_string()]).unwrap();
        a.move_tunnel("t2", "a2").unwrap();
        root.move_tunnel("t3", "b").unwrap();
        let b = root.group_mut(&["b".to_string()]).unwrap();
        b.move_tunnel("t3", "b1").unwrap();

        assert_eq!(names(&root.all_groups()), vec!["a", "a1", "a2", "b", "b1"]);
        assert_eq!(sorted(root.list_all_below()), vec!["t0", "t1", "t2", "t3"]);
        assert_eq!(sorted(root.list()), vec!["t4", "t5"]);
    }

    #[test]
    fn test_groups_report_names() {
        let mut root = root_with(&[("t1", "server"), ("t2", "server")]);
        root.move_tunnel("t1", "edge").unwrap();
        root.move_tunnel("t2", "core").unwrap();

        let groups = root.groups();
        assert_eq!(names(&groups), vec!["core", "edge"]);
        let edge = groups.iter().find(|g| g.name == "edge").unwrap();
        assert_eq!(edge.tunnels, vec!["t1"]);
    }

    #[test]
    fn test_group_groups() {
        let mut root = root_with(&[("t1", "server")]);
        root.move_tunnel("t1", "g1").unwrap();
        root.group_mut(&["g1".to_string()])
            .unwrap()
            .move_tunnel("t1", "g2")
            .unwrap();

        assert_eq!(names(&root.group_groups("g1")), vec!["g2"]);
        assert!(root.group_groups("missing").is_empty());
        assert!(root.list_group("missing").is_empty());
    }

    #[test]
    fn test_find_a_type_tags_child_matches() {
        let mut root = root_with(&[("a", "server"), ("b", "server"), ("c", "client")]);
        root.move_tunnel("b", "edge").unwrap();

        let found = root.find_a_type("server").unwrap();
        assert_eq!(found.len(), 2);

        let a = found.iter().find(|t| t.id() == "a").unwrap();
        let b = found.iter().find(|t| t.id() == "b").unwrap();
        assert_eq!(a.take_group(), "");
        assert_eq!(b.take_group(), "edge");
        assert_eq!(b.take_group(), "");
    }

    #[test]
    fn test_find_a_type_missing() {
        let root = root_with(&[("a", "server")]);
        assert_eq!(
            root.find_a_type("tracker").unwrap_err(),
            RegistryError::KindNotFound {
                kind: "tracker".to_string()
            }
        );
    }

    #[test]
    fn test_group_path_lookup() {
        let mut root = root_with(&[("t1", "server")]);
        root.move_tunnel("t1", "g1").unwrap();

        let path = vec!["g1".to_string()];
        assert_eq!(root.group(&path).unwrap().name(), "g1");
        assert!(root.group(&["g9".to_string()]).is_none());
        assert_eq!(root.group(&[]).unwrap().name(), "");
    }

    #[test]
    fn test_summary_serializes() {
        let mut root = root_with(&[("t1", "server")]);
        root.move_tunnel("t1", "g1").unwrap();

        let json = serde_json::to_string(&root.groups()).unwrap();
        assert_eq!(json, r#"[{"name":"g1","tunnels":["t1"],"groups":[]}]"#);
    }
}
