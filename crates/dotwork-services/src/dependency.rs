//! Dependency service: edge manipulation, cycle safety, ready queue, and
//! graph traversals.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use dotwork_core::dependency::{Dependency, Direction};
use dotwork_core::enums::DependencyKind;
use dotwork_core::id::EntityId;
use dotwork_core::issue::Issue;
use dotwork_core::scope::ScopeFilter;
use dotwork_core::validation::ValidationError;
use dotwork_storage::UnitOfWork;

use crate::error::{Result, ServiceError};
use crate::scope::{matches_scope, ScopeCache};

/// A node in a dependency tree report.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct TreeNode {
    pub issue_id: EntityId,
    /// Depth from the root (0 = root).
    pub depth: usize,
    /// Set when the node was reached again along the walk; traversal stops
    /// there instead of looping.
    pub cycle_stop: bool,
}

/// One simple cycle found by the diagnostics pass.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CycleReport {
    pub kind: DependencyKind,
    /// The cycle's nodes in walk order; the last edge returns to the first.
    pub nodes: Vec<EntityId>,
}

/// Dependency operations over one unit of work.
pub struct DependencyService<'a> {
    uow: &'a UnitOfWork,
    scope_cache: &'a ScopeCache,
}

impl<'a> DependencyService<'a> {
    pub fn new(uow: &'a UnitOfWork, scope_cache: &'a ScopeCache) -> Self {
        Self { uow, scope_cache }
    }

    // -- Edge manipulation ---------------------------------------------------

    /// Inserts an edge `from -> to` of the given kind after validating the
    /// endpoints, rejecting self-loops, and proving the kind's graph stays
    /// acyclic. The proof loads the kind's edge set with one query and runs
    /// a depth-first reachability check in memory.
    pub fn add_dependency(
        &self,
        from: &EntityId,
        to: &EntityId,
        kind: DependencyKind,
    ) -> Result<()> {
        if from == to {
            return Err(ValidationError::SelfDependency.into());
        }
        if !self.uow.issues().exists(from)? {
            return Err(ServiceError::not_found("issue", from.as_str()));
        }
        if !self.uow.issues().exists(to)? {
            return Err(ServiceError::not_found("issue", to.as_str()));
        }

        let edges = self.uow.dependencies().list_all(Some(kind))?;
        if would_create_cycle(&edges, from, to) {
            debug!(%from, %to, kind = %kind, "dependency rejected: cycle");
            return Err(ServiceError::Cycle);
        }

        self.uow
            .dependencies()
            .add(&Dependency::new(from.clone(), to.clone(), kind))?;
        Ok(())
    }

    /// Removes an edge. Idempotent.
    pub fn remove_dependency(
        &self,
        from: &EntityId,
        to: &EntityId,
        kind: DependencyKind,
    ) -> Result<()> {
        self.uow.dependencies().remove(from, to, kind)?;
        Ok(())
    }

    /// Edges touching an issue in the requested direction.
    pub fn list_for(&self, id: &EntityId, direction: Direction) -> Result<Vec<Dependency>> {
        if !self.uow.issues().exists(id)? {
            return Err(ServiceError::not_found("issue", id.as_str()));
        }
        Ok(self.uow.dependencies().list_for(id, direction)?)
    }

    // -- Traversals ----------------------------------------------------------

    /// Depth-first walk of one kind's subgraph from a root, reported with
    /// depth. Revisited nodes are emitted once more with `cycle_stop` set
    /// and not expanded further.
    pub fn tree(&self, root: &EntityId, kind: DependencyKind) -> Result<Vec<TreeNode>> {
        if !self.uow.issues().exists(root)? {
            return Err(ServiceError::not_found("issue", root.as_str()));
        }
        let edges = self.uow.dependencies().list_all(Some(kind))?;
        let adjacency = adjacency_map(&edges);

        // Depth-first with an explicit stack; children are pushed in
        // reverse so the report reads in edge order.
        let mut report = Vec::new();
        let mut visited: HashSet<&EntityId> = HashSet::new();
        let mut stack: Vec<(&EntityId, usize)> = vec![(root, 0)];
        while let Some((node, depth)) = stack.pop() {
            if !visited.insert(node) {
                report.push(TreeNode {
                    issue_id: node.clone(),
                    depth,
                    cycle_stop: true,
                });
                continue;
            }
            report.push(TreeNode {
                issue_id: node.clone(),
                depth,
                cycle_stop: false,
            });
            if let Some(children) = adjacency.get(node) {
                for child in children.iter().rev() {
                    stack.push((child, depth + 1));
                }
            }
        }
        Ok(report)
    }

    /// Issues ready to work on within the scope, ordered by priority then
    /// creation time.
    pub fn ready_queue(&self, scope: &ScopeFilter, limit: u32) -> Result<Vec<Issue>> {
        let candidates = self.uow.issues().list_ready(limit)?;
        if scope.is_unrestricted() {
            return Ok(candidates);
        }
        let sets = self.scope_cache.resolve(self.uow, scope, true)?;
        Ok(candidates
            .into_iter()
            .filter(|issue| matches_scope(&issue.id, &sets))
            .collect())
    }

    /// Finds all cycles, one simple cycle per strongly connected component
    /// and kind. Diagnostics only: a healthy store returns nothing.
    pub fn detect_cycles(&self) -> Result<Vec<CycleReport>> {
        let all_edges = self.uow.dependencies().list_all(None)?;

        let mut reports = Vec::new();
        for kind in DependencyKind::ALL {
            let edges: Vec<&Dependency> =
                all_edges.iter().filter(|e| e.kind == *kind).collect();
            if edges.is_empty() {
                continue;
            }

            let mut adjacency: HashMap<&EntityId, Vec<&EntityId>> = HashMap::new();
            let mut nodes: Vec<&EntityId> = Vec::new();
            let mut seen: HashSet<&EntityId> = HashSet::new();
            for edge in &edges {
                adjacency
                    .entry(&edge.from_issue_id)
                    .or_default()
                    .push(&edge.to_issue_id);
                for node in [&edge.from_issue_id, &edge.to_issue_id] {
                    if seen.insert(node) {
                        nodes.push(node);
                    }
                }
            }

            for component in tarjan_scc(&nodes, &adjacency) {
                if component.len() < 2 {
                    continue;
                }
                if let Some(cycle) = extract_cycle(&component, &adjacency) {
                    reports.push(CycleReport {
                        kind: *kind,
                        nodes: cycle,
                    });
                }
            }
        }
        Ok(reports)
    }
}

// ---------------------------------------------------------------------------
// Pure graph helpers
// ---------------------------------------------------------------------------

fn adjacency_map(edges: &[Dependency]) -> HashMap<&EntityId, Vec<&EntityId>> {
    let mut adjacency: HashMap<&EntityId, Vec<&EntityId>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(&edge.from_issue_id)
            .or_default()
            .push(&edge.to_issue_id);
    }
    adjacency
}

/// Returns `true` if inserting `from -> to` would close a cycle: i.e.,
/// `from` is already reachable from `to` through the existing edges.
pub fn would_create_cycle(edges: &[Dependency], from: &EntityId, to: &EntityId) -> bool {
    let adjacency = adjacency_map(edges);

    let mut stack: Vec<&EntityId> = vec![to];
    let mut visited: HashSet<&EntityId> = HashSet::new();
    while let Some(current) = stack.pop() {
        if current == from {
            return true;
        }
        if !visited.insert(current) {
            continue;
        }
        if let Some(next) = adjacency.get(current) {
            stack.extend(next.iter().copied());
        }
    }
    false
}

/// Iterative Tarjan strongly-connected-components.
fn tarjan_scc<'e>(
    nodes: &[&'e EntityId],
    adjacency: &HashMap<&'e EntityId, Vec<&'e EntityId>>,
) -> Vec<Vec<&'e EntityId>> {
    #[derive(Clone, Copy)]
    struct NodeState {
        index: usize,
        lowlink: usize,
        on_stack: bool,
    }

    let mut states: HashMap<&EntityId, NodeState> = HashMap::new();
    let mut stack: Vec<&EntityId> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<&EntityId>> = Vec::new();

    // Explicit call stack: (node, next child offset).
    let mut call_stack: Vec<(&'e EntityId, usize)> = Vec::new();
    let empty: Vec<&EntityId> = Vec::new();

    for &root in nodes {
        if states.contains_key(root) {
            continue;
        }
        call_stack.push((root, 0));
        while let Some(&(node, child_offset)) = call_stack.last() {
            if child_offset == 0 {
                states.insert(
                    node,
                    NodeState {
                        index: next_index,
                        lowlink: next_index,
                        on_stack: true,
                    },
                );
                next_index += 1;
                stack.push(node);
            }

            let children = adjacency.get(node).unwrap_or(&empty);
            let mut offset = child_offset;
            let mut descend_into = None;
            while offset < children.len() {
                let child = children[offset];
                offset += 1;
                match states.get(child) {
                    None => {
                        descend_into = Some(child);
                        break;
                    }
                    Some(child_state) if child_state.on_stack => {
                        let child_index = child_state.index;
                        let state = states.get_mut(node).expect("node state exists");
                        state.lowlink = state.lowlink.min(child_index);
                    }
                    Some(_) => {}
                }
            }

            if let Some(last) = call_stack.last_mut() {
                last.1 = offset;
            }
            if let Some(child) = descend_into {
                call_stack.push((child, 0));
                continue;
            }

            // Node finished: pop its frame, fold lowlink into the parent.
            let state = states[&node];
            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                let parent_state = states.get_mut(parent).expect("parent state exists");
                parent_state.lowlink = parent_state.lowlink.min(state.lowlink);
            }

            if state.lowlink == state.index {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    states.get_mut(member).expect("member state exists").on_stack = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                components.push(component);
            }
        }
    }
    components
}

/// Extracts one simple cycle inside a strongly connected component by
/// walking edges restricted to the component until a node repeats.
fn extract_cycle<'e>(
    component: &[&'e EntityId],
    adjacency: &HashMap<&'e EntityId, Vec<&'e EntityId>>,
) -> Option<Vec<EntityId>> {
    let members: HashSet<&EntityId> = component.iter().copied().collect();
    let start = *component.iter().min()?;

    let mut path: Vec<&EntityId> = vec![start];
    let mut seen: HashSet<&EntityId> = HashSet::new();
    seen.insert(start);

    let mut current = start;
    loop {
        let next: &EntityId = adjacency
            .get(current)?
            .iter()
            .copied()
            .find(|candidate| members.contains(candidate))?;
        if next == start {
            return Some(path.into_iter().cloned().collect());
        }
        if !seen.insert(next) {
            // Trim the tail before the repeated node.
            let at = path.iter().position(|n| *n == next)?;
            return Some(path[at..].iter().map(|n| (*n).clone()).collect());
        }
        path.push(next);
        current = next;
    }
}
