use crate::graph::PluginGraph;
use crate::plugins::PluginId;
use anyhow::{bail, Result};
use log::debug;

impl PluginGraph {
    /// Computes a total order over every node in the graph.
    ///
    /// Roots (indegree zero) are banded before the stack loop runs: roots
    /// that reach a `nearstart` plugin form the top band, roots that reach a
    /// `nearend` plugin the bottom band, everything else the middle. The
    /// nearstart partition runs first, so a root reaching both kinds of
    /// affinity is claimed by the top band. Within each band, node-set
    /// insertion order is preserved; children are released in the order
    /// their edges were added. That makes the result deterministic for a
    /// given rule corpus and plugin list.
    ///
    /// Cycles are rejected at edge insertion, so leftovers after the stack
    /// drains can only mean internal corruption; that case is an error.
    pub fn topo_sort(mut self) -> Result<Vec<PluginId>> {
        let roots: Vec<PluginId> = self
            .insertion_order()
            .iter()
            .copied()
            .filter(|&n| self.indegree_of(n) == 0)
            .collect();
        debug!("topo sort: {} nodes, {} roots", self.node_count(), roots.len());

        let (top_roots, roots) = self.remove_roots(roots, self.nearstart());
        let (bottom_roots, middle_roots) = self.remove_roots(roots, self.nearend());
        debug!(
            "topo sort bands: {} top, {} middle, {} bottom",
            top_roots.len(),
            middle_roots.len(),
            bottom_roots.len()
        );

        let mut stack: Vec<PluginId> = top_roots
            .into_iter()
            .chain(middle_roots)
            .chain(bottom_roots)
            .collect();
        stack.reverse();

        let mut sorted = Vec::with_capacity(self.node_count());
        while let Some(node) = stack.pop() {
            sorted.push(node);
            for child in self.take_children(node) {
                if self.decrement_indegree(child) == 0 {
                    stack.push(child);
                }
            }
        }

        if sorted.len() != self.node_count() {
            bail!(
                "topological sort failed: {} of {} plugins left in the graph",
                self.node_count() - sorted.len(),
                self.node_count()
            );
        }
        Ok(sorted)
    }

    /// Pulls out of `roots` every root that can reach a member of `which`,
    /// scanning `which` in list order. Returns `(removed, remaining)`, both
    /// preserving the relative order of `roots`.
    fn remove_roots(
        &self,
        roots: Vec<PluginId>,
        which: &[PluginId],
    ) -> (Vec<PluginId>, Vec<PluginId>) {
        let mut removed = Vec::new();
        let mut remaining = roots;
        for &target in which {
            let mut leftover = Vec::new();
            for root in remaining {
                if self.can_reach(root, target) {
                    removed.push(root);
                } else {
                    leftover.push(root);
                }
            }
            remaining = leftover;
        }
        (removed, remaining)
    }
}
