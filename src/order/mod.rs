use crate::graph::PluginGraph;
use crate::io::active_plugins;
use crate::io::game_dirs::{CaselessDir, GameDirs};
use crate::io::settings::Settings;
use crate::io::write_order;
use crate::plugins::{is_esm, ActiveSet, NameTable, PluginId};
use crate::report::Report;
use crate::rules::parser::RuleParser;
use anyhow::{anyhow, bail, Context, Result};
use hashbrown::HashMap;
use itertools::Itertools;
use log::debug;
use std::path::Path;

pub const OLD_ORDER_FILE: &str = "current_loadorder.out";
pub const NEW_ORDER_FILE: &str = "new_loadorder.out";
pub const DEBUG_FILE: &str = "load_order_debug.out";

/// What one run has been asked to do.
pub struct Options {
    pub all_plugins: bool,
    pub update: bool,
    pub quiet: bool,
    pub warnings_only: bool,
    pub explain: Option<String>,
}

/// One end-to-end sorting run: acquires the active plugin list, feeds the
/// rule files and the current order into the constraint graph, sorts, and
/// reports (or commits) the result. The name table, graph and report are
/// created here and threaded through every component by reference.
pub struct LoadOrder {
    options: Options,
    names: NameTable,
    graph: PluginGraph,
    active: ActiveSet,
    report: Report,
    already_sorted: bool,
}

impl LoadOrder {
    pub fn new(options: Options) -> Self {
        // --explain suppresses the normal message flow.
        let report = if options.explain.is_some() {
            Report::buffered(options.quiet)
        } else {
            Report::new(options.quiet)
        };
        Self::with_report(options, report)
    }

    pub fn with_report(options: Options, report: Report) -> Self {
        Self {
            options,
            names: NameTable::new(),
            graph: PluginGraph::new(),
            active: ActiveSet::default(),
            report,
            already_sorted: false,
        }
    }

    /// Runs the whole pipeline. `from_file` switches the active-plugin
    /// source from the game configuration to a plugin-list file.
    pub fn update(&mut self, from_file: Option<&Path>, settings: &Settings) -> Result<()> {
        let dirs = self.acquire_active(from_file, settings)?;

        if log::log_enabled!(log::Level::Debug) {
            debug!("initial load order:");
            for id in self.active.iter() {
                debug!("  {}", self.names.cname(id));
            }
        }

        self.read_rules(settings, dirs.as_ref().map(|d| &d.plugins))?;
        self.add_current_order();

        if let Some(target) = self.options.explain.clone() {
            if self.names.true_name_of(&target).is_err() {
                debug!("{} does not appear in any rule or the active set", target);
            }
            let id = self.names.canonical(&target);
            println!("{}", self.graph.explain(id, &self.active, &self.names));
            return Ok(());
        }

        let new_order = self.compute()?;
        let truenames = new_order
            .iter()
            .map(|&id| self.names.true_name(id).to_string())
            .collect_vec();

        if let Some(dirs) = dirs {
            if self.options.update {
                if self.already_sorted {
                    self.report
                        .message("[Load order not committed: already sorted.]");
                } else {
                    write_order::update_mod_times(&dirs.plugins, &truenames)?;
                    self.report.message("[LOAD ORDER UPDATED!]");
                }
            } else {
                self.report.message("[Load Order NOT updated.]");
            }
            let old_truenames = self
                .active
                .iter()
                .map(|id| self.names.true_name(id).to_string())
                .collect_vec();
            write_order::save_order(
                Path::new(OLD_ORDER_FILE),
                &old_truenames,
                "current",
                &mut self.report,
            )?;
            write_order::save_order(
                Path::new(NEW_ORDER_FILE),
                &truenames,
                "sorted",
                &mut self.report,
            )?;
        }

        if !self.options.warnings_only {
            self.emit_listing(&new_order);
        }

        if log::log_enabled!(log::Level::Debug) {
            match std::fs::write(DEBUG_FILE, self.report.dump()) {
                Ok(()) => debug!("debug dump saved to {}", DEBUG_FILE),
                Err(e) => debug!("unable to write {}: {}", DEBUG_FILE, e),
            }
        }
        Ok(())
    }

    /// Seeds `self.active` (and with it the name table, so truenames carry
    /// the on-disk spellings). Returns the game directories when the source
    /// is the filesystem rather than a list file.
    fn acquire_active(
        &mut self,
        from_file: Option<&Path>,
        settings: &Settings,
    ) -> Result<Option<GameDirs>> {
        if let Some(path) = from_file {
            let ids = active_plugins::plugins_from_file(path, &mut self.names, &mut self.report)?;
            if ids.is_empty() {
                self.report.message(
                    "No plugins detected. This tool understands plugin lists in the \
                     format used by Morrowind.ini or Wrye Mash.",
                );
                bail!("no plugins found in {}", path.display());
            }
            self.active = ActiveSet::new(ids);
            return Ok(None);
        }

        let dirs = match settings.plugin_dir.as_deref() {
            Some(dir) => GameDirs::at(dir)?,
            None => GameDirs::discover()?,
        };
        let ids = if self.options.all_plugins {
            active_plugins::installed_plugins(&dirs, &mut self.names, &mut self.report)
        } else {
            let active = active_plugins::active_plugins(&dirs, &mut self.names, &mut self.report)?;
            if active.is_empty() {
                active_plugins::installed_plugins(&dirs, &mut self.names, &mut self.report)
            } else {
                active
            }
        };
        if ids.is_empty() {
            bail!("no plugins detected; run this tool somewhere under the game directory");
        }
        self.active = ActiveSet::new(ids);
        Ok(Some(dirs))
    }

    /// The user rule file is optional; the base rule file is required.
    fn read_rules(&mut self, settings: &Settings, plugin_dir: Option<&CaselessDir>) -> Result<()> {
        let mut parser = RuleParser::new(
            &mut self.names,
            &mut self.graph,
            &self.active,
            plugin_dir,
            &mut self.report,
        );
        if let Err(e) = parser.read_rules(Path::new(&settings.user_rules)) {
            debug!("{:#}", e);
        }
        parser
            .read_rules(Path::new(&settings.base_rules))
            .with_context(|| {
                anyhow!(
                    "the base rule file is required; run this tool in the directory where {} lives",
                    settings.base_rules
                )
            })?;
        Ok(())
    }

    /// Injects the current load order as weak pseudo-edges, so plugins no
    /// rule constrains keep their relative positions. A pair that would
    /// close a cycle is silently dropped and the walk retries with the
    /// nearest earlier plugin. Plugins carrying a nearstart/nearend
    /// affinity take part as nodes only, leaving the affinity free to move
    /// them.
    fn add_current_order(&mut self) {
        if self.active.len() < 2 {
            return;
        }
        debug!("adding edges from the current load order");
        let order = self.active.order().to_vec();
        self.graph.ensure_node(order[0]);
        for curr in 1..order.len() {
            let node = order[curr];
            self.graph.ensure_node(node);
            if self.graph.is_affinity(node) {
                continue;
            }
            for prev in (0..curr).rev() {
                let candidate = order[prev];
                if self.graph.is_affinity(candidate) {
                    continue;
                }
                if self.graph.add_edge(candidate, node).accepted() {
                    break;
                }
                debug!(
                    "cycle detected, not adding: \"{}\" -> \"{}\"",
                    self.names.cname(candidate),
                    self.names.cname(node)
                );
            }
        }
    }

    /// Sorts the graph and reduces the result to the final load order:
    /// intersect with the active set, then masters first, plugins second,
    /// preserving intra-group order. Also fills the old-order listing and
    /// detects the nothing-to-do case.
    fn compute(&mut self) -> Result<Vec<PluginId>> {
        let graph = std::mem::take(&mut self.graph);
        let sorted = graph
            .topo_sort()
            .context("internal error: the graph should never contain a cycle")?;

        let mut masters = Vec::new();
        let mut plugins = Vec::new();
        for id in sorted {
            if !self.active.contains(id) {
                continue;
            }
            if is_esm(self.names.cname(id)) {
                masters.push(id);
            } else {
                plugins.push(id);
            }
        }
        let new_order = masters.into_iter().chain(plugins).collect_vec();

        for (i, id) in self.active.iter().enumerate() {
            let line = format!("_{:03}_ {}", i + 1, self.names.true_name(id));
            self.report.old_line(line);
        }

        if new_order.len() != self.active.len() {
            bail!(
                "internal error: sorted {} plugins but started with {}",
                new_order.len(),
                self.active.len()
            );
        }
        if new_order.as_slice() == self.active.order() {
            self.report
                .message("[Plugins are already in sorted order. No sorting needed.]");
            self.already_sorted = true;
        }
        Ok(new_order)
    }

    /// The proposed order, one line per plugin, carrying the original
    /// 1-based position. A plugin that moved up starts a highlighted run;
    /// the run ends once the original positions fall back in order.
    fn emit_listing(&mut self, new_order: &[PluginId]) {
        if self.options.update {
            self.report.message("\n[UPDATED] New Load Order:\n---------------");
        } else {
            self.report.message("\n[Proposed] New Load Order:\n---------------");
        }
        let orig_index: HashMap<PluginId, usize> = self
            .active
            .iter()
            .enumerate()
            .map(|(i, id)| (id, i + 1))
            .collect();
        let mut moved = false;
        for (i, &id) in new_order.iter().enumerate() {
            let orig = orig_index[&id];
            if orig - 1 > i {
                moved = true;
            }
            let mark = if moved { '*' } else { '_' };
            let line = format!("{}{:03}{} {}", mark, orig, mark, self.names.true_name(id));
            self.report.new_line(line);
            if moved && i + 1 < new_order.len() && orig > orig_index[&new_order[i + 1]] {
                moved = false;
            }
        }
    }
}
