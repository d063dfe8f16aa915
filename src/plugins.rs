use anyhow::{anyhow, Result};
use hashbrown::{HashMap, HashSet};
use std::path::Path;

/// Interned handle for a plugin name. Ids are only minted by [NameTable] and
/// index its internal tables.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct PluginId(u32);

impl PluginId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Caseless identity for plugin files. Every name is keyed by its canonical
/// form (ASCII lowercase); the first original-case spelling ever seen is kept
/// as the truename, used only for display and filesystem lookups.
///
/// The plugin directory is enumerated before any rules are read, so truenames
/// reflect the real on-disk spellings rather than whatever case a rule author
/// typed.
#[derive(Default)]
pub struct NameTable {
    ids: HashMap<String, PluginId>,
    cnames: Vec<String>,
    truenames: Vec<String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Interns `name` under its canonical key and returns the id. The first
    /// call for a given key records `name` as the truename.
    pub fn canonical(&mut self, name: &str) -> PluginId {
        let cname = name.to_ascii_lowercase();
        if let Some(&id) = self.ids.get(&cname) {
            return id;
        }
        let id = PluginId(self.cnames.len() as u32);
        self.ids.insert(cname.clone(), id);
        self.cnames.push(cname);
        self.truenames.push(name.to_string());
        id
    }

    /// Non-inserting probe.
    pub fn lookup(&self, name: &str) -> Option<PluginId> {
        self.ids.get(&name.to_ascii_lowercase()).copied()
    }

    pub fn cname(&self, id: PluginId) -> &str {
        self.cnames.get(id.index()).expect("safe")
    }

    pub fn true_name(&self, id: PluginId) -> &str {
        self.truenames.get(id.index()).expect("safe")
    }

    /// Truename lookup by string key. Asking for a key that was never
    /// canonicalized is a programmer error, not bad user input.
    pub fn true_name_of(&self, name: &str) -> Result<&str> {
        self.lookup(name)
            .map(|id| self.true_name(id))
            .ok_or_else(|| anyhow!("name \"{}\" was never canonicalized", name))
    }
}

/// The ordered list of currently enabled plugins, plus a membership set.
/// Rule expressions evaluate "exists" against this set.
#[derive(Default)]
pub struct ActiveSet {
    order: Vec<PluginId>,
    present: HashSet<PluginId>,
}

impl ActiveSet {
    pub fn new(order: Vec<PluginId>) -> Self {
        let present = order.iter().copied().collect();
        Self { order, present }
    }

    pub fn contains(&self, id: PluginId) -> bool {
        self.present.contains(&id)
    }

    pub fn order(&self) -> &[PluginId] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = PluginId> + '_ {
        self.order.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }
}

pub fn is_esm(name: &str) -> bool {
    Path::new(name)
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("esm"))
}

/// Returns `true` for the two plugin kinds the game loads (`.esm`, `.esp`).
pub fn is_plugin_file(name: &str) -> bool {
    Path::new(name).extension().map_or(false, |ext| {
        ext.eq_ignore_ascii_case("esm") || ext.eq_ignore_ascii_case("esp")
    })
}
