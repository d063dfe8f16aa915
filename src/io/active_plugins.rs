use crate::io::game_dirs::{CaselessDir, GameDirs};
use crate::plugins::{is_esm, is_plugin_file, NameTable, PluginId};
use crate::report::Report;
use anyhow::{anyhow, Context, Result};
use filetime::FileTime;
use itertools::Itertools;
use log::trace;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

fn read_lines(filename: &Path) -> Result<Lines<BufReader<File>>> {
    let file = File::open(filename)
        .with_context(|| anyhow!("unable to open file {} for reading", filename.display()))?;
    Ok(BufReader::new(file).lines())
}

/// Sorts a plugin list into the order the game would load it from disk.
fn sort_plugins(dir: &CaselessDir, plugin_list: &mut [String]) {
    let order = |plugin_name: &str| {
        // Order by modified time, with ESMs given priority.
        let is_esm = is_esm(plugin_name);
        let last_modified_time = dir
            .find_path(plugin_name)
            .and_then(|path| path.metadata().ok())
            .map(|metadata| FileTime::from_last_modification_time(&metadata))
            .unwrap_or_else(FileTime::zero);
        (!is_esm, last_modified_time)
    };

    plugin_list.sort_by(|a, b| order(a).cmp(&order(b)));
}

/// The active plugins as named by the `GameFile` entries of `Morrowind.ini`,
/// in load order. Entries that are missing from the plugin directory are
/// skipped: the ini routinely trails plugins that were uninstalled.
pub fn active_plugins(
    dirs: &GameDirs,
    names: &mut NameTable,
    report: &mut Report,
) -> Result<Vec<PluginId>> {
    let ini_path = match dirs.game.as_ref().and_then(|game| game.find_path("Morrowind.ini")) {
        Some(path) => path,
        None => {
            report.message("[Morrowind.ini not found, assuming running outside the game directory]");
            return Ok(Vec::new());
        }
    };

    let match_game_file = Regex::new(r"(?i)^GameFile\d+=([^\r\n]*)").expect("safe");

    let mut found = Vec::new();
    for line in read_lines(&ini_path)
        .with_context(|| anyhow!("unable to read {}", ini_path.display()))?
        .flatten()
    {
        if let Some(captures) = match_game_file.captures(line.trim_end()) {
            let listed = captures.get(1).expect("safe").as_str().trim();
            match dirs.plugins.find_file(listed) {
                Some(on_disk) => found.push(on_disk.to_string()),
                None => trace!("{} is listed in Morrowind.ini but not installed", listed),
            }
        }
    }

    sort_plugins(&dirs.plugins, &mut found);

    let ids = found.iter().map(|name| names.canonical(name)).collect_vec();
    report.loadup("Getting active plugins from: \"Morrowind.ini\"", ids.len(), "plugins");
    Ok(ids)
}

/// Every plugin file in the plugin directory, in on-disk load order. Serves
/// `--all` and the fallback when the ini names nothing.
pub fn installed_plugins(dirs: &GameDirs, names: &mut NameTable, report: &mut Report) -> Vec<PluginId> {
    let mut found = dirs
        .plugins
        .file_names()
        .filter(|name| is_plugin_file(name))
        .filter(|name| {
            dirs.plugins
                .find_path(name)
                .map_or(false, |path| path.is_file())
        })
        .map(str::to_string)
        .collect_vec();

    sort_plugins(&dirs.plugins, &mut found);

    let ids = found.iter().map(|name| names.canonical(name)).collect_vec();
    report.loadup(
        "Getting list of plugins from the plugin directory",
        ids.len(),
        "plugins",
    );
    ids
}

/// Reads a plugin list from a file, mostly for debugging somebody else's
/// load order. The line format is deliberately sloppy: bare names,
/// `GameFileN=` ini lines and Wrye-Mash-style `_NNN_` prefixes all work.
pub fn plugins_from_file(
    path: &Path,
    names: &mut NameTable,
    report: &mut Report,
) -> Result<Vec<PluginId>> {
    let sloppy_plugin = Regex::new(
        r"(?i)^(?:[_*]\d\d\d[_*]\s+|GameFile\d+=|\d{1,3} {1,2}|Plugin\d+\s*=\s*)?(.+\.es[mp]\b)",
    )
    .expect("safe");

    let mut ids = Vec::new();
    for line in read_lines(path)?.flatten() {
        if let Some(captures) = sloppy_plugin.captures(&line) {
            ids.push(names.canonical(captures.get(1).expect("safe").as_str()));
        }
    }

    report.loadup(
        &format!("Reading plugins from file: \"{}\"", path.display()),
        ids.len(),
        "plugins",
    );
    Ok(ids)
}
