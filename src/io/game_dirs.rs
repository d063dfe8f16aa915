use anyhow::{anyhow, Context, Result};
use hashbrown::HashMap;
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// A snapshot of one directory keyed by lowercased file name, so lookups
/// match the caseless identity used everywhere else. Renames after the
/// snapshot are not observed.
pub struct CaselessDir {
    dir: PathBuf,
    files: HashMap<String, String>,
}

impl CaselessDir {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let entries = fs::read_dir(&dir)
            .with_context(|| anyhow!("unable to list directory {}", dir.display()))?;
        let mut files = HashMap::new();
        for entry in entries {
            let entry =
                entry.with_context(|| anyhow!("unable to list directory {}", dir.display()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            files.insert(name.to_ascii_lowercase(), name);
        }
        Ok(Self { dir, files })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// The on-disk spelling of `name`, if present.
    pub fn find_file(&self, name: &str) -> Option<&str> {
        self.files.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn find_path(&self, name: &str) -> Option<PathBuf> {
        self.find_file(name).map(|f| self.dir.join(f))
    }

    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.files.values().map(String::as_str)
    }
}

/// Where the game lives: the directory holding `Morrowind.exe` (when found)
/// and the plugin directory rules and the sorter operate on.
pub struct GameDirs {
    pub game: Option<CaselessDir>,
    pub plugins: CaselessDir,
}

impl GameDirs {
    /// Walks upward from the working directory looking for `Morrowind.exe`.
    /// Without a hit, the working directory doubles as the plugin directory
    /// so rule authors can test a loose pile of files.
    pub fn discover() -> Result<Self> {
        if let Some(game) = find_parent_dir("Morrowind.exe")? {
            let data_path = game.find_path("Data Files").with_context(|| {
                anyhow!(
                    "game directory {} has no Data Files directory",
                    game.path().display()
                )
            })?;
            let plugins = CaselessDir::new(data_path)?;
            debug!("plugin directory: \"{}\"", plugins.path().display());
            return Ok(Self {
                game: Some(game),
                plugins,
            });
        }

        debug!("Morrowind.exe not found above the working directory");
        Ok(Self {
            game: CaselessDir::new("..").ok(),
            plugins: CaselessDir::new(".")?,
        })
    }

    /// A fixed plugin directory, bypassing discovery (settings override).
    pub fn at(plugin_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            game: None,
            plugins: CaselessDir::new(plugin_dir)?,
        })
    }
}

fn find_parent_dir(file_name: &str) -> Result<Option<CaselessDir>> {
    let mut path = std::env::current_dir().context("unable to determine the working directory")?;
    loop {
        let listing = CaselessDir::new(&path)?;
        if listing.find_file(file_name).is_some() {
            return Ok(Some(listing));
        }
        if !path.pop() {
            return Ok(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    #[test]
    fn lookups_ignore_case_and_return_disk_spelling() {
        let dir = tempfile::tempdir().expect("tempdir");
        File::create(dir.path().join("Bloodmoon.esm")).expect("create");
        let listing = CaselessDir::new(dir.path()).expect("listing");
        assert_eq!(listing.find_file("BLOODMOON.ESM"), Some("Bloodmoon.esm"));
        assert_eq!(
            listing.find_path("bloodmoon.esm"),
            Some(dir.path().join("Bloodmoon.esm"))
        );
        assert_eq!(listing.find_file("missing.esp"), None);
    }

    #[test]
    fn snapshot_does_not_observe_later_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let listing = CaselessDir::new(dir.path()).expect("listing");
        File::create(dir.path().join("late.esp")).expect("create");
        assert_eq!(listing.find_file("late.esp"), None);
    }
}
