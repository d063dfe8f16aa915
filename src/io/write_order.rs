use crate::io::game_dirs::CaselessDir;
use crate::report::Report;
use anyhow::{anyhow, Context, Result};
use filetime::FileTime;
use log::trace;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Baseline commit timestamp: the release mtime of Morrowind.esm.
const MTIME_FIRST: i64 = 1_026_943_162;
/// Floor for hosts with a badly wrong clock.
const MTIME_FLOOR: i64 = 1_228_683_562;

/// Writes one truename per line, for later reference.
pub fn save_order(path: &Path, order: &[String], what: &str, report: &mut Report) -> Result<()> {
    let file = File::create(path)
        .with_context(|| anyhow!("unable to open {} for writing", path.display()))?;
    let mut out = BufWriter::new(file);
    for name in order {
        writeln!(out, "{}", name)
            .with_context(|| anyhow!("unable to write to {}", path.display()))?;
    }
    report.message(format!("{} load order saved to: {}", what, path.display()));
    Ok(())
}

/// Rewrites modification times so that sorting the plugin directory by
/// mtime reproduces `order`, oldest first. Times start at the Morrowind.esm
/// epoch and step evenly toward the current time, always at least one
/// second apart so the resulting order is strict.
pub fn update_mod_times(dir: &CaselessDir, order: &[String]) -> Result<()> {
    if order.is_empty() {
        return Ok(());
    }

    let now = time::OffsetDateTime::now_utc().unix_timestamp().max(MTIME_FLOOR);
    let step = ((now - MTIME_FIRST) / order.len() as i64).max(1);

    let mut mtime = MTIME_FIRST;
    for name in order {
        let path = dir.find_path(name).with_context(|| {
            anyhow!("plugin {} vanished from {}", name, dir.path().display())
        })?;
        filetime::set_file_mtime(&path, FileTime::from_unix_time(mtime, 0))
            .with_context(|| anyhow!("unable to set last modified date on plugin {}", name))?;
        trace!("mtime {} <- {}", name, mtime);
        mtime += step;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn mtime_of(path: &Path) -> FileTime {
        FileTime::from_last_modification_time(&path.metadata().expect("metadata"))
    }

    #[test]
    fn mtimes_are_strictly_increasing_in_list_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["a.esm", "b.esp", "c.esp"] {
            File::create(dir.path().join(name)).expect("create");
        }
        let listing = CaselessDir::new(dir.path()).expect("listing");

        let order = ["a.esm", "b.esp", "c.esp"].map(String::from);
        update_mod_times(&listing, &order).expect("update");

        let times: Vec<FileTime> = order.iter().map(|n| mtime_of(&dir.path().join(n))).collect();
        assert!(times[0] < times[1]);
        assert!(times[1] < times[2]);
        assert_eq!(times[0].unix_seconds(), MTIME_FIRST);
    }

    #[test]
    fn tolerates_a_single_plugin() {
        let dir = tempfile::tempdir().expect("tempdir");
        File::create(dir.path().join("only.esp")).expect("create");
        let listing = CaselessDir::new(dir.path()).expect("listing");
        update_mod_times(&listing, &["only.esp".to_string()]).expect("update");
        assert_eq!(
            mtime_of(&dir.path().join("only.esp")).unix_seconds(),
            MTIME_FIRST
        );
    }

    #[test]
    fn saved_order_is_one_name_per_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out = dir.path().join("new_loadorder.out");
        let mut report = Report::buffered(false);
        let order = ["Morrowind.esm", "Mod.esp"].map(String::from);
        save_order(&out, &order, "sorted", &mut report).expect("save");
        assert_eq!(
            fs::read_to_string(&out).expect("read"),
            "Morrowind.esm\nMod.esp\n"
        );
        assert!(report.messages()[0].starts_with("sorted load order saved to:"));
    }
}
