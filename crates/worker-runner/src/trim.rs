//! Stale scratch-file cleanup under `testing/`.

use std::path::Path;
use std::time::SystemTime;

/// Removes files under `testing_dir` older than `max_age`, keeping at most
/// `max_entries` of the newest remaining ones. Run once per iteration before
/// requesting a task so a long-lived worker does not accumulate unbounded
/// downloads/builds/PGNs.
pub fn trim_stale_files(testing_dir: &Path, max_age: std::time::Duration, max_entries: usize) {
    if !testing_dir.exists() {
        return;
    }

    let mut entries: Vec<(std::path::PathBuf, SystemTime)> = walkdir::WalkDir::new(testing_dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let modified = e.metadata().ok()?.modified().ok()?;
            Some((e.into_path(), modified))
        })
        .collect();

    let now = SystemTime::now();
    entries.retain(|(path, modified)| {
        let age = now.duration_since(*modified).unwrap_or_default();
        if age > max_age {
            if let Err(err) = std::fs::remove_file(path) {
                tracing::warn!(?path, error = %err, "failed to remove stale scratch file");
            }
            false
        } else {
            true
        }
    });

    entries.sort_by_key(|(_, modified)| std::cmp::Reverse(*modified));
    for (path, _) in entries.into_iter().skip(max_entries) {
        if let Err(err) = std::fs::remove_file(&path) {
            tracing::warn!(?path, error = %err, "failed to trim excess scratch file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_files_under_the_cap() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.pgn")), "x").unwrap();
        }
        trim_stale_files(dir.path(), std::time::Duration::from_secs(3600), 3);
        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 3);
    }

    #[test]
    fn missing_directory_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        trim_stale_files(&missing, std::time::Duration::from_secs(1), 10);
    }
}
