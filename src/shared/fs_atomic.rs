use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Replaces `path` with `content` so that readers see either the old or the
/// new bytes, never a partial write.
pub fn atomic_write_file(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| std::io::Error::other("path has no parent"))?;
    let tmp_name = format!(
        ".{}.tmp-{}-{}",
        path.file_name().and_then(|v| v.to_str()).unwrap_or("state"),
        std::process::id(),
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0),
    );
    let tmp_path = parent.join(tmp_name);

    {
        let mut file = fs::OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&tmp_path)?;
        file.write_all(content)?;
        file.sync_all()?;
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    sync_parent_dir(parent)?;
    Ok(())
}

/// Copies `source` into `target_dir` under its own file name, replacing any
/// previous copy atomically. Returns the staged path.
pub fn stage_file_copy(source: &Path, target_dir: &Path) -> std::io::Result<std::path::PathBuf> {
    let name = source
        .file_name()
        .ok_or_else(|| std::io::Error::other("source path has no file name"))?;
    fs::create_dir_all(target_dir)?;
    let target = target_dir.join(name);
    let bytes = fs::read(source)?;
    atomic_write_file(&target, &bytes)?;
    Ok(target)
}

#[cfg(unix)]
fn sync_parent_dir(parent: &Path) -> std::io::Result<()> {
    fs::File::open(parent)?.sync_all()
}

#[cfg(not(unix))]
fn sync_parent_dir(_parent: &Path) -> std::io::Result<()> {
    Ok(())
}
