use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Replaces `path` with `content` via write-to-temp-then-rename.
///
/// The temp file sits next to the target with a `tmp.<nanos>` extension, so
/// it never shows up as a `.xml` keyword while the write is in flight.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let temp_path = path.with_extension(format!("tmp.{:016x}", random_suffix));

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)?;

    if let Err(e) = file.write_all(content).and_then(|()| file.sync_all()) {
        let _ = std::fs::remove_file(&temp_path);
        return Err(e);
    }
    drop(file);

    // On Windows, rename fails if destination exists
    #[cfg(windows)]
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(e);
        }
    }

    std::fs::rename(&temp_path, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&temp_path);
    })
}
