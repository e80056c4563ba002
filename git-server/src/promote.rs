//! Promotion of workspace objects into the canonical object store.
//!
//! Objects are content-addressed: a file that already exists in the canonical
//! store is byte-identical to ours and is left alone. New files are written
//! next to their destination and renamed into place, so readers never see a
//! partial object. Running a promotion twice is harmless.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Suffix counter for temporary files, unique across concurrent promotions.
static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Outcome of a promotion.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Promotion {
    /// Files copied into the canonical store.
    pub copied: usize,
    /// Files already present in the canonical store.
    pub skipped: usize,
}

/// Copy every object file of `from` missing in `to`.
///
/// `info/` is never promoted: it holds per-repository metadata such as
/// alternates, not objects.
pub fn promote(from: &Path, to: &Path) -> io::Result<Promotion> {
    let mut files = Vec::new();
    let mut promotion = Promotion::default();

    collect(from, Path::new(""), &mut files)?;

    // A pack index makes its pack visible, so it must land last.
    files.sort_by_key(|path| path.extension().map_or(false, |ext| ext == "idx"));

    for relative in files {
        let source = from.join(&relative);
        let target = to.join(&relative);

        if target.exists() {
            promotion.skipped += 1;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        copy_atomic(&source, &target)?;
        promotion.copied += 1;
    }
    tracing::debug!(
        "promoted {} object file(s), {} already present",
        promotion.copied,
        promotion.skipped
    );

    Ok(promotion)
}

fn collect(root: &Path, relative: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(root.join(relative))? {
        let entry = entry?;
        let path = relative.join(entry.file_name());
        let kind = entry.file_type()?;

        if kind.is_dir() {
            if path == Path::new("info") {
                continue;
            }
            collect(root, &path, files)?;
        } else if kind.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn copy_atomic(source: &Path, target: &Path) -> io::Result<()> {
    let mut tmp = target.as_os_str().to_owned();
    tmp.push(format!(
        ".tmp-{}-{}",
        std::process::id(),
        TMP_COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    let tmp = PathBuf::from(tmp);

    if let Err(err) = fs::copy(source, &tmp).and_then(|_| fs::rename(&tmp, target)) {
        fs::remove_file(&tmp).ok();
        return Err(err);
    }
    Ok(())
}
