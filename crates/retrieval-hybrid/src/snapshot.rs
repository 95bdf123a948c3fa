//! Zip archives of a collection's persisted artifacts.
//!
//! Archives live in `<collection>/snapshots/` and hold the chunk table,
//! `vec.index` and `idmap.parquet`, whichever exist, stored at the archive
//! root under their own file names.

use chrono::Local;
use std::fs::{self, File};
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use retrieval_core::error::{Error, Result};
use retrieval_vector::{CHUNKS_JSONL, CHUNKS_PARQUET, IDMAP_PARQUET, VEC_INDEX};

pub const SNAPSHOT_DIR: &str = "snapshots";
pub const SNAPSHOT_ARTIFACTS: [&str; 4] = [CHUNKS_PARQUET, CHUNKS_JSONL, VEC_INDEX, IDMAP_PARQUET];

fn zip_err(e: zip::result::ZipError) -> Error { Error::Archive(e.to_string()) }

/// Archive file name for `name`, or a `%Y%m%d%H%M%S` local timestamp.
///
/// Names must be plain file names; `.zip` is appended when missing.
pub fn snapshot_file_name(name: Option<&str>) -> Result<String> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(format!("{}.zip", Local::now().format("%Y%m%d%H%M%S")));
    };
    let plain = Path::new(name).file_name().is_some_and(|f| f == name) && !name.contains(['/', '\\']);
    if !plain {
        return Err(Error::InvalidQuery(format!("snapshot name '{name}' must be a plain file name")));
    }
    Ok(if name.ends_with(".zip") { name.to_string() } else { format!("{name}.zip") })
}

/// Move the finished archive to `snap_dir/file_name` without replacing an
/// existing file. Timestamped names take a `-1`, `-2`, ... suffix instead.
fn persist_new(mut tmp: NamedTempFile, snap_dir: &Path, file_name: &str, stamped: bool) -> Result<PathBuf> {
    let stem = file_name.strip_suffix(".zip").unwrap_or(file_name);
    let mut attempt = 0usize;
    loop {
        let out = match attempt {
            0 => snap_dir.join(file_name),
            n => snap_dir.join(format!("{stem}-{n}.zip")),
        };
        match tmp.persist_noclobber(&out) {
            Ok(_) => return Ok(out),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists && stamped => {
                tmp = e.file;
                attempt += 1;
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                return Err(Error::InvalidQuery(format!("snapshot {} already exists", out.display())));
            }
            Err(e) => return Err(Error::Io(e.error)),
        }
    }
}

/// Archive the artifacts found in `dir` into a new `dir/snapshots/<name>`.
///
/// Existing archives are never replaced: an explicit name that is taken is
/// rejected, a taken timestamp gets a numeric suffix. Fails with `NotFound`
/// when `dir` holds none of the artifacts.
pub fn export_snapshot(dir: &Path, name: Option<&str>) -> Result<PathBuf> {
    let present: Vec<&str> = SNAPSHOT_ARTIFACTS.into_iter().filter(|a| dir.join(a).is_file()).collect();
    if present.is_empty() {
        return Err(Error::NotFound(format!("no snapshot artifacts in {}", dir.display())));
    }
    let stamped = !name.map(str::trim).is_some_and(|n| !n.is_empty());
    let file_name = snapshot_file_name(name)?;
    let snap_dir = dir.join(SNAPSHOT_DIR);
    fs::create_dir_all(&snap_dir)?;

    let mut tmp = NamedTempFile::new_in(&snap_dir)?;
    {
        let mut zip = ZipWriter::new(tmp.as_file_mut());
        for artifact in &present {
            let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            zip.start_file(*artifact, options).map_err(zip_err)?;
            zip.write_all(&fs::read(dir.join(artifact))?)?;
        }
        zip.finish().map_err(zip_err)?;
    }
    let out = persist_new(tmp, &snap_dir, &file_name, stamped)?;
    tracing::info!(archive = %out.display(), artifacts = ?present, "exported snapshot");
    Ok(out)
}

/// Put back the files a failed rollback already replaced.
fn undo_restore(replaced: &[(PathBuf, Option<Vec<u8>>)]) {
    for (path, previous) in replaced {
        let undone = match previous {
            Some(bytes) => fs::write(path, bytes),
            None => fs::remove_file(path),
        };
        if let Err(e) = undone {
            tracing::warn!(error = %e, path = %path.display(), "could not undo partial rollback");
        }
    }
}

/// Restore the artifacts in `archive` into `dir`, overwriting existing files.
///
/// Every entry is read and checked before anything is written, so a missing,
/// corrupt or foreign archive leaves `dir` untouched. Entries are staged as
/// temporary files and renamed into place one by one; if a rename fails, the
/// files already replaced get their previous contents back. A restored chunk
/// table removes the other table format. Returns the restored file names.
pub fn rollback_snapshot(dir: &Path, archive: &Path) -> Result<Vec<String>> {
    let mut zip = ZipArchive::new(File::open(archive)?).map_err(zip_err)?;
    let mut restored: Vec<(String, Vec<u8>)> = Vec::with_capacity(zip.len());
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i).map_err(zip_err)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry
            .enclosed_name()
            .and_then(|p| p.to_str().map(str::to_string))
            .filter(|n| SNAPSHOT_ARTIFACTS.contains(&n.as_str()))
            .ok_or_else(|| Error::Archive(format!("unexpected entry '{}' in {}", entry.name(), archive.display())))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        restored.push((name, bytes));
    }
    if restored.is_empty() {
        return Err(Error::Archive(format!("{} holds no artifacts", archive.display())));
    }

    fs::create_dir_all(dir)?;
    let mut staged = Vec::with_capacity(restored.len());
    for (name, bytes) in &restored {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        staged.push((name.clone(), tmp));
    }
    let names: Vec<String> = restored.into_iter().map(|(name, _)| name).collect();
    let mut replaced: Vec<(PathBuf, Option<Vec<u8>>)> = Vec::with_capacity(staged.len());
    for (name, tmp) in staged {
        let target = dir.join(&name);
        let previous = match fs::read(&target) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                undo_restore(&replaced);
                return Err(e.into());
            }
        };
        if let Err(e) = tmp.persist(&target) {
            undo_restore(&replaced);
            return Err(Error::Io(e.error));
        }
        replaced.push((target, previous));
    }
    for (table, other) in [(CHUNKS_PARQUET, CHUNKS_JSONL), (CHUNKS_JSONL, CHUNKS_PARQUET)] {
        if names.iter().any(|n| n == table) && !names.iter().any(|n| n == other) {
            match fs::remove_file(dir.join(other)) {
                Err(e) if e.kind() != ErrorKind::NotFound => return Err(e.into()),
                _ => {}
            }
        }
    }
    tracing::info!(archive = %archive.display(), restored = ?names, "rolled back snapshot");
    Ok(names)
}
