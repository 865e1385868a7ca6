//! Packing and unpacking of `.zarr.zip` archives.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use tracing::debug;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use chip_common::{ChipError, ChipResult};

/// Zip a staging directory into `dest`.
///
/// Writes to a temp file next to `dest` and renames into place, so a
/// crash mid-pack never leaves a truncated archive behind.
pub fn pack(staging: &Path, dest: &Path) -> ChipResult<()> {
    let parent = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let tmp = tempfile::NamedTempFile::new_in(parent)?;
    let mut writer = ZipWriter::new(BufWriter::new(tmp.reopen()?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries = 0usize;
    for entry in WalkDir::new(staging).sort_by_file_name() {
        let entry = entry.map_err(|e| ChipError::store(format!("walk staging dir: {}", e)))?;
        let rel = entry
            .path()
            .strip_prefix(staging)
            .map_err(|e| ChipError::store(e.to_string()))?;
        if rel.as_os_str().is_empty() {
            continue;
        }
        let name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            writer
                .add_directory(name, options)
                .map_err(|e| ChipError::store(format!("zip add_directory: {}", e)))?;
        } else {
            writer
                .start_file(name, options)
                .map_err(|e| ChipError::store(format!("zip start_file: {}", e)))?;
            let mut file = BufReader::new(File::open(entry.path())?);
            io::copy(&mut file, &mut writer)?;
            entries += 1;
        }
    }

    let inner = writer
        .finish()
        .map_err(|e| ChipError::store(format!("zip finish: {}", e)))?;
    inner
        .into_inner()
        .map_err(|e| ChipError::store(format!("flush archive: {}", e)))?
        .sync_all()?;

    tmp.persist(dest)
        .map_err(|e| ChipError::store(format!("rename archive into place: {}", e)))?;

    debug!(dest = %dest.display(), entries, "packed chip archive");
    Ok(())
}

/// Unzip an archive into `target`.
pub fn unpack(archive_path: &Path, target: &Path) -> ChipResult<()> {
    let file = File::open(archive_path).map_err(|e| {
        ChipError::store(format!("cannot open archive {}: {}", archive_path.display(), e))
    })?;
    let mut archive = ZipArchive::new(BufReader::new(file)).map_err(|e| {
        ChipError::store(format!("{} is not a zip archive: {}", archive_path.display(), e))
    })?;

    archive
        .extract(target)
        .map_err(|e| ChipError::store(format!("unpack {}: {}", archive_path.display(), e)))?;

    debug!(
        archive = %archive_path.display(),
        entries = archive.len(),
        "unpacked chip archive"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_pack_unpack_round_trip() {
        let staging = tempfile::tempdir().unwrap();
        fs::create_dir_all(staging.path().join("cells/1U_2R")).unwrap();
        fs::write(staging.path().join("chipstore.json"), b"{}").unwrap();
        fs::write(staging.path().join("cells/1U_2R/zarr.json"), b"{\"a\":1}").unwrap();

        let out = tempfile::tempdir().unwrap();
        let dest = out.path().join("labels.zarr.zip");
        pack(staging.path(), &dest).unwrap();
        assert!(dest.exists());

        let extracted = tempfile::tempdir().unwrap();
        unpack(&dest, extracted.path()).unwrap();
        assert_eq!(
            fs::read(extracted.path().join("chipstore.json")).unwrap(),
            b"{}"
        );
        assert_eq!(
            fs::read(extracted.path().join("cells/1U_2R/zarr.json")).unwrap(),
            b"{\"a\":1}"
        );
    }

    #[test]
    fn test_unpack_missing_archive_errors() {
        let target = tempfile::tempdir().unwrap();
        let err = unpack(Path::new("/nonexistent.zarr.zip"), target.path()).unwrap_err();
        assert!(err.to_string().contains("cannot open archive"));
    }
}
