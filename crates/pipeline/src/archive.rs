//! Packaging of an image-set job's keyframes into one archive.

use std::fs::File;
use std::io;
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Keyframes directory {0} does not exist")]
    MissingDirectory(String),

    #[error("Archive I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Archive write error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Zip every regular file directly inside `source_dir` into `dest`, each
/// under its own file name. Subdirectories are not descended into. Returns
/// the number of files archived.
///
/// Blocking; call from `spawn_blocking`.
pub fn zip_directory(source_dir: &Path, dest: &Path) -> Result<usize, ArchiveError> {
    if !source_dir.is_dir() {
        return Err(ArchiveError::MissingDirectory(
            source_dir.display().to_string(),
        ));
    }

    let mut files = Vec::new();
    for entry in std::fs::read_dir(source_dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();

    let mut writer = ZipWriter::new(File::create(dest)?);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for path in &files {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        writer.start_file(name, options)?;
        let mut source = File::open(path)?;
        io::copy(&mut source, &mut writer)?;
    }
    writer.finish()?;

    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::io::Read;

    use super::*;

    fn entry_names(archive: &Path) -> BTreeSet<String> {
        let zip = zip::ZipArchive::new(File::open(archive).unwrap()).unwrap();
        zip.file_names().map(str::to_string).collect()
    }

    #[test]
    fn every_keyframe_is_archived_and_nothing_else() {
        let dir = tempfile::tempdir().unwrap();
        let keyframes = dir.path().join("keyframes");
        std::fs::create_dir(&keyframes).unwrap();
        std::fs::write(keyframes.join("scene_01.png"), b"one").unwrap();
        std::fs::write(keyframes.join("scene_02.png"), b"two").unwrap();
        std::fs::create_dir(keyframes.join("drafts")).unwrap();
        std::fs::write(keyframes.join("drafts").join("x.png"), b"skip").unwrap();

        let archive = dir.path().join("keyframes.zip");
        let count = zip_directory(&keyframes, &archive).unwrap();

        assert_eq!(count, 2);
        assert_eq!(
            entry_names(&archive),
            BTreeSet::from(["scene_01.png".to_string(), "scene_02.png".to_string()])
        );

        let mut zip = zip::ZipArchive::new(File::open(&archive).unwrap()).unwrap();
        let mut contents = String::new();
        zip.by_name("scene_02.png")
            .unwrap()
            .read_to_string(&mut contents)
            .unwrap();
        assert_eq!(contents, "two");
    }

    #[test]
    fn empty_directory_yields_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let keyframes = dir.path().join("keyframes");
        std::fs::create_dir(&keyframes).unwrap();
        let archive = dir.path().join("keyframes.zip");

        assert_eq!(zip_directory(&keyframes, &archive).unwrap(), 0);
        assert!(entry_names(&archive).is_empty());
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = zip_directory(&dir.path().join("keyframes"), &dir.path().join("k.zip"));
        assert!(matches!(result, Err(ArchiveError::MissingDirectory(_))));
    }
}
