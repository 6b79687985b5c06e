//! Plugin archive packing and extraction
//!
//! Archives are gzip-compressed tarballs rooted at the source's base name,
//! built fully in memory. Extraction refuses member paths that would escape
//! the destination directory.

use std::{
    fs,
    io::Cursor,
    path::{Component, Path, PathBuf},
};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use walkdir::WalkDir;

use crate::error::{Error, Result};

/// Predicate over archive-relative member paths. Matching members (and,
/// for directories, everything beneath them) are never written.
pub type IgnorePredicate<'a> = &'a dyn Fn(&Path) -> bool;

/// Build a gzip-compressed tar archive from a single file or a directory
/// tree, rooted at the source's base name.
pub fn make_archive(source: &Path, ignore: Option<IgnorePredicate>) -> Result<Vec<u8>> {
    let base = source
        .file_name()
        .ok_or_else(|| Error::Archive(format!("{} has no base name", source.display())))?;
    let base = PathBuf::from(base);

    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    if source.is_dir() {
        let mut walker = WalkDir::new(source)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter();
        while let Some(entry) = walker.next() {
            let entry = entry.map_err(|e| Error::Archive(e.to_string()))?;
            let rel = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| Error::Archive(e.to_string()))?;
            let member = base.join(rel);
            if ignore.is_some_and(|matches| matches(&member)) {
                if entry.file_type().is_dir() {
                    walker.skip_current_dir();
                }
                continue;
            }
            if entry.file_type().is_dir() {
                builder.append_dir(&member, entry.path())?;
            } else {
                builder.append_path_with_name(entry.path(), &member)?;
            }
        }
    } else if !ignore.is_some_and(|matches| matches(&base)) {
        builder.append_path_with_name(source, &base)?;
    }

    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}

/// Unpack a gzip-compressed tar archive into `dest`, overwriting existing
/// entries.
pub fn extract_archive(bytes: &[u8], dest: &Path) -> Result<()> {
    fs::create_dir_all(dest)?;
    let mut archive = tar::Archive::new(GzDecoder::new(Cursor::new(bytes)));
    for entry in archive.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.into_owned();
        validate_member_path(&member)?;
        entry.unpack(dest.join(&member))?;
    }
    Ok(())
}

fn validate_member_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        return Err(Error::Archive("empty member path".into()));
    }
    for component in path.components() {
        match component {
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(Error::Archive(format!(
                    "member path {} escapes the destination",
                    path.display()
                )))
            }
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, contents: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, contents).expect("write file");
    }

    #[test]
    fn directory_round_trip_preserves_the_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("demo");
        write(&source.join("plugin.toml"), "name = \"demo\"\n");
        write(&source.join("scripts/main.sh"), "#!/bin/sh\necho hi\n");

        let bytes = make_archive(&source, None).expect("make archive");
        let dest = temp.path().join("out");
        extract_archive(&bytes, &dest).expect("extract archive");

        assert!(dest.join("demo/plugin.toml").is_file());
        assert_eq!(
            fs::read_to_string(dest.join("demo/scripts/main.sh")).expect("read member"),
            "#!/bin/sh\necho hi\n"
        );
    }

    #[test]
    fn ignored_members_are_never_written() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("demo");
        write(&source.join("keep.txt"), "keep");
        write(&source.join("cache/drop.txt"), "drop");

        let ignore = |member: &Path| member.starts_with("demo/cache");
        let bytes = make_archive(&source, Some(&ignore)).expect("make archive");
        let dest = temp.path().join("out");
        extract_archive(&bytes, &dest).expect("extract archive");

        assert!(dest.join("demo/keep.txt").is_file());
        assert!(!dest.join("demo/cache").exists());
    }

    #[test]
    fn single_file_sources_archive_under_their_base_name() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("hello.sh");
        write(&source, "#!/bin/sh\n");

        let bytes = make_archive(&source, None).expect("make archive");
        let dest = temp.path().join("out");
        extract_archive(&bytes, &dest).expect("extract archive");
        assert!(dest.join("hello.sh").is_file());
    }

    #[test]
    fn traversal_member_paths_are_rejected() {
        assert!(validate_member_path(Path::new("demo/ok.txt")).is_ok());
        assert!(validate_member_path(Path::new("../evil.txt")).is_err());
        assert!(validate_member_path(Path::new("demo/../../evil.txt")).is_err());
        assert!(validate_member_path(Path::new("/etc/passwd")).is_err());
        assert!(validate_member_path(Path::new("")).is_err());
    }
}
