use chrono::{NaiveDate, NaiveDateTime};
use dcsm::{DcError, backup, statics};
use pretty_assertions::assert_eq;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 1, 2)
        .and_then(|d| d.and_hms_opt(h, m, s))
        .unwrap()
}

/// `<tmp>/storage` holding `a` and `b/c`.
fn storage() -> Result<(tempfile::TempDir, PathBuf)> {
    let root = tempfile::tempdir()?;
    let save_dir = root.path().join("storage");
    std::fs::create_dir_all(save_dir.join("b"))?;
    std::fs::write(save_dir.join("a"), b"alpha")?;
    std::fs::write(save_dir.join("b").join("c"), b"gamma")?;
    Ok((root, save_dir))
}

fn entry_names(zip_path: &Path) -> Result<Vec<String>> {
    let archive = zip::ZipArchive::new(std::fs::File::open(zip_path)?)?;
    Ok(archive.file_names().map(str::to_string).collect())
}

#[test]
fn create_and_list() -> Result<()> {
    let (root, save_dir) = storage()?;
    let mut progress = Vec::new();
    let created = backup::create_at(&save_dir, at(3, 4, 5), |done, total| {
        progress.push((done, total))
    })?;

    assert_eq!(created.file_name, "DC_storage_backup_20240102_030405.zip");
    assert!(created.absolute_path.is_absolute());
    assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);

    let zip_path = root.path().join("dcsm_backups").join(&created.file_name);
    assert_eq!(entry_names(&zip_path)?, vec!["dcsmINFO.txt", "a", "b/c"]);

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&zip_path)?)?;
    let mut marker = String::new();
    archive.by_name(statics::BACKUP_MARKER)?.read_to_string(&mut marker)?;
    assert_eq!(marker.lines().next(), Some("2024-01-02 03:04:05"));

    let listed = backup::list(&backup::backup_dir_for(&save_dir))?;
    assert_eq!(listed.len(), 1);
    assert!(listed[0].has_info);
    assert_eq!(listed[0].timestamp, Some(at(3, 4, 5)));
    let url = Some(statics::PROJECT_URL).filter(|u| !u.is_empty());
    assert_eq!(listed[0].provenance.as_deref(), url);
    assert_eq!(listed[0].version.as_deref(), Some(statics::APP_VERSION));
    assert_eq!(listed[0].size, created.size);
    Ok(())
}

#[test]
fn shadow_copy_is_not_archived() -> Result<()> {
    let (_root, save_dir) = storage()?;
    std::fs::write(save_dir.join(statics::FILE_SHADOW), b"shadow")?;
    let created = backup::create_at(&save_dir, at(1, 0, 0), |_, _| {})?;
    let names = entry_names(&created.absolute_path)?;
    assert!(!names.iter().any(|n| n == statics::FILE_SHADOW));
    Ok(())
}

#[test]
fn same_second_twice_is_a_conflict() -> Result<()> {
    let (_root, save_dir) = storage()?;
    backup::create_at(&save_dir, at(1, 0, 0), |_, _| {})?;
    assert!(matches!(
        backup::create_at(&save_dir, at(1, 0, 0), |_, _| {}),
        Err(DcError::Conflict(_))
    ));
    Ok(())
}

#[test]
fn list_puts_archives_with_info_first_newest_first() -> Result<()> {
    let (_root, save_dir) = storage()?;
    backup::create_at(&save_dir, at(1, 0, 0), |_, _| {})?;
    backup::create_at(&save_dir, at(5, 0, 0), |_, _| {})?;
    backup::create_at(&save_dir, at(3, 0, 0), |_, _| {})?;

    let backup_dir = backup::backup_dir_for(&save_dir);
    {
        let mut zip = zip::ZipWriter::new(std::fs::File::create(backup_dir.join("zz_plain.zip"))?);
        zip.start_file("a", zip::write::SimpleFileOptions::default())?;
        zip.write_all(b"alpha")?;
        zip.finish()?;
    }
    std::fs::write(backup_dir.join("broken.zip"), b"not a zip at all")?;
    std::fs::write(backup_dir.join("notes.txt"), b"ignored")?;

    let listed = backup::list(&backup_dir)?;
    let flags: Vec<bool> = listed.iter().map(|e| e.has_info).collect();
    assert_eq!(flags, vec![true, true, true, false, false]);
    let stamps: Vec<NaiveDateTime> = listed.iter().filter_map(|e| e.timestamp).collect();
    assert_eq!(stamps, vec![at(5, 0, 0), at(3, 0, 0), at(1, 0, 0)]);
    Ok(())
}

#[test]
fn missing_backup_dir_lists_empty() -> Result<()> {
    let root = tempfile::tempdir()?;
    assert!(backup::list(&root.path().join("dcsm_backups"))?.is_empty());
    Ok(())
}

#[test]
fn restore_replaces_folder_contents() -> Result<()> {
    let (_root, save_dir) = storage()?;
    let created = backup::create_at(&save_dir, at(2, 0, 0), |_, _| {})?;

    std::fs::write(save_dir.join("a"), b"changed")?;
    std::fs::write(save_dir.join("stray"), b"new file")?;
    std::fs::remove_dir_all(save_dir.join("b"))?;

    let restored = backup::restore(&created.absolute_path, &save_dir)?;
    assert_eq!(restored, 2);
    assert_eq!(std::fs::read(save_dir.join("a"))?, b"alpha");
    assert_eq!(std::fs::read(save_dir.join("b").join("c"))?, b"gamma");
    assert!(!save_dir.join("stray").exists());
    assert!(!save_dir.join(statics::BACKUP_MARKER).exists());
    Ok(())
}

#[test]
fn unreadable_archive_leaves_folder_alone() -> Result<()> {
    let (root, save_dir) = storage()?;
    let bogus = root.path().join("bogus.zip");
    std::fs::write(&bogus, b"nope")?;
    assert!(matches!(
        backup::restore(&bogus, &save_dir),
        Err(DcError::ArchiveFailed { .. })
    ));
    assert!(save_dir.join("a").exists());
    Ok(())
}

#[test]
fn required_files_names_missing_core_saves() -> Result<()> {
    let (_root, save_dir) = storage()?;
    let created = backup::create_at(&save_dir, at(1, 0, 0), |_, _| {})?;
    assert_eq!(
        backup::required_files(&created.absolute_path)?,
        vec![statics::FILE_MAIN_SAVE, statics::FILE_SIBLING_SAVE]
    );

    std::fs::write(save_dir.join(statics::FILE_MAIN_SAVE), b"%7B%7D")?;
    std::fs::write(save_dir.join(statics::FILE_SIBLING_SAVE), b"%7B%7D")?;
    let complete = backup::create_at(&save_dir, at(2, 0, 0), |_, _| {})?;
    assert!(backup::required_files(&complete.absolute_path)?.is_empty());
    Ok(())
}

#[test]
fn rename_appends_suffix_and_refuses_collisions() -> Result<()> {
    let (_root, save_dir) = storage()?;
    let first = backup::create_at(&save_dir, at(1, 0, 0), |_, _| {})?;
    let second = backup::create_at(&save_dir, at(2, 0, 0), |_, _| {})?;

    let renamed = backup::rename(&first.absolute_path, "before boss")?;
    assert_eq!(renamed.file_name().and_then(|n| n.to_str()), Some("before boss.zip"));
    assert!(renamed.exists());
    assert!(!first.absolute_path.exists());

    assert!(matches!(
        backup::rename(&second.absolute_path, "before boss.zip"),
        Err(DcError::Conflict(_))
    ));
    assert!(matches!(
        backup::rename(&second.absolute_path, "../escape"),
        Err(DcError::Conflict(_))
    ));
    assert_eq!(backup::rename(&renamed, "before boss")?, renamed);
    Ok(())
}

#[test]
fn deleting_the_last_backup_removes_the_directory() -> Result<()> {
    let (_root, save_dir) = storage()?;
    let backup_dir = backup::backup_dir_for(&save_dir);
    let first = backup::create_at(&save_dir, at(1, 0, 0), |_, _| {})?;
    let second = backup::create_at(&save_dir, at(2, 0, 0), |_, _| {})?;

    backup::delete(&first.absolute_path)?;
    assert!(backup_dir.exists());
    backup::delete(&second.absolute_path)?;
    assert!(!backup_dir.exists());

    assert!(matches!(
        backup::delete(&second.absolute_path),
        Err(DcError::NotFound(_))
    ));
    Ok(())
}

#[test]
fn estimate_is_in_the_right_ballpark() -> Result<()> {
    let (_root, save_dir) = storage()?;
    std::fs::write(save_dir.join("big"), "abc".repeat(10_000))?;
    let raw: u64 = 5 + 5 + 30_000;
    let estimate = backup::estimate(&save_dir)?;
    assert!(estimate > 0);
    assert!(estimate <= raw * 2);

    let empty = tempfile::tempdir()?;
    assert_eq!(backup::estimate(empty.path())?, 0);
    assert!(matches!(
        backup::estimate(&empty.path().join("missing")),
        Err(DcError::NotFound(_))
    ));
    Ok(())
}
