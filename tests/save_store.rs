use dcsm::{DcError, DcValue, SaveOutcome, SaveStore, codec, statics};
use pretty_assertions::assert_eq;
use std::path::Path;

type Result<T> = std::result::Result<T, Box<dyn std::error::Error>>;

const MAIN: &str = r#"{"endings":["1","2","3","10"],"collectedEndings":["1","10"],"omakes":["10","11"],"sticker":[1,2,3],"hp":5,"record":{"huge":[1,2,3,4]},"_tap_effect":[0,1],"initialVars":{"f":true},"kill":0,"killStart":0}"#;

fn write_doc(path: &Path, json: &str) -> Result<()> {
    std::fs::write(path, codec::encode(&DcValue::parse_json(json)?)?)?;
    Ok(())
}

fn store_with_main() -> Result<(tempfile::TempDir, SaveStore)> {
    let dir = tempfile::tempdir()?;
    let store = SaveStore::new(dir.path());
    write_doc(&store.main_path(), MAIN)?;
    Ok((dir, store))
}

#[test]
fn load_edit_save() -> Result<()> {
    let (_dir, store) = store_with_main()?;
    let mut save = store.load()?;
    assert_eq!(save.source_path, store.main_path());
    assert_eq!(save.stats().omake_score, 1);

    *save.root.get_mut("hp").ok_or("hp missing")? = DcValue::from(6);
    store.save(&save.root)?;
    let reloaded = store.load()?.root;
    assert_eq!(reloaded.get("hp"), Some(&DcValue::from(6)));
    assert_eq!(reloaded.get("record"), save.root.get("record"));
    Ok(())
}

#[test]
fn missing_main_save_is_not_found() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let store = SaveStore::new(dir.path());
    assert!(matches!(store.load(), Err(DcError::NotFound(_))));
    Ok(())
}

#[test]
fn editor_round_trip_preserves_bulk_fields() -> Result<()> {
    let (_dir, store) = store_with_main()?;
    let original = store.load()?.root;

    let text = SaveStore::editor_text(&original);
    assert!(!text.contains("huge"));
    assert!(text.contains(statics::EDITOR_COLLAPSED_SENTINEL));

    let edited = text.replace("\"hp\": 5", "\"hp\": 99");
    assert_ne!(edited, text);
    assert_eq!(store.apply_editor_text(&original, &edited)?, SaveOutcome::Saved);

    let saved = store.load()?.root;
    assert_eq!(saved.get("hp"), Some(&DcValue::from(99)));
    assert_eq!(saved.get("record"), original.get("record"));
    assert_eq!(saved.get("_tap_effect"), original.get("_tap_effect"));
    assert_eq!(saved.get("initialVars"), original.get("initialVars"));
    Ok(())
}

#[test]
fn untouched_editor_text_writes_nothing() -> Result<()> {
    let (_dir, store) = store_with_main()?;
    let before = std::fs::read(store.main_path())?;
    let original = store.load()?.root;

    let text = SaveStore::editor_text(&original);
    assert_eq!(store.apply_editor_text(&original, &text)?, SaveOutcome::NoChanges);
    assert_eq!(std::fs::read(store.main_path())?, before);
    Ok(())
}

#[test]
fn broken_editor_text_reports_position() -> Result<()> {
    let (_dir, store) = store_with_main()?;
    let original = store.load()?.root;
    match store.apply_editor_text(&original, "{\n  \"hp\": 1,\n  oops\n}") {
        Err(DcError::InvalidDocument { line, column, .. }) => {
            assert_eq!(line, 3);
            assert!(column > 0);
        }
        other => panic!("expected InvalidDocument, got {other:?}"),
    }
    assert!(matches!(
        store.apply_editor_text(&original, "[1, 2]"),
        Err(DcError::NotADocument { .. })
    ));
    Ok(())
}

#[test]
fn stats_from_disk() -> Result<()> {
    let (_dir, store) = store_with_main()?;
    let stats = store.view_stats()?;
    assert_eq!(stats.endings.collected, 2);
    assert_eq!(stats.endings.total, 4);
    assert_eq!(stats.missing_endings, vec!["2", "3"]);
    assert_eq!(stats.omake_score, 1);
    assert_eq!(stats.stickers.collected, 3);
    assert_eq!(stats.stickers.total, 132);
    assert!(!stats.is_zealot_route);
    Ok(())
}

#[test]
fn sibling_import_and_export() -> Result<()> {
    let (dir, store) = store_with_main()?;
    let picked = dir.path().join("picked.sav");
    write_doc(&picked, r#"{"stat":{"f":{"a":1}}}"#)?;

    let imported = store.import_sibling(&picked)?;
    assert!(store.sibling_path().exists());
    assert_eq!(store.sibling_document()?, imported);
    assert_eq!(codec::decode(&store.export_sibling()?)?, imported);

    let pretty = store.export_sibling_pretty()?;
    assert!(pretty.contains('\n'));
    assert_eq!(DcValue::parse_json(&pretty)?, imported);

    let garbage = dir.path().join("garbage.sav");
    std::fs::write(&garbage, b"%ZZ")?;
    assert!(store.import_sibling(&garbage).is_err());
    Ok(())
}

#[test]
fn sidecar_is_optional() -> Result<()> {
    let (_dir, store) = store_with_main()?;
    assert_eq!(store.sidecar()?, None);
    std::fs::write(
        store.sidecar_path(),
        codec::encode_value(&DcValue::from("neo state")),
    )?;
    assert_eq!(store.sidecar()?.as_deref(), Some("neo state"));
    Ok(())
}
