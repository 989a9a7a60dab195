//! Derived aggregates over the main save document, for the overview screen.
//!
//! Everything here is read-only and tolerant: missing or mistyped fields count as empty/zero.

use crate::{DcValue, statics};
use std::cmp::Ordering;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JudgeCounts {
    pub perfect: i64,
    pub good: i64,
    pub bad: i64,
}

impl JudgeCounts {
    pub fn total(&self) -> i64 {
        self.perfect.saturating_add(self.good).saturating_add(self.bad)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Coverage {
    pub collected: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryView {
    pub name: String,
    pub seibetu: i64,
    pub hutanari: Option<DcValue>,
    pub camera_enable: Option<DcValue>,
    pub yubiwa: Option<DcValue>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveStats {
    pub endings: Coverage,
    /// Ending ids not yet collected; numeric ids ascending, then everything else.
    pub missing_endings: Vec<String>,
    /// `omakes` entries that are also collected endings.
    pub omake_score: usize,
    pub stickers: Coverage,
    pub missing_stickers: Vec<i64>,
    pub characters: Coverage,
    pub gallery_count: usize,
    pub ng_scene_count: usize,
    pub whole_total_mp: i64,
    pub judge_counts: JudgeCounts,
    pub epilogue: i64,
    pub loop_count: i64,
    pub loop_record: i64,
    pub neo: i64,
    pub lamia_noroi: i64,
    pub trauma: i64,
    pub kill_warning: i64,
    pub kill: i64,
    /// `None` when the game never wrote the field.
    pub killed: Option<i64>,
    pub kill_start: i64,
    pub desu: i64,
    pub hade: i64,
    pub save_list_no: i64,
    pub album_page_no: i64,
    pub memory: MemoryView,
    pub autosave: Option<bool>,
    pub fullscreen: Option<bool>,
    pub is_zealot_route: bool,
}

/// Every sticker id the game can award.
pub fn all_sticker_ids() -> impl Iterator<Item = i64> {
    (statics::STICKER_MIN..=statics::STICKER_MAX).filter(|id| *id != statics::STICKER_MISSING_ID)
}

impl SaveStats {
    pub fn from_document(doc: &DcValue) -> Self {
        let endings = string_set(doc.get(statics::DC_ENDINGS), false);
        let collected_endings = string_set(doc.get(statics::DC_COLLECTED_ENDINGS), false);
        let omakes = string_set(doc.get(statics::DC_OMAKES), false);
        let characters = string_set(doc.get(statics::DC_CHARACTERS), true);
        let collected_characters = string_set(doc.get(statics::DC_COLLECTED_CHARACTERS), true);

        let mut missing_endings: Vec<String> =
            endings.difference(&collected_endings).cloned().collect();
        missing_endings.sort_by(|a, b| compare_ids(a, b));

        let stickers: BTreeSet<i64> = doc
            .get(statics::DC_STICKER)
            .and_then(DcValue::as_array)
            .unwrap_or_default()
            .iter()
            .filter_map(sticker_id)
            .collect();
        let missing_stickers: Vec<i64> = all_sticker_ids().filter(|id| !stickers.contains(id)).collect();
        let sticker_total = all_sticker_ids().count();

        let judge = doc.get(statics::DC_JUDGE_COUNTS);
        let judge_counts = JudgeCounts {
            perfect: int_at(judge, statics::DC_JUDGE_PERFECT),
            good: int_at(judge, statics::DC_JUDGE_GOOD),
            bad: int_at(judge, statics::DC_JUDGE_BAD),
        };

        let memory = doc.get(statics::DC_MEMORY);
        let memory = MemoryView {
            name: memory
                .and_then(|m| m.get(statics::DC_MEMORY_NAME))
                .and_then(DcValue::as_str)
                .unwrap_or_default()
                .to_string(),
            seibetu: int_at(memory, statics::DC_MEMORY_SEIBETU),
            hutanari: memory.and_then(|m| m.get(statics::DC_MEMORY_HUTANARI)).cloned(),
            camera_enable: memory
                .and_then(|m| m.get(statics::DC_MEMORY_CAMERA_ENABLE))
                .cloned(),
            yubiwa: memory.and_then(|m| m.get(statics::DC_MEMORY_YUBIWA)).cloned(),
        };

        let root = Some(doc);
        let kill = int_at(root, statics::DC_KILL);
        let killed = doc.get(statics::DC_KILLED).and_then(DcValue::as_i64);
        let kill_start = int_at(root, statics::DC_KILL_START);

        Self {
            endings: Coverage {
                collected: collected_endings.intersection(&endings).count(),
                total: endings.len(),
            },
            missing_endings,
            omake_score: omakes.intersection(&collected_endings).count(),
            stickers: Coverage {
                collected: sticker_total - missing_stickers.len(),
                total: sticker_total,
            },
            missing_stickers,
            characters: Coverage {
                collected: collected_characters.intersection(&characters).count(),
                total: characters.len(),
            },
            gallery_count: list_len(doc.get(statics::DC_GALLERY)),
            ng_scene_count: list_len(doc.get(statics::DC_NG_SCENE)),
            whole_total_mp: int_at(root, statics::DC_WHOLE_TOTAL_MP).max(0),
            judge_counts,
            epilogue: int_at(root, statics::DC_EPILOGUE),
            loop_count: int_at(root, statics::DC_LOOP_COUNT),
            loop_record: int_at(root, statics::DC_LOOP_RECORD),
            neo: int_at(root, statics::DC_NEO),
            lamia_noroi: int_at(root, statics::DC_LAMIA_NOROI),
            trauma: int_at(root, statics::DC_TRAUMA),
            kill_warning: int_at(root, statics::DC_KILL_WARNING),
            kill,
            killed,
            kill_start,
            desu: int_at(root, statics::DC_DESU),
            hade: int_at(root, statics::DC_HADE),
            save_list_no: int_at(root, statics::DC_SAVE_LIST_NO),
            album_page_no: int_at(root, statics::DC_ALBUM_PAGE_NO),
            memory,
            autosave: doc
                .get(statics::DC_SYSTEM)
                .and_then(|s| s.get(statics::DC_SYSTEM_AUTOSAVE))
                .and_then(DcValue::as_bool),
            fullscreen: doc.get(statics::DC_FULLSCREEN).and_then(DcValue::as_bool),
            is_zealot_route: kill == 1 || killed == Some(1) || kill_start > 0,
        }
    }
}

fn int_at(parent: Option<&DcValue>, key: &str) -> i64 {
    parent
        .and_then(|p| p.get(key))
        .and_then(DcValue::as_i64)
        .unwrap_or(0)
}

fn list_len(value: Option<&DcValue>) -> usize {
    value.and_then(DcValue::as_array).map_or(0, <[DcValue]>::len)
}

/// Entries of a string list as a set. Numbers are accepted and stringified; with
/// `skip_blank`, whitespace-only entries are dropped.
fn string_set(value: Option<&DcValue>, skip_blank: bool) -> BTreeSet<String> {
    value
        .and_then(DcValue::as_array)
        .unwrap_or_default()
        .iter()
        .filter_map(|v| match v {
            DcValue::String(s) => Some(s.clone()),
            DcValue::Number(_) => Some(v.to_json_compact()),
            _ => None,
        })
        .filter(|s| !skip_blank || !s.trim().is_empty())
        .collect()
}

fn sticker_id(value: &DcValue) -> Option<i64> {
    let id = match value {
        DcValue::String(s) => s.trim().parse().ok()?,
        other => other.as_i64()?,
    };
    let valid = (statics::STICKER_MIN..=statics::STICKER_MAX).contains(&id)
        && id != statics::STICKER_MISSING_ID;
    valid.then_some(id)
}

/// Numeric ids in numeric order first, then the rest lexically.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
