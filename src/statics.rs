// Central place for file names, save field names and user-facing strings.
// Keep these out of the component modules to reduce duplication and make tweaks safer.

// External links (empty until the manifest names a repository)
pub const PROJECT_URL: &str = env!("CARGO_PKG_REPOSITORY");
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// Storage directory layout (FILE_ prefix)
pub const FILE_MAIN_SAVE: &str = "DevilConnection_sf.sav";
pub const FILE_SIBLING_SAVE: &str = "DevilConnection_tyrano_data.sav";
pub const FILE_SIDECAR: &str = "NEO.sav";
pub const FILE_PHOTO_IDS: &str = "DevilConnection_photo_ids.sav";
pub const FILE_PHOTO_ALL_IDS: &str = "DevilConnection_photo_all_ids.sav";
pub const FILE_PHOTO_PREFIX: &str = "DevilConnection_photo_";
pub const FILE_PHOTO_THUMB_SUFFIX: &str = "_thumb";
pub const FILE_SAVE_EXT: &str = ".sav";
pub const FILE_SHADOW: &str = ".temp_sf.sav";

// Backup archive layout
pub const BACKUP_DIR_NAME: &str = "dcsm_backups";
pub const BACKUP_FILE_PREFIX: &str = "DC_storage_backup_";
pub const BACKUP_EXT: &str = "zip";
pub const BACKUP_MARKER: &str = "dcsmINFO.txt";
pub const BACKUP_MARKER_VERSION_PREFIX: &str = "ver:";
pub const BACKUP_REQUIRED_FILES: [&str; 2] = [FILE_MAIN_SAVE, FILE_SIBLING_SAVE];

// Timestamp formats
pub const FMT_PHOTO_DATE: &str = "%Y/%m/%d %H:%M:%S";
pub const FMT_BACKUP_NAME: &str = "%Y%m%d_%H%M%S";
pub const FMT_BACKUP_MARKER: &str = "%Y-%m-%d %H:%M:%S";

// Embedded image data URIs
pub const DATA_URI_PNG: &str = "data:image/png;base64,";
pub const DATA_URI_JPEG: &str = "data:image/jpeg;base64,";

// Main save document keys (DC_ prefix)
pub const DC_ENDINGS: &str = "endings";
pub const DC_COLLECTED_ENDINGS: &str = "collectedEndings";
pub const DC_OMAKES: &str = "omakes";
pub const DC_CHARACTERS: &str = "characters";
pub const DC_COLLECTED_CHARACTERS: &str = "collectedCharacters";
pub const DC_STICKER: &str = "sticker";
pub const DC_GALLERY: &str = "gallery";
pub const DC_NG_SCENE: &str = "ngScene";
pub const DC_WHOLE_TOTAL_MP: &str = "wholeTotalMP";
pub const DC_JUDGE_COUNTS: &str = "judgeCounts";
pub const DC_JUDGE_PERFECT: &str = "perfect";
pub const DC_JUDGE_GOOD: &str = "good";
pub const DC_JUDGE_BAD: &str = "bad";
pub const DC_EPILOGUE: &str = "epilogue";
pub const DC_LOOP_COUNT: &str = "loopCount";
pub const DC_LOOP_RECORD: &str = "loopRecord";
pub const DC_NEO: &str = "NEO";
pub const DC_LAMIA_NOROI: &str = "Lamia_noroi";
pub const DC_TRAUMA: &str = "trauma";
pub const DC_KILL_WARNING: &str = "killWarning";
pub const DC_KILL: &str = "kill";
pub const DC_KILLED: &str = "killed";
pub const DC_KILL_START: &str = "killStart";
pub const DC_DESU: &str = "desu";
pub const DC_HADE: &str = "hade";
pub const DC_SAVE_LIST_NO: &str = "saveListNo";
pub const DC_ALBUM_PAGE_NO: &str = "albumPageNo";
pub const DC_MEMORY: &str = "memory";
pub const DC_MEMORY_NAME: &str = "name";
pub const DC_MEMORY_SEIBETU: &str = "seibetu";
pub const DC_MEMORY_HUTANARI: &str = "hutanari";
pub const DC_MEMORY_CAMERA_ENABLE: &str = "cameraEnable";
pub const DC_MEMORY_YUBIWA: &str = "yubiwa";
pub const DC_SYSTEM: &str = "system";
pub const DC_SYSTEM_AUTOSAVE: &str = "autosave";
pub const DC_FULLSCREEN: &str = "fullscreen";

// Opaque bulk fields: preserved verbatim, collapsed in the editor.
pub const DC_RECORD: &str = "record";
pub const DC_TAP_EFFECT: &str = "_tap_effect";
pub const DC_INITIAL_VARS: &str = "initialVars";
pub const DC_BULK_FIELDS: [&str; 3] = [DC_RECORD, DC_TAP_EFFECT, DC_INITIAL_VARS];

// Screenshot index record keys
pub const PHOTO_FIELD_ID: &str = "id";
pub const PHOTO_FIELD_DATE: &str = "date";

// Sticker ids run 1..=133, and 82 was never shipped.
pub const STICKER_MIN: i64 = 1;
pub const STICKER_MAX: i64 = 133;
pub const STICKER_MISSING_ID: i64 = 82;

// Placeholder written into the editor projection in place of bulk fields.
pub const EDITOR_COLLAPSED_SENTINEL: &str = "<<collapsed by DCSM: left unchanged on save>>";

// Environment variable consulted by storage auto-detection.
pub const ENV_STORAGE_DIR: &str = "DCSM_STORAGE_DIR";

// English notification strings (EN_ prefix to make future localization easier)
pub const EN_ARROW: &str = "→";
pub const EN_PREFIX_ADDED: &str = "+ ";
pub const EN_PREFIX_REMOVED: &str = "- ";
pub const EN_LIST_APPEND: &str = " += ";
pub const EN_LIST_REMOVE: &str = " -= ";
pub const EN_ASSIGN: &str = " = ";

pub const EN_TYPE_NULL: &str = "null";
pub const EN_TYPE_BOOL: &str = "bool";
pub const EN_TYPE_INT: &str = "int";
pub const EN_TYPE_FLOAT: &str = "float";
pub const EN_TYPE_STRING: &str = "string";
pub const EN_TYPE_ARRAY: &str = "array";
pub const EN_TYPE_OBJECT: &str = "object";
