use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::edit::CropRectangle;
use crate::error::{Error, Result};

/// Key of the JSON array holding user presets
const PRESETS_KEY: &str = "cropPresets";
/// Key of the JSON object holding settings
const SETTINGS_KEY: &str = "settings";

/// Identifier of a crop preset
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct PresetId(pub String);

impl fmt::Display for PresetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named crop rectangle that outlives the session
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CropPreset {
    pub id: PresetId,
    pub name: String,
    pub area: CropRectangle,
    pub created_at: DateTime<Utc>,
}

impl CropPreset {
    /// Built-in presets are not stored and cannot be deleted
    pub fn is_builtin(&self) -> bool {
        self.id.0.starts_with("builtin-")
    }
}

/// The presets every install starts with
pub fn builtin_presets() -> Vec<CropPreset> {
    let band = |id: &str, name: &str, y: f64, height: f64| CropPreset {
        id: PresetId(format!("builtin-{id}")),
        name: name.to_string(),
        area: CropRectangle::new(0.0, y, 100.0, height),
        created_at: DateTime::<Utc>::default(),
    };

    vec![
        band("youtube-sub", "YouTube subtitle", 75.0, 25.0),
        band("bottom-30", "Bottom 30%", 70.0, 30.0),
        band("bottom-20", "Bottom 20%", 80.0, 20.0),
        band("full", "Full", 0.0, 100.0),
    ]
}

/// User-tunable defaults for crop and compose
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Output width of the composed image in pixels
    pub max_width: u32,
    /// Vertical gap between stacked items in pixels
    pub padding: u32,
    /// JPEG quality used for cropped rasters (1-100)
    pub jpeg_quality: u8,
    /// Font for comment bands; searched in system font folders when `None`
    pub font_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_width: 1080,
            padding: 10,
            jpeg_quality: 90,
            font_path: None,
        }
    }
}

impl Settings {
    /// Parse a numeric text field; empty, invalid and zero all mean "use the default".
    /// Values above `max` are capped.
    pub fn parse_field(text: &str, default: u32, max: u32) -> u32 {
        match text.trim().parse::<u32>() {
            Ok(0) | Err(_) => default,
            Ok(value) => value.min(max),
        }
    }
}

/// Persistent key/value store for presets and settings.
///
/// Everything lives in one SQLite table; presets are a single JSON array
/// under a fixed key, mirroring a browser local-storage layout.
pub struct PresetStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl PresetStore {
    /// Open (or create) the store in the user's data directory:
    /// - Linux: ~/.local/share/capstack/capstack.db
    /// - macOS: ~/Library/Application Support/capstack/capstack.db
    /// - Windows: %APPDATA%\capstack\capstack.db
    pub fn open_default() -> Result<Self> {
        let db_path = Self::default_db_path();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&db_path)?;
        log::info!("📁 Preset store at: {}", db_path.display());

        let store = PresetStore {
            conn,
            db_path: Some(db_path),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Store that lives only as long as the process
    pub fn in_memory() -> Result<Self> {
        let store = PresetStore {
            conn: Connection::open_in_memory()?,
            db_path: None,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn default_db_path() -> PathBuf {
        let mut path = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        path.push("capstack");
        path.push("capstack.db");
        path
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key     TEXT PRIMARY KEY,
                value   TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn put_raw(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            [key, value],
        )?;
        Ok(())
    }

    fn user_presets(&self) -> Result<Vec<CropPreset>> {
        match self.get_raw(PRESETS_KEY)? {
            Some(json) => {
                let mut presets: Vec<CropPreset> = serde_json::from_str(&json)?;
                for preset in &mut presets {
                    preset.area = preset.area.clamped();
                }
                Ok(presets)
            }
            None => Ok(Vec::new()),
        }
    }

    fn write_user_presets(&self, presets: &[CropPreset]) -> Result<()> {
        self.put_raw(PRESETS_KEY, &serde_json::to_string(presets)?)
    }

    /// Built-in presets followed by user presets in creation order
    pub fn list(&self) -> Result<Vec<CropPreset>> {
        let mut presets = builtin_presets();
        presets.extend(self.user_presets()?);
        Ok(presets)
    }

    /// Save the rectangle under `name` and return the new preset's ID
    pub fn save(&self, name: &str, area: CropRectangle) -> Result<PresetId> {
        let mut presets = self.user_presets()?;
        let created_at = Utc::now();

        let base = to_base36(created_at.timestamp_millis().max(0) as u64);
        let mut id = PresetId(base.clone());
        let mut suffix = 1;
        while presets.iter().any(|p| p.id == id) {
            id = PresetId(format!("{base}-{suffix}"));
            suffix += 1;
        }

        let name = match name.trim() {
            "" => format!("Preset {}", presets.len() + 1),
            trimmed => trimmed.to_string(),
        };

        presets.push(CropPreset {
            id: id.clone(),
            name,
            area: area.clamped(),
            created_at,
        });
        self.write_user_presets(&presets)?;

        log::info!("💾 Saved preset {}", id);
        Ok(id)
    }

    /// Delete a user preset
    pub fn delete(&self, id: &PresetId) -> Result<()> {
        let mut presets = self.user_presets()?;
        let before = presets.len();
        presets.retain(|p| &p.id != id);

        if presets.len() == before {
            return Err(Error::PresetNotFound(id.clone()));
        }

        self.write_user_presets(&presets)
    }

    /// Stored settings, or defaults if none were saved yet
    pub fn load_settings(&self) -> Result<Settings> {
        match self.get_raw(SETTINGS_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(Settings::default()),
        }
    }

    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        self.put_raw(SETTINGS_KEY, &serde_json::to_string(settings)?)
    }
}

// Implement Debug for better error messages
impl fmt::Debug for PresetStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PresetStore")
            .field("db_path", &self.db_path)
            .finish()
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value == 0 {
        return "0".to_string();
    }

    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_listed_first() {
        let store = PresetStore::in_memory().unwrap();
        let presets = store.list().unwrap();

        assert_eq!(presets.len(), 4);
        assert!(presets.iter().all(|p| p.is_builtin()));
        assert_eq!(presets[0].area, CropRectangle::new(0.0, 75.0, 100.0, 25.0));
        assert_eq!(presets[3].area, CropRectangle::full());
    }

    #[test]
    fn test_save_list_delete() {
        let store = PresetStore::in_memory().unwrap();
        let area = CropRectangle::new(0.0, 60.0, 100.0, 40.0);

        let first = store.save("Drama", area).unwrap();
        let second = store.save("  ", CropRectangle::default()).unwrap();
        assert_ne!(first, second);

        let presets = store.list().unwrap();
        assert_eq!(presets.len(), 6);
        assert_eq!(presets[4].name, "Drama");
        assert_eq!(presets[4].area, area);
        assert_eq!(presets[5].name, "Preset 2");
        assert!(!presets[4].is_builtin());

        store.delete(&first).unwrap();
        let names: Vec<String> = store.list().unwrap().into_iter().map(|p| p.name).collect();
        assert!(!names.contains(&"Drama".to_string()));

        assert!(matches!(
            store.delete(&first),
            Err(Error::PresetNotFound(_))
        ));
    }

    #[test]
    fn test_stored_record_format() {
        let store = PresetStore::in_memory().unwrap();
        store.save("Band", CropRectangle::default()).unwrap();

        let json = store.get_raw(PRESETS_KEY).unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let record = &value[0];

        assert_eq!(record["name"], "Band");
        assert_eq!(record["area"]["y"], 75.0);
        assert_eq!(record["area"]["height"], 25.0);
        assert!(record["id"].is_string());
        assert!(record["createdAt"].is_string());
    }

    #[test]
    fn test_settings_round_trip_and_defaults() {
        let store = PresetStore::in_memory().unwrap();
        assert_eq!(store.load_settings().unwrap(), Settings::default());

        let settings = Settings {
            max_width: 720,
            padding: 4,
            ..Settings::default()
        };
        store.save_settings(&settings).unwrap();
        assert_eq!(store.load_settings().unwrap(), settings);
    }

    #[test]
    fn test_parse_field_falls_back() {
        assert_eq!(Settings::parse_field("720", 1080, 4096), 720);
        assert_eq!(Settings::parse_field(" 0 ", 10, 4096), 10);
        assert_eq!(Settings::parse_field("abc", 10, 4096), 10);
        assert_eq!(Settings::parse_field("", 1080, 4096), 1080);
        // u32::MAX parses but is capped
        assert_eq!(Settings::parse_field("4294967295", 1080, 4096), 4096);
    }

    #[test]
    fn test_base36() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "z");
        assert_eq!(to_base36(36), "10");
    }
}
