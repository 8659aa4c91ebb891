use crate::error::{Result, SignError};
use crate::model::RecordId;
use crate::workflow::Mode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub backend_url: String,
    pub model: String,
    pub record_id: RecordId,
    pub session_id: Option<String>,
    pub pages_dir: String,
    /// JSON document served by the in-process backend instead of `backend_url`.
    pub fixture: Option<String>,
    pub mode: Mode,
    pub poll_interval_ms: u64,
    pub poll_max_attempts: u32,
    pub zoom: f32,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:8069".to_string(),
            model: "sign.oca.request".to_string(),
            record_id: 1,
            session_id: None,
            pages_dir: "pages".to_string(),
            fixture: None,
            mode: Mode::Configure,
            poll_interval_ms: 50,
            poll_max_attempts: 200,
            zoom: 1.0,
        }
    }
}

/// Command-line values that take precedence over the settings file.
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub mode: Option<Mode>,
    pub record_id: Option<RecordId>,
    pub backend_url: Option<String>,
    pub pages_dir: Option<String>,
    pub fixture: Option<String>,
}

impl AppSettings {
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(mode) = overrides.mode {
            self.mode = mode;
        }
        if let Some(record) = overrides.record_id {
            self.record_id = record;
        }
        if let Some(url) = &overrides.backend_url {
            self.backend_url = url.clone();
        }
        if let Some(dir) = &overrides.pages_dir {
            self.pages_dir = dir.clone();
        }
        if let Some(fixture) = &overrides.fixture {
            self.fixture = Some(fixture.clone());
        }
    }
}

pub fn config_path() -> Option<PathBuf> {
    if let Some(home) = std::env::var_os("HOME") {
        let path = PathBuf::from(home).join(".config").join("fieldsign.toml");
        if path.exists() {
            return Some(path);
        }
    }
    let local = Path::new("settings.toml");
    local.exists().then(|| local.to_path_buf())
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|e| e == "toml")
}

pub fn load_settings(path: &Path) -> Result<AppSettings> {
    let s = std::fs::read_to_string(path)?;
    if is_toml(path) {
        toml::from_str::<AppSettings>(&s)
            .map_err(|e| SignError::Settings(e.to_string()))
            .or_else(|toml_err| serde_json::from_str::<AppSettings>(&s).map_err(|_| toml_err))
    } else {
        serde_json::from_str::<AppSettings>(&s)
            .map_err(SignError::from)
            .or_else(|json_err| toml::from_str::<AppSettings>(&s).map_err(|_| json_err))
    }
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> Result<()> {
    let text = if is_toml(path) {
        toml::to_string_pretty(settings).map_err(|e| SignError::Settings(e.to_string()))?
    } else {
        serde_json::to_string_pretty(settings)?
    };
    std::fs::write(path, text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "mode = \"sign\"\nrecord_id = 42\n").unwrap();
        let settings = load_settings(&path).unwrap();
        assert_eq!(settings.mode, Mode::Sign);
        assert_eq!(settings.record_id, 42);
        assert_eq!(settings.poll_interval_ms, 50);
        assert_eq!(settings.model, "sign.oca.request");
    }

    #[test]
    fn saved_settings_load_back() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings {
            fixture: Some("lease.json".to_string()),
            zoom: 1.5,
            ..Default::default()
        };
        for name in ["settings.toml", "settings.json"] {
            let path = dir.path().join(name);
            save_settings(&path, &settings).unwrap();
            assert_eq!(load_settings(&path).unwrap(), settings);
        }
    }

    #[test]
    fn json_content_in_toml_file_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, r#"{"backend_url": "https://sign.example.com"}"#).unwrap();
        assert_eq!(load_settings(&path).unwrap().backend_url, "https://sign.example.com");
    }

    #[test]
    fn broken_file_is_a_settings_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "zoom = [").unwrap();
        assert!(matches!(load_settings(&path), Err(SignError::Settings(_))));
        assert!(matches!(load_settings(&dir.path().join("missing.toml")), Err(SignError::Io(_))));
    }

    #[test]
    fn overrides_win_over_file() {
        let mut settings = AppSettings::default();
        settings.apply(&Overrides {
            mode: Some(Mode::Sign),
            fixture: Some("doc.json".to_string()),
            ..Default::default()
        });
        assert_eq!(settings.mode, Mode::Sign);
        assert_eq!(settings.fixture.as_deref(), Some("doc.json"));
        assert_eq!(settings.record_id, 1);
    }
}
