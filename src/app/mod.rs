use crate::backend::{Backend, MemoryBackend, RpcBackend};
use crate::error::Result;
use crate::fields::{FieldTypeRegistry, SignaturePad};
use crate::model::ItemId;
use crate::sync::SyncClient;
use crate::viewer::{PageImageViewer, ReadyPoll};
use crate::workflow::Session;
use eframe::egui;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

mod actions;
mod help;
mod palette;
mod render;
pub mod settings;
mod update;

pub use settings::Overrides;

#[derive(Clone, Debug, PartialEq)]
enum ViewerState {
    Waiting,
    Ready { pages: u32 },
    Failed(String),
}

struct PageView {
    texture: egui::TextureHandle,
    size: egui::Vec2,
}

struct PadState {
    item: ItemId,
    pad: SignaturePad,
}

pub struct SignApp {
    session: Option<Session>,
    settings: settings::AppSettings,
    settings_path: PathBuf,
    viewer: PageImageViewer,
    ready_poll: ReadyPoll,
    viewer_state: ViewerState,
    pages: Vec<Option<PageView>>,
    page_rects: Vec<Option<egui::Rect>>,
    zoom: f32,
    menu_filter: palette::PlacementFilter,
    pad: Option<PadState>,
    status: Option<String>,
    fatal: Option<String>,
    show_help: bool,
}

impl SignApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, config: Option<PathBuf>, overrides: Overrides) -> Self {
        let settings_path = config
            .or_else(settings::config_path)
            .unwrap_or_else(|| PathBuf::from("settings.toml"));
        let mut settings = if settings_path.exists() {
            settings::load_settings(&settings_path).unwrap_or_else(|e| {
                warn!(path = %settings_path.display(), error = %e, "settings ignored");
                settings::AppSettings::default()
            })
        } else {
            settings::AppSettings::default()
        };
        settings.apply(&overrides);

        let (session, fatal) = match Self::open_session(&settings) {
            Ok(session) => (Some(session), None),
            Err(e) => {
                warn!(error = %e, "could not start session");
                (None, Some(e.to_string()))
            }
        };
        let viewer = PageImageViewer::open(&settings.pages_dir);
        let page_count = viewer.page_count() as usize;
        let ready_poll = ReadyPoll::new(
            Duration::from_millis(settings.poll_interval_ms),
            settings.poll_max_attempts,
        );

        Self {
            session,
            zoom: settings.zoom.clamp(0.25, 4.0),
            settings,
            settings_path,
            viewer,
            ready_poll,
            viewer_state: ViewerState::Waiting,
            pages: (0..page_count).map(|_| None).collect(),
            page_rects: vec![None; page_count],
            menu_filter: palette::PlacementFilter::default(),
            pad: None,
            status: None,
            fatal,
            show_help: false,
        }
    }

    fn open_session(settings: &settings::AppSettings) -> Result<Session> {
        let record = settings.record_id;
        let backend: Box<dyn Backend> = match &settings.fixture {
            Some(fixture) => Box::new(MemoryBackend::load(record, fixture)?),
            None => Box::new(RpcBackend::new(
                &settings.backend_url,
                &settings.model,
                settings.session_id.clone(),
            )?),
        };
        info!(record, mode = settings.mode.label(), "opening document");
        let sync = SyncClient::spawn(record, backend)?;
        Ok(Session::new(settings.mode, sync, FieldTypeRegistry::with_builtin()))
    }
}
