use crate::error::Result;
use crate::viewer::{PageImageViewer, ReadyPoll};
use crate::workflow::Session;
use std::time::Duration;
use tracing::{info, warn};

use super::{SignApp, ViewerState, settings};

impl SignApp {
    pub(super) fn open_pages_dialog(&mut self) {
        if let Some(dir) = rfd::FileDialog::new()
            .set_title("Folder of page images")
            .pick_folder()
        {
            self.settings.pages_dir = dir.display().to_string();
            self.reload_pages();
            self.status = Some(format!("Opened pages from {}", dir.display()));
        }
    }

    pub(super) fn open_fixture_dialog(&mut self) {
        if let Some(path) = rfd::FileDialog::new()
            .add_filter("JSON", &["json"])
            .pick_file()
        {
            let previous = self.settings.fixture.replace(path.display().to_string());
            match replace_session(&mut self.session, Self::open_session(&self.settings)) {
                Ok(()) => {
                    self.pad = None;
                    self.fatal = None;
                    self.status = Some(format!("Opened {}", path.display()));
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "fixture not opened");
                    self.settings.fixture = previous;
                    self.status = Some(format!("Could not open {}: {e}", path.display()));
                }
            }
            if let ViewerState::Ready { pages } = self.viewer_state
                && let Some(session) = &mut self.session
            {
                session.set_page_count(pages);
            }
        }
    }

    fn reload_pages(&mut self) {
        info!(dir = %self.settings.pages_dir, "reloading page images");
        self.viewer = PageImageViewer::open(&self.settings.pages_dir);
        let count = self.viewer.page_count() as usize;
        self.pages = (0..count).map(|_| None).collect();
        self.page_rects = vec![None; count];
        self.viewer_state = ViewerState::Waiting;
        self.ready_poll = ReadyPoll::new(
            Duration::from_millis(self.settings.poll_interval_ms),
            self.settings.poll_max_attempts,
        );
    }

    pub(super) fn persist_settings(&mut self) {
        self.settings.zoom = self.zoom;
        match settings::save_settings(&self.settings_path, &self.settings) {
            Ok(()) => self.status = Some(format!("Settings saved to {}", self.settings_path.display())),
            Err(e) => self.status = Some(format!("Could not save settings: {e}")),
        }
    }

    pub(super) fn close(&mut self) {
        if let Some(session) = &mut self.session
            && !session.is_closed()
        {
            info!("closing document view");
            session.close();
        }
        self.pad = None;
    }
}

/// Swaps in a newly opened session. The current one stays open if opening failed.
fn replace_session(current: &mut Option<Session>, opened: Result<Session>) -> Result<()> {
    let session = opened?;
    if let Some(mut old) = current.replace(session) {
        old.close();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::backend::memory::tests::sample_info;
    use crate::error::SignError;
    use crate::fields::FieldTypeRegistry;
    use crate::sync::SyncClient;
    use crate::workflow::Mode;

    fn session(mode: Mode) -> Session {
        let sync = SyncClient::inline(1, Box::new(MemoryBackend::new(1, sample_info())));
        Session::new(mode, sync, FieldTypeRegistry::with_builtin())
    }

    #[test]
    fn failed_open_keeps_current_session_live() {
        let mut current = Some(session(Mode::Configure));
        let opened = Err(SignError::DocumentInvalid("bad fixture".into()));
        assert!(replace_session(&mut current, opened).is_err());
        let kept = current.as_ref().unwrap();
        assert!(!kept.is_closed());
        assert_eq!(kept.mode(), Mode::Configure);
    }

    #[test]
    fn successful_open_replaces_session() {
        let mut current = Some(session(Mode::Configure));
        replace_session(&mut current, Ok(session(Mode::Sign))).unwrap();
        let next = current.as_ref().unwrap();
        assert_eq!(next.mode(), Mode::Sign);
        assert!(!next.is_closed());
    }
}
