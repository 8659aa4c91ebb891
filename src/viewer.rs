//! Page viewer readiness.
//!
//! Overlays attach only once every page reports a ready text layer. The wait is
//! bounded: a viewer error or too many attempts ends it.

use crate::error::{Result, SignError};
use crossbeam_channel::Receiver;
use eframe::egui;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ViewerProbe {
    pub pages: u32,
    pub text_layers: u32,
    pub error: Option<String>,
}

pub trait DocumentViewer {
    fn probe(&mut self) -> ViewerProbe;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    Pending,
    Ready { pages: u32 },
}

#[derive(Clone, Debug)]
pub struct ReadyPoll {
    interval: Duration,
    max_attempts: u32,
    attempts: u32,
    next_at: Option<Instant>,
}

impl Default for ReadyPoll {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL, Self::DEFAULT_MAX_ATTEMPTS)
    }
}

impl ReadyPoll {
    pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(50);
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 200;

    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
            attempts: 0,
            next_at: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Time left until the next probe is due.
    pub fn wait(&self, now: Instant) -> Duration {
        self.next_at
            .map_or(Duration::ZERO, |at| at.saturating_duration_since(now))
    }

    /// Probes the viewer if an attempt is due. Errors end the wait for good.
    pub fn poll(&mut self, viewer: &mut dyn DocumentViewer, now: Instant) -> Result<Readiness> {
        if self.next_at.is_some_and(|at| now < at) {
            return Ok(Readiness::Pending);
        }
        self.attempts += 1;
        let probe = viewer.probe();
        if let Some(error) = probe.error {
            warn!(%error, "document viewer reported an error");
            return Err(SignError::DocumentInvalid(error));
        }
        if probe.pages > 0 && probe.pages == probe.text_layers {
            info!(pages = probe.pages, attempts = self.attempts, "document ready");
            return Ok(Readiness::Ready { pages: probe.pages });
        }
        if self.attempts >= self.max_attempts {
            warn!(attempts = self.attempts, "document viewer timed out");
            return Err(SignError::ViewerTimeout {
                attempts: self.attempts,
            });
        }
        self.next_at = Some(now + self.interval);
        Ok(Readiness::Pending)
    }
}

pub struct DecodedPage {
    pub index: usize,
    pub name: String,
    pub image: egui::ColorImage,
}

/// Viewer over pre-rendered page images, decoded off the UI thread.
pub struct PageImageViewer {
    pages: u32,
    uploaded: u32,
    error: Option<String>,
    decoded: Option<Receiver<Result<DecodedPage>>>,
}

impl PageImageViewer {
    pub fn open(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        let files = match page_files(dir) {
            Ok(files) if files.is_empty() => {
                return Self::failed(format!("no page images in {}", dir.display()));
            }
            Ok(files) => files,
            Err(e) => return Self::failed(format!("{}: {e}", dir.display())),
        };
        let pages = files.len() as u32;
        info!(pages, dir = %dir.display(), "decoding page images");
        let (tx, rx) = crossbeam_channel::unbounded();
        let spawned = std::thread::Builder::new()
            .name("page-decoder".to_string())
            .spawn(move || {
                for (index, path) in files.into_iter().enumerate() {
                    if tx.send(decode_page(index, &path)).is_err() {
                        break;
                    }
                }
            });
        match spawned {
            Ok(_) => Self {
                pages,
                uploaded: 0,
                error: None,
                decoded: Some(rx),
            },
            Err(e) => Self::failed(e.to_string()),
        }
    }

    fn failed(error: String) -> Self {
        Self {
            pages: 0,
            uploaded: 0,
            error: Some(error),
            decoded: None,
        }
    }

    pub fn page_count(&self) -> u32 {
        self.pages
    }

    /// Pages decoded since the last call. A decode failure marks the document invalid.
    pub fn take_decoded(&mut self) -> Vec<DecodedPage> {
        let Some(rx) = &self.decoded else {
            return Vec::new();
        };
        let mut pages = Vec::new();
        for result in rx.try_iter() {
            match result {
                Ok(page) => pages.push(page),
                Err(e) => {
                    warn!(error = %e, "page image failed to decode");
                    self.error.get_or_insert_with(|| e.to_string());
                }
            }
        }
        pages
    }

    /// Records that a decoded page is on screen.
    pub fn mark_uploaded(&mut self) {
        self.uploaded = (self.uploaded + 1).min(self.pages);
    }
}

impl DocumentViewer for PageImageViewer {
    fn probe(&mut self) -> ViewerProbe {
        ViewerProbe {
            pages: self.pages,
            text_layers: self.uploaded,
            error: self.error.clone(),
        }
    }
}

/// Page images in a directory, sorted by file name.
pub fn page_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| ["png", "jpg", "jpeg"].contains(&e.to_lowercase().as_str()))
        })
        .collect();
    files.sort();
    Ok(files)
}

fn decode_page(index: usize, path: &Path) -> Result<DecodedPage> {
    let image = image::open(path)?.to_rgba8();
    let size = [image.width() as usize, image.height() as usize];
    debug!(index, path = %path.display(), "page decoded");
    Ok(DecodedPage {
        index,
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        image: egui::ColorImage::from_rgba_unmultiplied(size, image.as_raw()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    struct ScriptedViewer {
        probes: VecDeque<ViewerProbe>,
        calls: u32,
    }

    impl ScriptedViewer {
        fn new(probes: impl IntoIterator<Item = ViewerProbe>) -> Self {
            Self {
                probes: probes.into_iter().collect(),
                calls: 0,
            }
        }
    }

    impl DocumentViewer for ScriptedViewer {
        fn probe(&mut self) -> ViewerProbe {
            self.calls += 1;
            self.probes.pop_front().unwrap_or_default()
        }
    }

    fn probe(pages: u32, text_layers: u32) -> ViewerProbe {
        ViewerProbe {
            pages,
            text_layers,
            error: None,
        }
    }

    #[test]
    fn ready_once_every_page_has_a_text_layer() {
        let mut viewer = ScriptedViewer::new([probe(0, 0), probe(3, 1), probe(3, 3)]);
        let mut poll = ReadyPoll::new(Duration::from_millis(50), 10);
        let start = Instant::now();
        assert_eq!(poll.poll(&mut viewer, start).unwrap(), Readiness::Pending);
        // not due yet
        assert_eq!(poll.poll(&mut viewer, start).unwrap(), Readiness::Pending);
        assert_eq!(viewer.calls, 1);
        let later = start + Duration::from_millis(50);
        assert_eq!(poll.poll(&mut viewer, later).unwrap(), Readiness::Pending);
        let ready = poll.poll(&mut viewer, later + Duration::from_millis(50)).unwrap();
        assert_eq!(ready, Readiness::Ready { pages: 3 });
        assert_eq!(poll.attempts(), 3);
    }

    #[test]
    fn viewer_error_is_document_invalid() {
        let broken = ViewerProbe {
            error: Some("corrupt file".into()),
            ..probe(2, 0)
        };
        let mut viewer = ScriptedViewer::new([probe(2, 0), broken]);
        let mut poll = ReadyPoll::new(Duration::ZERO, 10);
        let now = Instant::now();
        poll.poll(&mut viewer, now).unwrap();
        let err = poll.poll(&mut viewer, now).unwrap_err();
        assert!(matches!(err, SignError::DocumentInvalid(m) if m == "corrupt file"));
    }

    #[test]
    fn gives_up_after_max_attempts() {
        let mut viewer = ScriptedViewer::new([]);
        let mut poll = ReadyPoll::new(Duration::ZERO, 3);
        let now = Instant::now();
        assert!(poll.poll(&mut viewer, now).is_ok());
        assert!(poll.poll(&mut viewer, now).is_ok());
        let err = poll.poll(&mut viewer, now).unwrap_err();
        assert!(matches!(err, SignError::ViewerTimeout { attempts: 3 }));
    }

    #[test]
    fn image_viewer_decodes_pages_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        image::RgbaImage::new(4, 6).save(dir.path().join("page-2.png")).unwrap();
        image::RgbaImage::new(3, 5).save(dir.path().join("page-1.png")).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a page").unwrap();

        let mut viewer = PageImageViewer::open(dir.path());
        assert_eq!(viewer.page_count(), 2);
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut pages = Vec::new();
        while pages.len() < 2 && Instant::now() < deadline {
            pages.extend(viewer.take_decoded());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(pages[0].name, "page-1.png");
        assert_eq!(pages[0].image.size, [3, 5]);
        assert_eq!(pages[1].index, 1);

        assert_eq!(viewer.probe().text_layers, 0);
        viewer.mark_uploaded();
        viewer.mark_uploaded();
        viewer.mark_uploaded();
        let probe = viewer.probe();
        assert_eq!((probe.pages, probe.text_layers), (2, 2));
    }

    #[test]
    fn empty_directory_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut viewer = PageImageViewer::open(dir.path());
        let mut poll = ReadyPoll::default();
        assert!(matches!(
            poll.poll(&mut viewer, Instant::now()),
            Err(SignError::DocumentInvalid(_))
        ));
    }
}
