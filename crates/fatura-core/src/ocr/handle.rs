//! Lazily-initialized OCR engine handles and the context that owns them.

use std::fmt;
use std::sync::{Mutex, OnceLock};

use image::GrayImage;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::{ArbitrationMode, EngineKind, OcrConfig};
use crate::error::OcrError;

use super::{create_engine, TextRecognizer};

type EngineInit = Box<dyn Fn() -> Result<Box<dyn TextRecognizer>, OcrError> + Send + Sync>;
type EngineSlot = Result<Mutex<Box<dyn TextRecognizer>>, String>;

/// Initialization state of one OCR engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum EngineState {
    /// Nobody has needed the engine yet.
    Uninitialized,
    /// The engine loaded and accepts images.
    Ready,
    /// Loading failed; the reason is kept for the lifetime of the handle.
    Failed { reason: String },
}

/// Health entry for one engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OcrStatus {
    pub engine: String,
    #[serde(flatten)]
    pub state: EngineState,
}

/// Aggregated OCR health, as reported to liveness checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    /// At least one engine is ready.
    pub ocr_available: bool,
    pub engines: Vec<OcrStatus>,
}

/// A single OCR engine, created on first use and cached forever.
///
/// Initialization runs at most once even under concurrent first use. A
/// failed initialization is never retried; `recognize` then returns empty
/// text. Calls into the engine are serialized.
pub struct OcrReaderHandle {
    name: String,
    init: EngineInit,
    slot: OnceLock<EngineSlot>,
}

impl OcrReaderHandle {
    /// Create a handle that runs `init` the first time the engine is needed.
    pub fn new<F>(name: impl Into<String>, init: F) -> Self
    where
        F: Fn() -> Result<Box<dyn TextRecognizer>, OcrError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            init: Box::new(init),
            slot: OnceLock::new(),
        }
    }

    /// Engine name used in logs and status reports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load the engine if no attempt has been made yet. Returns whether it is usable.
    pub fn initialize(&self) -> bool {
        let slot = self.slot.get_or_init(|| {
            info!("Initializing OCR engine '{}'", self.name);
            match (self.init)() {
                Ok(engine) => {
                    info!("OCR engine '{}' loaded", self.name);
                    Ok(Mutex::new(engine))
                }
                Err(e) => {
                    error!("Failed to initialize OCR engine '{}': {}", self.name, e);
                    Err(e.to_string())
                }
            }
        });
        slot.is_ok()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.slot.get(), Some(Ok(_)))
    }

    /// The retained initialization failure, if any.
    pub fn failure(&self) -> Option<&str> {
        match self.slot.get() {
            Some(Err(reason)) => Some(reason.as_str()),
            _ => None,
        }
    }

    pub fn status(&self) -> OcrStatus {
        let state = match self.slot.get() {
            None => EngineState::Uninitialized,
            Some(Ok(_)) => EngineState::Ready,
            Some(Err(reason)) => EngineState::Failed {
                reason: reason.clone(),
            },
        };
        OcrStatus {
            engine: self.name.clone(),
            state,
        }
    }

    /// Run the engine on a preprocessed page. Never fails: an unavailable or
    /// erroring engine yields empty text.
    pub fn recognize(&self, image: &GrayImage) -> String {
        let engine = match self.slot.get() {
            Some(Ok(engine)) => engine,
            Some(Err(_)) => {
                debug!("OCR engine '{}' unavailable, skipping", self.name);
                return String::new();
            }
            None => {
                warn!("OCR engine '{}' used before initialization, skipping", self.name);
                return String::new();
            }
        };

        let engine = engine.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        match engine.recognize(image) {
            Ok(text) => text.trim().to_string(),
            Err(e) => {
                error!("OCR engine '{}' failed: {}", self.name, e);
                String::new()
            }
        }
    }
}

impl fmt::Debug for OcrReaderHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OcrReaderHandle")
            .field("name", &self.name)
            .field("state", &self.status().state)
            .finish()
    }
}

/// Owns the OCR engines shared by every extraction in the process.
///
/// Build one per process and share it (`Arc`) between pipelines; tests
/// build their own with fake engines.
#[derive(Debug)]
pub struct OcrContext {
    primary: OcrReaderHandle,
    secondary: Option<OcrReaderHandle>,
}

impl OcrContext {
    pub fn new(primary: OcrReaderHandle, secondary: Option<OcrReaderHandle>) -> Self {
        Self { primary, secondary }
    }

    /// Create lazy handles for the engines named in the configuration.
    pub fn from_config(config: &OcrConfig) -> Self {
        let handle = |kind: EngineKind| {
            let config = config.clone();
            OcrReaderHandle::new(kind.to_string(), move || create_engine(kind, &config))
        };

        let secondary = config
            .secondary
            .filter(|kind| *kind != config.primary)
            .map(handle);
        Self::new(handle(config.primary), secondary)
    }

    pub fn primary(&self) -> &OcrReaderHandle {
        &self.primary
    }

    pub fn secondary(&self) -> Option<&OcrReaderHandle> {
        self.secondary.as_ref()
    }

    /// Initialize the engines `mode` needs. Returns whether any is usable.
    pub fn initialize(&self, mode: ArbitrationMode) -> bool {
        let primary = self.primary.initialize();
        let secondary = match (&self.secondary, mode) {
            (Some(handle), ArbitrationMode::Longest | ArbitrationMode::Fallback) => {
                handle.initialize()
            }
            _ => false,
        };
        primary || secondary
    }

    /// Recognize one page, choosing between engines according to `mode`.
    pub fn recognize(&self, image: &GrayImage, mode: ArbitrationMode) -> String {
        let secondary = match (&self.secondary, mode) {
            (Some(handle), ArbitrationMode::Longest | ArbitrationMode::Fallback) => handle,
            _ => return self.primary.recognize(image),
        };

        let first = self.primary.recognize(image);
        match mode {
            ArbitrationMode::Fallback if !first.is_empty() => first,
            ArbitrationMode::Fallback => secondary.recognize(image),
            _ => {
                let second = secondary.recognize(image);
                let (first_len, second_len) = (first.chars().count(), second.chars().count());
                debug!(
                    "Arbitration: {}={} chars, {}={} chars",
                    self.primary.name(),
                    first_len,
                    secondary.name(),
                    second_len
                );
                if second_len > first_len { second } else { first }
            }
        }
    }

    pub fn status(&self) -> Vec<OcrStatus> {
        std::iter::once(&self.primary)
            .chain(self.secondary.iter())
            .map(OcrReaderHandle::status)
            .collect()
    }

    /// Retained initialization failures as `engine: reason` lines.
    pub fn failures(&self) -> Vec<String> {
        std::iter::once(&self.primary)
            .chain(self.secondary.iter())
            .filter_map(|h| h.failure().map(|reason| format!("{}: {}", h.name(), reason)))
            .collect()
    }

    pub fn health(&self) -> HealthReport {
        HealthReport {
            ocr_available: self.primary.is_ready()
                || self.secondary.as_ref().is_some_and(OcrReaderHandle::is_ready),
            engines: self.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct FixedEngine {
        text: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl TextRecognizer for FixedEngine {
        fn name(&self) -> &str {
            "fixed"
        }

        fn recognize(&self, _image: &GrayImage) -> Result<String, OcrError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.text.to_string())
        }
    }

    struct BrokenEngine;

    impl TextRecognizer for BrokenEngine {
        fn name(&self) -> &str {
            "broken"
        }

        fn recognize(&self, _image: &GrayImage) -> Result<String, OcrError> {
            Err(OcrError::Recognition("model exploded".to_string()))
        }
    }

    fn fixed(name: &str, text: &'static str, calls: Arc<AtomicUsize>) -> OcrReaderHandle {
        OcrReaderHandle::new(name, move || {
            Ok(Box::new(FixedEngine {
                text,
                calls: calls.clone(),
            }) as Box<dyn TextRecognizer>)
        })
    }

    fn page() -> GrayImage {
        GrayImage::new(4, 4)
    }

    #[test]
    fn test_concurrent_first_use_initializes_once() {
        let inits = Arc::new(AtomicUsize::new(0));
        let counter = inits.clone();
        let handle = OcrReaderHandle::new("counting", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(std::time::Duration::from_millis(20));
            Ok(Box::new(FixedEngine {
                text: "ok",
                calls: Arc::new(AtomicUsize::new(0)),
            }) as Box<dyn TextRecognizer>)
        });

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| assert!(handle.initialize()));
            }
        });

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert!(handle.is_ready());
    }

    #[test]
    fn test_failed_initialization_is_never_retried() {
        let inits = Arc::new(AtomicUsize::new(0));
        let counter = inits.clone();
        let handle = OcrReaderHandle::new("missing", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(OcrError::ModelLoad("weights not found".to_string()))
        });

        assert!(!handle.initialize());
        assert!(!handle.initialize());
        assert_eq!(handle.recognize(&page()), "");
        assert_eq!(handle.recognize(&page()), "");

        assert_eq!(inits.load(Ordering::SeqCst), 1);
        assert_eq!(
            handle.failure(),
            Some("failed to load engine: weights not found")
        );
        assert_eq!(
            handle.status().state,
            EngineState::Failed {
                reason: "failed to load engine: weights not found".to_string()
            }
        );
    }

    #[test]
    fn test_recognize_before_initialize_is_empty() {
        let calls = Arc::new(AtomicUsize::new(0));
        let handle = fixed("lazy", "text", calls.clone());
        assert_eq!(handle.recognize(&page()), "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(handle.status().state, EngineState::Uninitialized);
    }

    #[test]
    fn test_engine_error_becomes_empty_text() {
        let handle = OcrReaderHandle::new("broken", || {
            Ok(Box::new(BrokenEngine) as Box<dyn TextRecognizer>)
        });
        assert!(handle.initialize());
        assert_eq!(handle.recognize(&page()), "");
    }

    #[test]
    fn test_longest_output_wins() {
        let ctx = OcrContext::new(
            fixed("a", "short", Arc::new(AtomicUsize::new(0))),
            Some(fixed("b", "much longer text", Arc::new(AtomicUsize::new(0)))),
        );
        assert!(ctx.initialize(ArbitrationMode::Longest));
        assert_eq!(ctx.recognize(&page(), ArbitrationMode::Longest), "much longer text");
    }

    #[test]
    fn test_longest_tie_favours_primary() {
        let ctx = OcrContext::new(
            fixed("a", "abcd", Arc::new(AtomicUsize::new(0))),
            Some(fixed("b", "wxyz", Arc::new(AtomicUsize::new(0)))),
        );
        ctx.initialize(ArbitrationMode::Longest);
        assert_eq!(ctx.recognize(&page(), ArbitrationMode::Longest), "abcd");
    }

    #[test]
    fn test_fallback_skips_secondary_when_primary_has_text() {
        let secondary_calls = Arc::new(AtomicUsize::new(0));
        let ctx = OcrContext::new(
            fixed("a", "primary text", Arc::new(AtomicUsize::new(0))),
            Some(fixed("b", "secondary text that is longer", secondary_calls.clone())),
        );
        ctx.initialize(ArbitrationMode::Fallback);
        assert_eq!(ctx.recognize(&page(), ArbitrationMode::Fallback), "primary text");
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_fallback_uses_secondary_when_primary_empty() {
        let ctx = OcrContext::new(
            fixed("a", "   ", Arc::new(AtomicUsize::new(0))),
            Some(fixed("b", "secondary", Arc::new(AtomicUsize::new(0)))),
        );
        ctx.initialize(ArbitrationMode::Fallback);
        assert_eq!(ctx.recognize(&page(), ArbitrationMode::Fallback), "secondary");
    }

    #[test]
    fn test_single_mode_leaves_secondary_uninitialized() {
        let ctx = OcrContext::new(
            fixed("a", "primary", Arc::new(AtomicUsize::new(0))),
            Some(fixed("b", "secondary", Arc::new(AtomicUsize::new(0)))),
        );
        assert!(ctx.initialize(ArbitrationMode::Single));
        assert_eq!(ctx.recognize(&page(), ArbitrationMode::Single), "primary");
        assert_eq!(ctx.status()[1].state, EngineState::Uninitialized);
    }

    #[test]
    fn test_health_reports_failures() {
        let ctx = OcrContext::new(
            OcrReaderHandle::new("onnx", || Err(OcrError::ModelLoad("no det.onnx".to_string()))),
            Some(fixed("tesseract", "ok", Arc::new(AtomicUsize::new(0)))),
        );
        assert!(ctx.initialize(ArbitrationMode::Longest));

        let health = ctx.health();
        assert!(health.ocr_available);
        assert_eq!(health.engines.len(), 2);
        assert_eq!(ctx.failures(), vec!["onnx: failed to load engine: no det.onnx".to_string()]);

        let json = serde_json::to_value(&health).unwrap();
        assert_eq!(json["engines"][0]["state"], "failed");
        assert_eq!(json["engines"][1]["state"], "ready");
    }

    #[test]
    fn test_from_config_drops_duplicate_secondary() {
        let mut config = OcrConfig::default();
        config.secondary = Some(config.primary);
        let ctx = OcrContext::from_config(&config);
        assert!(ctx.secondary().is_none());
        assert_eq!(ctx.primary().name(), "onnx");
    }
}
