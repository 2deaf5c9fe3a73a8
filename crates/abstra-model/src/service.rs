//! Generation service: owns the model session and its lifecycle.
//!
//! The lifecycle contract is `load` → any number of `generate` calls →
//! `unload`, re-entered as often as the caller likes. Generation never
//! propagates failures: a failed call is logged and yields an empty string
//! so a long batch keeps going.

use crate::{ModelBackend, ModelError, ModelInfo, ModelSession, SamplingParams};
use tracing::{debug, error, info, trace};

pub const DEFAULT_MAX_LENGTH: usize = 3000;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_REPETITION_PENALTY: f32 = 1.2;

/// Decoding defaults applied to every `generate` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub max_length: usize,
    pub temperature: f32,
    pub repetition_penalty: f32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_length: DEFAULT_MAX_LENGTH,
            temperature: DEFAULT_TEMPERATURE,
            repetition_penalty: DEFAULT_REPETITION_PENALTY,
        }
    }
}

/// Lifecycle counters, mostly for the run log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub loads: usize,
    pub unloads: usize,
    pub generations: usize,
    pub generation_failures: usize,
    pub reclaims: usize,
}

pub struct GenerationService {
    backend: Box<dyn ModelBackend>,
    session: Option<Box<dyn ModelSession>>,
    settings: GenerationSettings,
    stats: SessionStats,
}

impl GenerationService {
    pub fn new(backend: Box<dyn ModelBackend>, settings: GenerationSettings) -> Self {
        Self {
            backend,
            session: None,
            settings,
            stats: SessionStats::default(),
        }
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_loaded(&self) -> bool {
        self.session.is_some()
    }

    pub fn model_info(&self) -> Option<ModelInfo> {
        self.session.as_ref().map(|s| s.info())
    }

    /// Acquire a model session. Errors are fatal for the caller's run and
    /// are returned as-is.
    pub fn load(&mut self) -> Result<(), ModelError> {
        if self.session.is_some() {
            debug!("load called with a live session; replacing it");
            self.unload();
        }
        info!("Loading model via {} backend", self.backend.name());
        let session = self.backend.load()?;
        let info = session.info();
        info!(
            "Model loaded successfully: {} ({}, device={})",
            info.name, info.precision, info.device
        );
        self.session = Some(session);
        self.stats.loads += 1;
        Ok(())
    }

    /// Drop the session. A no-op when nothing is loaded.
    pub fn unload(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.reclaim();
            drop(session);
            self.stats.unloads += 1;
            info!("Model unloaded");
        }
        self.reclaim_memory();
    }

    pub fn reload(&mut self) -> Result<(), ModelError> {
        info!("Reloading model...");
        self.unload();
        self.load()?;
        self.reclaim_memory();
        Ok(())
    }

    /// Generate a reply to `prompt`; `None` uses the configured length cap.
    pub fn generate(&mut self, prompt: &str, max_length: Option<usize>) -> String {
        let params = SamplingParams {
            max_length: max_length.unwrap_or(self.settings.max_length),
            temperature: self.settings.temperature,
            repetition_penalty: self.settings.repetition_penalty,
        };
        self.stats.generations += 1;

        let result = match self.session.as_deref_mut() {
            Some(session) => session.chat(prompt, &params),
            None => Err(ModelError::NotLoaded),
        };
        let text = match result {
            Ok(text) => text,
            Err(e) => {
                error!("Error generating response: {e}");
                self.stats.generation_failures += 1;
                String::new()
            }
        };
        self.reclaim_memory();
        text
    }

    /// Scoring access for attribution.
    pub fn session_mut(&mut self) -> Result<&mut (dyn ModelSession + 'static), ModelError> {
        self.session.as_deref_mut().ok_or(ModelError::NotLoaded)
    }

    /// Idempotent housekeeping; cheap enough to call after every step.
    pub fn reclaim_memory(&mut self) {
        if let Some(session) = self.session.as_deref_mut() {
            session.reclaim();
        }
        self.stats.reclaims += 1;
        trace!("memory reclamation pass #{}", self.stats.reclaims);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Device, Precision};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct EchoSession {
        fail: bool,
        reclaimed: Arc<AtomicUsize>,
    }

    impl ModelSession for EchoSession {
        fn chat(&mut self, prompt: &str, params: &SamplingParams) -> Result<String, ModelError> {
            if self.fail {
                return Err(ModelError::Api("boom".to_string()));
            }
            Ok(format!("{}|{}", prompt, params.max_length))
        }

        fn log_likelihood(&mut self, _context: &str, _target: &str) -> Result<f64, ModelError> {
            Ok(-1.0)
        }

        fn reclaim(&mut self) {
            self.reclaimed.fetch_add(1, Ordering::SeqCst);
        }

        fn info(&self) -> ModelInfo {
            ModelInfo {
                name: "echo".to_string(),
                backend: "echo".to_string(),
                precision: Precision::Float32,
                device: Device::Cpu,
            }
        }
    }

    struct EchoBackend {
        fail_load: bool,
        fail_chat: bool,
        reclaimed: Arc<AtomicUsize>,
    }

    impl ModelBackend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        fn load(&self) -> Result<Box<dyn ModelSession>, ModelError> {
            if self.fail_load {
                return Err(ModelError::Load {
                    model: "echo".to_string(),
                    reason: "weights unavailable".to_string(),
                });
            }
            Ok(Box::new(EchoSession {
                fail: self.fail_chat,
                reclaimed: self.reclaimed.clone(),
            }))
        }
    }

    fn service(fail_load: bool, fail_chat: bool) -> (GenerationService, Arc<AtomicUsize>) {
        let reclaimed = Arc::new(AtomicUsize::new(0));
        let backend = EchoBackend {
            fail_load,
            fail_chat,
            reclaimed: reclaimed.clone(),
        };
        (
            GenerationService::new(Box::new(backend), GenerationSettings::default()),
            reclaimed,
        )
    }

    #[test]
    fn test_generate_uses_default_and_override_length() {
        let (mut svc, _) = service(false, false);
        svc.load().unwrap();
        assert_eq!(svc.generate("p", None), format!("p|{DEFAULT_MAX_LENGTH}"));
        assert_eq!(svc.generate("p", Some(16)), "p|16");
        assert_eq!(svc.stats().generations, 2);
    }

    #[test]
    fn test_generate_failure_returns_empty() {
        let (mut svc, _) = service(false, true);
        svc.load().unwrap();
        assert_eq!(svc.generate("p", None), "");
        assert_eq!(svc.stats().generation_failures, 1);
    }

    #[test]
    fn test_generate_without_session_returns_empty() {
        let (mut svc, _) = service(false, false);
        assert!(!svc.is_loaded());
        assert_eq!(svc.generate("p", None), "");
        assert!(matches!(svc.session_mut(), Err(ModelError::NotLoaded)));
    }

    #[test]
    fn test_load_failure_propagates() {
        let (mut svc, _) = service(true, false);
        let err = svc.load().unwrap_err();
        assert!(matches!(err, ModelError::Load { .. }));
        assert!(!svc.is_loaded());
    }

    #[test]
    fn test_unload_then_load_again() {
        let (mut svc, reclaimed) = service(false, false);
        svc.load().unwrap();
        svc.unload();
        assert!(!svc.is_loaded());
        svc.unload();
        svc.load().unwrap();
        svc.reload().unwrap();

        let stats = svc.stats();
        assert_eq!(stats.loads, 3);
        assert_eq!(stats.unloads, 2);
        assert!(reclaimed.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn test_generation_triggers_reclaim() {
        let (mut svc, reclaimed) = service(false, false);
        svc.load().unwrap();
        let before = reclaimed.load(Ordering::SeqCst);
        svc.generate("p", None);
        assert_eq!(reclaimed.load(Ordering::SeqCst), before + 1);
    }
}
