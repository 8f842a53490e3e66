//! The per-model evaluator: settings plus caller hooks.

use crate::error::Result;
use crate::model::Model;
use crate::overlap::{DefaultOverlap, DefaultOverlapLogger, OverlapHandler, OverlapLogger};
use crate::ray::SegmentId;
use crate::resource::Resource;
use crate::settings::Settings;
use crate::weave;

/// Evaluates rays against a prepped [`Model`].
///
/// Shared read-only between worker threads; all mutable state lives in
/// the [`Resource`] each worker passes in.
pub struct Evaluator<'m> {
    pub(crate) model: &'m Model,
    pub(crate) settings: Settings,
    pub(crate) handler: Box<dyn OverlapHandler>,
    pub(crate) logger: Box<dyn OverlapLogger>,
}

impl<'m> Evaluator<'m> {
    /// Evaluator with default settings and overlap hooks.
    pub fn new(model: &'m Model) -> Self {
        Self {
            model,
            settings: Settings::default(),
            handler: Box::new(DefaultOverlap),
            logger: Box::new(DefaultOverlapLogger::new()),
        }
    }

    /// Evaluator with validated `settings`.
    pub fn with_settings(model: &'m Model, settings: Settings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            ..Self::new(model)
        })
    }

    /// Replace the pairwise overlap policy.
    pub fn overlap_handler(mut self, handler: impl OverlapHandler + 'static) -> Self {
        self.handler = Box::new(handler);
        self
    }

    /// Replace the overlap logger.
    pub fn overlap_logger(mut self, logger: impl OverlapLogger + 'static) -> Self {
        self.logger = Box::new(logger);
        self
    }

    /// The model.
    pub fn model(&self) -> &'m Model {
        self.model
    }

    /// Active settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// A fresh per-worker context sized for this model.
    pub fn resource(&self) -> Resource {
        Resource::new(self.model.solid_count())
    }

    /// Weave segments already stored in `res.state` into its input list.
    pub fn weave(&self, res: &mut Resource, pending: &[SegmentId]) -> Result<()> {
        weave::weave(self.model, &self.settings, &mut res.state, pending)
    }
}

impl std::fmt::Debug for Evaluator<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
