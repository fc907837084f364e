//! Mock extractors for testing.
//!
//! [`MockExtractor`] derives a deterministic vector from the item identifier
//! and never touches the filesystem. Individual identifiers can be scripted
//! to fail or to panic, which is how the pipeline's isolation guarantees are
//! exercised. [`MockFactory`] counts how many extractions were dispatched.

use sonara_core::{Error, FeatureVector, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::extractor::{ExtractorFactory, FeatureExtractor, WorkItem};

/// Deterministic extractor driven by item identifiers.
#[derive(Debug, Clone, Default)]
pub struct MockExtractor {
    dimension: usize,
    fail: HashSet<String>,
    panic: HashSet<String>,
    calls: Arc<AtomicUsize>,
}

impl MockExtractor {
    /// Create a mock producing vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
            ..Self::default()
        }
    }

    /// Deterministic vector for an identifier.
    pub fn vector_for(id: &str, dimension: usize) -> Vec<f32> {
        let bytes = id.as_bytes();
        (0..dimension.max(1))
            .map(|i| {
                let byte = if bytes.is_empty() {
                    0u8
                } else {
                    bytes[i % bytes.len()]
                };
                ((f32::from(byte) + i as f32) % 256.0) / 256.0
            })
            .collect()
    }
}

impl FeatureExtractor for MockExtractor {
    #[allow(clippy::panic)]
    fn extract(&mut self, item: &WorkItem) -> Result<FeatureVector> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.panic.contains(&item.id) {
            panic!("mock extractor crashed on '{}'", item.id);
        }
        if self.fail.contains(&item.id) {
            return Err(Error::extraction(item.row, format!("scripted failure for '{}'", item.id)));
        }
        FeatureVector::new(Self::vector_for(&item.id, self.dimension))
    }

    fn dimension(&self) -> Option<usize> {
        Some(self.dimension)
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Factory handing out [`MockExtractor`]s that share one call counter.
#[derive(Debug, Clone)]
pub struct MockFactory {
    template: MockExtractor,
    created: Arc<AtomicUsize>,
    model: String,
}

impl MockFactory {
    /// Create a factory for vectors of `dimension` components.
    pub fn new(dimension: usize) -> Self {
        Self {
            template: MockExtractor::new(dimension),
            created: Arc::new(AtomicUsize::new(0)),
            model: "mock".to_string(),
        }
    }

    /// Make extraction of `id` fail with a per-item error.
    pub fn failing(mut self, id: impl Into<String>) -> Self {
        self.template.fail.insert(id.into());
        self
    }

    /// Make extraction of `id` panic.
    pub fn panicking(mut self, id: impl Into<String>) -> Self {
        self.template.panic.insert(id.into());
        self
    }

    /// Override the model half of the identity.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Total `extract` calls across all extractors from this factory.
    pub fn calls(&self) -> usize {
        self.template.calls.load(Ordering::SeqCst)
    }

    /// Number of extractors built.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl ExtractorFactory for MockFactory {
    fn create(&self) -> Result<Box<dyn FeatureExtractor>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.template.clone()))
    }

    fn method(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }
}
