//! Capability interfaces for externally supplied grading logic, and the
//! registry the flow engine pulls instances from.
//!
//! The server core never implements grading itself: Generate, Calculate and
//! the three Check phases are traits, registered as factories. A factory is
//! either a shared singleton or a constructor closure producing a fresh
//! instance per call; dynamically loaded suppliers (scripting engines and
//! the like) are external implementations of the same traits behind a
//! constructor closure. A missing factory is not an error - the flow engine
//! degrades to diagnostic placeholder responses.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::methods::calculate::CalculatingResult;
use crate::methods::check::{CheckingResult, Condition};
use crate::methods::generate::GeneratingResult;

/// Error type processors report; downgraded by the flow engine, never
/// propagated to the wire.
pub type ProcessorError = Box<dyn std::error::Error + Send + Sync>;

/// Opaque state allocated by PreCheck, threaded read-only through every
/// per-unit check and into PostCheck. Owned by one in-flight Check
/// invocation; never shared across connections.
pub type PreCheckValue = Arc<dyn Any + Send + Sync>;

/// Cooperative cancellation flag handed to per-unit check workers.
///
/// The engine sets it when a unit's deadline expires and then proceeds
/// without waiting; a worker that never polls the token keeps running
/// detached until it finishes on its own.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> CancelToken {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Raw outcome of checking one condition, before score validation.
#[derive(Debug, Clone)]
pub struct UnitOutcome {
    /// Score in [0;1]; anything else is forced to zero by the engine.
    pub score: f64,
    pub comment: String,
}

impl UnitOutcome {
    pub fn new(score: f64, comment: impl Into<String>) -> UnitOutcome {
        UnitOutcome {
            score,
            comment: comment.into(),
        }
    }
}

/// Generate method logic.
pub trait GenerateProcessor: Send + Sync {
    fn generate(&self, condition: &str) -> GeneratingResult;
}

/// Calculate method logic.
pub trait CalculateProcessor: Send + Sync {
    fn calculate(
        &self,
        condition: &str,
        instructions: &str,
        pre_generated: Option<&GeneratingResult>,
    ) -> CalculatingResult;
}

/// Per-unit Check logic, called once per condition on a worker thread.
pub trait CheckProcessor: Send + Sync {
    fn check_unit(
        &self,
        condition: &Condition,
        instructions: &str,
        pre_generated: Option<&GeneratingResult>,
        pre_check: Option<&PreCheckValue>,
        cancel: &CancelToken,
    ) -> Result<UnitOutcome, ProcessorError>;
}

/// Whole-request setup phase of a Check flow; may allocate shared external
/// resources for the per-unit checks.
pub trait PreCheckProcessor: Send + Sync {
    fn pre_check(
        &self,
        conditions: &[Condition],
        instructions: &str,
        pre_generated: Option<&GeneratingResult>,
    ) -> Result<PreCheckValue, ProcessorError>;
}

/// Whole-request wrap-up phase of a Check flow. May rewrite the accumulated
/// results; the engine only accepts the rewrite when it validates. This is
/// also the place to release whatever PreCheck allocated.
pub trait PostCheckProcessor: Send + Sync {
    fn post_check(
        &self,
        pre_check: Option<&PreCheckValue>,
        results: &mut Vec<CheckingResult>,
        checkers: &[Arc<dyn CheckProcessor>],
    ) -> Result<(), ProcessorError>;
}

/// Supplies processor instances to the flow engine.
pub enum ProcessorFactory<T: ?Sized> {
    /// One shared instance handed out to every call.
    Singleton(Arc<T>),
    /// A fresh instance per call.
    Constructor(Box<dyn Fn() -> Arc<T> + Send + Sync>),
}

impl<T: ?Sized> ProcessorFactory<T> {
    pub fn instance(&self) -> Arc<T> {
        match self {
            ProcessorFactory::Singleton(instance) => Arc::clone(instance),
            ProcessorFactory::Constructor(construct) => construct(),
        }
    }
}

/// Keyed store of processor factories, at most one per capability kind.
/// Read-only once the server starts; shared across all connection handlers.
#[derive(Default)]
pub struct ProcessorRegistry {
    generate: Option<ProcessorFactory<dyn GenerateProcessor>>,
    calculate: Option<ProcessorFactory<dyn CalculateProcessor>>,
    check: Option<ProcessorFactory<dyn CheckProcessor>>,
    pre_check: Option<ProcessorFactory<dyn PreCheckProcessor>>,
    post_check: Option<ProcessorFactory<dyn PostCheckProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> ProcessorRegistry {
        ProcessorRegistry::default()
    }

    pub fn register_generate(&mut self, factory: ProcessorFactory<dyn GenerateProcessor>) {
        self.generate = Some(factory);
    }

    pub fn register_calculate(&mut self, factory: ProcessorFactory<dyn CalculateProcessor>) {
        self.calculate = Some(factory);
    }

    pub fn register_check(&mut self, factory: ProcessorFactory<dyn CheckProcessor>) {
        self.check = Some(factory);
    }

    pub fn register_pre_check(&mut self, factory: ProcessorFactory<dyn PreCheckProcessor>) {
        self.pre_check = Some(factory);
    }

    pub fn register_post_check(&mut self, factory: ProcessorFactory<dyn PostCheckProcessor>) {
        self.post_check = Some(factory);
    }

    pub fn generate(&self) -> Option<Arc<dyn GenerateProcessor>> {
        self.generate.as_ref().map(ProcessorFactory::instance)
    }

    pub fn calculate(&self) -> Option<Arc<dyn CalculateProcessor>> {
        self.calculate.as_ref().map(ProcessorFactory::instance)
    }

    pub fn check(&self) -> Option<Arc<dyn CheckProcessor>> {
        self.check.as_ref().map(ProcessorFactory::instance)
    }

    pub fn pre_check(&self) -> Option<Arc<dyn PreCheckProcessor>> {
        self.pre_check.as_ref().map(ProcessorFactory::instance)
    }

    pub fn post_check(&self) -> Option<Arc<dyn PostCheckProcessor>> {
        self.post_check.as_ref().map(ProcessorFactory::instance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct FixedScore(f64);

    impl CheckProcessor for FixedScore {
        fn check_unit(
            &self,
            _condition: &Condition,
            _instructions: &str,
            _pre_generated: Option<&GeneratingResult>,
            _pre_check: Option<&PreCheckValue>,
            _cancel: &CancelToken,
        ) -> Result<UnitOutcome, ProcessorError> {
            Ok(UnitOutcome::new(self.0, "ok"))
        }
    }

    #[test]
    fn test_empty_registry_has_no_processors() {
        let registry = ProcessorRegistry::new();
        assert!(registry.generate().is_none());
        assert!(registry.calculate().is_none());
        assert!(registry.check().is_none());
        assert!(registry.pre_check().is_none());
        assert!(registry.post_check().is_none());
    }

    #[test]
    fn test_singleton_factory_shares_one_instance() {
        let mut registry = ProcessorRegistry::new();
        registry.register_check(ProcessorFactory::Singleton(Arc::new(FixedScore(1.0))));
        let first = registry.check().unwrap();
        let second = registry.check().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_constructor_factory_builds_fresh_instances() {
        static BUILT: AtomicUsize = AtomicUsize::new(0);
        let mut registry = ProcessorRegistry::new();
        registry.register_check(ProcessorFactory::Constructor(Box::new(|| {
            BUILT.fetch_add(1, Ordering::Relaxed);
            Arc::new(FixedScore(0.5)) as Arc<dyn CheckProcessor>
        })));
        let first = registry.check().unwrap();
        let second = registry.check().unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(BUILT.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_cancel_token() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
