//! Structured telemetry for soft faults and broken invariants.
//!
//! The decoder and the accumulator never print. Anything unexpected that does not abort
//! decoding (a stale cache back-reference, an event naming a building that does not exist) is
//! turned into a [`ReplayViolation`] and handed to a [`ViolationObserver`]. By default that is
//! the [`TracingObserver`], which logs through `tracing`; tests install a
//! [`CollectingObserver`] and assert on what was reported.
//!
//! # Example
//!
//! ```
//! use selenia_replay::telemetry::{CollectingObserver, ViolationKind};
//! use selenia_replay::ReplayBuilder;
//! use std::sync::Arc;
//!
//! let observer = Arc::new(CollectingObserver::new());
//! let session = ReplayBuilder::new()
//!     .with_violation_observer(observer.clone())
//!     .start_plaintext("0\n0\n10\n10\n0\n0\n0\n0");
//! assert!(session.is_ok());
//! assert!(!observer.has_violation(ViolationKind::EventCache));
//! ```

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Severity of a reported violation.
///
/// Severities are ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    /// Unexpected but recoverable; decoding continued with a substitute.
    ///
    /// Example: a cache back-reference past the end of the cache.
    Warning,
    /// The frame is usable but parts of it are degraded.
    Error,
    /// A contract between decoder and accumulator was broken; the affected mutation was skipped.
    ///
    /// Example: a transport event naming a building that was never introduced.
    Critical,
}

impl ViolationSeverity {
    /// Returns a string representation suitable for logging labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for ViolationSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categories of violations, one per subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ViolationKind {
    /// Event cache lookups and growth.
    ///
    /// Examples:
    /// - Back-reference past the end of the cache
    /// - Cache reached capacity and stopped recording
    EventCache,
    /// Wire records that decode but look suspicious.
    WireFormat,
    /// Worker timeline mutations.
    Timeline,
    /// Frames handed over out of turn order.
    FrameOrder,
    /// An event referenced a building or tube that does not exist.
    DanglingReference,
    /// Configuration constraint violated.
    Configuration,
    /// A type's internal invariant was broken.
    ///
    /// Only checked in debug builds or when the `paranoid` feature is enabled.
    Invariant,
    /// Internal logic error (should never happen).
    InternalError,
}

impl ViolationKind {
    /// Returns a string representation suitable for logging labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::EventCache => "event_cache",
            Self::WireFormat => "wire_format",
            Self::Timeline => "timeline",
            Self::FrameOrder => "frame_order",
            Self::DanglingReference => "dangling_reference",
            Self::Configuration => "configuration",
            Self::Invariant => "invariant",
            Self::InternalError => "internal_error",
        }
    }
}

impl std::fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded violation with everything needed to diagnose it.
///
/// # Example
///
/// ```
/// use selenia_replay::telemetry::{ReplayViolation, ViolationKind, ViolationSeverity};
///
/// let violation = ReplayViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::EventCache,
///     "cache miss",
///     "delta.rs:42",
/// )
/// .with_frame(12)
/// .with_context("index", "1200");
///
/// assert!(violation.to_string().contains("frame=12"));
/// ```
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReplayViolation {
    /// The severity level of this violation.
    pub severity: ViolationSeverity,
    /// The subsystem where the violation occurred.
    pub kind: ViolationKind,
    /// Human-readable description of what went wrong.
    pub message: String,
    /// Source location where the violation was detected (file:line).
    pub location: &'static str,
    /// Sequence number of the frame being processed, if any.
    pub frame: Option<u32>,
    /// Additional structured context as key-value pairs.
    pub context: BTreeMap<String, String>,
}

impl ReplayViolation {
    /// Creates a new violation.
    #[must_use]
    pub fn new(
        severity: ViolationSeverity,
        kind: ViolationKind,
        message: impl Into<String>,
        location: &'static str,
    ) -> Self {
        Self {
            severity,
            kind,
            message: message.into(),
            location,
            frame: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the frame being processed when this violation occurred.
    #[must_use]
    pub fn with_frame(mut self, frame: u32) -> Self {
        self.frame = Some(frame);
        self
    }

    /// Adds a context key-value pair.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Serializes this violation to a JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }

    /// Serializes this violation to a pretty-printed JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json_pretty(&self) -> Option<String> {
        serde_json::to_string_pretty(self).ok()
    }
}

impl std::fmt::Display for ReplayViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[{}/{}] {} (at {}",
            self.severity, self.kind, self.message, self.location
        )?;
        if let Some(frame) = self.frame {
            write!(f, ", frame={frame}")?;
        }
        if !self.context.is_empty() {
            write!(f, ", context={:?}", self.context)?;
        }
        write!(f, ")")
    }
}

/// Observes violations as they are reported.
///
/// # Example
///
/// ```
/// use selenia_replay::telemetry::{ReplayViolation, ViolationObserver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
///
/// struct CountingObserver(AtomicUsize);
///
/// impl ViolationObserver for CountingObserver {
///     fn on_violation(&self, _violation: &ReplayViolation) {
///         self.0.fetch_add(1, Ordering::Relaxed);
///     }
/// }
/// ```
pub trait ViolationObserver: Send + Sync {
    /// Called when a violation is detected.
    fn on_violation(&self, violation: &ReplayViolation);
}

/// Observer that logs violations through `tracing`.
///
/// - `Warning` severity → `tracing::warn!`
/// - `Error` and `Critical` severity → `tracing::error!`
///
/// All fields are emitted as structured tracing fields (`severity`, `kind`, `location`,
/// `frame`, `context`).
#[derive(Debug, Default, Clone)]
pub struct TracingObserver;

impl TracingObserver {
    /// Creates a new tracing observer.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn format_frame(frame: Option<u32>) -> String {
        frame.map_or_else(|| "null".to_string(), |f| f.to_string())
    }
}

impl ViolationObserver for TracingObserver {
    fn on_violation(&self, violation: &ReplayViolation) {
        let severity = violation.severity.as_str();
        let kind = violation.kind.as_str();
        let location = violation.location;
        let frame_str = Self::format_frame(violation.frame);

        let context_str = if violation.context.is_empty() {
            "{}".to_string()
        } else {
            let pairs: Vec<String> = violation
                .context
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            format!("{{{}}}", pairs.join(", "))
        };

        match violation.severity {
            ViolationSeverity::Warning => {
                tracing::warn!(
                    severity,
                    kind,
                    location,
                    frame = %frame_str,
                    context = %context_str,
                    "{}",
                    violation.message
                );
            },
            ViolationSeverity::Error | ViolationSeverity::Critical => {
                tracing::error!(
                    severity,
                    kind,
                    location,
                    frame = %frame_str,
                    context = %context_str,
                    "{}",
                    violation.message
                );
            },
        }
    }
}

/// Observer that collects violations for tests.
///
/// ```
/// use selenia_replay::telemetry::{
///     CollectingObserver, ReplayViolation, ViolationKind, ViolationObserver, ViolationSeverity,
/// };
///
/// let observer = CollectingObserver::new();
/// observer.on_violation(&ReplayViolation::new(
///     ViolationSeverity::Warning,
///     ViolationKind::EventCache,
///     "test violation",
///     "test.rs:1",
/// ));
/// assert_eq!(observer.len(), 1);
/// assert!(observer.has_violation(ViolationKind::EventCache));
/// ```
#[derive(Debug, Default)]
pub struct CollectingObserver {
    violations: Mutex<Vec<ReplayViolation>>,
}

impl CollectingObserver {
    /// Creates a new collecting observer with an empty violation list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            violations: Mutex::new(Vec::new()),
        }
    }

    /// Returns a copy of all collected violations.
    #[must_use]
    pub fn violations(&self) -> Vec<ReplayViolation> {
        self.violations.lock().clone()
    }

    /// Returns the number of collected violations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.violations.lock().len()
    }

    /// Returns true if no violations have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.violations.lock().is_empty()
    }

    /// Checks if any violation of the specified kind has been collected.
    #[must_use]
    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.lock().iter().any(|v| v.kind == kind)
    }

    /// Checks if any violation with the specified severity has been collected.
    #[must_use]
    pub fn has_severity(&self, severity: ViolationSeverity) -> bool {
        self.violations
            .lock()
            .iter()
            .any(|v| v.severity == severity)
    }

    /// Returns all violations matching the specified kind.
    #[must_use]
    pub fn violations_of_kind(&self, kind: ViolationKind) -> Vec<ReplayViolation> {
        self.violations
            .lock()
            .iter()
            .filter(|v| v.kind == kind)
            .cloned()
            .collect()
    }

    /// Clears all collected violations.
    pub fn clear(&self) {
        self.violations.lock().clear();
    }
}

impl ViolationObserver for CollectingObserver {
    fn on_violation(&self, violation: &ReplayViolation) {
        self.violations.lock().push(violation.clone());
    }
}

/// Reports a violation with location tracking through the default [`TracingObserver`].
///
/// ```
/// use selenia_replay::{report_violation, telemetry::{ViolationKind, ViolationSeverity}};
///
/// report_violation!(ViolationSeverity::Warning, ViolationKind::WireFormat,
///     "unexpected token count: {}", 7);
/// ```
#[macro_export]
macro_rules! report_violation {
    ($severity:expr, $kind:expr, $msg:literal) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::ReplayViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};

    ($severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        use $crate::telemetry::ViolationObserver as _;
        let violation = $crate::telemetry::ReplayViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        $crate::telemetry::TracingObserver.on_violation(&violation);
    }};
}

/// Asserts that no violations have been collected.
#[macro_export]
macro_rules! assert_no_violations {
    ($observer:expr) => {{
        let violations = $observer.violations();
        assert!(
            violations.is_empty(),
            "Expected no violations, but found {}:\n{:#?}",
            violations.len(),
            violations
        );
    }};
}

/// Asserts that a violation of the specified kind was collected.
#[macro_export]
macro_rules! assert_violation {
    ($observer:expr, $kind:expr) => {{
        assert!(
            $observer.has_violation($kind),
            "Expected violation of kind {:?}, but found: {:#?}",
            $kind,
            $observer.violations()
        );
    }};
}

/// Reports a violation to an optional observer, falling back to [`TracingObserver`] if `None`.
pub fn report_to_observer<O: ViolationObserver + ?Sized>(
    observer: Option<&Arc<O>>,
    violation: &ReplayViolation,
) {
    match observer {
        Some(obs) => obs.on_violation(violation),
        None => TracingObserver.on_violation(violation),
    }
}

/// Reports a violation through an `Option<Arc<dyn ViolationObserver>>`, tagged with a frame.
///
/// ```text
/// report_violation_to!(observer, frame, severity, kind, "message {}", args);
/// ```
#[macro_export]
macro_rules! report_violation_to {
    ($observer:expr, $frame:expr, $severity:expr, $kind:expr, $msg:literal) => {{
        let mut violation = $crate::telemetry::ReplayViolation::new(
            $severity,
            $kind,
            $msg,
            concat!(file!(), ":", line!()),
        );
        violation.frame = $frame;
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};

    ($observer:expr, $frame:expr, $severity:expr, $kind:expr, $fmt:literal, $($arg:tt)+) => {{
        let mut violation = $crate::telemetry::ReplayViolation::new(
            $severity,
            $kind,
            format!($fmt, $($arg)+),
            concat!(file!(), ":", line!()),
        );
        violation.frame = $frame;
        $crate::telemetry::report_to_observer($observer.as_ref(), &violation);
    }};
}

// ==========================================
// Runtime Invariant Checking
// ==========================================

/// Result of a failed invariant check.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InvariantViolation {
    /// Name of the type whose invariant was violated.
    pub type_name: &'static str,
    /// Description of the violated invariant.
    pub invariant: String,
    /// Additional diagnostic context.
    pub details: Option<String>,
}

impl InvariantViolation {
    /// Creates a new invariant violation.
    #[must_use]
    pub fn new(type_name: &'static str, invariant: impl Into<String>) -> Self {
        Self {
            type_name,
            invariant: invariant.into(),
            details: None,
        }
    }

    /// Adds additional details to the violation.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Serializes this violation to a JSON string.
    #[cfg(feature = "json")]
    #[must_use]
    pub fn to_json(&self) -> Option<String> {
        serde_json::to_string(self).ok()
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.type_name, self.invariant)?;
        if let Some(details) = &self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

/// Trait for types that maintain internal invariants.
pub trait InvariantChecker {
    /// Returns `Ok(())` if all invariants hold, or the first broken one.
    fn check_invariants(&self) -> Result<(), InvariantViolation>;
}

/// Checks invariants in debug builds (or with `paranoid`) and reports failures as
/// `Critical` violations. Compiles to nothing otherwise.
#[macro_export]
#[cfg(any(debug_assertions, feature = "paranoid"))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{}",
                violation
            );
        }
    }};

    ($expr:expr, $context:expr) => {{
        use $crate::telemetry::InvariantChecker as _;
        if let Err(violation) = $expr.check_invariants() {
            $crate::report_violation!(
                $crate::telemetry::ViolationSeverity::Critical,
                $crate::telemetry::ViolationKind::Invariant,
                "{} [context: {}]",
                violation,
                $context
            );
        }
    }};
}

/// No-op version for release builds without `paranoid` feature.
#[macro_export]
#[cfg(not(any(debug_assertions, feature = "paranoid")))]
macro_rules! debug_check_invariants {
    ($expr:expr) => {{}};
    ($expr:expr, $context:expr) => {{}};
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering() {
        assert!(ViolationSeverity::Warning < ViolationSeverity::Error);
        assert!(ViolationSeverity::Error < ViolationSeverity::Critical);
    }

    #[test]
    fn kind_labels_are_snake_case() {
        assert_eq!(ViolationKind::EventCache.as_str(), "event_cache");
        assert_eq!(ViolationKind::DanglingReference.as_str(), "dangling_reference");
        assert_eq!(ViolationKind::FrameOrder.to_string(), "frame_order");
    }

    #[test]
    fn violation_display_includes_frame_and_context() {
        let violation = ReplayViolation::new(
            ViolationSeverity::Critical,
            ViolationKind::DanglingReference,
            "unknown building",
            "test.rs:10",
        )
        .with_frame(50)
        .with_context("building", "99");

        let display = violation.to_string();
        assert!(display.contains("critical"));
        assert!(display.contains("dangling_reference"));
        assert!(display.contains("frame=50"));
        assert!(display.contains("building"));
    }

    #[test]
    fn collecting_observer_filters() {
        let observer = CollectingObserver::new();
        assert!(observer.is_empty());

        observer.on_violation(&ReplayViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::EventCache,
            "first",
            "test.rs:1",
        ));
        observer.on_violation(&ReplayViolation::new(
            ViolationSeverity::Critical,
            ViolationKind::DanglingReference,
            "second",
            "test.rs:2",
        ));

        assert_eq!(observer.len(), 2);
        assert!(observer.has_severity(ViolationSeverity::Critical));
        assert!(!observer.has_severity(ViolationSeverity::Error));
        assert_eq!(observer.violations_of_kind(ViolationKind::EventCache).len(), 1);

        observer.clear();
        assert!(observer.is_empty());
    }

    #[test]
    fn report_to_observer_prefers_the_given_observer() {
        let observer = Arc::new(CollectingObserver::new());
        let violation = ReplayViolation::new(
            ViolationSeverity::Warning,
            ViolationKind::WireFormat,
            "msg",
            "test.rs:1",
        );
        report_to_observer(Some(&observer), &violation);
        report_to_observer(None::<&Arc<CollectingObserver>>, &violation);
        assert_eq!(observer.len(), 1);
    }

    #[test]
    fn report_violation_to_tags_frame() {
        let collecting = Arc::new(CollectingObserver::new());
        let observer: Option<Arc<dyn ViolationObserver>> = Some(collecting.clone());
        report_violation_to!(
            observer,
            Some(7),
            ViolationSeverity::Warning,
            ViolationKind::EventCache,
            "index {} out of range",
            3
        );
        let violations = collecting.violations();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].frame, Some(7));
        assert!(violations[0].message.contains("index 3"));
    }

    #[test]
    fn invariant_violation_display() {
        let violation = InvariantViolation::new("WorkerTimeline", "progress not increasing")
            .with_details("index 2");
        assert_eq!(
            violation.to_string(),
            "WorkerTimeline: progress not increasing (index 2)"
        );
    }
}
