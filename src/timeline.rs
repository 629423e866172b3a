//! Worker-presence timelines.
//!
//! A [`WorkerTimeline`] is a step function from frame progress to the list of workers standing
//! at a building, stored as checkpoints sorted by progress. The workers are constant between
//! two checkpoints and change exactly at a checkpoint.
//!
//! Mutations never re-sort: every insertion goes through a binary search, so the sequence stays
//! strictly increasing. Two progress values closer than [`EPSILON`] name the same checkpoint.
//!
//! ```
//! use selenia_replay::WorkerTimeline;
//!
//! let mut timeline = WorkerTimeline::starting_with(&[1, 2]);
//! timeline.remove_first_at(1, 0.2);
//! timeline.add_at(3, 0.8);
//!
//! assert_eq!(timeline.state_at(0.1), &[1, 2]);
//! assert_eq!(timeline.state_at(0.5), &[2]);
//! assert_eq!(timeline.state_at(0.9), &[2, 3]);
//! ```

use smallvec::SmallVec;

use crate::telemetry::{InvariantChecker, InvariantViolation};
use crate::WorkerType;

/// Two progress values closer than this are the same instant.
pub const EPSILON: f64 = 1e-7;

/// Worker types present at a building, in arrival order.
pub type WorkerList = SmallVec<[WorkerType; 8]>;

#[inline]
fn same_progress(a: f64, b: f64) -> bool {
    (a - b).abs() < EPSILON
}

/// Removes the first occurrence of `worker`, if any.
fn remove_first(workers: &mut WorkerList, worker: WorkerType) {
    if let Some(index) = workers.iter().position(|&w| w == worker) {
        workers.remove(index);
    }
}

/// The workers present from `progress` until the next checkpoint.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct Checkpoint {
    /// Frame-local progress at which this state begins.
    pub progress: f64,
    /// Workers present.
    pub workers: WorkerList,
}

impl Checkpoint {
    /// Creates a checkpoint.
    #[must_use]
    pub fn new(progress: f64, workers: impl IntoIterator<Item = WorkerType>) -> Self {
        Self {
            progress,
            workers: workers.into_iter().collect(),
        }
    }

    /// Number of workers of type `worker` present.
    #[must_use]
    pub fn count_of(&self, worker: WorkerType) -> usize {
        self.workers.iter().filter(|&&w| w == worker).count()
    }
}

/// A building's checkpoints for one frame, sorted by strictly increasing progress.
#[derive(Debug, Clone, PartialEq, Default, serde::Serialize, serde::Deserialize)]
pub struct WorkerTimeline {
    checkpoints: Vec<Checkpoint>,
}

impl WorkerTimeline {
    /// An empty timeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A timeline with a single checkpoint at progress 0.
    #[must_use]
    pub fn starting_with(workers: &[WorkerType]) -> Self {
        Self {
            checkpoints: vec![Checkpoint::new(0.0, workers.iter().copied())],
        }
    }

    /// The checkpoints, in order.
    #[must_use]
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Number of checkpoints.
    #[must_use]
    pub fn len(&self) -> usize {
        self.checkpoints.len()
    }

    /// Returns true if there are no checkpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.checkpoints.is_empty()
    }

    /// The final state of the frame.
    #[must_use]
    pub fn last(&self) -> Option<&Checkpoint> {
        self.checkpoints.last()
    }

    /// Index of the checkpoint at `p`, if one exists within [`EPSILON`].
    fn exact_index(&self, p: f64) -> Option<usize> {
        // Progress is strictly increasing, so only the first checkpoint past `p - EPSILON`
        // can be within range.
        let index = self
            .checkpoints
            .partition_point(|c| c.progress <= p - EPSILON);
        self.checkpoints
            .get(index)
            .filter(|c| same_progress(c.progress, p))
            .map(|_| index)
    }

    /// Insertion index for a new checkpoint at `p` (no checkpoint exists there).
    fn insertion_index(&self, p: f64) -> usize {
        self.checkpoints.partition_point(|c| c.progress < p)
    }

    /// Appends a checkpoint past the current end without copying state.
    ///
    /// Used to seed a frame (the settle-to-empty checkpoint of a new month). Ignored, with a
    /// `false` return, if `checkpoint` would not be strictly after the last one.
    pub fn push(&mut self, checkpoint: Checkpoint) -> bool {
        if self
            .checkpoints
            .last()
            .is_some_and(|last| checkpoint.progress < last.progress + EPSILON)
        {
            return false;
        }
        self.checkpoints.push(checkpoint);
        true
    }

    /// Makes sure a checkpoint exists at `p`, copying the state in effect just before it.
    ///
    /// A no-op if a checkpoint already exists at `p`. With nothing before `p` the new
    /// checkpoint is empty.
    pub fn freeze_at(&mut self, p: f64) {
        if self.exact_index(p).is_some() {
            return;
        }
        let index = self.insertion_index(p);
        let workers = index
            .checked_sub(1)
            .and_then(|prev| self.checkpoints.get(prev))
            .map(|c| c.workers.clone())
            .unwrap_or_default();
        self.checkpoints.insert(
            index,
            Checkpoint {
                progress: p,
                workers,
            },
        );
        crate::debug_check_invariants!(self, "freeze_at");
    }

    /// Adds one `worker` from `p` onwards.
    ///
    /// Every checkpoint at or after `p` gains the worker. If none sits exactly at `p`, one is
    /// created from the state just before `p` (or from nothing) plus the worker.
    pub fn add_at(&mut self, worker: WorkerType, p: f64) {
        let mut exact = false;
        for checkpoint in &mut self.checkpoints {
            if same_progress(checkpoint.progress, p) {
                exact = true;
                checkpoint.workers.push(worker);
            } else if checkpoint.progress >= p {
                checkpoint.workers.push(worker);
            }
        }
        if !exact {
            let index = self.insertion_index(p);
            let mut workers = index
                .checked_sub(1)
                .and_then(|prev| self.checkpoints.get(prev))
                .map(|c| c.workers.clone())
                .unwrap_or_default();
            workers.push(worker);
            self.checkpoints.insert(
                index,
                Checkpoint {
                    progress: p,
                    workers,
                },
            );
        }
        crate::debug_check_invariants!(self, "add_at");
    }

    /// Removes one `worker` from `p` onwards.
    ///
    /// Every checkpoint at or after `p` loses its first worker of that type; checkpoints
    /// without one are left unchanged. If no checkpoint sits exactly at `p`, one is created
    /// from the state just before `p` minus the worker. With nothing before `p`, nothing is
    /// created.
    pub fn remove_first_at(&mut self, worker: WorkerType, p: f64) {
        let mut exact = false;
        for checkpoint in &mut self.checkpoints {
            if same_progress(checkpoint.progress, p) {
                exact = true;
                remove_first(&mut checkpoint.workers, worker);
            } else if checkpoint.progress >= p {
                remove_first(&mut checkpoint.workers, worker);
            }
        }
        if !exact {
            let index = self.insertion_index(p);
            let previous = index
                .checked_sub(1)
                .and_then(|prev| self.checkpoints.get(prev))
                .map(|c| c.workers.clone());
            if let Some(mut workers) = previous {
                remove_first(&mut workers, worker);
                self.checkpoints.insert(
                    index,
                    Checkpoint {
                        progress: p,
                        workers,
                    },
                );
            }
        }
        crate::debug_check_invariants!(self, "remove_first_at");
    }

    /// The checkpoint in effect at `q`: the last one at or before `q`.
    #[must_use]
    pub fn checkpoint_at(&self, q: f64) -> Option<&Checkpoint> {
        let index = self.checkpoints.partition_point(|c| c.progress <= q);
        index.checked_sub(1).and_then(|i| self.checkpoints.get(i))
    }

    /// Workers present at `q`. Empty before the first checkpoint.
    #[must_use]
    pub fn state_at(&self, q: f64) -> &[WorkerType] {
        self.checkpoint_at(q).map_or(&[], |c| c.workers.as_slice())
    }

    /// The checkpoint the renderer is heading towards at `q`: the first one at or after `q`,
    /// or the last one if `q` is past the end.
    #[must_use]
    pub fn next_checkpoint_at(&self, q: f64) -> Option<&Checkpoint> {
        let index = self.checkpoints.partition_point(|c| c.progress < q);
        self.checkpoints.get(index).or_else(|| self.checkpoints.last())
    }

    /// Workers of [`next_checkpoint_at`](Self::next_checkpoint_at). Empty for an empty
    /// timeline.
    #[must_use]
    pub fn next_state_at(&self, q: f64) -> &[WorkerType] {
        self.next_checkpoint_at(q)
            .map_or(&[], |c| c.workers.as_slice())
    }
}

impl InvariantChecker for WorkerTimeline {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        for (index, checkpoint) in self.checkpoints.iter().enumerate() {
            if !checkpoint.progress.is_finite() {
                return Err(InvariantViolation::new(
                    "WorkerTimeline",
                    "checkpoint progress is not finite",
                )
                .with_details(format!("index {index}: {}", checkpoint.progress)));
            }
        }
        for (index, pair) in self.checkpoints.windows(2).enumerate() {
            if let [a, b] = pair {
                if b.progress <= a.progress {
                    return Err(InvariantViolation::new(
                        "WorkerTimeline",
                        "checkpoint progress is not strictly increasing",
                    )
                    .with_details(format!(
                        "index {}: {} then {}",
                        index + 1,
                        a.progress,
                        b.progress
                    )));
                }
            }
        }
        Ok(())
    }
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

    fn progresses(timeline: &WorkerTimeline) -> Vec<f64> {
        timeline.checkpoints().iter().map(|c| c.progress).collect()
    }

    fn workers(timeline: &WorkerTimeline, index: usize) -> Vec<WorkerType> {
        timeline.checkpoints()[index].workers.to_vec()
    }

    #[test]
    fn freeze_copies_previous_state() {
        let mut timeline = WorkerTimeline::starting_with(&[4]);
        timeline.freeze_at(0.5);
        assert_eq!(progresses(&timeline), vec![0.0, 0.5]);
        assert_eq!(workers(&timeline, 1), vec![4]);
    }

    #[test]
    fn freeze_on_empty_timeline_creates_empty_checkpoint() {
        let mut timeline = WorkerTimeline::new();
        timeline.freeze_at(0.3);
        assert_eq!(timeline.len(), 1);
        assert!(timeline.checkpoints()[0].workers.is_empty());
    }

    #[test]
    fn freeze_twice_is_idempotent() {
        let mut once = WorkerTimeline::starting_with(&[1]);
        once.add_at(2, 0.6);
        let mut twice = once.clone();
        once.freeze_at(0.3);
        twice.freeze_at(0.3);
        twice.freeze_at(0.3);
        assert_eq!(once, twice);
    }

    #[test]
    fn freeze_within_epsilon_is_a_no_op() {
        let mut timeline = WorkerTimeline::starting_with(&[]);
        timeline.freeze_at(0.5);
        timeline.freeze_at(0.5 + EPSILON / 2.0);
        timeline.freeze_at(0.5 - EPSILON / 2.0);
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn add_propagates_forward() {
        let mut timeline = WorkerTimeline::starting_with(&[]);
        timeline.freeze_at(0.8);
        timeline.add_at(5, 0.4);
        assert_eq!(progresses(&timeline), vec![0.0, 0.4, 0.8]);
        assert_eq!(workers(&timeline, 0), Vec::<WorkerType>::new());
        assert_eq!(workers(&timeline, 1), vec![5]);
        assert_eq!(workers(&timeline, 2), vec![5]);
    }

    #[test]
    fn add_at_existing_progress_merges() {
        let mut timeline = WorkerTimeline::starting_with(&[1]);
        timeline.add_at(2, 0.0);
        assert_eq!(timeline.len(), 1);
        assert_eq!(workers(&timeline, 0), vec![1, 2]);
    }

    #[test]
    fn add_before_everything_creates_singleton() {
        let mut timeline = WorkerTimeline::new();
        timeline.freeze_at(0.5);
        timeline.add_at(3, 0.2);
        assert_eq!(progresses(&timeline), vec![0.2, 0.5]);
        assert_eq!(workers(&timeline, 0), vec![3]);
        assert_eq!(workers(&timeline, 1), vec![3]);
    }

    #[test]
    fn remove_first_only_removes_one() {
        let mut timeline = WorkerTimeline::starting_with(&[2, 1, 2]);
        timeline.remove_first_at(2, 0.5);
        assert_eq!(workers(&timeline, 0), vec![2, 1, 2]);
        assert_eq!(workers(&timeline, 1), vec![1, 2]);
    }

    #[test]
    fn remove_absent_worker_leaves_checkpoints_unchanged() {
        let mut timeline = WorkerTimeline::starting_with(&[1, 1]);
        timeline.remove_first_at(9, 0.5);
        assert_eq!(timeline.len(), 2);
        assert_eq!(workers(&timeline, 1), vec![1, 1]);
    }

    #[test]
    fn remove_with_nothing_before_does_not_synthesize() {
        let mut timeline = WorkerTimeline::new();
        timeline.freeze_at(0.5);
        timeline.remove_first_at(1, 0.2);
        assert_eq!(progresses(&timeline), vec![0.5]);
    }

    #[test]
    fn queries_follow_the_step_function() {
        let mut timeline = WorkerTimeline::starting_with(&[1]);
        timeline.add_at(2, 0.5);
        assert_eq!(timeline.state_at(0.49), &[1]);
        assert_eq!(timeline.state_at(0.5), &[1, 2]);
        assert_eq!(timeline.state_at(2.0), &[1, 2]);
        assert_eq!(timeline.state_at(-1.0), &[] as &[WorkerType]);

        assert_eq!(timeline.next_state_at(0.25), &[1, 2]);
        assert_eq!(timeline.next_state_at(0.5), &[1, 2]);
        assert_eq!(timeline.next_state_at(0.75), &[1, 2]);
        assert_eq!(timeline.next_state_at(0.0), &[1]);
        assert!(WorkerTimeline::new().next_state_at(0.3).is_empty());
    }

    #[test]
    fn push_rejects_non_increasing_progress() {
        let mut timeline = WorkerTimeline::starting_with(&[1]);
        assert!(timeline.push(Checkpoint::new(0.1, [])));
        assert!(!timeline.push(Checkpoint::new(0.1, [])));
        assert!(!timeline.push(Checkpoint::new(0.05, [])));
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn invariants_hold_after_mixed_mutations() {
        let mut timeline = WorkerTimeline::starting_with(&[1, 2, 3]);
        timeline.freeze_at(0.9);
        timeline.remove_first_at(2, 0.3);
        timeline.add_at(7, 0.6);
        timeline.add_at(7, 0.1);
        timeline.freeze_at(0.45);
        assert!(timeline.check_invariants().is_ok());
        assert_eq!(timeline.checkpoints()[timeline.len() - 1].count_of(7), 2);
    }

    #[test]
    fn invariant_checker_detects_unsorted_checkpoints() {
        let timeline = WorkerTimeline {
            checkpoints: vec![Checkpoint::new(0.5, []), Checkpoint::new(0.2, [])],
        };
        let violation = timeline.check_invariants().unwrap_err();
        assert!(violation.to_string().contains("strictly increasing"));
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod property_tests {
    use super::*;
    use crate::test_config::miri_case_count;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Mutation {
        Freeze(f64),
        Add(WorkerType, f64),
        Remove(WorkerType, f64),
    }

    fn mutation() -> impl Strategy<Value = Mutation> {
        // A coarse grid so mutations regularly land on existing checkpoints.
        let progress = (0u32..=20).prop_map(|step| f64::from(step) / 20.0);
        prop_oneof![
            progress.clone().prop_map(Mutation::Freeze),
            (1u8..5, progress.clone()).prop_map(|(w, p)| Mutation::Add(w, p)),
            (1u8..5, progress).prop_map(|(w, p)| Mutation::Remove(w, p)),
        ]
    }

    fn apply(timeline: &mut WorkerTimeline, mutation: &Mutation) {
        match *mutation {
            Mutation::Freeze(p) => timeline.freeze_at(p),
            Mutation::Add(w, p) => timeline.add_at(w, p),
            Mutation::Remove(w, p) => timeline.remove_first_at(w, p),
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: miri_case_count(),
            ..ProptestConfig::default()
        })]

        /// Progress stays strictly increasing whatever the mutation order.
        #[test]
        fn prop_progress_strictly_increasing(
            start in prop::collection::vec(1u8..5, 0..4),
            mutations in prop::collection::vec(mutation(), 0..40),
        ) {
            let mut timeline = WorkerTimeline::starting_with(&start);
            for m in &mutations {
                apply(&mut timeline, m);
                prop_assert!(timeline.check_invariants().is_ok());
            }
        }

        /// Freezing never changes what the timeline answers.
        #[test]
        fn prop_freeze_preserves_states(
            mutations in prop::collection::vec(mutation(), 0..20),
            at in 0u32..=20,
        ) {
            let mut timeline = WorkerTimeline::starting_with(&[1, 2]);
            for m in &mutations {
                apply(&mut timeline, m);
            }
            let probes: Vec<f64> = (0..=40).map(|i| f64::from(i) / 40.0).collect();
            let before: Vec<Vec<WorkerType>> =
                probes.iter().map(|&q| timeline.state_at(q).to_vec()).collect();
            timeline.freeze_at(f64::from(at) / 20.0);
            let after: Vec<Vec<WorkerType>> =
                probes.iter().map(|&q| timeline.state_at(q).to_vec()).collect();
            prop_assert_eq!(before, after);
        }
    }
}
