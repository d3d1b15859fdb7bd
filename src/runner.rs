//! Runs a [`DigitisationScheme`] against a live [`ReceiverSession`].
//!
//! Tasks run strictly in order. Before each one the link is flushed, so a
//! press left over from the previous task can't become the first point of
//! the next. Single tasks go through the accept/undo rule in
//! [`acceptance`](crate::acceptance); continuous tasks keep every sample.
//!
//! Per-sample problems (a garbled record, a timeout, a half-delivered set)
//! are logged and the sample is read again. Anything else stops the run and
//! hands back the points captured so far.

use log::{debug, info, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use thiserror::Error;

use crate::{
    acceptance::next_index,
    observer::DigitisationObserver,
    point_set::{DigitisedPoint, PointSet},
    receiver_session::{ReceiverSession, Sample, SessionError},
    scheme::{DigitisationScheme, DigitisationTask, TaskTarget},
    tracker_link::TrackerLink,
};

/// What a run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Every kept point, in capture order.
    pub points: PointSet,
    /// Tasks that ran to completion.
    pub completed_tasks: usize,
    /// Whether a stop was requested before every task ran.
    pub aborted: bool,
}

/// The run hit an error it can't skip. The points kept before it are
/// returned so they can still be saved.
#[derive(Debug, Error)]
#[error("digitisation stopped during task {}: {source}", .task + 1)]
pub struct RunError {
    /// Index of the task that failed.
    pub task: usize,
    /// Why the session gave up.
    pub source: SessionError,
    /// Points kept before the failure.
    pub points: PointSet,
}

/// Drives a scheme to completion over one session.
pub struct SchemeRunner<L: TrackerLink> {
    session: ReceiverSession<L>,
    stop: Arc<AtomicBool>,
}

impl<L: TrackerLink> SchemeRunner<L> {
    /// A runner with a fresh stop flag.
    pub fn new(session: ReceiverSession<L>) -> Self {
        Self {
            session,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Use `stop` as the stop flag. Setting it ends the run before the next
    /// task starts; the task in progress always finishes.
    pub fn with_stop_flag(mut self, stop: Arc<AtomicBool>) -> Self {
        self.stop = stop;
        self
    }

    /// A handle to the stop flag.
    pub fn stop_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// The session samples are read from.
    pub fn session(&self) -> &ReceiverSession<L> {
        &self.session
    }

    /// Hands the session back, e.g. to run another scheme.
    pub fn into_session(self) -> ReceiverSession<L> {
        self.session
    }

    /// Run every task of `scheme` in order.
    pub fn run<O: DigitisationObserver>(
        &mut self,
        scheme: &DigitisationScheme,
        observer: &mut O,
    ) -> Result<RunOutcome, RunError> {
        let mut points = PointSet::new();
        let task_count = scheme.len();

        for (position, task) in scheme.tasks().iter().enumerate() {
            if self.stop.load(Ordering::SeqCst) {
                warn!("Stop requested after {} of {} tasks", position, task_count);
                return Ok(RunOutcome {
                    points,
                    completed_tasks: position,
                    aborted: true,
                });
            }

            observer.on_task_started(task, position, task_count);
            if let Err(source) = self.run_task(task, &mut points, observer) {
                return Err(RunError {
                    task: position,
                    source,
                    points,
                });
            }
            observer.on_task_finished(task);
        }

        info!("Scheme finished with {} points", points.len());
        Ok(RunOutcome {
            points,
            completed_tasks: task_count,
            aborted: false,
        })
    }

    fn run_task<O: DigitisationObserver>(
        &mut self,
        task: &DigitisationTask,
        points: &mut PointSet,
        observer: &mut O,
    ) -> Result<(), SessionError> {
        self.session.clear_old_data()?;
        match task.target() {
            TaskTarget::Labels(labels) => self.run_single(task, labels, points, observer),
            TaskTarget::Count(n) => self.run_continuous(task, *n, points, observer),
        }
    }

    fn run_single<O: DigitisationObserver>(
        &mut self,
        task: &DigitisationTask,
        labels: &[String],
        points: &mut PointSet,
        observer: &mut O,
    ) -> Result<(), SessionError> {
        let mut index = 0;
        while index < labels.len() {
            observer.on_awaiting_point(task, &labels[index]);
            let sample = self.next_sample()?;
            let distance = sample.receiver_distance;

            let step = next_index(distance, index, task.limit());
            if step.accepted {
                let point = DigitisedPoint::new(task.category(), &labels[index], sample.position);
                observer.on_point_accepted(task, &point, distance);
                points.push(point);
            } else {
                // Only points of this task are ever removed: step.index < index
                // means index > 0, so this task has kept at least one.
                let undone = if step.undoes(index) { points.pop() } else { None };
                observer.on_point_rejected(task, &labels[step.index], distance, undone.as_ref());
            }

            index = step.index;
            observer.on_task_progress(task, index, labels.len());
        }
        Ok(())
    }

    fn run_continuous<O: DigitisationObserver>(
        &mut self,
        task: &DigitisationTask,
        n_points: usize,
        points: &mut PointSet,
        observer: &mut O,
    ) -> Result<(), SessionError> {
        for done in 0..n_points {
            observer.on_awaiting_point(task, task.category());
            let sample = self.next_sample()?;
            let point = DigitisedPoint::new(task.category(), task.category(), sample.position);
            observer.on_point_accepted(task, &point, sample.receiver_distance);
            points.push(point);
            observer.on_task_progress(task, done + 1, n_points);
        }
        Ok(())
    }

    /// The next good sample. Recoverable errors are logged and skipped.
    fn next_sample(&mut self) -> Result<Sample, SessionError> {
        loop {
            match self.session.sample() {
                Ok(sample) => return Ok(sample),
                Err(SessionError::Timeout) => debug!("No press yet"),
                Err(e) if e.is_recoverable() => warn!("Skipping sample: {}", e),
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        receiver_session::SessionConfig, simulated_tracker::SimulatedTracker, Vec3,
    };

    const NEAR: [f64; 3] = [1.0, 2.0, 2.0];
    const FAR: [f64; 3] = [100.0, 0.0, 0.0];

    #[derive(Debug, PartialEq)]
    enum Event {
        Started(String),
        Accepted(String),
        Rejected {
            offered: String,
            undone: Option<String>,
        },
        Progress(usize, usize),
        Finished(String),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
    }

    impl DigitisationObserver for Recorder {
        fn on_task_started(&mut self, task: &DigitisationTask, _: usize, _: usize) {
            self.events.push(Event::Started(task.category().to_owned()));
        }

        fn on_point_accepted(&mut self, _: &DigitisationTask, point: &DigitisedPoint, _: f64) {
            self.events.push(Event::Accepted(point.label.clone()));
        }

        fn on_point_rejected(
            &mut self,
            _: &DigitisationTask,
            label: &str,
            _: f64,
            undone: Option<&DigitisedPoint>,
        ) {
            self.events.push(Event::Rejected {
                offered: label.to_owned(),
                undone: undone.map(|p| p.label.clone()),
            });
        }

        fn on_task_progress(&mut self, _: &DigitisationTask, done: usize, total: usize) {
            self.events.push(Event::Progress(done, total));
        }

        fn on_task_finished(&mut self, task: &DigitisationTask) {
            self.events.push(Event::Finished(task.category().to_owned()));
        }
    }

    fn runner(tracker: SimulatedTracker) -> SchemeRunner<SimulatedTracker> {
        let config = SessionConfig {
            command_delay_ms: 0,
            ..SessionConfig::default()
        };
        SchemeRunner::new(ReceiverSession::new(tracker, config).unwrap())
    }

    fn labels(points: &PointSet) -> Vec<&str> {
        points.iter().map(|p| p.label.as_str()).collect()
    }

    #[test]
    fn fiducials_in_label_order() {
        let tracker = SimulatedTracker::new()
            .press_at([0.0; 3], NEAR)
            .press_at([0.0; 3], NEAR)
            .press_at([0.0; 3], NEAR);
        let mut scheme = DigitisationScheme::new();
        scheme.add("fiducials", &["lpa", "rpa", "nasion"], "single", None).unwrap();

        let outcome = runner(tracker).run(&scheme, &mut Recorder::default()).unwrap();

        assert_eq!(labels(&outcome.points), ["lpa", "rpa", "nasion"]);
        assert!(outcome.points.iter().all(|p| p.category == "fiducials"));
        assert!(outcome
            .points
            .iter()
            .all(|p| (p.position - Vec3::new(1.0, 2.0, 2.0)).norm() < 1e-9));
        assert_eq!(outcome.completed_tasks, 1);
        assert!(!outcome.aborted);
    }

    #[test]
    fn continuous_keeps_far_presses() {
        let mut tracker = SimulatedTracker::new();
        for _ in 0..5 {
            tracker = tracker.press_at([0.0; 3], FAR);
        }
        let mut scheme = DigitisationScheme::new();
        scheme.add("head", &[], "continuous", Some(5)).unwrap();

        let outcome = runner(tracker).run(&scheme, &mut Recorder::default()).unwrap();

        assert_eq!(labels(&outcome.points), ["head"; 5]);
    }

    #[test]
    fn far_press_undoes_previous_point() {
        let tracker = SimulatedTracker::new()
            .press_at([0.0; 3], NEAR)
            .press_at([0.0; 3], [0.0, 0.0, 5.0])
            .press_at([0.0; 3], FAR)
            .press_at([0.0; 3], [0.0, 0.0, 7.0])
            .press_at([0.0; 3], NEAR);
        let mut scheme = DigitisationScheme::new();
        scheme.add_single("fiducials", &["lpa", "rpa", "nasion"]).unwrap();
        let mut recorder = Recorder::default();

        let outcome = runner(tracker).run(&scheme, &mut recorder).unwrap();

        assert_eq!(labels(&outcome.points), ["lpa", "rpa", "nasion"]);
        assert_eq!(outcome.points.as_slice()[1].position, Vec3::new(0.0, 0.0, 7.0));
        assert!(recorder.events.contains(&Event::Rejected {
            offered: "rpa".into(),
            undone: Some("rpa".into()),
        }));
        let progress: Vec<_> = recorder
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Progress(done, _) => Some(*done),
                _ => None,
            })
            .collect();
        assert_eq!(progress, [1, 2, 1, 2, 3]);
    }

    #[test]
    fn first_press_rejection_keeps_earlier_tasks() {
        let tracker = SimulatedTracker::new()
            .press_at([0.0; 3], NEAR)
            .press_at([0.0; 3], FAR)
            .press_at([0.0; 3], FAR)
            .press_at([0.0; 3], [3.0, 0.0, 0.0]);
        let mut scheme = DigitisationScheme::new();
        scheme.add_single("fiducials", &["lpa"]).unwrap();
        scheme.add_single("OPM", &["FL1"]).unwrap();
        let mut recorder = Recorder::default();

        let outcome = runner(tracker).run(&scheme, &mut recorder).unwrap();

        assert_eq!(labels(&outcome.points), ["lpa", "FL1"]);
        assert_eq!(
            recorder
                .events
                .iter()
                .filter(|e| matches!(e, Event::Rejected { undone: None, .. }))
                .count(),
            2
        );
    }

    #[test]
    fn garbled_records_are_skipped() {
        let tracker = SimulatedTracker::new()
            .garbled(["01 noise on the line", "02 more noise"])
            .press_at([0.0; 3], NEAR);
        let mut scheme = DigitisationScheme::new();
        scheme.add_single("EEG", &["Cz"]).unwrap();

        let outcome = runner(tracker).run(&scheme, &mut Recorder::default()).unwrap();

        assert_eq!(labels(&outcome.points), ["Cz"]);
    }

    #[test]
    fn non_finite_records_are_never_accepted() {
        let tracker = SimulatedTracker::new()
            .garbled([
                "01     NaN   0.00   0.00   0.00   0.00   0.00",
                "02    0.00   0.00   0.00   0.00   0.00   0.00",
            ])
            .press_at([0.0; 3], NEAR);
        let mut scheme = DigitisationScheme::new();
        scheme.add_single("fiducials", &["lpa"]).unwrap();

        let outcome = runner(tracker).run(&scheme, &mut Recorder::default()).unwrap();

        assert_eq!(labels(&outcome.points), ["lpa"]);
        assert!(outcome.points.iter().all(|p| p.position.iter().all(|c| c.is_finite())));
    }

    #[test]
    fn stale_records_are_dropped_before_each_task() {
        let mut leftover = SimulatedTracker::new().press_at([0.0; 3], [9.0, 9.0, 9.0]);
        let lines = [leftover.read_record().unwrap(), leftover.read_record().unwrap()];
        let tracker = SimulatedTracker::new()
            .stale(lines)
            .press_at([0.0; 3], NEAR)
            .press_at([0.0; 3], NEAR);
        let mut scheme = DigitisationScheme::new();
        scheme.add_single("fiducials", &["nasion"]).unwrap();
        scheme.add_continuous("head", 1).unwrap();
        let mut runner = runner(tracker);

        let outcome = runner.run(&scheme, &mut Recorder::default()).unwrap();

        assert_eq!(outcome.points.as_slice()[0].position, Vec3::new(1.0, 2.0, 2.0));
        assert_eq!(runner.session().link().discard_count(), 2);
    }

    #[test]
    fn stop_flag_ends_run_between_tasks() {
        struct StopAfterFirst(Arc<AtomicBool>);
        impl DigitisationObserver for StopAfterFirst {
            fn on_task_finished(&mut self, _: &DigitisationTask) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let tracker = SimulatedTracker::new()
            .press_at([0.0; 3], NEAR)
            .press_at([0.0; 3], NEAR);
        let mut scheme = DigitisationScheme::new();
        scheme.add_continuous("head", 2).unwrap();
        scheme.add_single("fiducials", &["lpa"]).unwrap();
        let mut runner = runner(tracker);
        let mut observer = StopAfterFirst(runner.stop_flag());

        let outcome = runner.run(&scheme, &mut observer).unwrap();

        assert!(outcome.aborted);
        assert_eq!(outcome.completed_tasks, 1);
        assert_eq!(outcome.points.len(), 2);
    }

    #[test]
    fn disconnect_returns_points_so_far() {
        let tracker = SimulatedTracker::new().press_at([0.0; 3], NEAR);
        let mut scheme = DigitisationScheme::new();
        scheme.add_single("fiducials", &["lpa"]).unwrap();
        scheme.add_single("OPM", &["FL1", "FL2"]).unwrap();

        let err = runner(tracker).run(&scheme, &mut Recorder::default()).unwrap_err();

        assert_eq!(err.task, 1);
        assert!(matches!(err.source, SessionError::Io(_)));
        assert_eq!(labels(&err.points), ["lpa"]);
    }

    #[test]
    fn observer_sees_task_boundaries() {
        let tracker = SimulatedTracker::new().press_at([0.0; 3], NEAR);
        let mut scheme = DigitisationScheme::new();
        scheme.add_single("OPM", &["FL7"]).unwrap();
        let mut recorder = Recorder::default();

        runner(tracker).run(&scheme, &mut recorder).unwrap();

        assert_eq!(
            recorder.events,
            [
                Event::Started("OPM".into()),
                Event::Accepted("FL7".into()),
                Event::Progress(1, 1),
                Event::Finished("OPM".into()),
            ]
        );
    }

    #[test]
    fn random_presses_fill_continuous_task() {
        let tracker = SimulatedTracker::new().with_random_presses(10, 30.0, 0.5);
        let mut scheme = DigitisationScheme::new();
        scheme.add_continuous("head", 10).unwrap();
        let mut runner = runner(tracker);

        let outcome = runner.run(&scheme, &mut Recorder::default()).unwrap();

        assert_eq!(outcome.points.len(), 10);
        assert_eq!(runner.session().link().remaining(), 0);
    }
}
