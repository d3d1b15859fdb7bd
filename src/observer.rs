//! Hooks the [`SchemeRunner`](crate::runner::SchemeRunner) calls while it
//! captures points.
//!
//! The runner calls these synchronously, between samples. Anything the
//! operator should see or hear (prompts, plots, beeps) lives behind this
//! trait so the capture loop itself never changes.

use log::{info, warn};

use crate::{point_set::DigitisedPoint, scheme::DigitisationTask};

/// Receives progress notifications from a running scheme. Every method has
/// an empty default.
pub trait DigitisationObserver {
    /// A task is about to start. `position` counts from 0.
    fn on_task_started(&mut self, _task: &DigitisationTask, _position: usize, _task_count: usize) {}

    /// The runner is waiting for the operator to press on `label`.
    fn on_awaiting_point(&mut self, _task: &DigitisationTask, _label: &str) {}

    /// `point` was kept. `distance` is the receiver-to-receiver distance of
    /// the press.
    fn on_point_accepted(&mut self, _task: &DigitisationTask, _point: &DigitisedPoint, _distance: f64) {}

    /// A press was too far from the head reference. `undone` is the point it
    /// removed, if any, and `label` is the one offered next.
    fn on_point_rejected(
        &mut self,
        _task: &DigitisationTask,
        _label: &str,
        _distance: f64,
        _undone: Option<&DigitisedPoint>,
    ) {
    }

    /// `done` of the task's `total` points are currently kept.
    fn on_task_progress(&mut self, _task: &DigitisationTask, _done: usize, _total: usize) {}

    /// The task's last point was kept.
    fn on_task_finished(&mut self, _task: &DigitisationTask) {}
}

/// Ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl DigitisationObserver for NullObserver {}

/// Reports progress through the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl DigitisationObserver for LogObserver {
    fn on_task_started(&mut self, task: &DigitisationTask, position: usize, task_count: usize) {
        info!(
            "task {}/{}: {} {} ({} points)",
            position + 1,
            task_count,
            task.mode(),
            task.category(),
            task.len()
        );
    }

    fn on_awaiting_point(&mut self, task: &DigitisationTask, label: &str) {
        info!("{}: digitise {}", task.category(), label);
    }

    fn on_point_accepted(&mut self, _task: &DigitisationTask, point: &DigitisedPoint, distance: f64) {
        info!(
            "{} {} at ({:.2}, {:.2}, {:.2}), receivers {:.2} apart",
            point.category, point.label, point.position.x, point.position.y, point.position.z, distance
        );
    }

    fn on_point_rejected(
        &mut self,
        task: &DigitisationTask,
        label: &str,
        distance: f64,
        undone: Option<&DigitisedPoint>,
    ) {
        match undone {
            Some(p) => warn!(
                "receivers {:.2} apart (limit {}), removed {}, digitise {} again",
                distance,
                task.limit(),
                p.label,
                label
            ),
            None => warn!(
                "receivers {:.2} apart (limit {}), press ignored, digitise {}",
                distance,
                task.limit(),
                label
            ),
        }
    }

    fn on_task_progress(&mut self, task: &DigitisationTask, done: usize, total: usize) {
        info!("{}: {}/{}", task.category(), done, total);
    }

    fn on_task_finished(&mut self, task: &DigitisationTask) {
        info!("{} done", task.category());
    }
}

impl<O: DigitisationObserver + ?Sized> DigitisationObserver for &mut O {
    fn on_task_started(&mut self, task: &DigitisationTask, position: usize, task_count: usize) {
        (**self).on_task_started(task, position, task_count)
    }

    fn on_awaiting_point(&mut self, task: &DigitisationTask, label: &str) {
        (**self).on_awaiting_point(task, label)
    }

    fn on_point_accepted(&mut self, task: &DigitisationTask, point: &DigitisedPoint, distance: f64) {
        (**self).on_point_accepted(task, point, distance)
    }

    fn on_point_rejected(
        &mut self,
        task: &DigitisationTask,
        label: &str,
        distance: f64,
        undone: Option<&DigitisedPoint>,
    ) {
        (**self).on_point_rejected(task, label, distance, undone)
    }

    fn on_task_progress(&mut self, task: &DigitisationTask, done: usize, total: usize) {
        (**self).on_task_progress(task, done, total)
    }

    fn on_task_finished(&mut self, task: &DigitisationTask) {
        (**self).on_task_finished(task)
    }
}
