use std::{
    io::{self, BufRead, Write},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use log::warn;
use opm_digitise::{
    observer::{DigitisationObserver, LogObserver},
    point_set::DigitisedPoint,
    scheme::DigitisationTask,
};

/// Tells the operator what to press next on stdout, and between tasks asks
/// whether to carry on.
pub struct PromptObserver {
    log: LogObserver,
    stop: Arc<AtomicBool>,
    interactive: bool,
    more_tasks: bool,
}

impl PromptObserver {
    pub fn new(stop: Arc<AtomicBool>, interactive: bool) -> Self {
        Self {
            log: LogObserver,
            stop,
            interactive,
            more_tasks: false,
        }
    }

    fn ask_to_continue(&mut self, finished: &DigitisationTask) {
        print!(
            "{} done. Press Enter to continue, or q then Enter to stop: ",
            finished.category()
        );
        if let Err(e) = io::stdout().flush() {
            warn!("Could not flush stdout: {}", e);
        }
        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) if answer.trim().eq_ignore_ascii_case("q") => {
                self.stop.store(true, Ordering::SeqCst)
            }
            Ok(_) => {}
            Err(e) => warn!("Could not read the answer, carrying on: {}", e),
        }
    }
}

impl DigitisationObserver for PromptObserver {
    fn on_task_started(&mut self, task: &DigitisationTask, position: usize, task_count: usize) {
        self.log.on_task_started(task, position, task_count);
        self.more_tasks = position + 1 < task_count;
    }

    fn on_awaiting_point(&mut self, task: &DigitisationTask, label: &str) {
        println!("Please digitise {}", label);
        self.log.on_awaiting_point(task, label);
    }

    fn on_point_accepted(&mut self, task: &DigitisationTask, point: &DigitisedPoint, distance: f64) {
        self.log.on_point_accepted(task, point, distance);
    }

    fn on_point_rejected(
        &mut self,
        task: &DigitisationTask,
        label: &str,
        distance: f64,
        undone: Option<&DigitisedPoint>,
    ) {
        println!("Stylus too far from the head reference.");
        self.log.on_point_rejected(task, label, distance, undone);
    }

    fn on_task_progress(&mut self, task: &DigitisationTask, done: usize, total: usize) {
        self.log.on_task_progress(task, done, total);
    }

    fn on_task_finished(&mut self, task: &DigitisationTask) {
        self.log.on_task_finished(task);
        if self.interactive && self.more_tasks {
            self.ask_to_continue(task);
        }
    }
}
