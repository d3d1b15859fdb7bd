//! An in-memory tracker that speaks the same wire protocol as the real one.
//! Useful for dry runs without hardware and for driving the session, runner
//! and state machine in tests.

use rand::prelude::*;
use std::{collections::VecDeque, io};

use crate::{
    frame_decoder::RawReading,
    tracker_link::{Command, TrackerLink},
};

/// One event in the simulated tracker's future.
#[derive(Debug, Clone)]
enum Scripted {
    /// The operator presses the stylus button with both receivers at these
    /// readings.
    Press { head: RawReading, stylus: RawReading },
    /// Arbitrary lines arrive, as if sent by a misbehaving device.
    Lines(Vec<String>),
}

/// A scripted tracker with a stylus on one port and a head reference on the
/// other.
///
/// Each stylus press is only delivered once every record already on the wire
/// has been read. After a command is sent, the link goes quiet (reads time
/// out) once the command's response has been drained, just like the real
/// device does when nobody is pressing the button.
#[derive(Debug, Clone)]
pub struct SimulatedTracker {
    receivers: usize,
    stylus_port: usize,
    script: VecDeque<Scripted>,
    wire: VecDeque<String>,
    quiet: bool,
    idle: (RawReading, RawReading),
    sent: Vec<Command>,
    discards: usize,
}

impl Default for SimulatedTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedTracker {
    /// Two receivers, the stylus on port 0 and the head reference on port 1,
    /// and nothing scripted yet.
    pub fn new() -> Self {
        let origin = reading(0, [0.0; 3], [0.0; 3]);
        Self {
            receivers: 2,
            stylus_port: 0,
            script: VecDeque::new(),
            wire: VecDeque::new(),
            quiet: false,
            idle: (origin, origin),
            sent: Vec::new(),
            discards: 0,
        }
    }

    /// Pretend a different number of receivers is plugged in. Only the first
    /// two carry meaningful data.
    pub fn with_receivers(mut self, receivers: usize) -> Self {
        self.receivers = receivers;
        self
    }

    /// Put the stylus on port 1 and the head reference on port 0.
    pub fn with_swapped_ports(mut self) -> Self {
        self.stylus_port = 1;
        self
    }

    /// Queue a stylus press.
    pub fn press(mut self, head: RawReading, stylus: RawReading) -> Self {
        self.script.push_back(Scripted::Press { head, stylus });
        self
    }

    /// Queue a stylus press with the stylus at `stylus` and the head reference
    /// at `head`, both unrotated.
    pub fn press_at(self, head: [f64; 3], stylus: [f64; 3]) -> Self {
        self.press(reading(0, head, [0.0; 3]), reading(0, stylus, [0.0; 3]))
    }

    /// Queue raw lines to be delivered in place of a press.
    pub fn garbled<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.script
            .push_back(Scripted::Lines(lines.into_iter().map(Into::into).collect()));
        self
    }

    /// Put lines on the wire right now, as if left over from earlier presses.
    pub fn stale<S: Into<String>>(mut self, lines: impl IntoIterator<Item = S>) -> Self {
        self.wire.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Queue `count` presses at random positions around a random head pose.
    /// Roughly `out_of_range` of them land further than `limit` from the head
    /// reference, the rest within it.
    pub fn with_random_presses(mut self, count: usize, limit: f64, out_of_range: f64) -> Self {
        let mut rng = thread_rng();
        for _ in 0..count {
            let head = reading(
                0,
                [
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                ],
                [
                    rng.gen_range(-180.0..180.0),
                    rng.gen_range(-90.0..90.0),
                    rng.gen_range(-180.0..180.0),
                ],
            );
            let range = if rng.gen_bool(out_of_range.clamp(0.0, 1.0)) {
                rng.gen_range(limit * 1.1..limit * 2.0)
            } else {
                rng.gen_range(0.1 * limit..0.9 * limit)
            };
            let direction = random_unit_vector(&mut rng);
            let stylus = reading(
                0,
                [
                    head.x + direction[0] * range,
                    head.y + direction[1] * range,
                    head.z + direction[2] * range,
                ],
                [0.0; 3],
            );
            self.script.push_back(Scripted::Press { head, stylus });
        }
        self
    }

    /// Every command sent so far, in order.
    pub fn sent_commands(&self) -> &[Command] {
        &self.sent
    }

    /// How many times the input has been discarded.
    pub fn discard_count(&self) -> usize {
        self.discards
    }

    /// Number of scripted events not yet delivered.
    pub fn remaining(&self) -> usize {
        self.script.len()
    }

    fn emit(&mut self, head: RawReading, stylus: RawReading) {
        for port in 0..self.receivers {
            let source = match port {
                p if p == self.stylus_port => stylus,
                0 | 1 => head,
                _ => self.idle.1,
            };
            let record = RawReading {
                header: port as i32 + 1,
                ..source
            };
            self.wire.push_back(record.to_string());
        }
    }
}

fn reading(header: i32, position: [f64; 3], angles: [f64; 3]) -> RawReading {
    RawReading {
        header,
        x: position[0],
        y: position[1],
        z: position[2],
        azimuth: angles[0],
        elevation: angles[1],
        roll: angles[2],
    }
}

fn random_unit_vector(rng: &mut impl Rng) -> [f64; 3] {
    loop {
        let v: [f64; 3] = [
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        ];
        let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
        if norm > 1e-3 && norm <= 1.0 {
            return [v[0] / norm, v[1] / norm, v[2] / norm];
        }
    }
}

impl TrackerLink for SimulatedTracker {
    fn send(&mut self, command: Command) -> io::Result<()> {
        self.sent.push(command);
        if command == Command::SingleRecord {
            let (head, stylus) = self.idle;
            self.emit(head, stylus);
        }
        self.quiet = true;
        Ok(())
    }

    fn read_record(&mut self) -> io::Result<String> {
        if let Some(line) = self.wire.pop_front() {
            return Ok(line);
        }
        if self.quiet {
            self.quiet = false;
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        match self.script.pop_front() {
            Some(Scripted::Press { head, stylus }) => self.emit(head, stylus),
            Some(Scripted::Lines(lines)) => self.wire.extend(lines),
            None => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "simulated session has no presses left",
                ))
            }
        }
        self.wire.pop_front().ok_or_else(|| {
            io::Error::new(io::ErrorKind::TimedOut, "scripted event produced no data")
        })
    }

    fn discard_input(&mut self) -> io::Result<()> {
        self.wire.clear();
        self.discards += 1;
        Ok(())
    }
}
