//! Owns the link to the tracker and turns its records into synchronised
//! samples: one reading per receiver plus the stylus position relative to the
//! head reference.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{io, thread::sleep, time::Duration};
use thiserror::Error;

use crate::{
    frame_decoder::{FrameError, RawReading},
    pose::{receiver_distance, relative_position},
    tracker_link::{Command, TrackerLink},
    Vec3,
};

/// The only receiver topology supported: one stylus, one head reference.
pub const EXPECTED_RECEIVERS: usize = 2;

/// How the session talks to the tracker. Every field has a sensible default,
/// so a config file only needs to name what differs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Receiver port the stylus is plugged into.
    pub stylus_receiver: usize,
    /// Receiver port the head reference is plugged into.
    pub head_reference: usize,
    /// Serial line speed.
    pub baud_rate: u32,
    /// How long a single read may block before it counts as a timeout.
    pub read_timeout_ms: u64,
    /// Pause after each command so the tracker can act on it.
    pub command_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stylus_receiver: 0,
            head_reference: 1,
            baud_rate: 115200,
            read_timeout_ms: 1000,
            command_delay_ms: 100,
        }
    }
}

impl SessionConfig {
    /// Read timeout as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    fn validate(&self) -> Result<(), SessionError> {
        let ports_ok = self.stylus_receiver != self.head_reference
            && self.stylus_receiver < EXPECTED_RECEIVERS
            && self.head_reference < EXPECTED_RECEIVERS;
        if ports_ok {
            Ok(())
        } else {
            Err(SessionError::ReceiverPorts {
                stylus: self.stylus_receiver,
                head: self.head_reference,
            })
        }
    }
}

/// Things that go wrong while talking to the tracker.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The transport failed outright, e.g. the device was unplugged.
    #[error("tracker i/o failed: {0}")]
    Io(io::Error),

    /// A record could not be decoded.
    #[error(transparent)]
    Format(#[from] FrameError),

    /// Nothing arrived within the read timeout.
    #[error("timed out waiting for tracker data")]
    Timeout,

    /// The link went quiet part way through a set of receiver records. The
    /// partial set has been discarded.
    #[error("only {received} of {expected} receiver records arrived")]
    PartialSet {
        /// Records read before the timeout.
        received: usize,
        /// Records that make up a full set.
        expected: usize,
    },

    /// The tracker reported a receiver count other than two.
    #[error("expected 2 receivers, found {found}; plug in both the stylus and the head reference")]
    ReceiverCount {
        /// Receivers that answered.
        found: usize,
    },

    /// The configured stylus and head reference ports are unusable.
    #[error("stylus ({stylus}) and head reference ({head}) must be two distinct ports, 0 or 1")]
    ReceiverPorts {
        /// Configured stylus port.
        stylus: usize,
        /// Configured head reference port.
        head: usize,
    },
}

impl SessionError {
    /// Whether the caller should simply try to read the next sample.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::Format(_) | SessionError::Timeout | SessionError::PartialSet { .. }
        )
    }
}

impl From<io::Error> for SessionError {
    fn from(error: io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => SessionError::Timeout,
            _ => SessionError::Io(error),
        }
    }
}

/// One reading per receiver, indexed by receiver port.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiverSet {
    readings: Vec<RawReading>,
}

impl ReceiverSet {
    /// The reading from receiver `port`, if there is one.
    pub fn get(&self, port: usize) -> Option<&RawReading> {
        self.readings.get(port)
    }

    /// Number of readings in the set.
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    /// True when the set holds no readings.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Readings in read order.
    pub fn iter(&self) -> impl Iterator<Item = &RawReading> {
        self.readings.iter()
    }
}

/// A synchronised sample, reduced to what digitisation needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Raw readings the sample was computed from.
    pub readings: ReceiverSet,
    /// Stylus tip in the head reference frame.
    pub position: Vec3,
    /// Distance between the two receivers' raw positions.
    pub receiver_distance: f64,
}

/// A live connection to a two-receiver tracker.
pub struct ReceiverSession<L: TrackerLink> {
    link: L,
    config: SessionConfig,
    receivers: usize,
}

impl<L: TrackerLink> ReceiverSession<L> {
    /// Wrap `link`. Fails if the configured receiver ports are unusable.
    pub fn new(link: L, config: SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        Ok(Self {
            link,
            config,
            receivers: EXPECTED_RECEIVERS,
        })
    }

    /// The settings this session was opened with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The underlying link.
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Give the link back.
    pub fn into_link(self) -> L {
        self.link
    }

    fn command(&mut self, command: Command) -> Result<(), SessionError> {
        self.link.send(command)?;
        if self.config.command_delay_ms > 0 {
            sleep(Duration::from_millis(self.config.command_delay_ms));
        }
        Ok(())
    }

    /// Reset the tracker, switch it to metric output and check that exactly
    /// a stylus and a head reference are connected.
    pub fn prepare_for_digitisation(&mut self) -> Result<(), SessionError> {
        self.command(Command::FactoryDefaults)?;
        self.clear_old_data()?;
        self.command(Command::MetricUnits)?;

        let found = self.count_receivers()?;
        if found != EXPECTED_RECEIVERS {
            return Err(SessionError::ReceiverCount { found });
        }
        self.receivers = found;
        info!("Tracker ready with {} receivers", found);
        Ok(())
    }

    /// Ask every active receiver for one record and count the answers.
    pub fn count_receivers(&mut self) -> Result<usize, SessionError> {
        self.command(Command::SingleRecord)?;
        let mut found = 0;
        loop {
            match self.link.read_record() {
                Ok(line) if !line.trim().is_empty() => found += 1,
                Ok(_) => {}
                Err(e) if matches!(e.kind(), io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock) => {
                    break
                }
                Err(e) => return Err(e.into()),
            }
        }
        debug!("{} receivers answered", found);
        Ok(found)
    }

    /// Drop anything buffered, so stale button presses can't be attributed
    /// to whatever is captured next.
    pub fn clear_old_data(&mut self) -> Result<(), SessionError> {
        self.link.discard_input()?;
        Ok(())
    }

    /// Block until a full set of receiver records has arrived and decode it.
    ///
    /// All records of the set are read before any is decoded, so a malformed
    /// record never leaves the rest of its set on the wire.
    pub fn read_receiver_set(&mut self) -> Result<ReceiverSet, SessionError> {
        let mut lines = Vec::with_capacity(self.receivers);
        for received in 0..self.receivers {
            match self.link.read_record() {
                Ok(line) => lines.push(line),
                Err(e) => match SessionError::from(e) {
                    SessionError::Timeout if received > 0 => {
                        warn!(
                            "Tracker went quiet after {} of {} records, discarding",
                            received, self.receivers
                        );
                        self.link.discard_input()?;
                        return Err(SessionError::PartialSet {
                            received,
                            expected: self.receivers,
                        });
                    }
                    other => return Err(other),
                },
            }
        }

        let readings = lines
            .iter()
            .map(|line| line.parse::<RawReading>())
            .collect::<Result<Vec<_>, _>>()?;
        debug!("Received {:?}", readings);
        Ok(ReceiverSet { readings })
    }

    /// Read one synchronised set and compute the stylus position relative to
    /// the head reference.
    pub fn sample(&mut self) -> Result<Sample, SessionError> {
        let readings = self.read_receiver_set()?;
        let (stylus, head) = match (
            readings.get(self.config.stylus_receiver),
            readings.get(self.config.head_reference),
        ) {
            (Some(stylus), Some(head)) => (*stylus, *head),
            _ => {
                return Err(SessionError::ReceiverCount {
                    found: readings.len(),
                })
            }
        };

        Ok(Sample {
            position: relative_position(&head, &stylus),
            receiver_distance: receiver_distance(&stylus, &head),
            readings,
        })
    }
}
