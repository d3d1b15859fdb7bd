//! Host-side software for digitising head and helmet geometry with a
//! two-receiver electromagnetic tracker.
//!
//! One receiver is mounted on the participant's head as a reference, the
//! other sits in a stylus. Every stylus press produces one fixed-width ASCII
//! record per receiver over a serial line. Those records are decoded
//! ([`frame_decoder`]), turned into a stylus position relative to the head
//! reference ([`pose`]) and collected according to a
//! [`scheme`](scheme::DigitisationScheme) of labelled and continuous tasks
//! ([`runner`]).
//!
//! The captured points are then used to register the head onto a helmet
//! template ([`registration`], [`coregistration`]) and to place the sensors
//! in the helmet according to caliper depth measurements
//! ([`sensor_layout`]).
//!
//! The [`simulated_tracker`] speaks the same wire protocol as the device, so
//! everything here can run without hardware.

#![warn(missing_docs)]
pub mod acceptance;
pub mod args;
pub mod config;
pub mod coregistration;
pub mod frame_decoder;
pub mod observer;
pub mod point_set;
pub mod pose;
pub mod receiver_session;
pub mod registration;
pub mod runner;
pub mod scheme;
pub mod sensor_layout;
pub mod simulated_tracker;
pub mod template;
pub mod tracker_link;
pub mod units;

/// A position or direction in 3D, in whatever unit its source uses.
pub type Vec3 = nalgebra::Vector3<f64>;

/// A 3x3 matrix, used for rotations and orientation frames.
pub type Mat3 = nalgebra::Matrix3<f64>;
