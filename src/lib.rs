//! Support library for the Mirantis OpenStack integration tests
//!
//! The tests drive an already deployed cloud and wait for its state to
//! change. [`wait`] provides the polling primitive all of them rely on;
//! the remaining modules contain the helpers the test scenarios are
//! built from. External systems are only reached through closures and
//! the traits [`remote::Remote`] and [`migration::ComputeApi`].

pub mod config;
pub mod error;
pub mod ironic;
pub mod migration;
pub mod neutron;
pub mod rabbitmq;
pub mod remote;
pub mod wait;

pub use error::{Error, Result, WaitError};
pub use remote::{LocalShell, Remote, RemoteResult};
pub use wait::{wait, Tolerated, Truthy, WaitSpec};
