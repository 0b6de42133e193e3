//! Rolling per-timeframe counters, bucketed on the trendrr epoch and owned
//! by a single background task so reads and writes never race.
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]
#![deny(unsafe_code)]

mod error;
mod stats;
mod timeamount;

pub use error::StatsError;
pub use stats::{LoggingPersister, Persister, Stats, StatsSave};
pub use timeamount::{trendrr_epoch, TimeAmount, Timeframe};
