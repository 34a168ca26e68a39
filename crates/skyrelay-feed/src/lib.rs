pub mod decode;
pub mod opensky;

use std::future::Future;

use skyrelay_types::RelayError;

pub use decode::{decode_states, FeedSnapshot};
pub use opensky::{BoundingBox, Credentials, OpenSkyClient, OpenSkyConfig};

/// A source of full aircraft-state polls.
///
/// Uses RPITIT with an explicit `+ Send` bound so the relay can await it
/// from a spawned task.
pub trait StateFeed: Send + Sync + 'static {
    /// Fetch and decode the current state of every aircraft the feed covers.
    /// A decode failure fails the whole poll; callers never see partial rows.
    fn fetch(&self) -> impl Future<Output = Result<FeedSnapshot, RelayError>> + Send;
}
