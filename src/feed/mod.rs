// Push channel (protocol, session state machine, transport) and bulk fetch

pub mod client;
pub mod protocol;
pub mod session;
pub mod snapshot;
mod stats;

pub use client::run_feed;
pub use protocol::{
    encode_frame, parse_frame, ClientMessage, FeedMessage, FrameError, UpstreamStatus,
};
pub use session::{ConnectionState, FeedSession, FrameOutcome};
pub use snapshot::{BulkSnapshot, FetchError, HistoryQuery, SnapshotClient, SnapshotResponse};
pub use stats::{FeedStats, FeedStatsSnapshot};
