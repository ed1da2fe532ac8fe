pub mod error;
pub mod fetch;
mod options;
pub mod playlist;
pub mod poller;
pub mod reader;
pub mod store;
mod stream;
pub mod util;

pub use error::{FetchError, ParseError, StreamError, StreamResult};
pub use fetch::{HttpTransport, SegmentFetcher};
pub use options::StreamOptions;
pub use poller::PollerState;
pub use stream::{M3u8Stream, M3u8StreamBuilder, StreamHandle};
pub use util::{http::HttpClient, retry::RetryPolicy};
