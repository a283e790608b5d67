//! Remote I/O: downloading source images and requesting video frames.

mod http_client;
mod remote;

pub use http_client::{
    create_http_client, HttpFetcher, HttpFrameCapture, CAPTURE_API_KEY_HEADER,
    DEFAULT_FETCH_TIMEOUT,
};
pub use remote::{FrameCapture, RemoteFetch};
