pub mod fetcher;

pub use fetcher::{FetchedPlaylist, UpstreamFetcher};
