pub mod admission;
pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod ffmpeg;
pub mod logging;
pub mod pipeline;
pub mod server;
pub mod uri;
pub mod workspace;

pub use error::ThumbError;
pub use pipeline::ThumbnailPipeline;
