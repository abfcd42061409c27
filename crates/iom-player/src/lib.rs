pub mod config;
pub mod decode;
pub mod device;
pub mod error;
pub mod output;
mod playback;
pub mod player;
pub mod resample;
pub mod rolling;
pub mod samples;
pub mod sniff;
pub mod source;
pub mod status;

pub use config::{PlayerConfig, QueueConfig};
pub use error::{DecodeError, QueueError, QueueResult};
pub use output::{AudioOutput, TrackInfo};
pub use player::Player;
pub use rolling::RollingQueue;
pub use source::{ByteSource, MemorySource};
pub use status::PlayerStatus;
