pub mod job;
pub mod media;
pub mod search;

pub use job::*;
pub use media::*;
pub use search::*;
