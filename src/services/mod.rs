//! Services shared by the pipeline stages and front-ends

pub mod format;
pub mod io;
pub mod progress;

pub use format::OutputFormatHandler;
pub use io::ImageIOService;
pub use progress::{
    BatchProgressStats, CompositeObserver, ConsoleObserver, NoOpObserver, QueueObserver,
    TracingObserver,
};
