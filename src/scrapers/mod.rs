pub mod browser;
pub mod filter;
pub mod normalize;
pub mod stagehand;
pub mod traits;
pub mod types;
pub mod workflow;

pub use stagehand::{StagehandClient, StagehandLauncher};
pub use traits::{BrowserAutomation, BrowserLauncher, BrowserSessionInfo};
pub use types::SearchParams;
pub use workflow::ExtractionWorkflow;
