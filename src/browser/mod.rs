mod discovery;
mod driver;
mod launcher;
mod session;

pub use discovery::{discover_all_browsers, BrowserInfo, BrowserType};
pub use driver::{CdpPageDriver, PageDriver};
pub use session::{SessionManager, SessionStatus};
