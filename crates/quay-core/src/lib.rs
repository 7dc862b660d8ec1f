pub mod error;
pub mod events;
pub mod listing;
pub mod local;
pub mod manager;
pub mod session;
pub mod transfer;

pub use error::CoreError;
pub use events::{Event, EventBus};
pub use listing::{join_path, navigate_path, DirCache, FileEntry, Side};
pub use manager::{DirectoryPicker, FileManager};
pub use session::{
    ConnectionConfig, ConnectionInfo, ConnectionManager, ConnectionState, Protocol,
};
pub use transfer::{Direction, TransferId, TransferItem, TransferQueue, TransferStatus};
