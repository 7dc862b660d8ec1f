pub mod backend;
pub mod ftp;
pub mod sftp;
pub mod sim;

pub use backend::{RemoteBackend, RemoteConfig, RemoteEntry};
pub use ftp::FtpBackend;
pub use sftp::SftpBackend;
pub use sim::{SimBackend, SimHandle};
