//! File-backed chat platform used by the CLI.

pub mod directory;
pub mod file;

pub use directory::DirectoryFile;
pub use file::FilePlatform;
