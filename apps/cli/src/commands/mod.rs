//! 命令定义和实现

pub mod checksum;
pub mod run;

pub use checksum::ChecksumCommand;
pub use run::RunCommand;
