pub mod destroy;
pub mod ip;
pub mod list;
pub mod snapshot;
pub mod up;
