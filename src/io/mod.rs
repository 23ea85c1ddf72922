pub mod backend;
pub mod config_io;
pub mod delim;
pub mod editor;
pub mod lock;
pub mod logging;
pub mod recovery;
pub mod sqlite;
pub mod state;
