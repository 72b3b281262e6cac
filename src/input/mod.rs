pub mod status_file;

pub use status_file::{parse_status, read_status, ServerStatus, SERVERDATA_FILE};
