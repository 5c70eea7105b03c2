pub mod record_loader;

pub use record_loader::{latest_table, load_records, parse_records};
