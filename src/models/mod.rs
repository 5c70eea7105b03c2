pub mod attachment;
pub mod contact;
pub mod loaders;
pub mod record;

pub use attachment::{AcquisitionStrategy, Attachment, AttachmentKind};
pub use contact::Contact;
pub use loaders::{latest_table, load_records, parse_records};
pub use record::{normalize_branch, Record, AGE_LIMIT};
