//! GRBL protocol support
//!
//! Response classification, telemetry parsing, error/alarm descriptions and
//! outbound line preparation.

pub mod error_decoder;
pub mod response_parser;
pub mod status_parser;
pub mod utils;

pub use error_decoder::{describe_alarm, describe_error, format_alarm, format_error};
pub use response_parser::{ErrorKind, GrblResponse};
pub use status_parser::{BufferState, StatusParser, StatusReport};
pub use utils::{is_comment_or_blank, prepare_line, split_lines, strip_comments};
