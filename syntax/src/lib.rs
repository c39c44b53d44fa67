//! Parsers for the two small string formats used in job definitions:
//! filename templates with `{axis}` placeholders, and wall-clock intervals
//! such as `30m` used for job timeouts.

mod error;
pub use error::Error;

mod template;
pub use template::{format_template, parse_template, Piece};

mod interval;
pub use interval::{Interval, TimeUnit};
