use combine::easy;
use combine::stream::PointerOffset;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid {kind} \"{text}\" at position {pos}: {msg}")]
    Parse {
        kind: &'static str,
        text: String,
        pos: usize,
        msg: String,
    },
    #[error("Template \"{0}\" refers to undefined key \"{1}\"")]
    UndefinedKey(String, String),
    #[error(
        "Invalid timeout interval: \"{0}\". Timeout should be a number followed by a suffix; \
        suffix may be s for seconds, m for minutes, h for hours or d for days"
    )]
    InvalidInterval(String),
    #[error("Interval \"{0}\" is too large")]
    IntervalOverflow(String),
}

impl Error {
    /// Convert a combine error into our own type.
    // since converting combine's errors is a lifetime nightmare,
    // we just stringify the error before returning it.
    pub(crate) fn from_easy(
        kind: &'static str,
        text: &str,
        e: easy::Errors<char, &str, PointerOffset<str>>,
    ) -> Self {
        let pos = e.position.translate_position(text);
        Error::Parse {
            kind,
            text: text.to_owned(),
            pos,
            msg: format!("{}", e),
        }
    }
}
