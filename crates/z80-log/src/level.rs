/// Log levels, each rendered as a fixed bracketed prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Error,
    Msg,
    Warn,
    Debug,
}

impl Level {
    #[must_use]
    pub fn prefix(self) -> &'static str {
        match self {
            Level::Error => "[ERR] ",
            Level::Msg => "[MSG] ",
            Level::Warn => "[WARN] ",
            Level::Debug => "[DEBUG] ",
        }
    }
}
