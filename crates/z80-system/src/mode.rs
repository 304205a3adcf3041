/// The orchestrator's top-level run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Terminal state: the main loop exits once this is reached.
    None,
    Normal,
    Test,
    Decompile,
}
