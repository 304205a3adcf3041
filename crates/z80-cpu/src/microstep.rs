/// Tagged identifier for the next micro-step the scheduler should run.
///
/// Stands in for the reference implementation's raw function-pointer slots:
/// an exhaustive match over this enum can never "forget" a variant, so the
/// only way the scheduler starves is the documented one (no step armed on a
/// rising edge), not an accidental gap in the dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicroStep {
    /// A rising or falling edge with nothing useful to do, but not starvation.
    Idle,

    M1T1Rise,
    M1T1Fall,
    M1T2Fall,
    M1T3Rise,
    M1T3Fall,
    M1T4Fall,

    MemReadT1Rise,
    MemReadT1Fall,
    MemReadT2Rise,
    MemReadT2Fall,

    MemWriteT1Rise,
    MemWriteT1Fall,
    MemWriteT2Fall,
    MemWriteT3Fall,

    PrepReadOperands,
    PrepPrefixedRead,
    FinalisePrefixedRead,
    Execute,
    FetchCycleStart,
}
