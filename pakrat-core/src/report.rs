/// Narrow reporting surface handed to the extractors by reference.
///
/// Verbose gating is the implementation's choice; core code calls `verbose`
/// for per-file notes and `info` for the summary lines it always wants shown.
pub trait Reporter {
    fn info(&self, msg: &str);
    fn verbose(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// A reporter that swallows everything. Used in tests.
pub struct NullReporter;

impl Reporter for NullReporter {
    fn info(&self, _msg: &str) {}
    fn verbose(&self, _msg: &str) {}
    fn error(&self, _msg: &str) {}
}
