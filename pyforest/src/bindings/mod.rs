// Python bindings module
// Each file contains one or more PyO3 #[pyclass] definitions

pub mod change;
pub mod detector;
pub mod tree_record;

// Re-export all bindings for convenience
pub use change::PyChangeAnalyzer;
pub use detector::PyTreeDetector;
pub use tree_record::PyTreeRecord;
