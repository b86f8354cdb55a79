pub mod contrast;
pub mod probe;

pub use contrast::{ContrastPolicy, TextColorDecision};
pub use probe::{DominantColorProbe, ProbedColor, RemotePaletteExtractor};
