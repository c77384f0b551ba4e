mod epic;
mod ids;
mod project;
mod sprint;

pub use epic::*;
pub use ids::*;
pub use project::*;
pub use sprint::*;
