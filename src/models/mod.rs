pub mod plan;
pub mod sync;
pub mod workout;

pub use plan::{OverrideAuthor, PlanItem, PlanOverride};
pub use sync::SyncState;
pub use workout::{Workout, WorkoutSource, WorkoutType};
