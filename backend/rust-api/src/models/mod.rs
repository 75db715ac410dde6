pub mod attempt;
pub mod processing;
pub mod question;
pub mod session;
pub mod trophy;

pub use attempt::{AttemptBackend, AttemptRecord, AttemptState};
pub use question::{AnswerOption, Question};
pub use session::{DerivedStats, SessionStatus};
pub use trophy::{TrophyEvaluation, TrophyType};
