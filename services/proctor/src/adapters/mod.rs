pub mod fixtures;
pub mod question_bank;
pub mod results;
pub mod roster;

pub use fixtures::Fixtures;
pub use question_bank::FixtureQuestionBank;
pub use results::InMemoryResultsStore;
pub use roster::RosterIdentity;
