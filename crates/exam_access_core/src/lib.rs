pub mod clock;
pub mod codegen;
pub mod domain;
pub mod error;
pub mod events;
pub mod ports;
pub mod projector;
pub mod registry;
pub mod rotation;
pub mod session;

pub use clock::{Clock, ManualClock, Scheduler, SystemClock, TimerControl, TimerId, TimerTask};
pub use codegen::RandomCodeGenerator;
pub use domain::{
    AccessToken, Actor, Admission, AnswerValue, ExamSnapshot, IssueRequest, QuestionId,
    QuestionKind, QuestionSnapshot, RejectReason, Role, RotationPolicy, SessionId, SessionState,
    SubmissionReason, SubmissionResult, SupersededValue, TokenId,
};
pub use error::{AccessError, AccessResult};
pub use events::{ExamEvent, NoopSink, RecordingSink};
pub use ports::{
    CodeGenerator, EventSink, IdentityService, PortError, PortResult, QuestionBankService,
    ResultsStore,
};
pub use projector::{QuestionStatus, SessionProjection};
pub use registry::TokenRegistry;
pub use rotation::TokenRotator;
pub use session::{ExamSession, ExamSessionController};
