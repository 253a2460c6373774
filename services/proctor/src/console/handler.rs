//! services/proctor/src/console/handler.rs
//!
//! The main control loop of a console. It reads commands line by line, drives
//! the core, and interleaves notifications the core raises on its own.

use exam_access_core::domain::{IssueRequest, Role, RotationPolicy, SessionState, SubmissionReason};
use exam_access_core::error::AccessError;
use exam_access_core::events::ExamEvent;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::console::events::on_event;
use crate::console::guard::{require_actor, require_class, require_exam, require_role};
use crate::console::protocol::{
    ClientMessage, ProgressDto, QuestionDto, ServerMessage, SubmissionDto, SupersededDto,
    TokenDto,
};
use crate::console::state::{ActiveExam, AppState, ConsoleSession};
use crate::error::{ServiceError, ServiceResult};

/// Runs one console until `reader` reaches end of input.
///
/// Replies and notifications are written to `writer` as one JSON object per line.
/// Whatever exam is open when input ends is abandoned.
pub async fn run_console<R, W>(
    app: Arc<AppState>,
    mut events: mpsc::UnboundedReceiver<ExamEvent>,
    reader: R,
    writer: W,
) -> ServiceResult<()>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!("Console ready.");
    let (outbox, outbox_rx) = mpsc::unbounded_channel::<ServerMessage>();
    let writer_task = tokio::spawn(write_outbox(writer, outbox_rx));

    let mut session = ConsoleSession::default();
    let mut lines = BufReader::new(reader).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    info!("Console input closed.");
                    break;
                };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let reply = match serde_json::from_str::<ClientMessage>(line) {
                    Ok(message) => handle_client_message(&app, &mut session, message).await,
                    Err(e) => {
                        warn!("Unreadable console line: {}", e);
                        Some(error_message(&ServiceError::Json(e)))
                    }
                };
                if let Some(reply) = reply {
                    let _ = outbox.send(reply);
                }
            }
            Some(event) = events.recv() => {
                if let Some(notice) = on_event(&app, &session, event).await {
                    let _ = outbox.send(notice);
                }
            }
        }
    }

    // --- Cleanup ---
    session.reset();
    // Submissions that raced the end of input still reach the results store.
    while let Ok(event) = events.try_recv() {
        if let Some(notice) = on_event(&app, &session, event).await {
            let _ = outbox.send(notice);
        }
    }
    drop(outbox);
    match writer_task.await {
        Ok(result) => result?,
        Err(e) => return Err(ServiceError::Internal(format!("console writer failed: {}", e))),
    }
    info!("Console closed.");
    Ok(())
}

async fn write_outbox<W>(
    mut writer: W,
    mut outbox: mpsc::UnboundedReceiver<ServerMessage>,
) -> ServiceResult<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbox.recv().await {
        let mut line = serde_json::to_string(&message)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
    }
    Ok(())
}

fn error_message(e: &ServiceError) -> ServerMessage {
    ServerMessage::Error {
        code: e.code(),
        message: e.to_string(),
    }
}

/// Handles one command and returns the reply, if the command has one of its own.
///
/// Errors never end the console; they become `error` replies.
pub async fn handle_client_message(
    app: &AppState,
    session: &mut ConsoleSession,
    message: ClientMessage,
) -> Option<ServerMessage> {
    match dispatch(app, session, message).await {
        Ok(reply) => reply,
        Err(e) => {
            if matches!(e, ServiceError::Port(_) | ServiceError::Internal(_)) {
                error!("Console command failed: {}", e);
            }
            Some(error_message(&e))
        }
    }
}

async fn dispatch(
    app: &AppState,
    session: &mut ConsoleSession,
    message: ClientMessage,
) -> ServiceResult<Option<ServerMessage>> {
    match message {
        ClientMessage::Login { actor_id } => {
            // An unknown id leaves whoever is logged in untouched.
            let actor = app.identity.resolve_actor(&actor_id).await?;
            if session.actor.is_some() {
                session.reset();
            }
            info!("{} {} logged in", actor.role.as_str(), actor.actor_id);
            let reply = ServerMessage::LoggedIn {
                actor_id: actor.actor_id.clone(),
                display_name: actor.display_name.clone(),
                role: actor.role.as_str(),
            };
            session.actor = Some(actor);
            Ok(Some(reply))
        }
        ClientMessage::Logout => {
            require_actor(session)?;
            session.reset();
            Ok(Some(ServerMessage::LoggedOut))
        }

        // --- Teacher commands ---
        ClientMessage::IssueToken {
            exam_ref,
            class_ref,
            subject_ref,
            rotate,
            rotation_seconds,
            duration_seconds,
        } => {
            require_role(session, Role::Teacher)?;
            // Refuse codes for exams that do not exist.
            app.question_bank.exam_snapshot(&exam_ref).await?;

            let mut request = IssueRequest::new(exam_ref);
            request.class_ref = class_ref;
            request.subject_ref = subject_ref;
            if rotate || rotation_seconds.is_some() {
                let seconds = rotation_seconds.unwrap_or(app.config.default_rotation_seconds);
                request = request.rotating(RotationPolicy::every(seconds));
            }
            if let Some(seconds) = duration_seconds {
                request = request.timed(seconds);
            }
            let token = app.rotator.issue(request)?;
            Ok(Some(ServerMessage::TokenIssued {
                token: TokenDto::from(&token),
            }))
        }
        ClientMessage::RotateToken { token_id } => {
            require_role(session, Role::Teacher)?;
            // Announced through the rotation event, like scheduled rotations.
            app.rotator.rotate_now(token_id)?;
            Ok(None)
        }
        ClientMessage::DeactivateToken { token_id } => {
            require_role(session, Role::Teacher)?;
            app.rotator.deactivate(token_id)?;
            Ok(Some(ServerMessage::TokenDeactivated { token_id }))
        }
        ClientMessage::ReactivateToken { token_id, rearm } => {
            require_role(session, Role::Teacher)?;
            let token = app.rotator.reactivate(token_id)?;
            let rearmed = rearm && token.rotates();
            if rearmed {
                app.rotator.arm(token_id)?;
            }
            Ok(Some(ServerMessage::TokenReactivated {
                token: TokenDto::from(&token),
                rearmed,
            }))
        }
        ClientMessage::ListTokens { exam_ref } => {
            require_role(session, Role::Teacher)?;
            let tokens = app
                .registry()
                .tokens_for_exam(&exam_ref)
                .iter()
                .map(TokenDto::from)
                .collect();
            Ok(Some(ServerMessage::Tokens { exam_ref, tokens }))
        }
        ClientMessage::TokenHistory { token_id } => {
            require_role(session, Role::Teacher)?;
            let history = app
                .registry()
                .history(token_id)?
                .iter()
                .map(SupersededDto::from)
                .collect();
            Ok(Some(ServerMessage::TokenHistory { token_id, history }))
        }
        ClientMessage::ListResults { exam_ref } => {
            require_role(session, Role::Teacher)?;
            let submissions = app
                .results
                .submissions_for_exam(&exam_ref)
                .await?
                .iter()
                .map(SubmissionDto::from)
                .collect();
            Ok(Some(ServerMessage::Results {
                exam_ref,
                submissions,
            }))
        }

        // --- Student commands ---
        ClientMessage::EnterExam { code } => enter_exam(app, session, &code).await.map(Some),
        ClientMessage::Answer { question_id, value } => {
            let exam = require_exam(session)?;
            exam.controller.answer(&question_id, value.into())?;
            Ok(Some(progress(exam)))
        }
        ClientMessage::ClearAnswer { question_id } => {
            let exam = require_exam(session)?;
            exam.controller.clear_answer(&question_id)?;
            Ok(Some(progress(exam)))
        }
        ClientMessage::ToggleFlag { question_id } => {
            let exam = require_exam(session)?;
            exam.controller.toggle_flag(&question_id)?;
            Ok(Some(progress(exam)))
        }
        ClientMessage::GoTo { index } => {
            let exam = require_exam(session)?;
            exam.controller.go_to(index)?;
            Ok(Some(progress(exam)))
        }
        ClientMessage::Next => {
            let exam = require_exam(session)?;
            exam.controller.next()?;
            Ok(Some(progress(exam)))
        }
        ClientMessage::Previous => {
            let exam = require_exam(session)?;
            exam.controller.previous()?;
            Ok(Some(progress(exam)))
        }
        ClientMessage::RequestSubmit => {
            let exam = require_exam(session)?;
            match exam.controller.request_submit()? {
                SessionState::Submitting => {
                    let view = exam.controller.projection();
                    Ok(Some(ServerMessage::SubmitPending {
                        unanswered: view
                            .unanswered()
                            .map(|q| q.question_id.clone())
                            .collect(),
                        remaining_seconds: view.remaining_seconds,
                    }))
                }
                _ => Ok(Some(progress(exam))),
            }
        }
        ClientMessage::ConfirmSubmit => {
            let exam = require_exam(session)?;
            let result = exam.controller.confirm_submit()?;
            if result.reason != SubmissionReason::Manual {
                // The countdown got there first and has already announced it.
                return Ok(None);
            }
            app.results.save_submission(result.clone()).await?;
            Ok(Some(ServerMessage::ExamSubmitted {
                message: result.reason.message().to_string(),
                result: SubmissionDto::from(&result),
            }))
        }
        ClientMessage::CancelSubmit => {
            let exam = require_exam(session)?;
            exam.controller.cancel_submit()?;
            Ok(Some(ServerMessage::SubmitCancelled {
                progress: ProgressDto::from(&exam.controller.projection()),
            }))
        }
        ClientMessage::Status => {
            let exam = require_exam(session)?;
            Ok(Some(progress(exam)))
        }
        ClientMessage::LeaveExam => {
            require_exam(session)?;
            let (session_id, state) = session.leave_exam().ok_or(ServiceError::NoExam)?;
            Ok(Some(ServerMessage::ExamLeft {
                session_id,
                state: state.as_str(),
            }))
        }
    }
}

/// Admits a student by code and starts the attempt.
async fn enter_exam(
    app: &AppState,
    session: &mut ConsoleSession,
    code: &str,
) -> ServiceResult<ServerMessage> {
    let actor = require_role(session, Role::Student)?.clone();
    if session.exam_in_progress() {
        return Err(AccessError::InvalidState {
            operation: "enter an exam",
            state: SessionState::InProgress.as_str(),
        }
        .into());
    }

    let presented = code.trim().to_ascii_uppercase();
    let token = match app.registry().admit(&presented, app.scheduler.now()) {
        Ok(token) => token,
        Err(e) => match e.reject_reason() {
            Some(reason) => {
                info!(
                    "Entry refused for student {}: {}",
                    actor.actor_id,
                    reason.as_str()
                );
                return Ok(ServerMessage::EntryRejected {
                    reason: reason.as_str(),
                    message: reason.message(),
                });
            }
            None => return Err(e.into()),
        },
    };
    require_class(&actor, &token)?;

    let snapshot = app.question_bank.exam_snapshot(&token.exam_ref).await?;
    let duration = token.attempt_duration(snapshot.duration_seconds);
    let questions: Vec<QuestionDto> = snapshot.questions.iter().map(QuestionDto::from).collect();
    let title = snapshot.title.clone();

    let controller = app.new_controller(&actor.actor_id);
    controller.start(snapshot, duration)?;

    // A finished attempt is replaced by the new one.
    session.leave_exam();
    let exam = ActiveExam { controller };
    let reply = ServerMessage::ExamStarted {
        session_id: exam.controller.session_id(),
        exam_ref: token.exam_ref,
        title,
        questions,
        progress: ProgressDto::from(&exam.controller.projection()),
    };
    session.exam = Some(exam);
    Ok(reply)
}

fn progress(exam: &ActiveExam) -> ServerMessage {
    ServerMessage::Progress {
        progress: ProgressDto::from(&exam.controller.projection()),
    }
}
