//! services/proctor/src/adapters/fixtures.rs
//!
//! Loads the school roster and the exam bank from a JSON fixture file.
//!
//! The file has the shape `{ "actors": [...], "exams": [...] }`. Records are
//! deserialized into "impure" structs that mirror the file and are then
//! converted into core domain types.

use exam_access_core::domain::{
    Actor, ExamSnapshot, QuestionKind, QuestionSnapshot, Role,
};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::{ServiceError, ServiceResult};

/// Everything the in-memory adapters are seeded with.
#[derive(Debug, Clone, Default)]
pub struct Fixtures {
    pub actors: Vec<Actor>,
    pub exams: Vec<ExamSnapshot>,
}

impl Fixtures {
    pub fn load(path: &Path) -> ServiceResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let fixtures = Self::parse(&raw)?;
        info!(
            "Loaded {} actors and {} exams from {}",
            fixtures.actors.len(),
            fixtures.exams.len(),
            path.display()
        );
        Ok(fixtures)
    }

    pub fn parse(raw: &str) -> ServiceResult<Self> {
        let file: FixtureFile = serde_json::from_str(raw)?;

        let mut actor_ids = HashSet::new();
        let actors = file
            .actors
            .into_iter()
            .map(|record| {
                if !actor_ids.insert(record.actor_id.clone()) {
                    return Err(ServiceError::Fixture(format!(
                        "duplicate actor '{}'",
                        record.actor_id
                    )));
                }
                Ok(record.to_domain())
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        let mut exam_refs = HashSet::new();
        let exams = file
            .exams
            .into_iter()
            .map(|record| {
                if !exam_refs.insert(record.exam_ref.clone()) {
                    return Err(ServiceError::Fixture(format!(
                        "duplicate exam '{}'",
                        record.exam_ref
                    )));
                }
                record.to_domain()
            })
            .collect::<ServiceResult<Vec<_>>>()?;

        Ok(Self { actors, exams })
    }
}

//=========================================================================================
// "Impure" Fixture Record Structs
//=========================================================================================

#[derive(Deserialize)]
struct FixtureFile {
    #[serde(default)]
    actors: Vec<ActorRecord>,
    #[serde(default)]
    exams: Vec<ExamRecord>,
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum RoleRecord {
    Teacher,
    Student,
}

#[derive(Deserialize)]
struct ActorRecord {
    actor_id: String,
    display_name: String,
    role: RoleRecord,
    #[serde(default)]
    class_ref: Option<String>,
}
impl ActorRecord {
    fn to_domain(self) -> Actor {
        Actor {
            actor_id: self.actor_id,
            display_name: self.display_name,
            role: match self.role {
                RoleRecord::Teacher => Role::Teacher,
                RoleRecord::Student => Role::Student,
            },
            class_ref: self.class_ref,
        }
    }
}

#[derive(Deserialize, Clone, Copy, Default)]
#[serde(rename_all = "snake_case")]
enum KindRecord {
    #[default]
    FreeText,
    SingleChoice,
    MultipleChoice,
}

#[derive(Deserialize)]
struct QuestionRecord {
    id: String,
    prompt: String,
    #[serde(default)]
    kind: KindRecord,
    #[serde(default)]
    options: Vec<String>,
}
impl QuestionRecord {
    fn to_domain(self, exam_ref: &str) -> ServiceResult<QuestionSnapshot> {
        let kind = match self.kind {
            KindRecord::FreeText => QuestionKind::FreeText,
            KindRecord::SingleChoice | KindRecord::MultipleChoice if self.options.is_empty() => {
                return Err(ServiceError::Fixture(format!(
                    "question '{}' of exam '{}' is a choice question without options",
                    self.id, exam_ref
                )));
            }
            KindRecord::SingleChoice => QuestionKind::SingleChoice {
                options: self.options,
            },
            KindRecord::MultipleChoice => QuestionKind::MultipleChoice {
                options: self.options,
            },
        };
        Ok(QuestionSnapshot {
            id: self.id,
            prompt: self.prompt,
            kind,
        })
    }
}

#[derive(Deserialize)]
struct ExamRecord {
    exam_ref: String,
    title: String,
    duration_seconds: u32,
    questions: Vec<QuestionRecord>,
}
impl ExamRecord {
    fn to_domain(self) -> ServiceResult<ExamSnapshot> {
        let mut ids = HashSet::new();
        if let Some(duplicate) = self.questions.iter().find(|q| !ids.insert(q.id.as_str())) {
            return Err(ServiceError::Fixture(format!(
                "exam '{}' repeats question '{}'",
                self.exam_ref, duplicate.id
            )));
        }
        let exam_ref = self.exam_ref;
        let questions = self
            .questions
            .into_iter()
            .map(|q| q.to_domain(&exam_ref))
            .collect::<ServiceResult<Vec<_>>>()?;
        Ok(ExamSnapshot {
            exam_ref,
            title: self.title,
            duration_seconds: self.duration_seconds,
            questions,
        })
    }
}
