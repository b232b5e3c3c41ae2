use serde::Serialize;
use serde_json::{Map, Value};

/// Marker the extraction service uses for fields it could not find.
const NOT_PROVIDED: &str = "Not provided";

// Canonical keys first, then aliases seen from older backends.
const NAME_KEYS: &[&str] = &["Name", "name"];
const EMAIL_KEYS: &[&str] = &["Email", "email"];
const GITHUB_KEYS: &[&str] = &["GitHub", "Github", "github"];
const LINKEDIN_KEYS: &[&str] = &["LinkedIn", "Linkedin", "linkedin"];
const EDUCATION_KEYS: &[&str] = &["Education", "education"];
const EXPERIENCE_KEYS: &[&str] = &["Professional Experience", "Experience", "experience"];
const PROJECT_KEYS: &[&str] = &["Projects", "projects"];
const SKILL_KEYS: &[&str] = &["Skills", "skills"];
const QA_KEYS: &[&str] = &["Questions and Answers", "Questions", "questions"];

const ROLE_KEYS: &[&str] = &["Role", "role", "Title", "title", "Position", "position"];
const EMPLOYER_KEYS: &[&str] = &["Company", "company", "Employer", "employer"];
const DURATION_KEYS: &[&str] = &["Duration", "duration", "Dates", "dates"];
const DESCRIPTION_KEYS: &[&str] = &["Description", "description", "Details", "details"];
const PROJECT_NAME_KEYS: &[&str] = &["Name", "name", "project_name", "Project Name"];
const TECHNOLOGY_KEYS: &[&str] = &["Technologies", "technologies", "Tech Stack", "tech_stack"];
const QUESTION_KEYS: &[&str] = &["Question", "question"];
const ANSWER_KEYS: &[&str] = &["Answer", "answer"];
const DEGREE_KEYS: &[&str] = &["Degree", "degree"];
const INSTITUTION_KEYS: &[&str] = &["Institution", "institution", "School", "school"];
const YEAR_KEYS: &[&str] = &["Year", "year", "Duration", "duration"];

/// Canonical view of an extracted resume.
///
/// Built by `Portfolio::from_extracted`, the only place that knows about the
/// backend's field spellings and shapes. Absent data is `None` or empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Portfolio {
    pub name: Option<String>,
    pub email: Option<String>,
    pub github: Option<String>,
    pub linkedin: Option<String>,
    pub education: Vec<String>,
    pub experience: Vec<Experience>,
    pub projects: Vec<Project>,
    pub skills: Vec<String>,
    pub questions: Vec<QuestionAnswer>,
}

/// One position. `title` may still carry "Role at Employer".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Experience {
    pub title: String,
    pub details: Vec<ExperienceDetail>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExperienceDetail {
    pub duration: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Project {
    pub name: Option<String>,
    pub description: Option<String>,
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QuestionAnswer {
    pub question: String,
    pub answer: String,
}

impl Portfolio {
    /// Normalizes an `extracted_info` object. Never fails: anything that is
    /// missing or oddly shaped degrades to an empty field.
    pub fn from_extracted(info: &Value) -> Self {
        Portfolio {
            name: lookup(info, NAME_KEYS).and_then(scalar),
            email: lookup(info, EMAIL_KEYS).and_then(scalar),
            github: lookup(info, GITHUB_KEYS).and_then(scalar),
            linkedin: lookup(info, LINKEDIN_KEYS).and_then(scalar),
            education: lookup(info, EDUCATION_KEYS)
                .map(parse_education)
                .unwrap_or_default(),
            experience: lookup(info, EXPERIENCE_KEYS)
                .map(parse_experience)
                .unwrap_or_default(),
            projects: lookup(info, PROJECT_KEYS)
                .map(parse_projects)
                .unwrap_or_default(),
            skills: lookup(info, SKILL_KEYS).map(list).unwrap_or_default(),
            questions: lookup(info, QA_KEYS).map(parse_questions).unwrap_or_default(),
        }
    }
}

/// First present, non-null value among `keys`.
fn lookup<'a>(value: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    let obj = value.as_object()?;
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .find(|v| !v.is_null())
}

fn lookup_scalar(obj: &Value, keys: &[&str]) -> Option<String> {
    lookup(obj, keys).and_then(scalar)
}

/// A single display string. One-element arrays are unwrapped.
fn scalar(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => return items.iter().find_map(scalar),
        _ => return None,
    };
    if text.is_empty() || text.eq_ignore_ascii_case(NOT_PROVIDED) {
        None
    } else {
        Some(text)
    }
}

/// A list of display strings. A bare string is a one-item list.
fn list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}

/// Like `list`, but comma-separated strings are split.
fn split_list(value: &Value) -> Vec<String> {
    match value {
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect(),
        other => list(other),
    }
}

fn parse_education(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(education_entry).collect(),
        other => education_entry(other).into_iter().collect(),
    }
}

fn education_entry(value: &Value) -> Option<String> {
    if !value.is_object() {
        return scalar(value);
    }
    let parts: Vec<String> = [DEGREE_KEYS, INSTITUTION_KEYS, YEAR_KEYS]
        .iter()
        .filter_map(|keys| lookup_scalar(value, keys))
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Accepts either an array of `{Role, Duration, Description}` records or a
/// mapping from title to a list of `{duration, description}` details.
fn parse_experience(value: &Value) -> Vec<Experience> {
    match value {
        Value::Array(items) => items.iter().filter_map(experience_record).collect(),
        Value::Object(map) => experience_mapping(map),
        _ => Vec::new(),
    }
}

fn experience_record(record: &Value) -> Option<Experience> {
    if !record.is_object() {
        return scalar(record).map(|title| Experience {
            title,
            details: Vec::new(),
        });
    }

    let role = lookup_scalar(record, ROLE_KEYS);
    let employer = lookup_scalar(record, EMPLOYER_KEYS);
    let title = match (role, employer) {
        (Some(role), Some(employer)) => format!("{role} at {employer}"),
        (Some(role), None) => role,
        (None, Some(employer)) => employer,
        (None, None) => String::new(),
    };

    let detail = experience_detail(record);
    let details: Vec<ExperienceDetail> = detail.into_iter().collect();
    if title.is_empty() && details.is_empty() {
        return None;
    }
    Some(Experience { title, details })
}

fn experience_mapping(map: &Map<String, Value>) -> Vec<Experience> {
    map.iter()
        .map(|(title, details)| Experience {
            title: title.trim().to_string(),
            details: match details {
                Value::Array(items) => items.iter().filter_map(experience_detail).collect(),
                other => experience_detail(other).into_iter().collect(),
            },
        })
        .collect()
}

fn experience_detail(value: &Value) -> Option<ExperienceDetail> {
    let detail = if value.is_object() {
        ExperienceDetail {
            duration: lookup_scalar(value, DURATION_KEYS),
            description: lookup(value, DESCRIPTION_KEYS).and_then(description_text),
        }
    } else {
        ExperienceDetail {
            duration: None,
            description: scalar(value),
        }
    };
    if detail.duration.is_none() && detail.description.is_none() {
        None
    } else {
        Some(detail)
    }
}

/// Descriptions arrive either as one string or as a list of bullet strings.
fn description_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let lines: Vec<String> = items.iter().filter_map(scalar).collect();
            if lines.is_empty() {
                None
            } else {
                Some(lines.join(" "))
            }
        }
        other => scalar(other),
    }
}

fn parse_projects(value: &Value) -> Vec<Project> {
    let Value::Array(items) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            if !item.is_object() {
                return scalar(item).map(|name| Project {
                    name: Some(name),
                    ..Project::default()
                });
            }
            let project = Project {
                name: lookup_scalar(item, PROJECT_NAME_KEYS),
                description: lookup(item, DESCRIPTION_KEYS).and_then(description_text),
                technologies: lookup(item, TECHNOLOGY_KEYS)
                    .map(split_list)
                    .unwrap_or_default(),
            };
            (project != Project::default()).then_some(project)
        })
        .collect()
}

/// Accepts an array of `{Question, Answer}` records or a question-to-answer
/// mapping.
fn parse_questions(value: &Value) -> Vec<QuestionAnswer> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| {
                let question = lookup_scalar(item, QUESTION_KEYS)?;
                Some(QuestionAnswer {
                    question,
                    answer: lookup(item, ANSWER_KEYS)
                        .and_then(description_text)
                        .unwrap_or_default(),
                })
            })
            .collect(),
        Value::Object(map) => map
            .iter()
            .filter(|(question, _)| !question.trim().is_empty())
            .map(|(question, answer)| QuestionAnswer {
                question: question.trim().to_string(),
                answer: description_text(answer).unwrap_or_default(),
            })
            .collect(),
        _ => Vec::new(),
    }
}
