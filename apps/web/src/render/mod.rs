//! HTML views. Pure functions of their inputs: nothing here touches the
//! store or the network.

use askama::Template;

use crate::models::resume::{Experience, Portfolio, Project, QuestionAnswer};

pub const NAME_PLACEHOLDER: &str = "Name Not Provided";
pub const NO_DATA_MESSAGE: &str = "No data available. Please upload a resume first.";
const TITLE_PLACEHOLDER: &str = "Portfolio";
const DESCRIPTION_PLACEHOLDER: &str = "a professional";
const PROJECT_PLACEHOLDER: &str = "Untitled project";

/// Sections longer than this become scrollable.
const SCROLL_THRESHOLD: usize = 3;

/// Outcome of the last publish attempt, as shown under the portfolio.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishView {
    pub url: Option<String>,
    pub next_steps: Vec<String>,
    pub error: Option<String>,
}

pub struct ProfileView {
    pub name: String,
    pub initials: String,
    pub github: String,
    pub linkedin: String,
    pub email: String,
}

pub struct ExperienceView {
    pub job_title: String,
    pub employer: String,
    pub details: Vec<DetailView>,
}

pub struct DetailView {
    pub duration: String,
    pub description: String,
}

pub struct ProjectView {
    pub name: String,
    pub description: String,
    pub technologies: String,
}

#[derive(Template)]
#[template(path = "portfolio.html")]
pub struct PortfolioPage {
    pub page_title: String,
    pub meta_name: String,
    pub profile: ProfileView,
    pub experience: Vec<ExperienceView>,
    pub education: Vec<String>,
    pub projects: Vec<ProjectView>,
    pub skills: Vec<String>,
    pub questions: Vec<QuestionAnswer>,
    pub scroll: bool,
    pub publish_action: String,
    pub publish_url: String,
    pub publish_error: String,
    pub next_steps: Vec<String>,
}

impl PortfolioPage {
    pub fn new(username: &str, portfolio: &Portfolio, publish: &PublishView) -> Self {
        let name = portfolio.name.clone();

        let experience: Vec<ExperienceView> =
            portfolio.experience.iter().map(experience_view).collect();
        let projects: Vec<ProjectView> = portfolio.projects.iter().map(project_view).collect();

        let scroll = [
            experience.len(),
            portfolio.education.len(),
            projects.len(),
            portfolio.questions.len(),
        ]
        .iter()
        .any(|n| *n > SCROLL_THRESHOLD);

        PortfolioPage {
            page_title: format!(
                "{} | Resume",
                name.as_deref().unwrap_or(TITLE_PLACEHOLDER)
            ),
            meta_name: name
                .clone()
                .unwrap_or_else(|| DESCRIPTION_PLACEHOLDER.to_string()),
            profile: ProfileView {
                initials: name.as_deref().map(initials).unwrap_or_default(),
                name: name.unwrap_or_else(|| NAME_PLACEHOLDER.to_string()),
                github: portfolio.github.as_deref().and_then(safe_link).unwrap_or_default(),
                linkedin: portfolio
                    .linkedin
                    .as_deref()
                    .and_then(safe_link)
                    .unwrap_or_default(),
                email: portfolio
                    .email
                    .as_deref()
                    .filter(|e| e.contains('@') && !e.contains(char::is_whitespace))
                    .map(String::from)
                    .unwrap_or_default(),
            },
            experience,
            education: portfolio.education.clone(),
            projects,
            skills: portfolio.skills.clone(),
            questions: portfolio.questions.clone(),
            scroll,
            publish_action: publish_path(username),
            publish_url: publish.url.as_deref().and_then(safe_link).unwrap_or_default(),
            publish_error: publish.error.clone().unwrap_or_default(),
            next_steps: publish.next_steps.clone(),
        }
    }
}

#[derive(Template, Default)]
#[template(path = "upload.html")]
pub struct UploadPage {
    pub username: String,
    pub filename: String,
    pub error: String,
    pub message: String,
    /// When set, the page forwards here after `redirect_delay_secs`.
    pub redirect_url: String,
    pub redirect_delay_secs: u64,
}

#[derive(Template)]
#[template(path = "empty.html")]
pub struct EmptyPage {
    pub message: String,
    pub error: String,
}

pub fn render_portfolio(
    username: &str,
    portfolio: &Portfolio,
    publish: &PublishView,
) -> Result<String, askama::Error> {
    PortfolioPage::new(username, portfolio, publish).render()
}

/// Page shown when there is nothing in the store, optionally with the
/// error that left it empty.
pub fn render_empty(error: Option<&str>) -> Result<String, askama::Error> {
    EmptyPage {
        message: NO_DATA_MESSAGE.to_string(),
        error: error.unwrap_or_default().to_string(),
    }
    .render()
}

/// Splits "Role at Employer" on the last " at ".
pub fn split_role_employer(full_title: &str) -> (String, String) {
    match full_title.rfind(" at ") {
        Some(idx) => (
            full_title[..idx].trim().to_string(),
            full_title[idx + 4..].trim().to_string(),
        ),
        None => (full_title.to_string(), String::new()),
    }
}

/// Avatar fallback: the first letter of each word.
pub fn initials(name: &str) -> String {
    name.split_whitespace()
        .filter_map(|word| word.chars().next())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Only http(s) links are rendered. Bare domains get an https scheme.
pub fn safe_link(url: &str) -> Option<String> {
    let url = url.trim();
    if url.is_empty() || url.contains(char::is_whitespace) {
        return None;
    }
    let lower = url.to_ascii_lowercase();
    if lower.starts_with("https://") || lower.starts_with("http://") {
        Some(url.to_string())
    } else if !url.contains(':') && url.contains('.') {
        Some(format!("https://{url}"))
    } else {
        None
    }
}

pub fn portfolio_path(username: &str) -> String {
    format!("/portfolio/{}", encode_segment(username))
}

pub fn publish_path(username: &str) -> String {
    format!("{}/publish", portfolio_path(username))
}

/// Percent-encodes everything outside the RFC 3986 unreserved set.
pub(crate) fn encode_segment(segment: &str) -> String {
    segment
        .bytes()
        .map(|b| {
            if b.is_ascii_alphanumeric() || b"-._~".contains(&b) {
                (b as char).to_string()
            } else {
                format!("%{b:02X}")
            }
        })
        .collect()
}

fn experience_view(entry: &Experience) -> ExperienceView {
    let (job_title, employer) = split_role_employer(&entry.title);
    ExperienceView {
        job_title,
        employer,
        details: entry
            .details
            .iter()
            .map(|d| DetailView {
                duration: d.duration.clone().unwrap_or_default(),
                description: d.description.clone().unwrap_or_default(),
            })
            .collect(),
    }
}

fn project_view(project: &Project) -> ProjectView {
    ProjectView {
        name: project
            .name
            .clone()
            .unwrap_or_else(|| PROJECT_PLACEHOLDER.to_string()),
        description: project.description.clone().unwrap_or_default(),
        technologies: project.technologies.join(", "),
    }
}
