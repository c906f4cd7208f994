//! Professor records and the join of ratings and review rows.
//!
//! Ratings rows are consumed first, then comment rows. Output order is the
//! order in which a name was first seen.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Grade values that carry no information
const NOT_AVAILABLE: &str = "N/A";

/// One row of the ratings CSV. Every column is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RatingRow {
    #[serde(rename = "fullName", default)]
    pub full_name: Option<String>,
    #[serde(rename = "overallRating", default)]
    pub overall_rating: Option<String>,
    #[serde(rename = "numEvals", default)]
    pub num_evals: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "materialClear", default)]
    pub material_clear: Option<String>,
    #[serde(rename = "studentDifficulties", default)]
    pub student_difficulties: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub courses: Option<String>,
}

/// One row of the review comments CSV. Every column is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommentRow {
    #[serde(default)]
    pub professor_name: Option<String>,
    #[serde(default)]
    pub rating_text: Option<String>,
    #[serde(default)]
    pub professor_id: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub course_code: Option<String>,
    #[serde(default)]
    pub grade_level: Option<String>,
    #[serde(default)]
    pub grade: Option<String>,
}

/// A professor with ratings and reviews merged into one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfessorRecord {
    pub name: String,
    pub rating: f64,
    pub num_evals: u32,
    pub clarity: f64,
    pub difficulty: f64,
    pub department: String,
    pub courses: String,
    pub link: String,
    /// Review texts joined by the separator and bounded in length
    pub comments: String,
    pub grade_levels: Vec<String>,
    pub grades: Vec<String>,
}

/// Knobs for [`aggregate`]
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub profile_base_url: String,
    pub max_comment_chars: usize,
    pub separator: String,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            profile_base_url: "https://www.ratemyprofessors.com".to_string(),
            max_comment_chars: 2000,
            separator: " | ".to_string(),
        }
    }
}

/// Record under construction; comments are joined once all rows are in.
struct Pending {
    record: ProfessorRecord,
    comments: Vec<String>,
    course_codes: Vec<String>,
}

impl Pending {
    fn empty(name: &str, link: String) -> Self {
        Self {
            record: ProfessorRecord {
                name: name.to_string(),
                rating: 0.0,
                num_evals: 0,
                clarity: 0.0,
                difficulty: 0.0,
                department: String::new(),
                courses: String::new(),
                link,
                comments: String::new(),
                grade_levels: Vec::new(),
                grades: Vec::new(),
            },
            comments: Vec::new(),
            course_codes: Vec::new(),
        }
    }
}

/// Merge ratings and comment rows into one record per professor name.
pub fn aggregate(
    ratings: &[RatingRow],
    comments: &[CommentRow],
    options: &AggregateOptions,
) -> Vec<ProfessorRecord> {
    let mut pending: Vec<Pending> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in ratings {
        let Some(name) = non_empty(&row.full_name) else {
            continue;
        };
        let link = profile_link(&options.profile_base_url, non_empty(&row.id), name);
        let slot = match index.get(name) {
            Some(&i) => i,
            None => {
                index.insert(name.to_string(), pending.len());
                pending.push(Pending::empty(name, link.clone()));
                pending.len() - 1
            }
        };

        // Last ratings row for a name wins for every ratings-sourced field.
        let record = &mut pending[slot].record;
        record.rating = parse_f64_or_zero(row.overall_rating.as_deref());
        record.num_evals = parse_u32_or_zero(row.num_evals.as_deref());
        record.clarity = parse_f64_or_zero(row.material_clear.as_deref());
        record.difficulty = parse_f64_or_zero(row.student_difficulties.as_deref());
        record.department = non_empty(&row.department).unwrap_or_default().to_string();
        record.courses = non_empty(&row.courses).unwrap_or_default().to_string();
        record.link = link;
    }

    for row in comments {
        let Some(name) = non_empty(&row.professor_name) else {
            continue;
        };
        let slot = match index.get(name) {
            Some(&i) => i,
            None => {
                let link =
                    profile_link(&options.profile_base_url, non_empty(&row.professor_id), name);
                index.insert(name.to_string(), pending.len());
                pending.push(Pending::empty(name, link));
                pending.len() - 1
            }
        };

        let entry = &mut pending[slot];
        if entry.record.department.is_empty() {
            if let Some(department) = non_empty(&row.department) {
                entry.record.department = department.to_string();
            }
        }
        if let Some(code) = non_empty(&row.course_code) {
            if !entry.course_codes.iter().any(|c| c == code) {
                entry.course_codes.push(code.to_string());
            }
        }
        if let Some(text) = non_empty(&row.rating_text) {
            entry.comments.push(text.to_string());
        }
        if let Some(level) = informative(&row.grade_level) {
            entry.record.grade_levels.push(level.to_string());
        }
        if let Some(grade) = informative(&row.grade) {
            entry.record.grades.push(grade.to_string());
        }
    }

    pending
        .into_iter()
        .map(|entry| {
            let mut record = entry.record;
            if record.courses.is_empty() && !entry.course_codes.is_empty() {
                record.courses = entry.course_codes.join(", ");
            }
            let joined = entry.comments.join(&options.separator);
            record.comments =
                bound_at_separator(&joined, options.max_comment_chars, &options.separator)
                    .to_string();
            record
        })
        .collect()
}

/// Parse a decimal field, treating anything unparseable as zero.
pub fn parse_f64_or_zero(value: Option<&str>) -> f64 {
    value
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

/// Parse a count field, treating anything unparseable or negative as zero.
pub fn parse_u32_or_zero(value: Option<&str>) -> u32 {
    value
        .and_then(|v| v.trim().parse::<u32>().ok())
        .unwrap_or(0)
}

/// Lowercase the name and collapse each whitespace run into one hyphen.
/// Punctuation is kept as is.
pub fn slugify(name: &str) -> String {
    name.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

fn profile_link(base: &str, id: Option<&str>, name: &str) -> String {
    let tail = match id {
        Some(id) => id.to_string(),
        None => slugify(name),
    };
    format!("{}/professor/{}", base.trim_end_matches('/'), tail)
}

/// Cut `text` to at most `max_chars` characters.
///
/// When the text is too long, the cut lands at the start of the last
/// separator that starts at or before the limit, so no comment is split. If no
/// such separator exists the text is cut hard at the limit.
pub fn bound_at_separator<'a>(text: &'a str, max_chars: usize, separator: &str) -> &'a str {
    let Some(limit) = byte_offset_of_char(text, max_chars) else {
        return text;
    };
    if !separator.is_empty() {
        // A separator starting at or before the limit still lets us cut there.
        let window_end = (limit + separator.len()).min(text.len());
        let window_end = floor_char_boundary(text, window_end);
        if let Some(at) = text[..window_end].rfind(separator) {
            if at > 0 && at <= limit {
                return &text[..at];
            }
        }
    }
    &text[..limit]
}

/// Byte offset of the `n`th character, or `None` when the text is shorter.
fn byte_offset_of_char(text: &str, n: usize) -> Option<usize> {
    text.char_indices().nth(n).map(|(i, _)| i)
}

fn floor_char_boundary(text: &str, mut at: usize) -> usize {
    while !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn informative(value: &Option<String>) -> Option<&str> {
    non_empty(value).filter(|v| !v.eq_ignore_ascii_case(NOT_AVAILABLE))
}
