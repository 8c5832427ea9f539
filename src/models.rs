//! Core data types that flow through the crawl and classification pipeline.
//!
//! These types represent account records, follow-graph jobs, and the
//! request/response shapes exchanged with the classifier.

use serde::{Deserialize, Serialize};

/// Full profile snapshot returned by a profile fetch.
///
/// A profile fetch overwrites every attribute of the stored account record;
/// listing items only ever produce the smaller [`AccountRef`].
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    #[serde(default)]
    pub follower_count: i64,
    #[serde(default)]
    pub following_count: i64,
    #[serde(default)]
    pub is_private: bool,
}

/// Minimal account descriptor yielded by a followers/following listing.
///
/// Inserted into storage only if the account has not been seen before, so a
/// listing item never clobbers richer data from an earlier profile fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountRef {
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub profile_pic_url: Option<String>,
    #[serde(default)]
    pub is_private: bool,
}

/// The three kinds of crawl work a job can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobType {
    Profile,
    Followers,
    Following,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::Profile => "profile",
            JobType::Followers => "followers",
            JobType::Following => "following",
        }
    }

    pub fn parse(s: &str) -> Option<JobType> {
        match s {
            "profile" => Some(JobType::Profile),
            "followers" => Some(JobType::Followers),
            "following" => Some(JobType::Following),
            _ => None,
        }
    }

    /// The paired listing type whose completion unlocks the mutual
    /// computation, if any.
    pub fn sibling(&self) -> Option<JobType> {
        match self {
            JobType::Followers => Some(JobType::Following),
            JobType::Following => Some(JobType::Followers),
            JobType::Profile => None,
        }
    }
}

/// Job lifecycle: `pending → in_progress → {completed, failed}`.
///
/// Both terminal states stay terminal; a job is never re-enqueued without
/// operator re-enrollment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<JobStatus> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "in_progress" => Some(JobStatus::InProgress),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A row in the `scrape_jobs` queue.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub job_id: i64,
    pub target_username: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub last_cursor: Option<String>,
    pub total_items: Option<i64>,
    pub processed_items: i64,
    pub error_message: Option<String>,
}

/// Account descriptor submitted to the classifier.
///
/// Serializes to exactly the `{username, full_name, bio}` shape of the
/// classification request contract.
#[derive(Debug, Clone, Serialize)]
pub struct Subject {
    pub username: String,
    pub full_name: String,
    pub bio: String,
}

/// A followed account loaded for classification: the subject descriptor
/// plus the stable account id the score is stored under.
#[derive(Debug, Clone)]
pub struct FollowedAccount {
    pub user_id: String,
    pub subject: Subject,
}

fn default_confidence() -> f64 {
    0.5
}

/// One category assignment in a classifier response.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifiedAccount {
    pub username: String,
    pub category: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
}

/// Structured classifier response: `{ "results": [...] }`.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyResponse {
    pub results: Vec<ClassifiedAccount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_type_round_trip() {
        for t in [JobType::Profile, JobType::Followers, JobType::Following] {
            assert_eq!(JobType::parse(t.as_str()), Some(t));
        }
        assert_eq!(JobType::parse("posts"), None);
    }

    #[test]
    fn listing_siblings_pair_up() {
        assert_eq!(JobType::Followers.sibling(), Some(JobType::Following));
        assert_eq!(JobType::Following.sibling(), Some(JobType::Followers));
        assert_eq!(JobType::Profile.sibling(), None);
    }

    #[test]
    fn missing_confidence_defaults() {
        let parsed: ClassifiedAccount =
            serde_json::from_str(r#"{"username": "a", "category": "Music"}"#).unwrap();
        assert_eq!(parsed.confidence, 0.5);
    }
}
