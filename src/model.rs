use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_RATING: u8 = 5;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Admin,
    Editor,
    Actor,
    Translator,
    Viewer,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Admin => "admin",
            UserRole::Editor => "editor",
            UserRole::Actor => "actor",
            UserRole::Translator => "translator",
            UserRole::Viewer => "viewer",
        }
    }
}

impl FromStr for UserRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserRole::Admin),
            "editor" => Ok(UserRole::Editor),
            "actor" => Ok(UserRole::Actor),
            "translator" => Ok(UserRole::Translator),
            "viewer" => Ok(UserRole::Viewer),
            other => Err(format!("Unknown user role: {}", other)),
        }
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account of the local backend.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
    pub registered_at: DateTime<Utc>,
}

/// The identity held by a browser session. Never carries credentials.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CurrentUser {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    /// Remote auth token; `None` for local sessions.
    #[serde(default)]
    pub token: Option<String>,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        CurrentUser {
            id: user.id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            token: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ProjectCategory {
    Drama,
    Comedy,
    Documentary,
    Short,
    Series,
    Animation,
}

impl ProjectCategory {
    pub const ALL: [ProjectCategory; 6] = [
        ProjectCategory::Drama,
        ProjectCategory::Comedy,
        ProjectCategory::Documentary,
        ProjectCategory::Short,
        ProjectCategory::Series,
        ProjectCategory::Animation,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProjectCategory::Drama => "drama",
            ProjectCategory::Comedy => "comedy",
            ProjectCategory::Documentary => "documentary",
            ProjectCategory::Short => "short",
            ProjectCategory::Series => "series",
            ProjectCategory::Animation => "animation",
        }
    }
}

impl FromStr for ProjectCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProjectCategory::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("Unknown project category: {}", s))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub date: DateTime<Utc>,
    pub rating: u8,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub detailed_description: String,
    pub category: ProjectCategory,
    pub year: i32,
    /// Team member ids; only the remote backend fills this in.
    #[serde(default)]
    pub team: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn detailed_description(&self) -> &str {
        if self.detailed_description.is_empty() {
            &self.description
        } else {
            &self.detailed_description
        }
    }
}

/// A validated project that has not been given an id yet.
#[derive(Debug, Clone)]
pub struct NewProject {
    pub title: String,
    pub description: String,
    pub category: ProjectCategory,
    pub year: i32,
    pub created_at: DateTime<Utc>,
}

impl NewProject {
    pub fn into_project(self, id: String) -> Project {
        Project {
            id,
            detailed_description: self.description.clone(),
            title: self.title,
            description: self.description,
            category: self.category,
            year: self.year,
            team: Vec::new(),
            comments: Vec::new(),
            created_at: Some(self.created_at),
        }
    }
}

/// A validated comment that has not been given an id yet.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub user_id: String,
    pub user_name: String,
    pub text: String,
    pub date: DateTime<Utc>,
}

impl NewComment {
    pub fn into_comment(self, id: String) -> Comment {
        Comment {
            id,
            user_id: self.user_id,
            user_name: self.user_name,
            text: self.text,
            date: self.date,
            rating: DEFAULT_RATING,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Owners,
    CoOwners,
    Actresses,
    Actors,
    Editors,
    Translators,
    SoundEngineers,
    EditorsVideo,
}

const ROLE_BUCKETS: &[(&str, Bucket)] = &[
    ("owner", Bucket::Owners),
    ("co-owner", Bucket::CoOwners),
    ("actress", Bucket::Actresses),
    ("actor", Bucket::Actors),
    ("editor", Bucket::Editors),
    ("translator", Bucket::Translators),
    ("sound", Bucket::SoundEngineers),
    ("sound-engineer", Bucket::SoundEngineers),
    ("video", Bucket::EditorsVideo),
    ("video-editor", Bucket::EditorsVideo),
];

impl Bucket {
    /// Unknown roles are filed under actors.
    pub fn for_role(role: &str) -> Bucket {
        ROLE_BUCKETS
            .iter()
            .find(|(name, _)| *name == role)
            .map(|(_, bucket)| *bucket)
            .unwrap_or(Bucket::Actors)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Bucket::Owners => "owners",
            Bucket::CoOwners => "co_owners",
            Bucket::Actresses => "actresses",
            Bucket::Actors => "actors",
            Bucket::Editors => "editors",
            Bucket::Translators => "translators",
            Bucket::SoundEngineers => "sound_engineers",
            Bucket::EditorsVideo => "editors_video",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TeamMember {
    pub id: String,
    pub name: String,
    pub role: String,
}

impl TeamMember {
    pub fn category(&self) -> Bucket {
        Bucket::for_role(&self.role)
    }
}

/// Team members grouped by bucket.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Team(BTreeMap<Bucket, Vec<TeamMember>>);

impl Team {
    /// Files every member under the bucket of its role, whatever group it came from.
    pub fn from_members<I: IntoIterator<Item = TeamMember>>(members: I) -> Team {
        let mut team = Team::default();
        for member in members {
            team.insert(member);
        }
        team
    }

    pub fn insert(&mut self, member: TeamMember) {
        self.0.entry(member.category()).or_default().push(member);
    }

    pub fn bucket(&self, bucket: Bucket) -> &[TeamMember] {
        self.0.get(&bucket).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn members(&self) -> impl Iterator<Item = &TeamMember> {
        self.0.values().flatten()
    }

    pub fn normalized(self) -> Team {
        Team::from_members(self.0.into_iter().flat_map(|(_, members)| members))
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Contacts {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub schedule: String,
}

/// The static document that seeds the local collections.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SiteData {
    #[serde(default)]
    pub contacts: Contacts,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub team: Team,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub enum VideoUpload {
    Stored { path: String, url: String },
    /// No object storage is configured; the file was dropped.
    NotPersisted { file_name: String },
}
