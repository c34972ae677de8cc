use super::{Backend, BackendKind, Registration};
use crate::error::SiteError;
use crate::model::*;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

pub const PROJECTS: &str = "projects";
pub const TEAM: &str = "team";
pub const USERS: &str = "users";
pub const COMMENTS: &str = "comments";
pub const SETTINGS: &str = "settings";
pub const CONTACTS: &str = "contacts";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl Document {
    /// Decodes the fields with the document id injected as `id`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T, SiteError> {
        let mut fields = self.fields.clone();
        fields.insert("id".to_owned(), Value::String(self.id.clone()));
        Ok(serde_json::from_value(Value::Object(fields))?)
    }
}

/// An account of the remote auth service.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub uid: String,
    pub email: String,
    pub token: String,
}

/// The calls the site makes against the remote document/auth/object service.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_all(&self, collection: &str) -> Result<Vec<Document>, SiteError>;
    async fn get_one(&self, collection: &str, id: &str) -> Result<Option<Document>, SiteError>;
    async fn get_subresources(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
    ) -> Result<Vec<Document>, SiteError>;
    async fn add(&self, collection: &str, fields: Value) -> Result<String, SiteError>;
    async fn set(&self, collection: &str, id: &str, fields: Value) -> Result<(), SiteError>;
    async fn add_subresource(
        &self,
        collection: &str,
        id: &str,
        subcollection: &str,
        fields: Value,
    ) -> Result<String, SiteError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthUser, SiteError>;
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthUser, SiteError>;
    async fn sign_out(&self, token: &str) -> Result<(), SiteError>;
    /// Current auth state of a token; `None` once it is signed out or expired.
    async fn auth_state(&self, token: &str) -> Result<Option<AuthUser>, SiteError>;

    async fn put_object(
        &self,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, SiteError>;
}

#[derive(Deserialize)]
struct ProjectFields {
    id: String,
    title: String,
    description: String,
    #[serde(default)]
    detailed_description: String,
    category: ProjectCategory,
    year: i32,
    #[serde(default)]
    team: Vec<String>,
    #[serde(default, rename = "createdAt")]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct Profile {
    name: Option<String>,
    role: Option<String>,
}

/// Stores everything in the remote service; ids are assigned by the service.
pub struct RemoteBackend<S> {
    store: S,
}

impl<S: DocumentStore> RemoteBackend<S> {
    pub fn new(store: S) -> Self {
        RemoteBackend { store }
    }

    async fn comments(&self, project_id: &str) -> Result<Vec<Comment>, SiteError> {
        let mut comments = self
            .store
            .get_subresources(PROJECTS, project_id, COMMENTS)
            .await?
            .iter()
            .map(Document::decode::<Comment>)
            .collect::<Result<Vec<_>, _>>()?;
        comments.sort_by_key(|comment| comment.date);
        Ok(comments)
    }

    async fn project_from(&self, document: &Document) -> Result<Project, SiteError> {
        let fields: ProjectFields = document.decode()?;
        Ok(Project {
            comments: self.comments(&fields.id).await?,
            id: fields.id,
            title: fields.title,
            description: fields.description,
            detailed_description: fields.detailed_description,
            category: fields.category,
            year: fields.year,
            team: fields.team,
            created_at: fields.created_at,
        })
    }

    /// Name and role come from the `users` profile, falling back to email and viewer.
    async fn current_user(&self, auth: AuthUser) -> Result<CurrentUser, SiteError> {
        let profile = match self.store.get_one(USERS, &auth.uid).await? {
            Some(document) => serde_json::from_value(Value::Object(document.fields))?,
            None => Profile {
                name: None,
                role: None,
            },
        };
        Ok(CurrentUser {
            id: auth.uid,
            name: profile.name.unwrap_or_else(|| auth.email.clone()),
            role: profile
                .role
                .and_then(|role| role.parse().ok())
                .unwrap_or(UserRole::Viewer),
            email: auth.email,
            token: Some(auth.token),
        })
    }
}

/// `videos/<upload time>_<file name>`, with the name reduced to safe characters.
pub fn video_path(file_name: &str, at: DateTime<Utc>) -> String {
    let safe: String = file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("videos/{}_{}", at.format("%Y%m%d%H%M%S%9f"), safe)
}

fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next().map(str::to_ascii_lowercase).as_deref() {
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl<S: DocumentStore> Backend for RemoteBackend<S> {
    fn kind(&self) -> BackendKind {
        BackendKind::Remote
    }

    async fn list_projects(&self) -> Result<Vec<Project>, SiteError> {
        let mut projects = Vec::new();
        for document in self.store.get_all(PROJECTS).await? {
            projects.push(self.project_from(&document).await?);
        }
        Ok(projects)
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, SiteError> {
        match self.store.get_one(PROJECTS, id).await? {
            Some(document) => Ok(Some(self.project_from(&document).await?)),
            None => Ok(None),
        }
    }

    async fn add_project(&self, project: NewProject) -> Result<Project, SiteError> {
        let fields = json!({
            "title": project.title,
            "description": project.description,
            "detailed_description": project.description,
            "category": project.category,
            "year": project.year,
            "team": [],
            "createdAt": project.created_at,
        });
        let id = self.store.add(PROJECTS, fields).await?;
        debug!("Remote store assigned project id {}", id);
        Ok(project.into_project(id))
    }

    async fn team(&self) -> Result<Team, SiteError> {
        let members = self
            .store
            .get_all(TEAM)
            .await?
            .iter()
            .map(Document::decode::<TeamMember>)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Team::from_members(members))
    }

    async fn add_team_member(&self, name: &str, role: &str) -> Result<TeamMember, SiteError> {
        let fields = json!({
            "name": name,
            "role": role,
            "category": Bucket::for_role(role),
            "createdAt": Utc::now(),
        });
        let id = self.store.add(TEAM, fields).await?;
        Ok(TeamMember {
            id,
            name: name.to_owned(),
            role: role.to_owned(),
        })
    }

    async fn add_comment(
        &self,
        project_id: &str,
        comment: NewComment,
    ) -> Result<Comment, SiteError> {
        if self.store.get_one(PROJECTS, project_id).await?.is_none() {
            return Err(SiteError::project_not_found(project_id));
        }
        let fields = json!({
            "user_id": comment.user_id,
            "user_name": comment.user_name,
            "text": comment.text,
            "date": comment.date,
            "rating": DEFAULT_RATING,
        });
        let id = self
            .store
            .add_subresource(PROJECTS, project_id, COMMENTS, fields)
            .await?;
        Ok(comment.into_comment(id))
    }

    async fn contacts(&self) -> Result<Contacts, SiteError> {
        match self.store.get_one(SETTINGS, CONTACTS).await? {
            Some(document) => Ok(serde_json::from_value(Value::Object(document.fields))?),
            None => Ok(Contacts::default()),
        }
    }

    async fn upload_video(&self, file_name: &str, bytes: Vec<u8>) -> Result<VideoUpload, SiteError> {
        let path = video_path(file_name, Utc::now());
        let url = self
            .store
            .put_object(&path, bytes, content_type_for(file_name))
            .await?;
        info!("Stored video at {}", path);
        Ok(VideoUpload::Stored { path, url })
    }

    async fn register(&self, registration: Registration) -> Result<CurrentUser, SiteError> {
        let auth = self
            .store
            .sign_up(&registration.email, &registration.password)
            .await?;
        let profile = json!({
            "name": registration.name,
            "email": registration.email,
            "role": registration.role,
            "registrationDate": Utc::now(),
        });
        self.store.set(USERS, &auth.uid, profile).await?;
        Ok(CurrentUser {
            id: auth.uid,
            name: registration.name,
            email: registration.email,
            role: registration.role,
            token: Some(auth.token),
        })
    }

    async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, SiteError> {
        let auth = self.store.sign_in(email, password).await?;
        self.current_user(auth).await
    }

    async fn logout(&self, user: &CurrentUser) -> Result<(), SiteError> {
        match &user.token {
            Some(token) => self.store.sign_out(token).await,
            None => Ok(()),
        }
    }

    async fn refresh_session(&self, user: &CurrentUser) -> Result<Option<CurrentUser>, SiteError> {
        let token = match &user.token {
            Some(token) => token,
            None => return Ok(None),
        };
        match self.store.auth_state(token).await? {
            Some(auth) => Ok(Some(self.current_user(auth).await?)),
            None => Ok(None),
        }
    }
}
