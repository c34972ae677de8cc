//! Data access: one storage interface, two interchangeable implementations.
//!
//! [`Backend`] is implemented by the sled-backed [`local::LocalBackend`] and by
//! [`remote::RemoteBackend`] on top of a remote document store. The choice is
//! made once in [`select`]; everything above talks to [`DataAccess`], which
//! checks input, enforces the call timeout and logs failures.

pub mod http;
pub mod local;
pub mod remote;

use crate::config::Config;
use crate::error::SiteError;
use crate::model::*;
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use log::{info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Remote,
}

/// A validated registration request.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: UserRole,
}

#[async_trait]
pub trait Backend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn list_projects(&self) -> Result<Vec<Project>, SiteError>;
    async fn get_project(&self, id: &str) -> Result<Option<Project>, SiteError>;
    async fn add_project(&self, project: NewProject) -> Result<Project, SiteError>;

    async fn team(&self) -> Result<Team, SiteError>;
    async fn add_team_member(&self, name: &str, role: &str) -> Result<TeamMember, SiteError>;

    /// Fails with `NotFound` when the project does not exist.
    async fn add_comment(&self, project_id: &str, comment: NewComment)
        -> Result<Comment, SiteError>;

    async fn contacts(&self) -> Result<Contacts, SiteError>;

    async fn upload_video(&self, file_name: &str, bytes: Vec<u8>)
        -> Result<VideoUpload, SiteError>;

    async fn register(&self, registration: Registration) -> Result<CurrentUser, SiteError>;
    async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, SiteError>;
    async fn logout(&self, user: &CurrentUser) -> Result<(), SiteError>;

    /// Re-reads the auth state behind a stored session; `None` means signed out.
    async fn refresh_session(&self, user: &CurrentUser) -> Result<Option<CurrentUser>, SiteError>;
}

/// Picks the backend for the lifetime of the process.
pub fn select(config: &Config, db: &sled::Db) -> Result<Arc<dyn Backend>, SiteError> {
    match &config.remote_url {
        Some(url) => {
            info!("Using remote backend at {}", url);
            let store = http::HttpDocumentStore::new(
                url,
                config.remote_api_key.clone(),
                config.timeout(),
            )?;
            Ok(Arc::new(remote::RemoteBackend::new(store)))
        }
        None => {
            info!("No remote backend configured, using local storage");
            let backend = local::LocalBackend::open(db)?;
            backend.seed_from_file(&config.seed)?;
            Ok(Arc::new(backend))
        }
    }
}

/// Whitespace-only input counts as missing; accepted input is passed on unchanged.
fn required<'a>(value: &'a str, message: &str) -> Result<&'a str, SiteError> {
    if value.trim().is_empty() {
        Err(SiteError::validation(message))
    } else {
        Ok(value)
    }
}

pub struct DataAccess {
    backend: Arc<dyn Backend>,
    timeout: Duration,
    admin_emails: Vec<String>,
}

impl DataAccess {
    pub fn new(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        DataAccess {
            backend,
            timeout,
            admin_emails: Vec::new(),
        }
    }

    /// Only these emails may register with the admin role.
    pub fn with_admin_emails(mut self, emails: Vec<String>) -> Self {
        self.admin_emails = emails;
        self
    }

    fn may_register_admin(&self, email: &str) -> bool {
        let email = email.trim();
        self.admin_emails
            .iter()
            .any(|allowed| allowed.trim().eq_ignore_ascii_case(email))
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    async fn call<T, F>(&self, operation: &'static str, fut: F) -> Result<T, SiteError>
    where
        F: Future<Output = Result<T, SiteError>>,
    {
        match actix_rt::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!("{} failed: {}", operation, err);
                Err(err)
            }
            Err(_) => {
                warn!("{} timed out after {:?}", operation, self.timeout);
                Err(SiteError::Timeout(self.timeout))
            }
        }
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, SiteError> {
        self.call("list projects", self.backend.list_projects()).await
    }

    pub async fn project(&self, id: &str) -> Result<Project, SiteError> {
        self.call("get project", self.backend.get_project(id))
            .await?
            .ok_or_else(|| SiteError::project_not_found(id))
    }

    pub async fn add_project(
        &self,
        title: &str,
        description: &str,
        category: &str,
    ) -> Result<Project, SiteError> {
        let title = required(title, "Fill in all fields")?;
        let description = required(description, "Fill in all fields")?;
        let category = required(category, "Fill in all fields")?
            .trim()
            .parse::<ProjectCategory>()
            .map_err(SiteError::Validation)?;
        let now = Utc::now();
        let project = NewProject {
            title: title.to_owned(),
            description: description.to_owned(),
            category,
            year: now.year(),
            created_at: now,
        };
        self.call("add project", self.backend.add_project(project))
            .await
    }

    pub async fn team(&self) -> Result<Team, SiteError> {
        self.call("load team", self.backend.team()).await
    }

    pub async fn add_team_member(&self, name: &str, role: &str) -> Result<TeamMember, SiteError> {
        let name = required(name, "Enter the member name")?;
        self.call(
            "add team member",
            self.backend.add_team_member(name, role.trim()),
        )
        .await
    }

    /// The session is checked before the text, so a signed-out caller always gets `Auth`.
    pub async fn add_comment(
        &self,
        project_id: &str,
        text: &str,
        user: Option<&CurrentUser>,
    ) -> Result<Comment, SiteError> {
        let user = user.ok_or_else(|| SiteError::auth("You must be logged in to comment"))?;
        let text = required(text, "Enter the comment text")?;
        let comment = NewComment {
            user_id: user.id.clone(),
            user_name: user.name.clone(),
            text: text.to_owned(),
            date: Utc::now(),
        };
        self.call("add comment", self.backend.add_comment(project_id, comment))
            .await
    }

    pub async fn contacts(&self) -> Result<Contacts, SiteError> {
        self.call("load contacts", self.backend.contacts()).await
    }

    pub async fn upload_video(
        &self,
        file_name: Option<&str>,
        bytes: Vec<u8>,
    ) -> Result<VideoUpload, SiteError> {
        let file_name = required(file_name.unwrap_or(""), "Choose a file to upload")?;
        if bytes.is_empty() {
            return Err(SiteError::validation("Choose a file to upload"));
        }
        self.call("upload video", self.backend.upload_video(file_name, bytes))
            .await
    }

    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: &str,
    ) -> Result<CurrentUser, SiteError> {
        let registration = Registration {
            name: required(name, "Fill in all fields")?.to_owned(),
            email: required(email, "Fill in all fields")?.to_owned(),
            password: required(password, "Fill in all fields")?.to_owned(),
            role: required(role, "Fill in all fields")?
                .trim()
                .parse()
                .map_err(SiteError::Validation)?,
        };
        if registration.role == UserRole::Admin && !self.may_register_admin(email) {
            return Err(SiteError::auth(
                "Administrator accounts cannot be registered from this form",
            ));
        }
        self.call("register", self.backend.register(registration))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, SiteError> {
        let email = required(email, "Enter email and password")?;
        let password = required(password, "Enter email and password")?;
        self.call("login", self.backend.login(email, password)).await
    }

    pub async fn logout(&self, user: &CurrentUser) -> Result<(), SiteError> {
        self.call("logout", self.backend.logout(user)).await
    }

    pub async fn refresh_session(
        &self,
        user: &CurrentUser,
    ) -> Result<Option<CurrentUser>, SiteError> {
        self.call("refresh session", self.backend.refresh_session(user))
            .await
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::database::temporary_db;

    pub fn local_access() -> DataAccess {
        let backend = local::LocalBackend::open(&temporary_db()).unwrap();
        DataAccess::new(Arc::new(backend), Duration::from_secs(5))
            .with_admin_emails(vec!["a@x.com".to_owned()])
    }

    pub fn viewer(name: &str) -> CurrentUser {
        CurrentUser {
            id: "42".to_owned(),
            name: name.to_owned(),
            email: "v@x.com".to_owned(),
            role: UserRole::Viewer,
            token: None,
        }
    }

    /// Never answers.
    struct StalledBackend;

    #[async_trait]
    impl Backend for StalledBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Remote
        }
        async fn list_projects(&self) -> Result<Vec<Project>, SiteError> {
            futures::future::pending().await
        }
        async fn get_project(&self, _id: &str) -> Result<Option<Project>, SiteError> {
            futures::future::pending().await
        }
        async fn add_project(&self, _project: NewProject) -> Result<Project, SiteError> {
            futures::future::pending().await
        }
        async fn team(&self) -> Result<Team, SiteError> {
            futures::future::pending().await
        }
        async fn add_team_member(&self, _name: &str, _role: &str) -> Result<TeamMember, SiteError> {
            futures::future::pending().await
        }
        async fn add_comment(
            &self,
            _project_id: &str,
            _comment: NewComment,
        ) -> Result<Comment, SiteError> {
            futures::future::pending().await
        }
        async fn contacts(&self) -> Result<Contacts, SiteError> {
            futures::future::pending().await
        }
        async fn upload_video(
            &self,
            _file_name: &str,
            _bytes: Vec<u8>,
        ) -> Result<VideoUpload, SiteError> {
            futures::future::pending().await
        }
        async fn register(&self, _registration: Registration) -> Result<CurrentUser, SiteError> {
            futures::future::pending().await
        }
        async fn login(&self, _email: &str, _password: &str) -> Result<CurrentUser, SiteError> {
            futures::future::pending().await
        }
        async fn logout(&self, _user: &CurrentUser) -> Result<(), SiteError> {
            futures::future::pending().await
        }
        async fn refresh_session(
            &self,
            _user: &CurrentUser,
        ) -> Result<Option<CurrentUser>, SiteError> {
            futures::future::pending().await
        }
    }

    #[actix_rt::test]
    async fn added_project_is_listed_with_call_year() {
        let dal = local_access();
        dal.add_project("Film A", "desc", "drama").await.unwrap();
        let projects = dal.list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        let project = &projects[0];
        assert_eq!(project.title, "Film A");
        assert_eq!(project.description, "desc");
        assert_eq!(project.category, ProjectCategory::Drama);
        assert_eq!(project.year, Utc::now().year());
        assert!(project.comments.is_empty());
        assert!(project.team.is_empty());
    }

    #[actix_rt::test]
    async fn project_fields_are_stored_as_entered() {
        let dal = local_access();
        let added = dal.add_project(" Film A ", "desc\n", " drama ").await.unwrap();
        assert_eq!(added.title, " Film A ");
        let project = dal.project(&added.id).await.unwrap();
        assert_eq!(project.title, " Film A ");
        assert_eq!(project.description, "desc\n");
        assert_eq!(project.category, ProjectCategory::Drama);

        let comment = dal
            .add_comment(&added.id, "  Great film ", Some(&viewer("Ann")))
            .await
            .unwrap();
        assert_eq!(comment.text, "  Great film ");
    }

    #[actix_rt::test]
    async fn admin_role_needs_an_allowed_email() {
        let dal = local_access();
        let err = dal
            .register("Bob", "b@x.com", "p1", "admin")
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Auth(_)));
        assert!(matches!(
            dal.login("b@x.com", "p1").await,
            Err(SiteError::Auth(_))
        ));

        let admin = dal.register("Ann", "A@X.com", "p1", "admin").await.unwrap();
        assert!(admin.is_admin());
        let viewer = dal.register("Bob", "b@x.com", "p1", "viewer").await.unwrap();
        assert!(!viewer.is_admin());
    }

    #[actix_rt::test]
    async fn empty_project_fields_are_rejected() {
        let dal = local_access();
        for (title, description, category) in
            [("", "desc", "drama"), ("Film", "  ", "drama"), ("Film", "desc", "")]
        {
            let err = dal.add_project(title, description, category).await.unwrap_err();
            assert!(matches!(err, SiteError::Validation(_)));
        }
        assert!(matches!(
            dal.add_project("Film", "desc", "western").await,
            Err(SiteError::Validation(_))
        ));
        assert!(dal.list_projects().await.unwrap().is_empty());
    }

    #[actix_rt::test]
    async fn comment_without_session_is_an_auth_error() {
        let dal = local_access();
        let project = dal.add_project("Film A", "desc", "drama").await.unwrap();
        for text in ["Great", ""] {
            let err = dal.add_comment(&project.id, text, None).await.unwrap_err();
            assert!(matches!(err, SiteError::Auth(_)));
        }
    }

    #[actix_rt::test]
    async fn comment_with_session_appends_exactly_one() {
        let dal = local_access();
        let project = dal.add_project("Film A", "desc", "drama").await.unwrap();
        let comment = dal
            .add_comment(&project.id, "Great film", Some(&viewer("Ann")))
            .await
            .unwrap();
        assert_eq!(comment.rating, DEFAULT_RATING);
        assert_eq!(comment.user_name, "Ann");
        let stored = dal.project(&project.id).await.unwrap();
        assert_eq!(stored.comments, vec![comment]);
    }

    #[actix_rt::test]
    async fn empty_comment_text_is_a_validation_error() {
        let dal = local_access();
        let project = dal.add_project("Film A", "desc", "drama").await.unwrap();
        let err = dal
            .add_comment(&project.id, " ", Some(&viewer("Ann")))
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Validation(_)));
    }

    #[actix_rt::test]
    async fn unknown_project_is_not_found() {
        let dal = local_access();
        assert!(matches!(
            dal.project("nope").await,
            Err(SiteError::NotFound { .. })
        ));
    }

    #[actix_rt::test]
    async fn registration_requires_a_known_role() {
        let dal = local_access();
        let err = dal
            .register("Ann", "a@x.com", "p1", "director")
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::Validation(_)));
    }

    #[actix_rt::test]
    async fn stalled_backend_times_out() {
        let dal = DataAccess::new(Arc::new(StalledBackend), Duration::from_millis(20));
        assert!(matches!(
            dal.list_projects().await,
            Err(SiteError::Timeout(_))
        ));
        assert!(matches!(
            dal.add_team_member("Vera", "actress").await,
            Err(SiteError::Timeout(_))
        ));
    }

    #[actix_rt::test]
    async fn missing_upload_is_a_validation_error() {
        let dal = local_access();
        assert!(matches!(
            dal.upload_video(None, vec![1]).await,
            Err(SiteError::Validation(_))
        ));
        assert!(matches!(
            dal.upload_video(Some("clip.mp4"), Vec::new()).await,
            Err(SiteError::Validation(_))
        ));
    }
}
