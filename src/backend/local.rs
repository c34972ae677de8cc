use super::{Backend, BackendKind, Registration};
use crate::database::{SlotStore, SlotUpdate};
use crate::error::SiteError;
use crate::model::*;
use actix_web::{error::BlockingError, web};
use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use std::path::Path;

const LOCAL: &str = "local";
const USERS: &str = "users";
const PROJECTS: &str = "projects";
const TEAM: &str = "team";
const CONTACTS: &str = "contacts";

/// bcrypt runs on the blocking pool; both layers of failure end up here.
fn hashing<T>(
    result: Result<bcrypt::BcryptResult<T>, BlockingError>,
) -> Result<T, SiteError> {
    result
        .map_err(|err| SiteError::Storage(err.to_string()))?
        .map_err(|err| SiteError::Encoding(err.to_string()))
}

/// Fallback storage in the embedded database, one slot per collection.
pub struct LocalBackend {
    db: sled::Db,
    slots: sled::Tree,
}

impl LocalBackend {
    pub fn open(db: &sled::Db) -> Result<Self, SiteError> {
        Ok(LocalBackend {
            db: db.clone(),
            slots: db.open_tree(LOCAL)?,
        })
    }

    fn generate_id(&self) -> Result<String, SiteError> {
        Ok(self.db.generate_id()?.to_string())
    }

    /// Fills empty collections from the static site document; existing data wins.
    pub fn seed(&self, data: &SiteData) -> Result<(), SiteError> {
        if self.slots.read_slot::<Vec<Project>>(PROJECTS)?.is_none() {
            self.slots.write_slot(PROJECTS, &data.projects)?;
        }
        if self.slots.read_slot::<Team>(TEAM)?.is_none() {
            self.slots.write_slot(TEAM, &data.team.clone().normalized())?;
        }
        if self.slots.read_slot::<Contacts>(CONTACTS)?.is_none() {
            self.slots.write_slot(CONTACTS, &data.contacts)?;
        }
        Ok(())
    }

    pub fn seed_from_file(&self, path: &Path) -> Result<(), SiteError> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) => {
                warn!("No seed data at {}: {}", path.display(), err);
                return Ok(());
            }
        };
        let data: SiteData = serde_json::from_str(&raw)?;
        info!(
            "Seeding local storage from {} ({} projects, {} team members)",
            path.display(),
            data.projects.len(),
            data.team.members().count()
        );
        self.seed(&data)
    }
}

#[async_trait]
impl Backend for LocalBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    async fn list_projects(&self) -> Result<Vec<Project>, SiteError> {
        Ok(self.slots.read_slot(PROJECTS)?.unwrap_or_default())
    }

    async fn get_project(&self, id: &str) -> Result<Option<Project>, SiteError> {
        let projects: Vec<Project> = self.slots.read_slot(PROJECTS)?.unwrap_or_default();
        Ok(projects.into_iter().find(|project| project.id == id))
    }

    async fn add_project(&self, project: NewProject) -> Result<Project, SiteError> {
        let project = project.into_project(self.generate_id()?);
        self.slots.update_slot(PROJECTS, |projects: &mut Vec<Project>| {
            projects.push(project.clone());
            Ok(())
        })?;
        debug!("Added project {} ({})", project.id, project.title);
        Ok(project)
    }

    async fn team(&self) -> Result<Team, SiteError> {
        Ok(self.slots.read_slot(TEAM)?.unwrap_or_default())
    }

    async fn add_team_member(&self, name: &str, role: &str) -> Result<TeamMember, SiteError> {
        let member = TeamMember {
            id: self.generate_id()?,
            name: name.to_owned(),
            role: role.to_owned(),
        };
        self.slots.update_slot(TEAM, |team: &mut Team| {
            team.insert(member.clone());
            Ok(())
        })?;
        debug!("Added {} to {}", member.name, member.category().as_str());
        Ok(member)
    }

    async fn add_comment(
        &self,
        project_id: &str,
        comment: NewComment,
    ) -> Result<Comment, SiteError> {
        let comment = comment.into_comment(self.generate_id()?);
        self.slots.update_slot(PROJECTS, |projects: &mut Vec<Project>| {
            let project = projects
                .iter_mut()
                .find(|project| project.id == project_id)
                .ok_or_else(|| SiteError::project_not_found(project_id))?;
            project.comments.push(comment.clone());
            Ok(())
        })?;
        Ok(comment)
    }

    async fn contacts(&self) -> Result<Contacts, SiteError> {
        Ok(self.slots.read_slot(CONTACTS)?.unwrap_or_default())
    }

    async fn upload_video(&self, file_name: &str, bytes: Vec<u8>) -> Result<VideoUpload, SiteError> {
        info!(
            "Dropping upload {} ({} bytes): no object storage without a remote backend",
            file_name,
            bytes.len()
        );
        Ok(VideoUpload::NotPersisted {
            file_name: file_name.to_owned(),
        })
    }

    async fn register(&self, registration: Registration) -> Result<CurrentUser, SiteError> {
        let password = registration.password.clone();
        let password_hash =
            hashing(web::block(move || bcrypt::hash(password, bcrypt::DEFAULT_COST)).await)?;
        let user = User {
            id: self.generate_id()?,
            name: registration.name,
            email: registration.email,
            password_hash,
            role: registration.role,
            registered_at: Utc::now(),
        };
        self.slots.update_slot(USERS, |users: &mut Vec<User>| {
            if users.iter().any(|existing| existing.email == user.email) {
                return Err(SiteError::validation(
                    "A user with this email already exists",
                ));
            }
            users.push(user.clone());
            Ok(())
        })?;
        info!("Registered user {} as {}", user.id, user.role);
        Ok(CurrentUser::from(&user))
    }

    async fn login(&self, email: &str, password: &str) -> Result<CurrentUser, SiteError> {
        let users: Vec<User> = self.slots.read_slot(USERS)?.unwrap_or_default();
        if let Some(user) = users.into_iter().find(|user| user.email == email) {
            let password = password.to_owned();
            let hash = user.password_hash.clone();
            if hashing(web::block(move || bcrypt::verify(password, &hash)).await)? {
                return Ok(CurrentUser::from(&user));
            }
        }
        Err(SiteError::auth("Invalid email or password"))
    }

    async fn logout(&self, _user: &CurrentUser) -> Result<(), SiteError> {
        Ok(())
    }

    async fn refresh_session(&self, user: &CurrentUser) -> Result<Option<CurrentUser>, SiteError> {
        Ok(Some(user.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::temporary_db;
    use chrono::Datelike;

    fn backend() -> LocalBackend {
        LocalBackend::open(&temporary_db()).unwrap()
    }

    fn new_project(title: &str) -> NewProject {
        NewProject {
            title: title.to_owned(),
            description: "desc".to_owned(),
            category: ProjectCategory::Comedy,
            year: Utc::now().year(),
            created_at: Utc::now(),
        }
    }

    fn new_comment(text: &str) -> NewComment {
        NewComment {
            user_id: "1".to_owned(),
            user_name: "Ann".to_owned(),
            text: text.to_owned(),
            date: Utc::now(),
        }
    }

    fn registration(email: &str) -> Registration {
        Registration {
            name: "Ann".to_owned(),
            email: email.to_owned(),
            password: "p1".to_owned(),
            role: UserRole::Viewer,
        }
    }

    #[actix_rt::test]
    async fn empty_storage_has_no_projects() {
        assert!(backend().list_projects().await.unwrap().is_empty());
        assert_eq!(backend().team().await.unwrap(), Team::default());
        assert_eq!(backend().contacts().await.unwrap(), Contacts::default());
    }

    #[actix_rt::test]
    async fn rapid_adds_get_distinct_ids() {
        let backend = backend();
        let mut ids = Vec::new();
        for n in 0..20 {
            ids.push(backend.add_project(new_project(&n.to_string())).await.unwrap().id);
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 20);
        assert_eq!(backend.list_projects().await.unwrap().len(), 20);
    }

    #[actix_rt::test]
    async fn members_are_grouped_by_role() {
        let backend = backend();
        backend.add_team_member("Vera", "actress").await.unwrap();
        backend.add_team_member("Oleg", "gaffer").await.unwrap();
        backend.add_team_member("Lev", "sound").await.unwrap();
        let team = backend.team().await.unwrap();
        assert_eq!(team.bucket(Bucket::Actresses)[0].name, "Vera");
        assert_eq!(team.bucket(Bucket::Actors)[0].name, "Oleg");
        assert_eq!(team.bucket(Bucket::SoundEngineers)[0].name, "Lev");
    }

    #[actix_rt::test]
    async fn comment_on_missing_project_is_not_found() {
        let backend = backend();
        backend.add_project(new_project("Film A")).await.unwrap();
        let err = backend
            .add_comment("missing", new_comment("hi"))
            .await
            .unwrap_err();
        assert!(matches!(err, SiteError::NotFound { .. }));
    }

    #[actix_rt::test]
    async fn comments_append_in_order() {
        let backend = backend();
        let project = backend.add_project(new_project("Film A")).await.unwrap();
        backend.add_comment(&project.id, new_comment("first")).await.unwrap();
        backend.add_comment(&project.id, new_comment("second")).await.unwrap();
        let stored = backend.get_project(&project.id).await.unwrap().unwrap();
        let texts: Vec<_> = stored.comments.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, ["first", "second"]);
        assert_ne!(stored.comments[0].id, stored.comments[1].id);
    }

    #[actix_rt::test]
    async fn registered_user_can_log_in_and_password_is_hashed() {
        let backend = backend();
        let registered = backend.register(registration("a@x.com")).await.unwrap();
        assert_eq!(registered.role, UserRole::Viewer);
        let users: Vec<User> = backend.slots.read_slot(USERS).unwrap().unwrap();
        assert_ne!(users[0].password_hash, "p1");
        let logged_in = backend.login("a@x.com", "p1").await.unwrap();
        assert_eq!(logged_in, registered);
    }

    #[actix_rt::test]
    async fn concurrent_logins_share_the_blocking_pool() {
        let backend = backend();
        backend.register(registration("a@x.com")).await.unwrap();
        let logins = (0..4).map(|_| backend.login("a@x.com", "p1"));
        for result in futures::future::join_all(logins).await {
            assert_eq!(result.unwrap().email, "a@x.com");
        }
    }

    #[actix_rt::test]
    async fn wrong_password_and_duplicate_email_are_rejected() {
        let backend = backend();
        backend.register(registration("a@x.com")).await.unwrap();
        assert!(matches!(
            backend.login("a@x.com", "nope").await,
            Err(SiteError::Auth(_))
        ));
        assert!(matches!(
            backend.login("b@x.com", "p1").await,
            Err(SiteError::Auth(_))
        ));
        assert!(matches!(
            backend.register(registration("a@x.com")).await,
            Err(SiteError::Validation(_))
        ));
    }

    #[actix_rt::test]
    async fn local_upload_is_reported_as_not_persisted() {
        let upload = backend().upload_video("clip.mp4", vec![0, 1, 2]).await.unwrap();
        assert_eq!(
            upload,
            VideoUpload::NotPersisted {
                file_name: "clip.mp4".to_owned()
            }
        );
    }

    #[actix_rt::test]
    async fn seed_fills_only_empty_collections() {
        let backend = backend();
        backend.add_project(new_project("Existing")).await.unwrap();
        let data: SiteData = serde_json::from_str(
            r#"{
                "contacts": {"address": "1 Film St", "phone": "555", "email": "hi@x.com", "schedule": "9-18"},
                "projects": [{"id": "p1", "title": "Seeded", "description": "d", "category": "drama", "year": 2020}],
                "team": {"owners": [{"id": "m1", "name": "Ilya", "role": "owner"}]}
            }"#,
        )
        .unwrap();
        backend.seed(&data).unwrap();
        let projects = backend.list_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(projects[0].title, "Existing");
        assert_eq!(backend.team().await.unwrap().bucket(Bucket::Owners).len(), 1);
        assert_eq!(backend.contacts().await.unwrap().address, "1 Film St");
    }

    #[actix_rt::test]
    async fn bundled_seed_document_parses() {
        let backend = backend();
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("data/data.json");
        backend.seed_from_file(&path).unwrap();
        assert!(!backend.list_projects().await.unwrap().is_empty());
    }
}
