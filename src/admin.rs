//! Form-driven actions: presence checks, then a call into [`DataAccess`].
//!
//! Every action reports its outcome as a notification. On success the
//! submitted form is cleared; on failure its values are kept as a draft so
//! the page can fill the form in again.

use crate::backend::DataAccess;
use crate::database::SlotStore;
use crate::error::SiteError;
use crate::model::{Comment, CurrentUser, Project, TeamMember, VideoUpload};
use crate::session::{BrowserContext, SessionStore};
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const DRAFTS: &str = "drafts";

pub const MAX_DRAFT_LEN: usize = 512;

/// Unsent form input, keyed by field name.
pub struct Drafts<S> {
    slots: S,
}

impl<S: SlotStore> Drafts<S> {
    pub fn new(slots: S) -> Self {
        Drafts { slots }
    }

    pub fn all(&self) -> BTreeMap<String, String> {
        self.slots
            .read_slot(DRAFTS)
            .unwrap_or_else(|err| {
                warn!("Dropping unreadable drafts: {}", err);
                None
            })
            .unwrap_or_default()
    }

    /// Replaces earlier drafts with the fields of one form. Values longer than
    /// [`MAX_DRAFT_LEN`] are not kept, the browser session cannot hold them.
    fn keep(&self, fields: &[(&str, &str)]) {
        let mut drafts = BTreeMap::new();
        for (name, value) in fields {
            if value.len() > MAX_DRAFT_LEN {
                warn!("Not keeping {} bytes of {} as a draft", value.len(), name);
                continue;
            }
            drafts.insert((*name).to_owned(), (*value).to_owned());
        }
        let result = if drafts.is_empty() {
            self.slots.remove_slot(DRAFTS)
        } else {
            self.slots.write_slot(DRAFTS, &drafts)
        };
        if let Err(err) = result {
            warn!("Could not keep form draft: {}", err);
        }
    }

    fn reset(&self, fields: &[(&str, &str)]) {
        let mut drafts = self.all();
        let before = drafts.len();
        for (name, _) in fields {
            drafts.remove(*name);
        }
        if drafts.len() == before {
            return;
        }
        let result = if drafts.is_empty() {
            self.slots.remove_slot(DRAFTS)
        } else {
            self.slots.write_slot(DRAFTS, &drafts)
        };
        if let Err(err) = result {
            warn!("Could not reset form: {}", err);
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct RegisterForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ProjectForm {
    pub title: String,
    pub description: String,
    pub category: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct MemberForm {
    pub name: String,
    pub role: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[serde(default)]
pub struct CommentForm {
    pub text: String,
}

fn require_admin<S: SlotStore>(session: &SessionStore<S>) -> Result<(), SiteError> {
    if session.is_admin() {
        Ok(())
    } else if session.current_user().is_some() {
        Err(SiteError::auth("Administrator access required"))
    } else {
        Err(SiteError::auth("You must be logged in"))
    }
}

impl<S: SlotStore + Clone> BrowserContext<S> {
    /// Turns an outcome into a banner and resets or keeps the form fields.
    fn report<T>(
        &self,
        result: Result<T, SiteError>,
        success: impl FnOnce(&T) -> String,
        failure: &str,
        fields: &[(&str, &str)],
    ) -> Result<T, SiteError> {
        match &result {
            Ok(value) => {
                self.drafts.reset(fields);
                self.notifications.success(success(value));
            }
            Err(err @ SiteError::Validation(_)) | Err(err @ SiteError::Auth(_)) => {
                self.drafts.keep(fields);
                self.notifications.error(err.to_string());
            }
            Err(err) => {
                self.drafts.keep(fields);
                self.notifications.error(format!("{}: {}", failure, err));
            }
        }
        result
    }

    fn sign_in(&self, user: &CurrentUser) -> Result<(), SiteError> {
        self.session.set_current_user(user).map(|_| ())
    }
}

pub async fn login<S: SlotStore + Clone>(
    dal: &DataAccess,
    ctx: &BrowserContext<S>,
    form: &LoginForm,
) -> Result<CurrentUser, SiteError> {
    let result = match dal.login(&form.email, &form.password).await {
        Ok(user) => ctx.sign_in(&user).map(|_| user),
        Err(err) => Err(err),
    };
    ctx.report(
        result,
        |_| "Logged in successfully".to_owned(),
        "Login failed",
        &[("login_email", form.email.as_str())],
    )
}

pub async fn register<S: SlotStore + Clone>(
    dal: &DataAccess,
    ctx: &BrowserContext<S>,
    form: &RegisterForm,
) -> Result<CurrentUser, SiteError> {
    let result = if form.password != form.confirm_password {
        Err(SiteError::validation("Passwords do not match"))
    } else {
        match dal
            .register(&form.name, &form.email, &form.password, &form.role)
            .await
        {
            Ok(user) => ctx.sign_in(&user).map(|_| user),
            Err(err) => Err(err),
        }
    };
    ctx.report(
        result,
        |_| "Registered successfully".to_owned(),
        "Registration failed",
        &[
            ("register_name", form.name.as_str()),
            ("register_email", form.email.as_str()),
            ("register_role", form.role.as_str()),
        ],
    )
}

/// Ends the session even when the backend could not sign out.
pub async fn logout<S: SlotStore + Clone>(
    dal: &DataAccess,
    ctx: &BrowserContext<S>,
) -> Result<(), SiteError> {
    let backend_result = match ctx.session.current_user() {
        Some(user) => dal.logout(&user).await,
        None => Ok(()),
    };
    let cleared = ctx.session.clear_current_user().map(|_| ());
    ctx.report(
        backend_result.and(cleared),
        |_| "Logged out successfully".to_owned(),
        "Logout failed",
        &[],
    )
}

pub async fn add_project<S: SlotStore + Clone>(
    dal: &DataAccess,
    ctx: &BrowserContext<S>,
    form: &ProjectForm,
) -> Result<Project, SiteError> {
    let result = match require_admin(&ctx.session) {
        Ok(()) => {
            dal.add_project(&form.title, &form.description, &form.category)
                .await
        }
        Err(err) => Err(err),
    };
    ctx.report(
        result,
        |project| format!("Project \"{}\" added", project.title),
        "Could not add project",
        &[
            ("project_title", form.title.as_str()),
            ("project_description", form.description.as_str()),
            ("project_category", form.category.as_str()),
        ],
    )
}

pub async fn add_team_member<S: SlotStore + Clone>(
    dal: &DataAccess,
    ctx: &BrowserContext<S>,
    form: &MemberForm,
) -> Result<TeamMember, SiteError> {
    let result = match require_admin(&ctx.session) {
        Ok(()) => dal.add_team_member(&form.name, &form.role).await,
        Err(err) => Err(err),
    };
    ctx.report(
        result,
        |member| format!("{} added to the team", member.name),
        "Could not add team member",
        &[("member_name", form.name.as_str())],
    )
}

pub async fn add_comment<S: SlotStore + Clone>(
    dal: &DataAccess,
    ctx: &BrowserContext<S>,
    project_id: &str,
    form: &CommentForm,
) -> Result<Comment, SiteError> {
    let user = ctx.session.current_user();
    let result = dal.add_comment(project_id, &form.text, user.as_ref()).await;
    ctx.report(
        result,
        |_| "Comment added".to_owned(),
        "Could not add comment",
        &[("comment_text", form.text.as_str())],
    )
}

pub async fn upload_video<S: SlotStore + Clone>(
    dal: &DataAccess,
    ctx: &BrowserContext<S>,
    file_name: Option<&str>,
    bytes: Vec<u8>,
) -> Result<VideoUpload, SiteError> {
    let result = match require_admin(&ctx.session) {
        Ok(()) => dal.upload_video(file_name, bytes).await,
        Err(err) => Err(err),
    };
    if let Ok(VideoUpload::NotPersisted { file_name }) = &result {
        ctx.notifications.error(format!(
            "Video \"{}\" was not stored: no remote storage is configured",
            file_name
        ));
        return result;
    }
    ctx.report(
        result,
        |upload| match upload {
            VideoUpload::Stored { url, .. } => format!("Video uploaded: {}", url),
            VideoUpload::NotPersisted { file_name } => format!("Video \"{}\" not stored", file_name),
        },
        "Could not upload video",
        &[],
    )
}
