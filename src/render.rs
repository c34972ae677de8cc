use crate::error::SiteError;
use crate::model::{
    Bucket, Comment, Contacts, CurrentUser, Project, ProjectCategory, Team, TeamMember,
};
use crate::notification::{Notification, DISMISS_AFTER};
use crate::session::Visibility;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Home,
    Projects,
    ProjectDetail,
    Team,
    Contacts,
    Admin,
}

impl Section {
    pub const ALL: [Section; 6] = [
        Section::Home,
        Section::Projects,
        Section::ProjectDetail,
        Section::Team,
        Section::Contacts,
        Section::Admin,
    ];

    pub fn id(self) -> &'static str {
        match self {
            Section::Home => "home",
            Section::Projects => "projects",
            Section::ProjectDetail => "project-detail",
            Section::Team => "team",
            Section::Contacts => "contacts",
            Section::Admin => "admin",
        }
    }

    pub fn from_id(id: &str) -> Option<Section> {
        Section::ALL.iter().copied().find(|section| section.id() == id)
    }
}

/// Team containers on the page and the buckets each one shows.
pub const TEAM_CONTAINERS: &[(&str, &str, &[Bucket])] = &[
    ("management", "Management", &[Bucket::Owners, Bucket::CoOwners]),
    ("actresses", "Actresses", &[Bucket::Actresses]),
    ("actors", "Actors", &[Bucket::Actors]),
    ("editors", "Editors", &[Bucket::Editors]),
    ("translators", "Translators", &[Bucket::Translators]),
    ("sound_engineers", "Sound engineers", &[Bucket::SoundEngineers]),
    ("editors_video", "Video editors", &[Bucket::EditorsVideo]),
];

pub const ADMIN_TABS: &[&str] = &["video-tab", "project-tab", "member-tab"];

fn team_tab_ids() -> Vec<&'static str> {
    TEAM_CONTAINERS.iter().map(|(id, _, _)| *id).collect()
}

/// Exclusive selection among sibling tabs; the first one starts active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tabs {
    ids: Vec<&'static str>,
    active: usize,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct TabState {
    pub id: &'static str,
    pub active: bool,
}

impl Tabs {
    pub fn new(ids: Vec<&'static str>) -> Self {
        Tabs { ids, active: 0 }
    }

    /// Unknown ids leave the current selection alone.
    pub fn activate(&mut self, id: &str) -> bool {
        match self.ids.iter().position(|tab| *tab == id) {
            Some(index) => {
                self.active = index;
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> &'static str {
        self.ids[self.active]
    }

    pub fn states(&self) -> Vec<TabState> {
        self.ids
            .iter()
            .enumerate()
            .map(|(index, id)| TabState {
                id: *id,
                active: index == self.active,
            })
            .collect()
    }
}

/// Which section is on screen. Exactly one is visible at a time.
#[derive(Debug, Clone)]
pub struct PageState {
    section: Section,
    project_id: Option<String>,
    pub team_tabs: Tabs,
    pub admin_tabs: Tabs,
}

impl Default for PageState {
    fn default() -> Self {
        PageState {
            section: Section::Home,
            project_id: None,
            team_tabs: Tabs::new(team_tab_ids()),
            admin_tabs: Tabs::new(ADMIN_TABS.to_vec()),
        }
    }
}

impl PageState {
    pub fn section(&self) -> Section {
        self.section
    }

    pub fn project_id(&self) -> Option<&str> {
        self.project_id.as_deref()
    }

    /// Leaving the detail view always drops it. Unknown ids show the home section.
    pub fn show_section(&mut self, id: &str) -> Section {
        let section = match Section::from_id(id) {
            Some(Section::ProjectDetail) if self.project_id.is_some() => Section::ProjectDetail,
            Some(Section::ProjectDetail) => Section::Projects,
            Some(section) => section,
            None => Section::Home,
        };
        if section != Section::ProjectDetail {
            self.project_id = None;
        }
        self.section = section;
        section
    }

    pub fn show_project_detail(&mut self, project_id: &str) {
        self.project_id = Some(project_id.to_owned());
        self.section = Section::ProjectDetail;
    }

    pub fn is_visible(&self, section: Section) -> bool {
        self.section == section
    }
}

#[derive(Serialize)]
struct CommentView<'a> {
    user_name: &'a str,
    date: String,
    text: &'a str,
}

#[derive(Serialize)]
struct Banner<'a> {
    class: &'static str,
    message: &'a str,
}

#[derive(Serialize)]
struct TeamPanel {
    id: &'static str,
    label: &'static str,
    active: bool,
    html: String,
}

/// Everything a full page shows besides the section state.
#[derive(Debug, Default)]
pub struct PageData {
    pub user: Option<CurrentUser>,
    pub notifications: Vec<Notification>,
    pub drafts: BTreeMap<String, String>,
    pub contacts: Contacts,
    pub projects: Vec<Project>,
    pub team: Team,
    pub project: Option<Project>,
    pub remote: bool,
}

pub struct Renderer {
    tera: tera::Tera,
}

impl Renderer {
    pub fn new(templates: &Path) -> Result<Self, SiteError> {
        let glob = templates.join("**").join("*");
        let tera = tera::Tera::new(&glob.to_string_lossy())?;
        Ok(Renderer { tera })
    }

    fn render(&self, template: &str, ctx: &tera::Context) -> Result<String, SiteError> {
        Ok(self.tera.render(template, ctx)?)
    }

    /// One card and one detail link per project, rebuilt from scratch on every call.
    pub fn render_projects(&self, projects: &[Project]) -> Result<String, SiteError> {
        let mut ctx = tera::Context::new();
        ctx.insert("projects", projects);
        self.render("partials/projects.html", &ctx)
    }

    /// `None` when the page has no container with this id.
    pub fn render_team_category(
        &self,
        container_id: &str,
        members: &[TeamMember],
    ) -> Result<Option<String>, SiteError> {
        if !TEAM_CONTAINERS.iter().any(|(id, _, _)| *id == container_id) {
            return Ok(None);
        }
        let mut ctx = tera::Context::new();
        ctx.insert("container_id", container_id);
        ctx.insert("members", members);
        self.render("partials/team_category.html", &ctx).map(Some)
    }

    pub fn render_comments(&self, comments: &[Comment]) -> Result<String, SiteError> {
        let comments: Vec<_> = comments
            .iter()
            .map(|comment| CommentView {
                user_name: &comment.user_name,
                date: comment.date.format("%Y-%m-%d").to_string(),
                text: &comment.text,
            })
            .collect();
        let mut ctx = tera::Context::new();
        ctx.insert("comments", &comments);
        self.render("partials/comments.html", &ctx)
    }

    fn team_panels(&self, state: &PageState, team: &Team) -> Result<Vec<TeamPanel>, SiteError> {
        let active = state.team_tabs.active();
        let mut panels = Vec::new();
        for &(id, label, buckets) in TEAM_CONTAINERS {
            let members: Vec<TeamMember> = buckets
                .iter()
                .flat_map(|bucket| team.bucket(*bucket).iter().cloned())
                .collect();
            if let Some(html) = self.render_team_category(id, &members)? {
                panels.push(TeamPanel {
                    id,
                    label,
                    active: id == active,
                    html,
                });
            }
        }
        Ok(panels)
    }

    pub fn render_page(&self, state: &PageState, data: &PageData) -> Result<String, SiteError> {
        let visibility = Visibility::for_user(data.user.as_ref());
        let mut ctx = tera::Context::new();
        ctx.insert("section", state.section().id());
        ctx.insert("visibility", &visibility);
        ctx.insert("user", &data.user);
        let banners: Vec<_> = data
            .notifications
            .iter()
            .map(|notification| Banner {
                class: notification.css_class(),
                message: &notification.message,
            })
            .collect();
        ctx.insert("notifications", &banners);
        ctx.insert("dismiss_after_ms", &(DISMISS_AFTER.as_millis() as u64));
        ctx.insert("drafts", &data.drafts);
        ctx.insert("contacts", &data.contacts);
        ctx.insert("remote", &data.remote);
        ctx.insert("projects_html", &self.render_projects(&data.projects)?);
        ctx.insert("team_panels", &self.team_panels(state, &data.team)?);
        ctx.insert("admin_tabs", &state.admin_tabs.states());
        ctx.insert("categories", &ProjectCategory::ALL);
        ctx.insert(
            "selected_category",
            data.drafts
                .get("project_category")
                .map(String::as_str)
                .unwrap_or(""),
        );
        match (&data.project, state.project_id()) {
            (Some(project), Some(id))
                if project.id == id && state.is_visible(Section::ProjectDetail) =>
            {
                ctx.insert("project", project);
                ctx.insert("project_detail", project.detailed_description());
                ctx.insert("comments_html", &self.render_comments(&project.comments)?);
            }
            _ => ctx.insert("project", &None::<Project>),
        }
        self.render("index.html", &ctx)
    }
}

#[cfg(test)]
pub fn test_renderer() -> Renderer {
    Renderer::new(&Path::new(env!("CARGO_MANIFEST_DIR")).join("templates")).unwrap()
}
