use crate::admin::{self, CommentForm, LoginForm, MemberForm, ProjectForm, RegisterForm};
use crate::backend::{BackendKind, DataAccess};
use crate::error::log_error;
use crate::render::{PageData, PageState, Renderer};
use crate::session::BrowserContext;
use actix_multipart::Multipart;
use actix_session::config::PersistentSession;
use actix_session::storage::CookieSessionStore;
use actix_session::{Session, SessionMiddleware};
use actix_web::cookie::{time, Key};
use actix_web::{http::header, web, HttpResponse};
use futures::StreamExt;
use log::{debug, warn};
use serde::Deserialize;

type Dal = web::Data<DataAccess>;
type Templates = web::Data<Renderer>;
type Context = BrowserContext<Session>;

pub const SESSION_COOKIE: &str = "showreel";

pub fn session_middleware(key: Key, secure: bool) -> SessionMiddleware<CookieSessionStore> {
    SessionMiddleware::builder(CookieSessionStore::default(), key)
        .cookie_name(SESSION_COOKIE.to_owned())
        .cookie_secure(secure)
        .session_lifecycle(PersistentSession::default().session_ttl(time::Duration::days(30)))
        .build()
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/projects/{id}", web::get().to(project_detail))
        .route("/projects/{id}/comments", web::post().to(add_comment))
        .route("/login", web::post().to(login))
        .route("/register", web::post().to(register))
        .route("/logout", web::post().to(logout))
        .route("/logout", web::get().to(logout))
        .route("/admin/projects", web::post().to(add_project))
        .route("/admin/team", web::post().to(add_team_member))
        .route("/admin/videos", web::post().to(upload_video));
}

fn redirect(location: &str) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((header::LOCATION, location))
        .finish()
}

/// Follows the backend's auth state: a session it no longer knows is dropped.
async fn sync_session(dal: &DataAccess, ctx: &Context) {
    let user = match ctx.session.current_user() {
        Some(user) => user,
        None => return,
    };
    let result = match dal.refresh_session(&user).await {
        Ok(Some(fresh)) if fresh == user => Ok(()),
        Ok(Some(fresh)) => ctx.session.set_current_user(&fresh).map(|_| ()),
        Ok(None) => {
            debug!("Backend no longer knows user {}", user.id);
            ctx.session.clear_current_user().map(|_| ())
        }
        Err(err) => Err(err),
    };
    if let Err(err) = result {
        warn!("Could not refresh session: {}", err);
    }
}

/// Loads what every page shows; failures become banners and the page still renders.
async fn page(
    dal: &DataAccess,
    ctx: &Context,
    templates: &Renderer,
    state: &PageState,
    project: Option<crate::model::Project>,
) -> actix_web::Result<HttpResponse> {
    sync_session(dal, ctx).await;
    let mut data = PageData {
        project,
        remote: dal.kind() == BackendKind::Remote,
        ..PageData::default()
    };
    let loaded = async {
        data.projects = dal.list_projects().await?;
        data.team = dal.team().await?;
        data.contacts = dal.contacts().await?;
        Ok::<_, crate::error::SiteError>(())
    }
    .await;
    if let Err(err) = loaded {
        ctx.notifications
            .error(format!("Could not load data, please try again later: {}", err));
    }
    data.user = ctx.session.current_user();
    data.notifications = ctx.notifications.take();
    data.drafts = ctx.drafts.all();
    let body = templates
        .render_page(state, &data)
        .map_err(|err| log_error(err, "Template error"))?;
    Ok(HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(body))
}

#[derive(Deserialize)]
struct Navigation {
    section: Option<String>,
    tab: Option<String>,
}

async fn index(
    query: web::Query<Navigation>,
    session: Session,
    dal: Dal,
    templates: Templates,
) -> actix_web::Result<HttpResponse> {
    let ctx = BrowserContext::new(session);
    let mut state = PageState::default();
    state.show_section(query.section.as_deref().unwrap_or("home"));
    if let Some(tab) = &query.tab {
        if !state.team_tabs.activate(tab) {
            state.admin_tabs.activate(tab);
        }
    }
    page(&dal, &ctx, &templates, &state, None).await
}

async fn project_detail(
    path: web::Path<String>,
    session: Session,
    dal: Dal,
    templates: Templates,
) -> actix_web::Result<HttpResponse> {
    let ctx = BrowserContext::new(session);
    let id = path.into_inner();
    let mut state = PageState::default();
    let project = match dal.project(&id).await {
        Ok(project) => {
            state.show_project_detail(&id);
            Some(project)
        }
        Err(err) => {
            ctx.notifications.error(err.to_string());
            state.show_section("projects");
            None
        }
    };
    page(&dal, &ctx, &templates, &state, project).await
}

async fn login(form: web::Form<LoginForm>, session: Session, dal: Dal) -> HttpResponse {
    let _ = admin::login(&dal, &BrowserContext::new(session), &form).await;
    redirect("/")
}

async fn register(form: web::Form<RegisterForm>, session: Session, dal: Dal) -> HttpResponse {
    let _ = admin::register(&dal, &BrowserContext::new(session), &form).await;
    redirect("/")
}

async fn logout(session: Session, dal: Dal) -> HttpResponse {
    let _ = admin::logout(&dal, &BrowserContext::new(session)).await;
    redirect("/")
}

async fn add_project(form: web::Form<ProjectForm>, session: Session, dal: Dal) -> HttpResponse {
    let _ = admin::add_project(&dal, &BrowserContext::new(session), &form).await;
    redirect("/?section=admin&tab=project-tab")
}

async fn add_team_member(form: web::Form<MemberForm>, session: Session, dal: Dal) -> HttpResponse {
    let _ = admin::add_team_member(&dal, &BrowserContext::new(session), &form).await;
    redirect("/?section=admin&tab=member-tab")
}

async fn add_comment(
    path: web::Path<String>,
    form: web::Form<CommentForm>,
    session: Session,
    dal: Dal,
) -> HttpResponse {
    let id = path.into_inner();
    let _ = admin::add_comment(&dal, &BrowserContext::new(session), &id, &form).await;
    redirect(&format!("/projects/{}", id))
}

async fn upload_video(
    mut payload: Multipart,
    session: Session,
    dal: Dal,
) -> actix_web::Result<HttpResponse> {
    let mut file_name = None;
    let mut bytes = Vec::new();
    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|err| log_error(err, "Upload error"))?;
        let is_video = field.name() == "video";
        if is_video {
            file_name = field
                .content_disposition()
                .get_filename()
                .filter(|name| !name.is_empty())
                .map(str::to_owned);
        }
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|err| log_error(err, "Upload error"))?;
            if is_video {
                bytes.extend_from_slice(&chunk);
            }
        }
    }
    let _ = admin::upload_video(
        &dal,
        &BrowserContext::new(session),
        file_name.as_deref(),
        bytes,
    )
    .await;
    Ok(redirect("/?section=admin&tab=video-tab"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::tests::local_access;
    use crate::render::test_renderer;
    use actix_web::cookie::Cookie;
    use actix_web::dev::ServiceResponse;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    fn session_cookie<B>(resp: &ServiceResponse<B>) -> Option<Cookie<'static>> {
        resp.response()
            .cookies()
            .find(|cookie| cookie.name() == SESSION_COOKIE)
            .map(|cookie| cookie.into_owned())
    }

    async fn body<B: actix_web::body::MessageBody>(resp: ServiceResponse<B>) -> String {
        String::from_utf8(test::read_body(resp).await.to_vec()).unwrap()
    }

    macro_rules! app {
        () => {
            app!(false)
        };
        ($secure:expr) => {
            test::init_service(
                App::new()
                    .wrap(session_middleware(Key::generate(), $secure))
                    .app_data(web::Data::new(local_access()))
                    .app_data(web::Data::new(test_renderer()))
                    .configure(configure),
            )
            .await
        };
    }

    fn register_form(role: &str) -> [(&'static str, String); 5] {
        [
            ("name", "Ann".to_owned()),
            ("email", "a@x.com".to_owned()),
            ("password", "p1".to_owned()),
            ("confirm_password", "p1".to_owned()),
            ("role", role.to_owned()),
        ]
    }

    #[actix_rt::test]
    async fn anonymous_home_page_shows_login_controls() {
        let app = app!();
        let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let html = body(resp).await;
        assert!(html.contains("<body class=\"signed-out\">"));
        assert!(html.contains("id=\"loginBtn\""));
    }

    #[actix_rt::test]
    async fn registered_viewer_does_not_see_admin_elements() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/register")
            .set_form(register_form("viewer"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let cookie = session_cookie(&resp).unwrap();

        let req = test::TestRequest::get().uri("/").cookie(cookie).to_request();
        let html = body(test::call_service(&app, req).await).await;
        assert!(html.contains("<body class=\"signed-in\">"));
        assert!(html.contains("Registered successfully"));
        assert!(html.contains("id=\"logoutBtn\""));
    }

    #[actix_rt::test]
    async fn admin_adds_a_project_and_sees_it_listed() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/register")
            .set_form(register_form("admin"))
            .to_request();
        let cookie = session_cookie(&test::call_service(&app, req).await).unwrap();

        let req = test::TestRequest::post()
            .uri("/admin/projects")
            .cookie(cookie)
            .set_form([("title", "Film A"), ("description", "desc"), ("category", "drama")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get(header::LOCATION).unwrap(),
            "/?section=admin&tab=project-tab"
        );
        let cookie = session_cookie(&resp).unwrap();

        let req = test::TestRequest::get()
            .uri("/?section=projects")
            .cookie(cookie)
            .to_request();
        let html = body(test::call_service(&app, req).await).await;
        assert!(html.contains("<body class=\"signed-in admin\">"));
        assert_eq!(html.matches("<h3>Film A</h3>").count(), 1);
        assert!(html.contains("Project &quot;Film A&quot; added"));
    }

    #[actix_rt::test]
    async fn anonymous_comment_is_refused() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/projects/1/comments")
            .set_form([("text", "Great")])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/projects/1");
        let cookie = session_cookie(&resp).unwrap();

        let req = test::TestRequest::get().uri("/").cookie(cookie).to_request();
        let html = body(test::call_service(&app, req).await).await;
        assert!(html.contains("You must be logged in to comment"));
    }

    #[actix_rt::test]
    async fn oversized_comment_still_redirects_with_a_banner() {
        let app = app!();
        let text = "x".repeat(5000);
        let req = test::TestRequest::post()
            .uri("/projects/1/comments")
            .set_form([("text", text.as_str())])
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let cookie = session_cookie(&resp).unwrap();

        let req = test::TestRequest::get().uri("/").cookie(cookie).to_request();
        let html = body(test::call_service(&app, req).await).await;
        assert!(html.contains("You must be logged in to comment"));
        assert!(!html.contains(&text));
    }

    #[actix_rt::test]
    async fn session_cookie_is_secure_when_configured() {
        let app = app!(true);
        let req = test::TestRequest::post()
            .uri("/register")
            .set_form(register_form("viewer"))
            .to_request();
        let cookie = session_cookie(&test::call_service(&app, req).await).unwrap();
        assert_eq!(cookie.secure(), Some(true));

        let app = app!();
        let req = test::TestRequest::post()
            .uri("/register")
            .set_form(register_form("viewer"))
            .to_request();
        let cookie = session_cookie(&test::call_service(&app, req).await).unwrap();
        assert_ne!(cookie.secure(), Some(true));
    }

    #[actix_rt::test]
    async fn unknown_project_falls_back_to_the_list() {
        let app = app!();
        let req = test::TestRequest::get().uri("/projects/404").to_request();
        let html = body(test::call_service(&app, req).await).await;
        assert!(html.contains("Project not found: 404"));
        assert!(html.contains("id=\"projects\" class=\"page-section\" data-visible=\"true\""));
    }

    #[actix_rt::test]
    async fn local_video_upload_reports_it_was_not_stored() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/register")
            .set_form(register_form("admin"))
            .to_request();
        let cookie = session_cookie(&test::call_service(&app, req).await).unwrap();

        let payload = "--XBOUNDARY\r\n\
            Content-Disposition: form-data; name=\"video\"; filename=\"clip.mp4\"\r\n\
            Content-Type: video/mp4\r\n\r\n\
            abc\r\n\
            --XBOUNDARY--\r\n";
        let req = test::TestRequest::post()
            .uri("/admin/videos")
            .cookie(cookie)
            .insert_header((
                header::CONTENT_TYPE,
                "multipart/form-data; boundary=XBOUNDARY",
            ))
            .set_payload(payload)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        let cookie = session_cookie(&resp).unwrap();

        let req = test::TestRequest::get().uri("/").cookie(cookie).to_request();
        let html = body(test::call_service(&app, req).await).await;
        assert!(html.contains("Video &quot;clip.mp4&quot; was not stored"));
    }
}
